use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

use crate::{
    split_port_address, OpCode, ARTDMX_PACKET_LEN, DMX_CHANNELS, HEADER, PROTOCOL_VERSION,
};

/// Per-universe ArtDmx state: the address bytes derived from the universe
/// number and the rolling sequence counter.
///
/// The 512-byte payload itself is supplied on every encode so the caller
/// decides where channel data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtDmxPacket {
    sequence: u8,
    physical: u8,
    net: u8,
    sub_uni: u8,
}

impl ArtDmxPacket {
    pub fn new(universe: u16) -> Self {
        let (net, sub_uni) = split_port_address(universe);
        Self {
            sequence: 0,
            physical: 0,
            net,
            sub_uni,
        }
    }

    /// Sequence number carried by the most recently encoded packet (0 before the first).
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Advance the sequence and serialize one full ArtDmx frame.
    ///
    /// Format: "Art-Net\0" + OpDmx(LE) + ProtVer(BE) + Sequence + Physical
    ///         + SubUni + Net + Length(BE) + data[512]
    pub fn encode(&mut self, data: &[u8; DMX_CHANNELS]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ARTDMX_PACKET_LEN);
        self.encode_into(data, &mut buf);
        buf
    }

    /// Same as [`encode`](Self::encode) but reuses `buf`, which is cleared first.
    pub fn encode_into(&mut self, data: &[u8; DMX_CHANNELS], buf: &mut Vec<u8>) {
        // 0 tells receivers sequencing is disabled; cycle through 1..=255.
        self.sequence = match self.sequence {
            u8::MAX => 1,
            s => s + 1,
        };

        buf.clear();
        buf.extend_from_slice(HEADER);
        buf.extend_from_slice(&(OpCode::Dmx as u16).to_le_bytes());
        buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        buf.push(self.sequence);
        buf.push(self.physical);
        buf.push(self.sub_uni);
        buf.push(self.net);
        buf.extend_from_slice(&(DMX_CHANNELS as u16).to_be_bytes());
        buf.extend_from_slice(data);
    }
}

/// Build an ArtPoll packet.
///
/// Format: "Art-Net\0" + OpPoll(LE) + ProtVer(BE) + TalkToMe + Priority
pub fn build_artpoll_packet() -> Vec<u8> {
    let mut buf = Vec::with_capacity(14);
    buf.extend_from_slice(HEADER);
    buf.extend_from_slice(&(OpCode::Poll as u16).to_le_bytes());
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.push(0x00); // TalkToMe
    buf.push(0x00); // Priority
    buf
}

/// Decoded ArtDmx frame.
#[derive(Debug, Clone)]
pub struct ParsedArtDmx {
    pub sequence: u8,
    pub physical: u8,
    pub universe: u16,
    pub data: Vec<u8>,
}

/// Parse an ArtDmx frame from bytes.
pub fn parse_artdmx_packet(data: &[u8]) -> io::Result<ParsedArtDmx> {
    let mut cursor = Cursor::new(data);

    let mut marker = [0u8; 8];
    cursor.read_exact(&mut marker)?;
    if &marker != HEADER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected Art-Net marker, got {:?}",
                String::from_utf8_lossy(&marker)
            ),
        ));
    }

    let opcode = cursor.read_u16::<LittleEndian>()?;
    if OpCode::from_u16(opcode) != Some(OpCode::Dmx) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("not an ArtDmx packet: opcode 0x{opcode:04x}"),
        ));
    }

    let _version = cursor.read_u16::<BigEndian>()?;
    let sequence = cursor.read_u8()?;
    let physical = cursor.read_u8()?;
    let sub_uni = cursor.read_u8()?;
    let net = cursor.read_u8()?;
    let length = cursor.read_u16::<BigEndian>()? as usize;
    if length > DMX_CHANNELS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("ArtDmx length {length} exceeds {DMX_CHANNELS}"),
        ));
    }

    let mut payload = vec![0u8; length];
    cursor.read_exact(&mut payload)?;

    Ok(ParsedArtDmx {
        sequence,
        physical,
        universe: crate::join_port_address(net, sub_uni),
        data: payload,
    })
}
