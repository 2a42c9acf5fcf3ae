pub mod packet;

pub use packet::{build_artpoll_packet, parse_artdmx_packet, ArtDmxPacket, ParsedArtDmx};

/// UDP port every Art-Net node listens on.
pub const ARTNET_PORT: u16 = 6454;

/// "Art-Net\0" marker that opens every packet.
pub const HEADER: &[u8; 8] = b"Art-Net\0";

/// Protocol revision we speak (Art-Net 4 still reports 14).
pub const PROTOCOL_VERSION: u16 = 14;

/// Channels carried by one universe.
pub const DMX_CHANNELS: usize = 512;

/// Header (18 bytes) plus a full universe payload.
pub const ARTDMX_PACKET_LEN: usize = 18 + DMX_CHANNELS;

/// Highest addressable universe (15-bit Port-Address).
pub const MAX_PORT_ADDRESS: u16 = 0x7FFF;

/// OpCodes are transmitted low byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpCode {
    Poll = 0x2000,
    PollReply = 0x2100,
    Dmx = 0x5000,
}

impl OpCode {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x2000 => Some(Self::Poll),
            0x2100 => Some(Self::PollReply),
            0x5000 => Some(Self::Dmx),
            _ => None,
        }
    }
}

/// Split a 15-bit Port-Address into the (Net, SubUni) bytes of an ArtDmx header.
///
/// Net holds bits 14-8, SubUni holds the sub-net nibble and universe nibble.
pub fn split_port_address(universe: u16) -> (u8, u8) {
    let net = ((universe >> 8) & 0x7F) as u8;
    let sub_uni = (universe & 0xFF) as u8;
    (net, sub_uni)
}

/// Inverse of [`split_port_address`].
pub fn join_port_address(net: u8, sub_uni: u8) -> u16 {
    (((net & 0x7F) as u16) << 8) | sub_uni as u16
}
