use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// An open connection to one node. Dropping it closes the socket.
#[async_trait]
pub trait Link: Send {
    /// Write some prefix of `buf`, returning how much went out.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Opens links. Swappable so tests can stand in for the network.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, local_address: &str, address: &str) -> io::Result<Box<dyn Link>>;
}

/// Connected UDP socket aimed at a node's Art-Net port.
pub struct UdpDialer {
    port: u16,
}

impl UdpDialer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for UdpDialer {
    fn default() -> Self {
        Self::new(artnet::ARTNET_PORT)
    }
}

fn bind_address(local_address: &str) -> io::Result<SocketAddr> {
    let ip = if local_address.is_empty() { "0.0.0.0" } else { local_address };
    format!("{ip}:0")
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad local address {ip}: {e}")))
}

#[async_trait]
impl Dialer for UdpDialer {
    async fn dial(&self, local_address: &str, address: &str) -> io::Result<Box<dyn Link>> {
        let socket = UdpSocket::bind(bind_address(local_address)?).await?;
        socket.connect((address, self.port)).await?;
        Ok(Box::new(UdpLink { socket }))
    }
}

struct UdpLink {
    socket: UdpSocket,
}

#[async_trait]
impl Link for UdpLink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_local_address_binds_everywhere() {
        assert_eq!(bind_address("").unwrap(), "0.0.0.0:0".parse().unwrap());
        assert_eq!(bind_address("127.0.0.1").unwrap(), "127.0.0.1:0".parse().unwrap());
        assert!(bind_address("not an ip").is_err());
    }

    #[tokio::test]
    async fn udp_link_delivers_a_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let dialer = UdpDialer::new(port);
        let mut link = dialer.dial("127.0.0.1", "127.0.0.1").await.unwrap();
        let sent = link.write(b"Art-Net\0").await.unwrap();
        assert_eq!(sent, 8);

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Art-Net\0");
    }
}
