//! Device transport: one UDP datagram of raw RGB per device per frame
//!
//! No header, no acknowledgement, no retry. A send that would block is dropped;
//! the next frame carries fresher data anyway.

use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Default port of the realtime pixel protocol
pub const DEFAULT_PIXEL_PORT: u16 = 21324;

/// Anything that can push a device frame to an address
pub trait Transport: Send + Sync {
    fn send(&self, addr: SocketAddr, payload: &[u8]) -> io::Result<()>;
}

/// Non-blocking UDP socket shared by every device
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port on all interfaces
    pub fn bind() -> io::Result<Self> {
        Self::bind_to(SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    pub fn bind_to(local: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        tracing::debug!(local = %socket.local_addr()?, "udp transport bound");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&self, addr: SocketAddr, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, addr)?;
        if sent < payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {sent} of {} bytes", payload.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn payload_arrives_as_one_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let transport = UdpTransport::bind_to("127.0.0.1:0".parse().unwrap()).unwrap();

        let payload = [255, 0, 0, 0, 255, 0];
        transport
            .send(receiver.local_addr().unwrap(), &payload)
            .unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &payload);
        assert_eq!(from, transport.local_addr().unwrap());
    }
}
