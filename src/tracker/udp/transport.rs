use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// One datagram out, one datagram in. Implementations must report an expired
/// read as `ErrorKind::TimedOut` or `ErrorKind::WouldBlock`.
pub trait Transport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize>;

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// A UDP socket connected to a single tracker.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds `bind_addr` and connects to the first address `tracker` resolves to.
    /// An unspecified bind address follows the tracker's address family.
    pub fn dial(bind_addr: SocketAddr, tracker: &str) -> io::Result<Self> {
        let remote = tracker.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{tracker} did not resolve to any address"),
            )
        })?;

        let local = match (bind_addr, remote) {
            (SocketAddr::V4(local), SocketAddr::V6(_)) if local.ip().is_unspecified() => {
                SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), local.port())
            }
            (SocketAddr::V6(local), SocketAddr::V4(_)) if local.ip().is_unspecified() => {
                SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), local.port())
            }
            _ => bind_addr,
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send(datagram)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // A zero read timeout is rejected by the OS layer
        if timeout.is_zero() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.recv(buf)
    }
}
