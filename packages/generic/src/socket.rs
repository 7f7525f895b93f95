//! Backends over connected sockets.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use channelfs_core::{Backend, ChannelError, Property, Transfer};

/// OS error codes that mean the peer went away. Reads and writes failing
/// with one of these end the stream instead of failing.
const PEER_GONE: [i32; 11] = [
    libc::ECONNRESET,
    libc::ECONNABORTED,
    libc::ECONNREFUSED,
    libc::ENETDOWN,
    libc::ENETUNREACH,
    libc::ENETRESET,
    libc::ENOTCONN,
    libc::ESHUTDOWN,
    libc::EPIPE,
    libc::EHOSTDOWN,
    libc::EHOSTUNREACH,
];

/// Whether `error` means the peer is gone rather than a real failure.
pub fn is_peer_gone(error: &io::Error) -> bool {
    error
        .raw_os_error()
        .is_some_and(|code| PEER_GONE.contains(&code))
}

/// The send/receive primitives a socket backend needs.
///
/// # Object Safety
///
/// This trait is object-safe.
pub trait SocketIo: AsRawFd + Send {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The remote address, once known.
    fn peer(&self) -> Option<SocketAddr>;

    /// Bound both directions; `None` blocks forever.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Tell the peer we are done. Sockets without a connection do nothing.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SocketIo for TcpStream {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

/// A UDP socket with a fixed peer, set up with `connect`.
impl SocketIo for UdpSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, buf)
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

/// A bound UDP socket that answers whoever sent the last datagram.
#[derive(Debug)]
pub struct UdpPeer {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpPeer {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket, peer: None }
    }
}

impl AsRawFd for UdpPeer {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl SocketIo for UdpPeer {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket.recv_from(buf)?;
        self.peer = Some(from);
        Ok(n)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.peer {
            Some(peer) => self.socket.send_to(buf, peer),
            None => Err(io::Error::from_raw_os_error(libc::EDESTADDRREQ)),
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)?;
        self.socket.set_write_timeout(timeout)
    }
}

/// Convert a microsecond count to a socket timeout; zero means none.
pub fn micros(us: i64) -> Option<Duration> {
    u64::try_from(us)
        .ok()
        .filter(|&us| us > 0)
        .map(Duration::from_micros)
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// A stream over a connected socket.
///
/// Sockets cannot reposition, so the channel serves relative seeks from
/// its pushback buffer alone. EOF is never inferred from a short transfer:
/// it comes from an orderly shutdown or from an error in the peer-gone
/// catalogue.
///
/// Server plugins also hand over the listening socket, which lives as long
/// as the accepted connection and is closed right after it.
#[derive(Debug)]
pub struct SocketStream<T: SocketIo> {
    io: Option<T>,
    server: Option<(OwnedFd, SocketAddr)>,
}

impl<T: SocketIo> SocketStream<T> {
    pub fn new(io: T) -> Self {
        Self {
            io: Some(io),
            server: None,
        }
    }

    /// Keep the listening socket the connection was accepted from.
    pub fn with_server(mut self, listener: OwnedFd, local: SocketAddr) -> Self {
        self.server = Some((listener, local));
        self
    }

    pub fn io(&self) -> Option<&T> {
        self.io.as_ref()
    }

    fn connection(&mut self) -> Result<&mut T, ChannelError> {
        self.io
            .as_mut()
            .ok_or_else(|| ChannelError::SocketRead(io::Error::from_raw_os_error(libc::ENOTCONN)))
    }
}

impl<T: SocketIo> Backend for SocketStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        let conn = self.connection()?;
        loop {
            return match conn.recv(buf) {
                Ok(0) => Ok(Transfer::eof(0)),
                Ok(n) => Ok(Transfer::new(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_peer_gone(&e) => {
                    log::debug!("socket read: peer gone ({}), reporting EOF", e);
                    Ok(Transfer::eof(0))
                }
                Err(e) if is_timeout(&e) => Err(ChannelError::Timeout {
                    operation: "reading from socket",
                }),
                Err(e) => Err(ChannelError::SocketRead(e)),
            };
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        let conn = self.connection()?;
        loop {
            return match conn.send(buf) {
                Ok(n) => {
                    if n < buf.len() {
                        log::debug!("socket accepted {} of {} bytes", n, buf.len());
                    }
                    Ok(Transfer::new(n))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_peer_gone(&e) => {
                    log::debug!("socket write: peer gone ({}), reporting EOF", e);
                    Ok(Transfer::eof(0))
                }
                Err(e) if is_timeout(&e) => Err(ChannelError::Timeout {
                    operation: "writing to socket",
                }),
                Err(e) => Err(ChannelError::SocketWrite(e)),
            };
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let result = match self.io.take() {
            Some(mut conn) => conn.shutdown().map_err(ChannelError::io("shutdown")),
            None => Ok(()),
        };
        if let Some((_, local)) = self.server.take() {
            log::debug!("closed server socket on {}", local);
        }
        result
    }

    fn detach(&mut self) {
        if let Some(io) = self.io.take() {
            std::mem::forget(io);
        }
        if let Some((listener, _)) = self.server.take() {
            std::mem::forget(listener);
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        let io = self.io.as_ref()?;
        match name {
            "Fd" => Some(Property::Fd(io.as_raw_fd())),
            "Socket" => io.peer().map(Property::Socket),
            "SocketServer" => self.server.as_ref().map(|(_, local)| Property::Socket(*local)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Property) -> bool {
        match (name, value.as_int(), self.io.as_ref()) {
            ("Timeout", Some(us), Some(io)) => match io.set_timeout(micros(us)) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("setting socket timeout failed: {}", e);
                    false
                }
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn peer_gone_catalogue_works() {
        assert!(is_peer_gone(&io::Error::from_raw_os_error(libc::ECONNRESET)));
        assert!(is_peer_gone(&io::Error::from_raw_os_error(libc::EPIPE)));
        assert!(!is_peer_gone(&io::Error::from_raw_os_error(libc::EINVAL)));
        assert!(!is_peer_gone(&io::Error::new(io::ErrorKind::Other, "no code")));
    }

    #[test]
    fn micros_works() {
        assert_eq!(micros(0), None);
        assert_eq!(micros(-5), None);
        assert_eq!(micros(1_500_000), Some(Duration::from_millis(1500)));
    }

    /// Fails every call with a fixed OS error.
    struct Failing(i32);

    impl AsRawFd for Failing {
        fn as_raw_fd(&self) -> RawFd {
            -1
        }
    }

    impl SocketIo for Failing {
        fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(self.0))
        }

        fn send(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(self.0))
        }

        fn peer(&self) -> Option<SocketAddr> {
            None
        }

        fn set_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn connection_reset_is_eof() {
        let mut stream = SocketStream::new(Failing(libc::ECONNRESET));
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), Transfer::eof(0));
        assert_eq!(stream.write(b"x").unwrap(), Transfer::eof(0));
    }

    #[test]
    fn other_errors_are_hard() {
        let mut stream = SocketStream::new(Failing(libc::EINVAL));
        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(err, ChannelError::SocketRead(_)));
        let err = stream.write(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::SocketWrite(_)));
    }

    #[test]
    fn tcp_pair_works() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let mut client = SocketStream::new(client);
        let mut server = SocketStream::new(server);
        assert!(client.repositioner().is_none());
        assert_eq!(client.property("Socket"), Some(Property::Socket(addr)));
        assert!(client.set_property("Timeout", Property::Int(2_000_000)));

        client.write(b"ping").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(server.read(&mut buf).unwrap(), Transfer::new(4));
        assert_eq!(&buf, b"ping");

        client.close().unwrap();
        assert_eq!(server.read(&mut buf).unwrap(), Transfer::eof(0));
    }
}
