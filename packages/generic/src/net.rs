//! Opening sockets for socket backends: client connections and one-shot
//! servers.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use channelfs_core::{Backend, ChannelError};

use crate::socket::{SocketIo, SocketStream, UdpPeer};

/// Transport of a socket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Tcp,
    Udp,
}

impl SocketKind {
    fn socket_type(self) -> libc::c_int {
        match self {
            SocketKind::Tcp => libc::SOCK_STREAM,
            SocketKind::Udp => libc::SOCK_DGRAM,
        }
    }
}

/// How a client socket is set up.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Bound on connecting, reading and writing. `None` blocks forever.
    pub timeout: Option<Duration>,
    /// Local port for UDP; 0 lets the OS pick.
    pub src_port: u16,
    /// Allow UDP broadcast destinations.
    pub broadcast: bool,
    /// `SO_LINGER` seconds applied to TCP sockets.
    pub linger: Option<i32>,
}

/// How a one-shot server waits for its client.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long to wait for the client. `None` waits forever. Also used as
    /// the read/write timeout of the accepted connection.
    pub wait: Option<Duration>,
    pub reuse_addr: bool,
    pub broadcast: bool,
    /// `SO_LINGER` seconds applied to both TCP sockets.
    pub linger: Option<i32>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            wait: Some(Duration::from_secs(60)),
            reuse_addr: false,
            broadcast: false,
            linger: None,
        }
    }
}

fn os_error(operation: &'static str) -> ChannelError {
    ChannelError::io(operation)(io::Error::last_os_error())
}

fn setsockopt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> Result<(), ChannelError> {
    // SAFETY: value points to a live T of the given size.
    let result = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (value as *const T).cast(),
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if result == -1 {
        return Err(os_error("setsockopt"));
    }
    Ok(())
}

/// Set `SO_LINGER` on a socket so close waits up to `seconds` for unsent data.
pub fn set_linger(fd: RawFd, seconds: i32) -> Result<(), ChannelError> {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: seconds,
    };
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_LINGER, &linger)
}

/// Block until `fd` is readable or `timeout` passes. Returns whether it
/// became readable.
pub fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool, ChannelError> {
    let millis = match timeout {
        None => -1,
        Some(t) => t
            .as_micros()
            .div_ceil(1000)
            .min(libc::c_int::MAX as u128) as libc::c_int,
    };
    let mut poll_fd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        // SAFETY: one valid pollfd.
        let ready = unsafe { libc::poll(&mut poll_fd, 1, millis) };
        if ready == -1 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ChannelError::io("poll")(e));
        }
        return Ok(ready > 0 && poll_fd.revents & libc::POLLIN != 0);
    }
}

/// Resolve `host:port`, preferring IPv4 addresses.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ChannelError> {
    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(ChannelError::io("resolve"))?
        .collect();
    addrs.sort_by_key(|addr| !addr.is_ipv4());
    if addrs.is_empty() {
        return Err(ChannelError::io("resolve")(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address for {}", host),
        )));
    }
    Ok(addrs)
}

fn connect_tcp(addrs: &[SocketAddr], options: &ConnectOptions) -> Result<TcpStream, ChannelError> {
    let mut last = None;
    for addr in addrs {
        let attempt = match options.timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("connecting to {} failed: {}", addr, e);
                last = Some(e);
            }
        }
    }
    Err(match last {
        Some(e) => ChannelError::io("connect")(e),
        None => ChannelError::io("connect")(io::Error::from_raw_os_error(libc::EADDRNOTAVAIL)),
    })
}

fn connect_udp(addr: SocketAddr, options: &ConnectOptions) -> Result<UdpSocket, ChannelError> {
    let local = match addr {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, options.src_port)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, options.src_port)),
    };
    let socket = UdpSocket::bind(local).map_err(ChannelError::io("bind"))?;
    if options.broadcast {
        socket
            .set_broadcast(true)
            .map_err(ChannelError::io("setsockopt"))?;
    }
    socket.connect(addr).map_err(ChannelError::io("connect"))?;
    Ok(socket)
}

fn finish<T: SocketIo + 'static>(
    io: T,
    timeout: Option<Duration>,
) -> Result<SocketStream<T>, ChannelError> {
    io.set_timeout(timeout)
        .map_err(ChannelError::io("setsockopt"))?;
    Ok(SocketStream::new(io))
}

/// Connect a client socket to `host:port` and wrap it in a backend.
pub fn connect(
    kind: SocketKind,
    host: &str,
    port: u16,
    options: &ConnectOptions,
) -> Result<Box<dyn Backend>, ChannelError> {
    let addrs = resolve(host, port)?;
    match kind {
        SocketKind::Tcp => {
            let stream = connect_tcp(&addrs, options)?;
            if let Some(seconds) = options.linger {
                set_linger(stream.as_raw_fd(), seconds)?;
            }
            log::debug!("connected to {}:{} over TCP", host, port);
            Ok(Box::new(finish(stream, options.timeout)?))
        }
        SocketKind::Udp => {
            let socket = connect_udp(addrs[0], options)?;
            log::debug!("addressed {} over UDP", addrs[0]);
            Ok(Box::new(finish(socket, options.timeout)?))
        }
    }
}

/// Create a socket bound to `port` on every IPv4 interface, setting
/// `SO_REUSEADDR` before the bind when asked. TCP sockets also listen.
pub fn bind(kind: SocketKind, port: u16, reuse_addr: bool) -> Result<OwnedFd, ChannelError> {
    // SAFETY: plain syscall; the result is checked before use.
    let raw = unsafe { libc::socket(libc::AF_INET, kind.socket_type() | libc::SOCK_CLOEXEC, 0) };
    if raw == -1 {
        return Err(os_error("socket"));
    }
    // SAFETY: raw is a fresh descriptor owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let flag: libc::c_int = if reuse_addr { 1 } else { 0 };
    setsockopt(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_REUSEADDR, &flag)?;

    // SAFETY: sockaddr_in is plain data; all-zero is INADDR_ANY.
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    // SAFETY: addr is a valid sockaddr_in of the stated size.
    let bound = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_in).cast(),
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if bound == -1 {
        return Err(os_error("bind"));
    }

    // SAFETY: fd is a bound stream socket.
    if kind == SocketKind::Tcp && unsafe { libc::listen(fd.as_raw_fd(), 1) } == -1 {
        return Err(os_error("listen"));
    }
    Ok(fd)
}

fn wait_for_client(fd: RawFd, local: SocketAddr, wait: Option<Duration>) -> Result<(), ChannelError> {
    match wait {
        Some(limit) => log::info!("waiting up to {:?} for a client on {}", limit, local),
        None => log::info!("waiting for a client on {}", local),
    }
    if wait_readable(fd, wait)? {
        return Ok(());
    }
    log::info!("no client showed up on {}", local);
    Err(ChannelError::Timeout {
        operation: "waiting for a client",
    })
}

/// Bind `port`, wait for exactly one client, and serve it as a backend.
///
/// The listening socket stays open until the channel closes, then goes with
/// the client connection. A TCP server accepts its client; a UDP server
/// answers whoever sent the last datagram.
pub fn serve(
    kind: SocketKind,
    port: u16,
    options: &ServeOptions,
) -> Result<Box<dyn Backend>, ChannelError> {
    let fd = bind(kind, port, options.reuse_addr)?;
    match kind {
        SocketKind::Tcp => {
            let listener = TcpListener::from(fd);
            let local = listener.local_addr().map_err(ChannelError::io("getsockname"))?;
            if let Some(seconds) = options.linger {
                set_linger(listener.as_raw_fd(), seconds)?;
            }
            wait_for_client(listener.as_raw_fd(), local, options.wait)?;

            let (stream, peer) = listener.accept().map_err(ChannelError::io("accept"))?;
            log::info!("accepted client {} on {}", peer, local);
            if let Some(seconds) = options.linger {
                set_linger(stream.as_raw_fd(), seconds)?;
            }
            let stream = finish(stream, options.wait)?;
            Ok(Box::new(stream.with_server(OwnedFd::from(listener), local)))
        }
        SocketKind::Udp => {
            let socket = UdpSocket::from(fd);
            let local = socket.local_addr().map_err(ChannelError::io("getsockname"))?;
            if options.broadcast {
                socket
                    .set_broadcast(true)
                    .map_err(ChannelError::io("setsockopt"))?;
            }
            wait_for_client(socket.as_raw_fd(), local, options.wait)?;

            let client = socket.try_clone().map_err(ChannelError::io("dup"))?;
            log::info!("client datagram waiting on {}", local);
            let stream = finish(UdpPeer::new(client), options.wait)?;
            Ok(Box::new(stream.with_server(OwnedFd::from(socket), local)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelfs_core::{Property, Transfer};
    use std::io::{Read, Write};
    use std::thread;

    fn free_port(kind: SocketKind) -> u16 {
        match kind {
            SocketKind::Tcp => TcpListener::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port(),
            SocketKind::Udp => UdpSocket::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port(),
        }
    }

    #[test]
    fn wait_readable_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let ready = wait_readable(socket.as_raw_fd(), Some(Duration::from_millis(20))).unwrap();
        assert!(!ready);

        let addr = socket.local_addr().unwrap();
        UdpSocket::bind("127.0.0.1:0").unwrap().send_to(b"x", addr).unwrap();
        assert!(wait_readable(socket.as_raw_fd(), Some(Duration::from_secs(5))).unwrap());
    }

    #[test]
    fn bind_twice_needs_reuse() {
        let port = free_port(SocketKind::Udp);
        let _first = bind(SocketKind::Udp, port, false).unwrap();
        let err = bind(SocketKind::Udp, port, false).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EADDRINUSE));
    }

    #[test]
    fn tcp_server_accepts_one_client() {
        let port = free_port(SocketKind::Tcp);
        let client = thread::spawn(move || {
            let mut stream = loop {
                match TcpStream::connect(("127.0.0.1", port)) {
                    Ok(stream) => break stream,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            };
            stream.write_all(b"hello").unwrap();
            let mut reply = [0u8; 3];
            stream.read_exact(&mut reply).unwrap();
            reply
        });

        let options = ServeOptions {
            wait: Some(Duration::from_secs(10)),
            reuse_addr: true,
            linger: Some(1),
            ..ServeOptions::default()
        };
        let mut server = serve(SocketKind::Tcp, port, &options).unwrap();
        assert!(matches!(server.property("SocketServer"), Some(Property::Socket(a)) if a.port() == port));

        let mut buf = [0u8; 5];
        assert_eq!(server.read(&mut buf).unwrap(), Transfer::new(5));
        assert_eq!(&buf, b"hello");
        server.write(b"bye").unwrap();
        assert_eq!(&client.join().unwrap(), b"bye");
        server.close().unwrap();
    }

    #[test]
    fn server_wait_times_out() {
        let port = free_port(SocketKind::Tcp);
        let options = ServeOptions {
            wait: Some(Duration::from_millis(50)),
            ..ServeOptions::default()
        };
        let err = serve(SocketKind::Tcp, port, &options).err().unwrap();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }

    #[test]
    fn udp_server_answers_last_sender() {
        let port = free_port(SocketKind::Udp);
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let sender = peer.try_clone().unwrap();
        let sending = thread::spawn(move || {
            // datagrams sent before the bind are lost, so keep trying
            for _ in 0..200 {
                let _ = sender.send_to(b"ping", ("127.0.0.1", port));
                thread::sleep(Duration::from_millis(10));
            }
        });

        let options = ServeOptions {
            wait: Some(Duration::from_secs(10)),
            reuse_addr: true,
            ..ServeOptions::default()
        };
        let mut server = serve(SocketKind::Udp, port, &options).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(server.read(&mut buf).unwrap().bytes, 4);
        assert_eq!(&buf, b"ping");
        server.write(b"pong").unwrap();

        let mut reply = [0u8; 4];
        loop {
            let (n, _) = peer.recv_from(&mut reply).unwrap();
            if &reply[..n] == b"pong" {
                break;
            }
        }
        server.close().unwrap();
        sending.join().unwrap();
    }

    #[test]
    fn udp_client_round_trip() {
        let echo = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = echo.local_addr().unwrap().port();
        let options = ConnectOptions {
            timeout: Some(Duration::from_secs(5)),
            ..ConnectOptions::default()
        };
        let mut client = connect(SocketKind::Udp, "127.0.0.1", port, &options).unwrap();
        client.write(b"data").unwrap();

        let mut buf = [0u8; 4];
        let (_, from) = echo.recv_from(&mut buf).unwrap();
        echo.send_to(b"back", from).unwrap();
        assert_eq!(client.read(&mut buf).unwrap().bytes, 4);
        assert_eq!(&buf, b"back");
        client.close().unwrap();
    }

    #[test]
    fn refused_tcp_connect_fails() {
        let port = free_port(SocketKind::Tcp);
        let err = connect(SocketKind::Tcp, "127.0.0.1", port, &ConnectOptions::default()).err().unwrap();
        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    }
}
