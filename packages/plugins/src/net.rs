//! Socket schemes: `Tcp` and `Udp` clients, `ServerTcp` and `ServerUdp`.

use std::time::Duration;

use channelfs_core::{Backend, ChannelError, Mode, OpenRequest, Options, Plugin};
use channelfs_generic::{connect, serve, ConnectOptions, ServeOptions, SocketKind};

use crate::args;

/// Client read/write timeout when `timeout` is absent.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// Client `SO_LINGER` seconds when `lingerTimeout` is absent.
const CLIENT_LINGER: i32 = 1;
/// How long servers wait for their client when `waitClientTimeout` is absent.
const SERVER_WAIT: Duration = Duration::from_secs(60);

fn address_options(payload: &str) -> Result<Options, ChannelError> {
    let mut options = Options::new();
    if !payload.is_empty() {
        let (host, port) = args::split_pair(payload, "host:port payload")?;
        options.push("host", host);
        options.push("port", port);
    }
    Ok(options)
}

fn port_options(payload: &str) -> Options {
    let mut options = Options::new();
    if !payload.is_empty() {
        options.push("port", payload);
    }
    options
}

/// A client socket addressed with `Scheme://host:port`.
///
/// Options: `timeout` (microseconds, 0 blocks forever), and for UDP
/// `srcport` and `broadcast`, for TCP `lingerTimeout` (seconds).
#[derive(Debug, Clone, Copy)]
pub struct ClientPlugin {
    kind: SocketKind,
}

impl ClientPlugin {
    pub fn tcp() -> Self {
        Self {
            kind: SocketKind::Tcp,
        }
    }

    pub fn udp() -> Self {
        Self {
            kind: SocketKind::Udp,
        }
    }
}

impl Plugin for ClientPlugin {
    fn scheme(&self) -> &'static str {
        match self.kind {
            SocketKind::Tcp => "Tcp",
            SocketKind::Udp => "Udp",
        }
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_WRITE)
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        address_options(payload)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let options = request.options;
        let host = args::required(options, "host")?;
        let port = args::port(options, "port")?;

        let mut settings = ConnectOptions {
            timeout: args::micros_or(options, "timeout", Some(CLIENT_TIMEOUT))?,
            ..ConnectOptions::default()
        };
        match self.kind {
            SocketKind::Tcp => {
                settings.linger = Some(args::linger(options, "lingerTimeout")?.unwrap_or(CLIENT_LINGER));
            }
            SocketKind::Udp => {
                settings.src_port = args::local_port(options, "srcport")?;
                settings.broadcast = args::flag(options, "broadcast")?;
            }
        }
        connect(self.kind, host, port, &settings)
    }
}

/// A one-shot server addressed with `Scheme://port`.
///
/// Opening blocks until one client shows up or `waitClientTimeout`
/// (microseconds, default 60 s, 0 waits forever) passes. Options:
/// `reuseAddr`, `lingerTimeout` (TCP, seconds) and `broadcast` (UDP).
#[derive(Debug, Clone, Copy)]
pub struct ServerPlugin {
    kind: SocketKind,
}

impl ServerPlugin {
    pub fn tcp() -> Self {
        Self {
            kind: SocketKind::Tcp,
        }
    }

    pub fn udp() -> Self {
        Self {
            kind: SocketKind::Udp,
        }
    }
}

impl Plugin for ServerPlugin {
    fn scheme(&self) -> &'static str {
        match self.kind {
            SocketKind::Tcp => "ServerTcp",
            SocketKind::Udp => "ServerUdp",
        }
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_WRITE)
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        Ok(port_options(payload))
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let options = request.options;
        let port = args::port(options, "port")?;

        let mut settings = ServeOptions {
            wait: args::micros_or(options, "waitClientTimeout", Some(SERVER_WAIT))?,
            reuse_addr: args::flag(options, "reuseAddr")?,
            ..ServeOptions::default()
        };
        match self.kind {
            SocketKind::Tcp => settings.linger = args::linger(options, "lingerTimeout")?,
            SocketKind::Udp => settings.broadcast = args::flag(options, "broadcast")?,
        }
        serve(self.kind, port, &settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelfs_core::{Channel, Permissions, Property, Registry};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn registry() -> Registry {
        Registry::new()
            .with(ClientPlugin::tcp())
            .with(ClientPlugin::udp())
            .with(ServerPlugin::tcp())
            .with(ServerPlugin::udp())
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn tcp_client_works() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let echo = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut channel = Channel::new();
        channel
            .open(
                &registry(),
                &format!("Tcp://127.0.0.1:{}", port),
                Mode::empty(),
                Permissions::empty(),
            )
            .unwrap();
        assert!(matches!(channel.get_property("Socket"), Some(Property::Socket(a)) if a.port() == port));
        channel.write_block(b"hello").unwrap();

        let mut buf = [0u8; 5];
        channel.read_block(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        echo.join().unwrap();

        // the echo side has hung up
        assert_eq!(channel.read(&mut buf).unwrap(), 0);
        assert!(channel.eof());
        channel.close().unwrap();
    }

    #[test]
    fn port_must_be_valid() {
        let registry = registry();
        for locator in ["Tcp://localhost:0", "Tcp://localhost:70000", "ServerTcp://0"] {
            let mut channel = Channel::new();
            let err = channel
                .open(&registry, locator, Mode::empty(), Permissions::empty())
                .unwrap_err();
            assert!(matches!(err, ChannelError::OutOfRange { what: "port", .. }), "{}", locator);
        }

        let mut channel = Channel::new();
        let err = channel
            .open(&registry, "Udp://", Mode::empty(), Permissions::empty())
            .unwrap_err();
        assert!(matches!(err, ChannelError::MissingOption { option: "host" }));
    }

    #[test]
    fn server_tcp_serves_one_client() {
        let port = free_port();
        let client = thread::spawn(move || {
            let mut stream = loop {
                match TcpStream::connect(("127.0.0.1", port)) {
                    Ok(stream) => break stream,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            };
            stream.write_all(b"request").unwrap();
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).unwrap();
            reply
        });

        let mut channel = Channel::new();
        channel
            .open(
                &registry(),
                &format!("ServerTcp://{} reuseAddr = 1 waitClientTimeout = 10000000", port),
                Mode::empty(),
                Permissions::empty(),
            )
            .unwrap();
        assert!(matches!(
            channel.get_property("SocketServer"),
            Some(Property::Socket(a)) if a.port() == port
        ));

        let mut buf = [0u8; 7];
        channel.read_block(&mut buf).unwrap();
        assert_eq!(&buf, b"request");
        channel.puts("response").unwrap();
        channel.close().unwrap();

        assert_eq!(client.join().unwrap(), b"response");
    }

    #[test]
    fn server_gives_up_waiting() {
        let mut channel = Channel::new();
        let err = channel
            .open(
                &registry(),
                &format!("ServerTcp://{} waitClientTimeout = 20000", free_port()),
                Mode::empty(),
                Permissions::empty(),
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
        assert_eq!(channel.last_error(), Some(channelfs_core::ErrorKind::Timeout));
    }
}
