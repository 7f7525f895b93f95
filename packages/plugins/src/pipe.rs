//! `PipeCmd://`: a shell command's standard output or standard input.
//!
//! The command runs through `sh -c`. A read-only channel reads what the
//! command prints; a write-only channel feeds the command. Closing waits for
//! the command to exit.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::process::{Child, Command, Stdio};

use channelfs_core::{
    Access, Backend, ChannelError, OpenRequest, Options, Plugin, Property, Transfer,
};
use channelfs_generic::BufferedDescriptor;

/// A running command and our end of its pipe.
#[derive(Debug)]
pub struct PipeCommand {
    pipe: BufferedDescriptor,
    child: Option<Child>,
    command: String,
}

impl PipeCommand {
    /// Start `command` with one of its standard streams piped to us.
    pub fn spawn(command: &str, access: Access) -> Result<Self, ChannelError> {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        match access {
            Access::Read => shell.stdout(Stdio::piped()),
            Access::Write => shell.stdin(Stdio::piped()),
            Access::ReadWrite => {
                return Err(ChannelError::BadFlags {
                    message: "PipeCmd channels are either READ_ONLY or WRITE_ONLY".to_string(),
                })
            }
        };

        let mut child = shell.spawn().map_err(ChannelError::io("spawn"))?;
        let fd: Option<OwnedFd> = match access {
            Access::Read => child.stdout.take().map(OwnedFd::from),
            _ => child.stdin.take().map(OwnedFd::from),
        };
        let Some(fd) = fd else {
            let _ = child.kill();
            return Err(ChannelError::io("pipe")(std::io::Error::from_raw_os_error(
                libc::EPIPE,
            )));
        };
        log::debug!("started '{}' as pid {}", command, child.id());

        Ok(Self {
            pipe: BufferedDescriptor::new(File::from(fd), true),
            child: Some(child),
            command: command.to_string(),
        })
    }
}

impl Backend for PipeCommand {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        self.pipe.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        self.pipe.write(buf)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        self.pipe.flush()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        // the command sees EOF on its input only once our end is gone
        let closed = self.pipe.close();
        if let Some(mut child) = self.child.take() {
            let status = child.wait().map_err(ChannelError::io("wait"))?;
            if !status.success() {
                log::warn!("'{}' exited with {}", self.command, status);
            }
        }
        closed
    }

    fn detach(&mut self) {
        self.pipe.detach();
        self.child = None;
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            "Pid" => self.child.as_ref().map(|c| Property::Int(i64::from(c.id()))),
            _ => self.pipe.property(name),
        }
    }
}

/// `PipeCmd://command` or `PipeCmd:// name = 'command with arguments'`.
///
/// Needs `READ_ONLY` or `WRITE_ONLY`; there is no default mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeCmdPlugin;

impl Plugin for PipeCmdPlugin {
    fn scheme(&self) -> &'static str {
        "PipeCmd"
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        let mut options = Options::new();
        if !payload.is_empty() {
            options.push("name", payload);
        }
        Ok(options)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let command = request
            .options
            .get("name")
            .ok_or(ChannelError::MissingOption { option: "name" })?;
        Ok(Box::new(PipeCommand::spawn(command, request.mode.access()?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelfs_core::{Channel, Mode, Permissions, Registry, Whence};
    use tempfile::tempdir;

    fn registry() -> Registry {
        Registry::new().with(PipeCmdPlugin)
    }

    #[test]
    fn reading_a_command_works() {
        let mut channel = Channel::new();
        channel
            .open(
                &registry(),
                "PipeCmd:// name = 'printf \"one\\ntwo\\n\"'",
                Mode::READ_ONLY,
                Permissions::empty(),
            )
            .unwrap();
        assert!(matches!(channel.get_property("Pid"), Some(Property::Int(pid)) if pid > 0));
        assert!(channel.get_property("Fd").is_some());

        assert_eq!(channel.gets(64).unwrap(), b"one\n");
        // stream media seek only within the pushback
        channel.unget(b"\n").unwrap();
        assert!(channel.seek(-2, Whence::Current).is_err());
        assert_eq!(channel.gets(64).unwrap(), b"\n");
        assert_eq!(channel.gets(64).unwrap(), b"two\n");
        assert!(channel.gets(64).unwrap().is_empty());
        assert!(channel.eof());
        channel.close().unwrap();
    }

    #[test]
    fn writing_to_a_command_works() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fed");
        let mut channel = Channel::new();
        channel
            .open(
                &registry(),
                &format!("PipeCmd:// name = 'cat > {}'", path.display()),
                Mode::WRITE_ONLY,
                Permissions::empty(),
            )
            .unwrap();
        channel.puts("through the pipe").unwrap();
        // close waits for the command
        channel.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"through the pipe");
    }

    #[test]
    fn needs_one_direction() {
        let registry = registry();
        let mut channel = Channel::new();
        let err = channel
            .open(&registry, "PipeCmd://true", Mode::READ_WRITE, Permissions::empty())
            .unwrap_err();
        assert!(matches!(err, ChannelError::BadFlags { .. }));

        let mut channel = Channel::new();
        let err = channel
            .open(&registry, "PipeCmd://true", Mode::empty(), Permissions::empty())
            .unwrap_err();
        assert!(matches!(err, ChannelError::UndefinedMode));

        let mut channel = Channel::new();
        let err = channel
            .open(&registry, "PipeCmd://", Mode::READ_ONLY, Permissions::empty())
            .unwrap_err();
        assert!(matches!(err, ChannelError::MissingOption { option: "name" }));
    }
}
