//! `Null://`: reads end immediately, writes vanish.

use channelfs_core::{Backend, ChannelError, Mode, OpenRequest, Options, Plugin, Transfer};

#[derive(Debug, Default)]
struct Null;

impl Backend for Null {
    fn read(&mut self, _buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        Ok(Transfer::eof(0))
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        Ok(Transfer::new(buf.len()))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlugin;

impl Plugin for NullPlugin {
    fn scheme(&self) -> &'static str {
        "Null"
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_WRITE)
    }

    fn payload_options(&self, _payload: &str) -> Result<Options, ChannelError> {
        Ok(Options::new())
    }

    fn open(&self, _request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        Ok(Box::new(Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelfs_core::{Channel, Permissions, Registry};

    #[test]
    fn null_works() {
        let registry = Registry::new().with(NullPlugin);
        let mut channel = Channel::new();
        channel
            .open(&registry, "Null://", Mode::empty(), Permissions::empty())
            .unwrap();

        assert_eq!(channel.write_block(&[7u8; 4096]).unwrap(), 4096);
        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf).unwrap(), 0);
        assert!(channel.eof());
        assert_eq!(channel.bytes_written(), 4096);
        channel.close().unwrap();
    }
}
