//! `Calc://`: a write-only sink that only keeps statistics.
//!
//! Useful for measuring what a producer would send without a real medium
//! behind it. Properties: `WriteCalls`, `MinWriteSize` and `MaxWriteSize`
//! (0 before the first write).

use channelfs_core::{
    Access, Backend, ChannelError, Mode, OpenRequest, Options, Plugin, Property, Transfer,
};

/// Write statistics of a `Calc` channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub calls: u64,
    pub min_size: usize,
    pub max_size: usize,
}

impl WriteStats {
    fn record(&mut self, size: usize) {
        self.min_size = if self.calls == 0 {
            size
        } else {
            self.min_size.min(size)
        };
        self.max_size = self.max_size.max(size);
        self.calls += 1;
    }
}

#[derive(Debug, Default)]
struct Calc {
    stats: WriteStats,
}

impl Backend for Calc {
    fn read(&mut self, _buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        Err(ChannelError::Unsupported {
            operation: "reading",
            scheme: "Calc",
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        self.stats.record(buf.len());
        Ok(Transfer::new(buf.len()))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        log::debug!("calc channel closed after {:?}", self.stats);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<Property> {
        let value = match name {
            "WriteCalls" => self.stats.calls,
            "MinWriteSize" => self.stats.min_size as u64,
            "MaxWriteSize" => self.stats.max_size as u64,
            _ => return None,
        };
        i64::try_from(value).ok().map(Property::Int)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalcPlugin;

impl Plugin for CalcPlugin {
    fn scheme(&self) -> &'static str {
        "Calc"
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::WRITE_ONLY)
    }

    fn payload_options(&self, _payload: &str) -> Result<Options, ChannelError> {
        Ok(Options::new())
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        if request.mode.access()? != Access::Write {
            return Err(ChannelError::BadFlags {
                message: "Calc channels accept WRITE_ONLY only".to_string(),
            });
        }
        Ok(Box::new(Calc::default()))
    }
}
