//! In-memory backend that records every call it receives.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

use crate::{Backend, ChannelError, Property, Reposition, Transfer, Whence};

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) reads: usize,
    pub(crate) writes: usize,
    pub(crate) seeks: usize,
    pub(crate) closes: usize,
    pub(crate) detaches: usize,
    pub(crate) last_seek: Option<SeekFrom>,
}

/// Shared view of a [`ScriptedBackend`]'s calls and contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct Probe {
    calls: Arc<Mutex<Calls>>,
    data: Arc<Mutex<Vec<u8>>>,
}

impl Probe {
    pub(crate) fn reads(&self) -> usize {
        self.calls.lock().unwrap().reads
    }

    pub(crate) fn writes(&self) -> usize {
        self.calls.lock().unwrap().writes
    }

    pub(crate) fn seeks(&self) -> usize {
        self.calls.lock().unwrap().seeks
    }

    pub(crate) fn closes(&self) -> usize {
        self.calls.lock().unwrap().closes
    }

    pub(crate) fn detaches(&self) -> usize {
        self.calls.lock().unwrap().detaches
    }

    pub(crate) fn last_seek(&self) -> Option<SeekFrom> {
        self.calls.lock().unwrap().last_seek
    }

    pub(crate) fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

/// A growable byte buffer with a cursor. Short reads at the end set EOF.
pub(crate) struct ScriptedBackend {
    probe: Probe,
    position: usize,
    repositionable: bool,
}

impl ScriptedBackend {
    pub(crate) fn new(data: &[u8], repositionable: bool) -> Self {
        let probe = Probe::default();
        *probe.data.lock().unwrap() = data.to_vec();
        Self {
            probe,
            position: 0,
            repositionable,
        }
    }

    pub(crate) fn probe(&self) -> Probe {
        self.probe.clone()
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub(crate) fn seeks(&self) -> usize {
        self.probe.seeks()
    }

    pub(crate) fn last_seek(&self) -> Option<SeekFrom> {
        self.probe.last_seek()
    }
}

impl Backend for ScriptedBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        self.probe.calls.lock().unwrap().reads += 1;
        let data = self.probe.data.lock().unwrap();
        let available = data.len().saturating_sub(self.position);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&data[self.position..self.position + count]);
        self.position += count;
        Ok(Transfer {
            bytes: count,
            eof: count < buf.len(),
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        self.probe.calls.lock().unwrap().writes += 1;
        let mut data = self.probe.data.lock().unwrap();
        let end = self.position + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(Transfer::new(buf.len()))
    }

    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        if self.repositionable {
            Some(self)
        } else {
            None
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.probe.calls.lock().unwrap().closes += 1;
        Ok(())
    }

    fn detach(&mut self) {
        self.probe.calls.lock().unwrap().detaches += 1;
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            "Size" => Some(Property::Size(self.probe.data.lock().unwrap().len() as u64)),
            _ => None,
        }
    }
}

impl Reposition for ScriptedBackend {
    fn reposition(&mut self, to: SeekFrom) -> Result<u64, ChannelError> {
        {
            let mut calls = self.probe.calls.lock().unwrap();
            calls.seeks += 1;
            calls.last_seek = Some(to);
        }
        let len = self.probe.data.lock().unwrap().len() as i64;
        let (offset, whence) = Whence::from_seek_from(to)?;
        let target = match whence {
            Whence::Start => offset,
            Whence::Current => self.position as i64 + offset,
            Whence::End => len + offset,
        };
        if target < 0 || target > len {
            return Err(ChannelError::SeekOutOfRange { offset, whence });
        }
        self.position = target as usize;
        Ok(target as u64)
    }
}
