//! `chcat`: copy everything readable from one locator into another.
//!
//! ```text
//! chcat File:///etc/hostname StdOut://
//! chcat 'ServerTcp://5000 reuseAddr = 1' File:///tmp/upload --config chcat.json
//! ```

use std::fs;
use std::path::PathBuf;

use channelfs::{Channel, ChannelConfig, ChannelError, Mode, Permissions};
use clap::Parser;

/// Bytes moved per read.
const CHUNK: usize = 8192;

/// Copy bytes between any two channelfs locators
#[derive(Parser, Debug)]
#[command(name = "chcat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Locator to read from, e.g. `File:///tmp/in` or `Tcp://host:port`
    pub from: String,

    /// Locator to write to, e.g. `StdOut://` or `Mem://4096`
    pub to: String,

    /// JSON file with channel settings (pushback capacity, write buffering)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append to the target instead of truncating it
    #[arg(long)]
    pub append: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{locator}: {source}")]
    Channel {
        locator: String,
        #[source]
        source: ChannelError,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ChannelConfig, CliError> {
    let Some(path) = path else {
        return Ok(ChannelConfig::from_env());
    };
    let text = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ConfigParse {
        path: path.clone(),
        source,
    })
}

/// Which end of a copy failed.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("reading: {0}")]
    Read(#[source] ChannelError),

    #[error("writing: {0}")]
    Write(#[source] ChannelError),
}

/// Mode for the target locator.
pub fn target_mode(append: bool) -> Mode {
    if append {
        Mode::WRITE_ONLY | Mode::CREATE | Mode::APPEND
    } else {
        Mode::WRITE_ONLY | Mode::CREATE | Mode::TRUNCATE
    }
}

/// Copy until `from` reaches EOF. Returns the number of bytes copied.
pub fn copy(from: &mut Channel, to: &mut Channel) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = from.read(&mut buf).map_err(CopyError::Read)?;
        if n > 0 {
            to.write_block(&buf[..n]).map_err(CopyError::Write)?;
            total += n as u64;
        }
        if from.eof() {
            break;
        }
    }
    to.flush().map_err(CopyError::Write)?;
    Ok(total)
}

/// Open both ends, copy, and close them.
pub fn run(args: &Args) -> Result<u64, CliError> {
    let config = load_config(args.config.as_ref())?;
    let registry = channelfs::registry();
    let at = |locator: &str| {
        let locator = locator.to_string();
        move |source: ChannelError| CliError::Channel { locator, source }
    };

    let mut from = Channel::with_config(&config);
    from.open(registry, &args.from, Mode::READ_ONLY, Permissions::empty())
        .map_err(at(&args.from))?;

    let mut to = Channel::with_config(&config);
    to.open(registry, &args.to, target_mode(args.append), Permissions::empty())
        .map_err(at(&args.to))?;

    let copied = copy(&mut from, &mut to).map_err(|e| match e {
        CopyError::Read(source) => at(&args.from)(source),
        CopyError::Write(source) => at(&args.to)(source),
    })?;
    log::info!("copied {} bytes from {} to {}", copied, args.from, args.to);

    from.close().map_err(at(&args.from))?;
    to.close().map_err(at(&args.to))?;
    Ok(copied)
}
