use std::panic::{catch_unwind, AssertUnwindSafe};

use channelfs_core::{Channel, Mode, Permissions, Phase, Whence};
use channelfs_plugins::default_registry;
use tempfile::tempdir;

#[test]
fn file_round_trip_works() {
    let dir = tempdir().unwrap();
    let locator = format!("File://{}", dir.path().join("x").display());
    let registry = default_registry();
    let payload: Vec<u8> = (0..100u8).collect();

    let mut channel = Channel::new();
    channel
        .open(
            &registry,
            &locator,
            Mode::WRITE_ONLY | Mode::CREATE | Mode::TRUNCATE,
            Permissions::USER_READ | Permissions::USER_WRITE,
        )
        .unwrap();
    assert_eq!(channel.write_block(&payload).unwrap(), 100);
    channel.close().unwrap();

    let mut channel = Channel::new();
    channel
        .open(&registry, &locator, Mode::READ_ONLY, Permissions::empty())
        .unwrap();
    let fd = channel.get_property("Fd").and_then(|p| p.as_fd()).unwrap();
    assert!(fd >= 0);

    let mut read_back = vec![0u8; 100];
    assert_eq!(channel.read_block(&mut read_back).unwrap(), 100);
    assert_eq!(read_back, payload);

    channel.close().unwrap();
    channel.clear();
    assert_eq!(channel.phase(), Phase::Constructed);

    let after_clear = catch_unwind(AssertUnwindSafe(|| channel.get_property("Fd")));
    assert!(after_clear.is_err());
}

#[test]
fn open_from_string_works() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("described");
    let registry = default_registry();

    let mut channel = Channel::new();
    channel
        .open_from_string(
            &registry,
            &format!(
                "stream = File name = '{}' mode = 'WRITE_ONLY | CREATE' perm = 0600",
                path.display()
            ),
        )
        .unwrap();
    assert_eq!(channel.permissions().bits(), 0o600);
    channel.puts("described").unwrap();
    channel.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"described");
}

#[test]
fn pushback_over_a_file_works() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tokens");
    std::fs::write(&path, b"alpha beta").unwrap();

    let mut channel = Channel::new();
    channel
        .open(
            &default_registry(),
            &format!("File://{}", path.display()),
            Mode::READ_WRITE,
            Permissions::empty(),
        )
        .unwrap();

    let mut word = [0u8; 6];
    channel.read_block(&mut word).unwrap();
    channel.unget(&word[5..]).unwrap();
    assert_eq!(channel.tell().unwrap(), 5);

    // the write lands where the caller stands, not where the OS is
    channel.puts("_").unwrap();
    channel.seek(0, Whence::Start).unwrap();
    let mut all = [0u8; 10];
    channel.read_block(&mut all).unwrap();
    assert_eq!(&all, b"alpha_beta");
    channel.close().unwrap();
}

#[test]
fn memory_copy_between_channels_works() {
    let registry = default_registry();

    let mut source = Channel::new();
    source
        .open(&registry, "Rand://Printables seed = 9", Mode::empty(), Permissions::empty())
        .unwrap();
    let mut target = Channel::new();
    target
        .open(&registry, "Mem://64", Mode::empty(), Permissions::empty())
        .unwrap();

    let mut buf = [0u8; 16];
    let mut copied = 0;
    while !target.eof() {
        source.read_block(&mut buf).unwrap();
        copied += target.write_block(&buf).unwrap();
    }
    assert_eq!(copied, 64);
    assert_eq!(target.bytes_written(), 64);
    // the last block found the target full
    assert_eq!(source.bytes_read(), 80);
}

#[test]
fn memory_seek_back_after_reading_past_pushback_works() {
    let mut channel = Channel::new();
    channel
        .open(&default_registry(), "Mem://16", Mode::empty(), Permissions::empty())
        .unwrap();
    channel.puts("0123456789").unwrap();
    channel.rewind().unwrap();

    let mut four = [0u8; 4];
    channel.read_block(&mut four).unwrap();
    channel.unget(b"23").unwrap();
    let mut five = [0u8; 5];
    channel.read_block(&mut five).unwrap();
    assert_eq!(&five, b"23456");

    assert_eq!(channel.seek(-2, Whence::Current).unwrap(), 5);
    let mut two = [0u8; 2];
    channel.read_block(&mut two).unwrap();
    assert_eq!(&two, b"56");

    // a write through an emptied pushback is what a backward seek finds
    channel.unget(b"56").unwrap();
    channel.read_block(&mut two).unwrap();
    channel.puts("XY").unwrap();
    assert_eq!(channel.seek(-2, Whence::Current).unwrap(), 7);
    channel.read_block(&mut two).unwrap();
    assert_eq!(&two, b"XY");
    channel.close().unwrap();
}
