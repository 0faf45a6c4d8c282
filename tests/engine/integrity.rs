//! Corruption handling in both integrity modes.

use crate::common::*;
use snapper::{Config, Error};

fn lenient() -> Config {
    Config::default().with_integrity(false)
}

#[test]
fn flipped_payload_byte_fails_restore_and_zeroes_buffer() {
    let mut engine = TestEngine::with_config(lenient());
    let gen = engine.snapshot_cycle(&[(1, &[0x05, 0x00, 0x00, 0x00])]);

    // corrupt one payload byte; the archive itself stays valid
    flip_byte(
        &engine.root.join(&gen).join("snapshot/0"),
        BACKLINK_HEADER_SIZE,
    );

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0xAAu8; 4];
    assert!(matches!(
        engine.snapper.restore(&mut buf, 1),
        Err(Error::IntegrityFailed)
    ));
    assert_eq!(buf, [0u8; 4]);
    engine.snapper.close_generation().unwrap();
}

#[test]
fn version_mismatch_never_satisfies_a_restore() {
    let mut engine = TestEngine::with_config(lenient());
    let gen = engine.snapshot_cycle(&[(1, &[1, 2, 3])]);

    // first byte of a backlink is its version
    flip_byte(&engine.root.join(&gen).join("snapshot/0"), 0);

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(
        engine.snapper.restore(&mut buf, 1),
        Err(Error::InvalidVersion)
    ));
    assert_eq!(buf, [0u8; 8]);
    engine.snapper.close_generation().unwrap();
}

#[test]
fn corrupt_payload_is_fatal_under_integrity() {
    let mut engine = TestEngine::new(); // integrity = on
    let gen = engine.snapshot_cycle(&[(1, &[1, 2, 3, 4])]);

    flip_byte(
        &engine.root.join(&gen).join("snapshot/0"),
        BACKLINK_HEADER_SIZE + 1,
    );

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 8];
    let err = engine.snapper.restore(&mut buf, 1).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(buf, [0u8; 8]);
}

#[test]
fn corrupted_archive_invalidates_the_generation() {
    let mut engine = TestEngine::with_config(lenient());
    let gen = engine.snapshot_cycle(&[(1, &[1, 2, 3])]);

    // flip a body byte: the stored body hash no longer matches
    let archive = engine.root.join(&gen).join("archive");
    flip_byte(&archive, ARCHIVE_HEADER_SIZE + 3);

    // the unnamed open scans for a valid generation and finds none
    assert!(matches!(
        engine.snapper.open_generation(None),
        Err(Error::NoPriorGen)
    ));

    // the named open reports what is wrong with it
    assert!(matches!(
        engine.snapper.open_generation(Some(gen.as_str())),
        Err(Error::IntegrityFailed)
    ));
}

#[test]
fn archive_version_mismatch_reported_on_named_open() {
    let mut engine = TestEngine::with_config(lenient());
    let gen = engine.snapshot_cycle(&[(1, &[1, 2, 3])]);

    flip_byte(&engine.root.join(&gen).join("archive"), 0);
    assert!(matches!(
        engine.snapper.open_generation(Some(gen.as_str())),
        Err(Error::InvalidVersion)
    ));
}

#[test]
fn corrupted_archive_is_fatal_on_named_open_under_integrity() {
    let mut engine = TestEngine::new();
    let gen = engine.snapshot_cycle(&[(1, &[1, 2, 3])]);

    flip_byte(
        &engine.root.join(&gen).join("archive"),
        ARCHIVE_HEADER_SIZE + 3,
    );
    let err = engine.snapper.open_generation(Some(gen.as_str())).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn open_of_unknown_generation_fails_to_load() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, &[1])]);
    assert!(matches!(
        engine.snapper.open_generation(Some("2000-01-01 00:00:00")),
        Err(Error::LoadGenFailed)
    ));
}

#[test]
fn restore_falls_back_to_an_older_chain_member() {
    // redundancy 2: the third identical take cuts a second copy
    let config = lenient().with_redundancy(2);
    let mut engine = TestEngine::with_config(config);
    let payload = b"durable payload";
    let first = engine.snapshot_cycle(&[(1, payload)]);
    engine.snapshot_cycle(&[(1, payload)]);
    let third = engine.snapshot_cycle(&[(1, payload)]);

    // the chain now holds two copies; damage the newer one
    let redundant = engine.root.join(&third).join("snapshot/0");
    assert!(redundant.exists());
    flip_byte(&redundant, BACKLINK_HEADER_SIZE);

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 32];
    let size = engine.snapper.restore(&mut buf, 1).unwrap();
    assert_eq!(&buf[..size], payload);
    engine.snapper.close_generation().unwrap();

    // the older copy served the read
    assert!(engine
        .root
        .join(&first)
        .join("snapshot/0")
        .exists());
}

#[test]
fn lenient_commit_drops_entries_it_cannot_reference() {
    let mut engine = TestEngine::with_config(lenient());
    let payload = b"will be damaged";
    let first = engine.snapshot_cycle(&[(1, payload)]);

    // damage the payload; the stored hash still matches the incoming
    // payload, so the next take shares the file and commit discovers the
    // damage while rewriting the count
    flip_byte(
        &engine.root.join(&first).join("snapshot/0"),
        BACKLINK_HEADER_SIZE,
    );
    engine.snapper.init_snapshot().unwrap();
    engine.snapper.take_snapshot(payload, 1).unwrap();
    engine.snapper.commit_snapshot().unwrap();

    // the damaged backlink is past recovery
    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 32];
    assert!(matches!(
        engine.snapper.restore(&mut buf, 1),
        Err(Error::IntegrityFailed)
    ));
    engine.snapper.close_generation().unwrap();
}

#[test]
fn dead_generation_keeps_files_other_generations_reference() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, b"first")]);
    // second generation cuts a fresh backlink (payload changed)...
    let second = engine.snapshot_cycle(&[(1, b"second")]);
    // ...and the third shares it
    let third = engine.snapshot_cycle(&[(1, b"second")]);
    let shared = engine.root.join(&second).join("snapshot/0");
    assert_eq!(
        refcount_of(&engine.root, &format!("/{second}/snapshot/0")),
        2
    );

    // the second generation's archive is destroyed; its directory still
    // hosts the backlink the third generation references
    flip_byte(
        &engine.root.join(&second).join("archive"),
        ARCHIVE_HEADER_SIZE + 3,
    );
    engine.reopen();
    engine.snapper.purge_zombies().unwrap();

    // the dead generation's archive is gone, the shared payload survives
    assert!(!engine.root.join(&second).join("archive").exists());
    assert!(shared.exists());

    engine.snapper.open_generation(Some(third.as_str())).unwrap();
    let mut buf = [0u8; 16];
    let size = engine.snapper.restore(&mut buf, 1).unwrap();
    assert_eq!(&buf[..size], b"second");
    engine.snapper.close_generation().unwrap();
}
