//! Snapshot lifecycle: creation, deduplication, redundancy, restore.

use crate::common::*;
use snapper::{Error, State};
use xxhash_rust::xxh32::xxh32;

#[test]
fn first_snapshot_layout_is_bit_exact() {
    let mut engine = TestEngine::new();
    let payload = [0x05u8, 0x00, 0x00, 0x00];
    let gen = engine.snapshot_cycle(&[(1, &payload)]);

    assert_eq!(generations(&engine.root), [gen.clone()]);

    // exactly one backlink: {version, hash_le, refcount = 1, payload}
    let files = backlink_files(&engine.root);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0], engine.root.join(&gen).join("snapshot/0"));

    let bytes = std::fs::read(&files[0]).unwrap();
    let mut expected = vec![0x02];
    expected.extend_from_slice(&xxh32(&payload, 0).to_le_bytes());
    expected.push(0x01);
    expected.extend_from_slice(&payload);
    assert_eq!(bytes, expected);

    // the archive binds key 1 to the backlink's root-relative path
    let entries = archive_entries(&engine.root.join(&gen).join("archive"));
    assert_eq!(entries, [(1, format!("/{gen}/snapshot/0"))]);
}

#[test]
fn identical_payload_shares_the_backlink() {
    let mut engine = TestEngine::new();
    let payload = [0x05u8, 0x00, 0x00, 0x00];
    let first = engine.snapshot_cycle(&[(1, &payload)]);
    let second = engine.snapshot_cycle(&[(1, &payload)]);

    // no new file; the shared backlink's count went from 01 to 02
    let files = backlink_files(&engine.root);
    assert_eq!(files.len(), 1);
    let value = format!("/{first}/snapshot/0");
    assert_eq!(refcount_of(&engine.root, &value), 2);

    // the new archive references the same path
    let entries = archive_entries(&engine.root.join(&second).join("archive"));
    assert_eq!(entries, [(1, value)]);
}

#[test]
fn redundancy_bound_forces_a_new_copy() {
    let mut engine = TestEngine::new(); // redundancy = 3
    let payload = [0x05u8, 0x00, 0x00, 0x00];

    let first = engine.snapshot_cycle(&[(1, &payload)]);
    engine.snapshot_cycle(&[(1, &payload)]);
    engine.snapshot_cycle(&[(1, &payload)]);
    assert_eq!(refcount_of(&engine.root, &format!("/{first}/snapshot/0")), 3);
    assert_eq!(backlink_files(&engine.root).len(), 1);

    // at the bound, the next identical take cuts a redundant copy under
    // the new generation; both coexist
    let fourth = engine.snapshot_cycle(&[(1, &payload)]);
    let files = backlink_files(&engine.root);
    assert_eq!(files.len(), 2);
    assert!(files.contains(&engine.root.join(&fourth).join("snapshot/0")));

    // the new archive's entries for the key end at the new file
    let entries = archive_entries(&engine.root.join(&fourth).join("archive"));
    assert_eq!(
        entries.last().unwrap(),
        &(1, format!("/{fourth}/snapshot/0"))
    );
}

#[test]
fn multi_key_round_trip_zero_fills_the_tail() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, &[1, 2, 3]), (2, &[4, 5, 6])]);

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0xAAu8; 16];
    let size = engine.snapper.restore(&mut buf, 1).unwrap();
    assert_eq!(size, 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
    assert!(buf[3..].iter().all(|&b| b == 0));

    let size = engine.snapper.restore(&mut buf, 2).unwrap();
    assert_eq!(size, 3);
    assert_eq!(&buf[..3], &[4, 5, 6]);
    assert!(buf[3..].iter().all(|&b| b == 0));

    engine.snapper.close_generation().unwrap();
}

#[test]
fn restore_of_unknown_key_is_no_matches() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, &[1])]);

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(
        engine.snapper.restore(&mut buf, 99),
        Err(Error::NoMatches)
    ));
    engine.snapper.close_generation().unwrap();
}

#[test]
fn undersized_restore_buffer_fails() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, &[1, 2, 3, 4, 5, 6, 7, 8])]);

    engine.snapper.open_generation(None).unwrap();
    let mut buf = [0u8; 4];
    assert!(matches!(
        engine.snapper.restore(&mut buf, 1),
        Err(Error::RestoreFailed)
    ));
    assert_eq!(buf, [0u8; 4]);
    engine.snapper.close_generation().unwrap();
}

#[test]
fn repeated_take_within_a_session_is_idempotent() {
    let mut engine = TestEngine::new();
    let gen = engine.snapshot_cycle(&[(1, &[7, 7]), (1, &[7, 7]), (1, &[7, 7])]);

    // one file, one archive entry, count raised exactly once
    assert_eq!(backlink_files(&engine.root).len(), 1);
    let entries = archive_entries(&engine.root.join(&gen).join("archive"));
    assert_eq!(entries.len(), 1);
    assert_eq!(refcount_of(&engine.root, &entries[0].1), 1);
}

#[test]
fn changed_payload_starts_a_fresh_chain() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, b"old contents")]);
    let second = engine.snapshot_cycle(&[(1, b"new contents")]);

    // the new generation's archive references only the fresh backlink
    let entries = archive_entries(&engine.root.join(&second).join("archive"));
    assert_eq!(entries, [(1, format!("/{second}/snapshot/0"))]);

    assert_eq!(engine.restore_latest(1, 64), b"new contents");
}

#[test]
fn interrupted_session_is_reclaimed_on_next_init() {
    let mut engine = TestEngine::new();
    let committed = engine.snapshot_cycle(&[(1, &[1, 2, 3])]);

    // a writer dies mid-session: payloads written, no commit
    engine.snapper.init_snapshot().unwrap();
    engine.snapper.take_snapshot(&[9, 9, 9], 2).unwrap();
    engine.reopen();
    assert_eq!(generations(&engine.root).len(), 2);

    // the next init sweeps the unfinished generation
    engine.snapper.init_snapshot().unwrap();
    let gens = generations(&engine.root);
    assert_eq!(gens.len(), 2); // the survivor and the new session
    assert!(gens.contains(&committed));
    assert_eq!(backlink_files(&engine.root).len(), 1);
}

#[test]
fn out_of_order_calls_change_nothing_on_disk() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, &[1, 2, 3])]);
    let before: Vec<_> = backlink_files(&engine.root);
    let gens_before = generations(&engine.root);

    let mut buf = [0u8; 8];
    assert!(matches!(
        engine.snapper.take_snapshot(&[4], 2),
        Err(Error::InvalidState)
    ));
    assert!(matches!(
        engine.snapper.commit_snapshot(),
        Err(Error::InvalidState)
    ));
    assert!(matches!(
        engine.snapper.restore(&mut buf, 1),
        Err(Error::InvalidState)
    ));
    assert!(matches!(
        engine.snapper.close_generation(),
        Err(Error::InvalidState)
    ));

    engine.snapper.open_generation(None).unwrap();
    assert!(matches!(
        engine.snapper.init_snapshot(),
        Err(Error::InvalidState)
    ));
    assert!(matches!(engine.snapper.purge(None), Err(Error::InvalidState)));
    engine.snapper.close_generation().unwrap();

    assert_eq!(engine.snapper.state(), State::Dormant);
    assert_eq!(backlink_files(&engine.root), before);
    assert_eq!(generations(&engine.root), gens_before);
}

#[test]
fn older_generations_restore_by_name() {
    let mut engine = TestEngine::new();
    let first = engine.snapshot_cycle(&[(1, b"version one")]);
    engine.snapshot_cycle(&[(1, b"version two")]);

    engine.snapper.open_generation(Some(first.as_str())).unwrap();
    let mut buf = [0u8; 32];
    let size = engine.snapper.restore(&mut buf, 1).unwrap();
    assert_eq!(&buf[..size], b"version one");
    engine.snapper.close_generation().unwrap();

    assert_eq!(engine.restore_latest(1, 32), b"version two");
}

#[test]
fn overflow_directories_hold_the_spill() {
    let mut engine = TestEngine::with_config(snapper::Config::default().with_threshold(4));
    engine.snapper.init_snapshot().unwrap();
    for key in 0..8u64 {
        engine.snapper.take_snapshot(&key.to_le_bytes(), key).unwrap();
    }
    engine.snapper.commit_snapshot().unwrap();

    let gen = generations(&engine.root).pop().unwrap();
    let snapshot = engine.root.join(&gen).join("snapshot");
    // threshold 4: three files plus ext/ per level
    assert!(snapshot.join("0").exists());
    assert!(snapshot.join("2").exists());
    assert!(snapshot.join("ext/0").exists());
    assert!(snapshot.join("ext/ext/0").exists());

    // archive entries point at the files' real locations
    let entries = archive_entries(&engine.root.join(&gen).join("archive"));
    assert_eq!(entries.len(), 8);
    for (_, value) in &entries {
        assert!(
            engine.root.join(value.trim_start_matches('/')).exists(),
            "dangling archive entry {value}"
        );
    }

    for key in 0..8u64 {
        assert_eq!(engine.restore_latest(key, 16), key.to_le_bytes());
    }
}

#[test]
fn baseline_carries_unchanged_keys_forward() {
    let mut engine = TestEngine::new();
    engine.snapshot_cycle(&[(1, b"kept"), (2, b"kept too")]);
    // the second session only re-takes key 1; key 2 rides the baseline
    let second = engine.snapshot_cycle(&[(1, b"kept")]);

    let entries = archive_entries(&engine.root.join(&second).join("archive"));
    assert_eq!(entries.len(), 2);

    assert_eq!(engine.restore_latest(2, 64), b"kept too");
}
