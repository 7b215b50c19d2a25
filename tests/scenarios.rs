//! End-to-end scenarios against literal key sequences, exercising the full
//! open/insert/query/dump/close surface through a real file on disk.

use std::io::Write;

use colacask::Database;
use tempfile::tempdir;

fn dump_string(db: &Database) -> String {
    let mut out = Vec::new();
    db.dump(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn create_insert_query() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    db.insert(42).unwrap();

    assert!(db.query(42).unwrap());
    assert!(!db.query(43).unwrap());

    let dump = dump_string(&db);
    assert!(dump.contains("level  0 (1 keys): 42"));
    db.close().unwrap();
}

#[test]
fn carry_to_level_one() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    db.insert(5).unwrap();
    db.insert(3).unwrap();

    let dump = dump_string(&db);
    assert!(dump.contains("level  0 (1 keys): 5"));
    assert!(dump.contains("level  1 (2 keys): 3 5"));

    assert!(db.query(3).unwrap());
    assert!(db.query(5).unwrap());
    assert!(!db.query(4).unwrap());
    db.close().unwrap();
}

#[test]
fn carry_to_level_two() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    for (i, key) in [10u64, 20, 30, 40].into_iter().enumerate() {
        db.insert(key).unwrap();
        assert_eq!(db.len(), i as u64 + 1);
    }

    // Levels 0 and 1 are logically empty (bits cleared by the carry) but
    // their bytes are untouched leftovers from the merges that emptied them.
    let dump = dump_string(&db);
    assert!(dump.contains("level  0 (1 keys): 30"));
    assert!(dump.contains("level  1 (2 keys): 10 20"));
    assert!(dump.contains("level  2 (4 keys): 10 20 30 40"));

    for key in [10, 20, 30, 40] {
        assert!(db.query(key).unwrap());
    }
    assert!(!db.query(25).unwrap());
    db.close().unwrap();
}

#[test]
fn cross_level_hit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    for key in [8u64, 1, 4, 9, 2, 7, 3, 6] {
        db.insert(key).unwrap();
    }

    for key in [1u64, 2, 3, 4, 6, 7, 8, 9] {
        assert!(db.query(key).unwrap(), "key {key} should be found");
    }
    assert!(!db.query(5).unwrap());

    let dump = dump_string(&db);
    assert!(dump.contains("level  3 (8 keys): 1 2 3 4 6 7 8 9"));
    db.close().unwrap();
}

/// After 6 of these 8 inserts, level 0 is unoccupied while levels 1 and 2 are
/// both occupied (n = 6 = 0b110) — the one case where `insert` wrote real
/// `fp` straddle pointers from level 1 into level 2's current contents, so
/// `query_with_cascading` actually narrows its level-2 window instead of
/// falling back to the full range.
#[test]
fn cascading_query_matches_plain_query_when_fp_is_live() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    for key in [8u64, 1, 4, 9, 2, 7] {
        db.insert(key).unwrap();
    }
    assert_eq!(db.len(), 6);

    for key in 0u64..12 {
        assert_eq!(
            db.query(key).unwrap(),
            db.query_with_cascading(key).unwrap(),
            "plain and cascading query disagreed on key {key}"
        );
    }
    assert!(db.query_with_cascading(4).unwrap());
    assert!(db.query_with_cascading(9).unwrap());
    assert!(!db.query_with_cascading(5).unwrap());
    db.close().unwrap();
}

#[test]
fn persistence_across_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    for key in [8u64, 1, 4, 9, 2, 7, 3, 6] {
        db.insert(key).unwrap();
    }
    db.close().unwrap();

    let mut ro = Database::open(&path, false).unwrap();
    for key in [1u64, 2, 3, 4, 6, 7, 8, 9] {
        assert!(ro.query(key).unwrap());
    }
    assert!(!ro.query(5).unwrap());
    drop(ro);

    let mut rw = Database::open(&path, true).unwrap();
    rw.insert(5).unwrap();
    assert_eq!(rw.len(), 9);

    // Levels 1 and 2 are logically empty but still carry the stale bytes
    // from the merges that last wrote them, before the carry to level 3.
    let dump = dump_string(&rw);
    assert!(dump.contains("level  0 (1 keys): 5"));
    assert!(dump.contains("level  1 (2 keys): 2 7"));
    assert!(dump.contains("level  2 (4 keys): 1 4 8 9"));
    assert!(dump.contains("level  3 (8 keys): 1 2 3 4 6 7 8 9"));

    assert!(rw.query(5).unwrap());
    rw.close().unwrap();
}

#[test]
fn reject_duplicate_insert() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let mut db = Database::create(&path).unwrap();
    db.insert(7).unwrap();
    assert!(db.insert(7).is_err());
    assert_eq!(db.len(), 1);
    db.close().unwrap();
}

#[test]
fn opening_nonexistent_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.db");
    assert!(Database::open(&path, false).is_err());
}

#[test]
fn creating_over_existing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");
    std::fs::File::create(&path).unwrap().write_all(b"not a colacask file").unwrap();
    assert!(Database::create(&path).is_err());
}

#[test]
fn empty_index_query_is_always_absent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");
    let mut db = Database::create(&path).unwrap();
    assert!(!db.query(0).unwrap());
    assert!(!db.query(u64::MAX).unwrap());
}

/// Large run: forces the on-disk mapping past its eager range and exercises
/// the buffered merge path, not just the happy path inside one mmap.
#[test]
#[ignore]
fn large_random_run() {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");

    let count: u64 = 65536;
    let mut order: Vec<u64> = (0..count).collect();
    order.shuffle(&mut StdRng::seed_from_u64(1));

    let mut db = Database::create(&path).unwrap();
    for key in order {
        db.insert(key).unwrap();
    }
    assert_eq!(db.len(), count);

    // popcount(65536) == 1: level 16 is the only occupied level, but levels
    // 0..15 still get dumped (dimmed) since 2^l <= n for all of them.
    let dump = dump_string(&db);
    assert!(dump.contains("level 16 (65536 keys)"));
    assert!(dump.contains("level 15"));

    for key in 0..count {
        assert!(db.query(key).unwrap());
    }
    assert!(!db.query(count).unwrap());
    db.close().unwrap();
}
