//! Tests for the durable code pool and the allocator built on top of it
//!
//! These exercise the pool's restart behavior against real files: a
//! drained prefix must never come back, and a corrupt file must refuse
//! to load.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use shortlinks::allocator::CodeAllocator;
use shortlinks::codes::{CodePool, CodeSpace};
use shortlinks::database::init_db;
use shortlinks::error::ServiceError;
use shortlinks::store::LinkStore;

fn pool_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("codes.txt")
}

#[test]
fn drained_pool_yields_every_code_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = CodePool::open(CodeSpace::new(b"ABCD", 2), pool_path(&dir)).unwrap();

    let mut seen = HashSet::new();
    while let Some(code) = pool.take().unwrap() {
        assert!(seen.insert(code), "pool returned a code twice");
    }

    assert_eq!(seen.len(), 16);
    assert_eq!(pool.remaining(), 0);
}

#[test]
fn pool_survives_restart_without_reissuing_codes() {
    let dir = tempfile::tempdir().unwrap();
    let space = CodeSpace::new(b"ABCD", 2);

    let first_batch: Vec<String> = {
        let pool = CodePool::open(space.clone(), pool_path(&dir)).unwrap();
        (0..5).map(|_| pool.take().unwrap().unwrap()).collect()
    };

    // Reopen from the persisted file, as after a process restart.
    let pool = CodePool::open(space, pool_path(&dir)).unwrap();
    assert_eq!(pool.remaining(), 11);

    let mut second_batch = HashSet::new();
    while let Some(code) = pool.take().unwrap() {
        second_batch.insert(code);
    }

    assert_eq!(second_batch.len(), 11);
    for code in &first_batch {
        assert!(
            !second_batch.contains(code),
            "code {} was issued again after restart",
            code
        );
    }
}

#[test]
fn pool_preserves_on_disk_order_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let space = CodeSpace::new(b"AB", 3);

    let pool = CodePool::open(space.clone(), pool_path(&dir)).unwrap();
    let first = pool.take().unwrap().unwrap();
    let second = pool.take().unwrap().unwrap();
    drop(pool);

    // A crash right after the two takes replays the same tail. No
    // re-shuffle may happen on load.
    let on_disk = std::fs::read_to_string(pool_path(&dir)).unwrap();
    assert_eq!(on_disk.len(), 6 * 3);
    let entries: Vec<&str> = on_disk
        .as_bytes()
        .chunks_exact(3)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect();
    assert!(!entries.contains(&first.as_str()));
    assert!(!entries.contains(&second.as_str()));

    let reopened = CodePool::open(space, pool_path(&dir)).unwrap();
    let third = reopened.take().unwrap().unwrap();
    assert_eq!(entries[0], third.as_str());
}

#[test]
fn corrupt_pool_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = pool_path(&dir);

    // Length not a multiple of the code width.
    std::fs::write(&path, "ABCD").unwrap();
    let result = CodePool::open(CodeSpace::uppercase_alpha(3), &path);
    assert!(matches!(result, Err(ServiceError::Persistence(_))));

    // Right length, byte outside the alphabet.
    std::fs::write(&path, "A1C").unwrap();
    let result = CodePool::open(CodeSpace::uppercase_alpha(3), &path);
    assert!(matches!(result, Err(ServiceError::Persistence(_))));
}

#[test]
fn allocator_reports_exhaustion_on_a_drained_pool() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(init_db(dir.path().join("links.db").to_str().unwrap()).unwrap());
    let store = LinkStore::new(db);
    let pool = Arc::new(CodePool::open(CodeSpace::new(b"AB", 2), pool_path(&dir)).unwrap());
    let allocator = CodeAllocator::new(pool, store.clone());

    // Four codes in the space, four allocations succeed.
    let mut seen = HashSet::new();
    for _ in 0..4 {
        let code = allocator.allocate(None).unwrap();
        store.reserve(&code, "https://example.com", "", None, None).unwrap();
        seen.insert(code);
    }
    assert_eq!(seen.len(), 4);

    // The fifth must fail loudly, not wrap around.
    let result = allocator.allocate(None);
    assert!(matches!(result, Err(ServiceError::PoolExhausted)));
}

#[test]
fn allocator_skips_pooled_codes_occupied_by_explicit_links() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(init_db(dir.path().join("links.db").to_str().unwrap()).unwrap());
    let store = LinkStore::new(db);
    let pool = Arc::new(CodePool::open(CodeSpace::new(b"AB", 2), pool_path(&dir)).unwrap());
    let allocator = CodeAllocator::new(pool, store.clone());

    // Occupy the whole space with explicitly requested codes. The pool
    // still holds all four entries, but none may be handed out.
    for code in ["AA", "AB", "BA", "BB"] {
        store.reserve(code, "https://example.com", "", None, None).unwrap();
    }

    let result = allocator.allocate(None);
    assert!(matches!(result, Err(ServiceError::PoolExhausted)));
}

#[test]
fn allocator_validates_requested_codes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(init_db(dir.path().join("links.db").to_str().unwrap()).unwrap());
    let store = LinkStore::new(db);
    let pool = Arc::new(CodePool::open(CodeSpace::new(b"AB", 2), pool_path(&dir)).unwrap());
    let allocator = CodeAllocator::new(pool, store.clone());

    assert!(matches!(
        allocator.allocate(Some("x")),
        Err(ServiceError::InvalidFormat)
    ));
    assert!(matches!(
        allocator.allocate(Some("not valid")),
        Err(ServiceError::InvalidFormat)
    ));
    assert!(matches!(
        allocator.allocate(Some("login")),
        Err(ServiceError::CodeTaken)
    ));

    let code = allocator.allocate(Some("promo")).unwrap();
    assert_eq!(code, "promo");
    store.reserve(&code, "https://example.com", "", None, None).unwrap();

    assert!(matches!(
        allocator.allocate(Some("promo")),
        Err(ServiceError::CodeTaken)
    ));
}
