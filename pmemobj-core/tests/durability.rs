//! Crash and reopen behaviour.
//!
//! Volatile regions model power loss: only bytes that went through
//! `persist` survive into the crash image.

use pmemobj_core::pool::{CrashHandle, SUPERBLOCK_SIZE};
use pmemobj_core::prelude::*;
use tempfile::tempdir;

const REGION_SIZE: u64 = 64 * 1024;

fn volatile_pool(layout: &str) -> (Pool<VolatileRegion>, CrashHandle) {
    let region = VolatileRegion::new(REGION_SIZE);
    let handle = region.crash_handle();
    (Pool::create_in(region, layout).unwrap(), handle)
}

fn values(pool: &Pool<VolatileRegion>) -> Vec<u64> {
    pool.iter::<u64>().map(|r| r.unwrap().1).collect()
}

#[test]
fn test_crash_right_after_create_yields_empty_pool() {
    let (pool, handle) = volatile_pool("fresh");
    handle.freeze_after(0);
    drop(pool);

    let pool = Pool::open_in(handle.image(), "fresh").unwrap();
    assert!(matches!(pool.first_oid(), Err(PoolError::NoSuchObject)));
}

#[test]
fn test_persisted_objects_survive_crash() {
    let (mut pool, handle) = volatile_pool("");
    for i in 0..10u64 {
        pool.allocate(&i, 0).unwrap();
    }
    handle.freeze_after(0);
    drop(pool);

    let pool = Pool::open_in(handle.image(), "").unwrap();
    assert_eq!(values(&pool), (0..10).rev().collect::<Vec<_>>());
}

#[test]
fn test_crash_between_record_and_link_persist() {
    let (mut pool, handle) = volatile_pool("");
    pool.allocate(&1u64, 0).unwrap();
    pool.allocate(&2u64, 0).unwrap();
    let before = pool.stats().unwrap();

    // The record persist lands, the root update does not
    handle.freeze_after(1);
    pool.allocate(&3u64, 0).unwrap();
    assert_eq!(values(&pool), vec![3, 2, 1]);
    drop(pool);

    let pool = Pool::open_in(handle.image(), "").unwrap();
    assert_eq!(values(&pool), vec![2, 1]);
    assert_eq!(pool.stats().unwrap(), before);
}

#[test]
fn test_crash_before_record_persist() {
    let (mut pool, handle) = volatile_pool("");
    pool.allocate(&1u64, 0).unwrap();

    handle.freeze_after(0);
    pool.allocate(&2u64, 0).unwrap();
    drop(pool);

    let pool = Pool::open_in(handle.image(), "").unwrap();
    assert_eq!(values(&pool), vec![1]);
}

#[test]
fn test_orphaned_record_space_is_reused_after_reopen() {
    let (mut pool, handle) = volatile_pool("");
    pool.allocate(&1u64, 0).unwrap();

    handle.freeze_after(1);
    let orphan = pool.allocate(&2u64, 0).unwrap();
    drop(pool);

    let mut pool = Pool::open_in(handle.image(), "").unwrap();
    let reused = pool.allocate(&3u64, 0).unwrap();
    assert_eq!(reused, orphan);
    assert_eq!(values(&pool), vec![3, 1]);
}

#[test]
fn test_crash_during_free_keeps_object() {
    let (mut pool, handle) = volatile_pool("");
    let a = pool.allocate(&1u64, 0).unwrap();
    pool.allocate(&2u64, 0).unwrap();

    handle.freeze_after(0);
    pool.free(a).unwrap();
    assert_eq!(values(&pool), vec![2]);
    drop(pool);

    let pool = Pool::open_in(handle.image(), "").unwrap();
    assert_eq!(values(&pool), vec![2, 1]);
}

#[test]
fn test_free_is_durable() {
    let (mut pool, handle) = volatile_pool("");
    let a = pool.allocate(&1u64, 0).unwrap();
    pool.allocate(&2u64, 0).unwrap();
    pool.allocate(&3u64, 0).unwrap();

    pool.free(a).unwrap();
    handle.freeze_after(0);
    drop(pool);

    let pool = Pool::open_in(handle.image(), "").unwrap();
    assert_eq!(values(&pool), vec![3, 2]);
}

#[test]
fn test_corrupt_root_fails_open() {
    let (mut pool, handle) = volatile_pool("");
    pool.allocate(&1u64, 0).unwrap();
    drop(pool);

    let mut bytes = handle.image().as_slice().to_vec();
    // root_offset lives right after the layout tag and size fields
    bytes[72..80].copy_from_slice(&(REGION_SIZE + 8).to_le_bytes());
    assert!(matches!(
        Pool::open_in(VolatileRegion::from_bytes(bytes), ""),
        Err(PoolError::CorruptPool { .. })
    ));
}

#[test]
fn test_cyclic_chain_fails_open() {
    let (mut pool, handle) = volatile_pool("");
    let a = pool.allocate(&1u64, 0).unwrap();
    let b = pool.allocate(&2u64, 0).unwrap();
    drop(pool);

    // Point the tail back at the head
    let mut bytes = handle.image().as_slice().to_vec();
    let next = a.offset() as usize + 16;
    bytes[next..next + 8].copy_from_slice(&b.offset().to_le_bytes());
    assert!(matches!(
        Pool::open_in(VolatileRegion::from_bytes(bytes), ""),
        Err(PoolError::CorruptPool { .. })
    ));
}

#[test]
fn test_bad_magic_fails_open() {
    let (pool, handle) = volatile_pool("");
    drop(pool);

    let mut bytes = handle.image().as_slice().to_vec();
    bytes[80] ^= 0xFF;
    assert!(matches!(
        Pool::open_in(VolatileRegion::from_bytes(bytes), ""),
        Err(PoolError::CorruptPool { offset: 0, .. })
    ));
}

#[test]
fn test_remapped_region_keeps_offsets_valid() {
    let (mut pool, handle) = volatile_pool("");
    let oids: Vec<Oid> = (0..5u64).map(|i| pool.allocate(&i, 7).unwrap()).collect();
    drop(pool);

    // A fresh buffer lives at a different address than the original one
    let image = handle.image();
    let pool = Pool::open_in(image, "").unwrap();
    for (i, oid) in oids.iter().enumerate() {
        assert_eq!(pool.read::<u64>(*oid).unwrap(), i as u64);
        assert_eq!(pool.type_tag(*oid).unwrap(), 7);
    }
    assert!(oids.iter().all(|oid| oid.offset() >= SUPERBLOCK_SIZE as u64));
}

#[test]
fn test_file_pool_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool");

    let mut pool = Pool::create(&path, "durable", 1024 * 1024, 0o666).unwrap();
    let mut expected = Vec::new();
    for i in 0..20u64 {
        let payload = format!("object-{}", i);
        pool.allocate(&payload, i).unwrap();
        expected.push((i, payload));
    }
    pool.close().unwrap();

    let pool = Pool::open(&path, "durable").unwrap();
    let mut found: Vec<(u64, String)> = pool
        .iter::<String>()
        .map(|r| {
            let (oid, s) = r.unwrap();
            (pool.type_tag(oid).unwrap(), s)
        })
        .collect();
    found.reverse();
    assert_eq!(found, expected);
}
