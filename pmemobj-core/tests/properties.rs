//! Property-based tests for payload round trips and chain contents.

use pmemobj_core::prelude::*;
use proptest::prelude::*;

const REGION_SIZE: u64 = 1024 * 1024;

fn empty_pool() -> Pool<VolatileRegion> {
    Pool::create_in(VolatileRegion::new(REGION_SIZE), "props").unwrap()
}

fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 0..32)
}

proptest! {
    #[test]
    fn test_allocate_then_first_returns_same_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut pool = empty_pool();
        let oid = pool.allocate(&bytes, 0).unwrap();

        let (first, read_back) = pool.first::<Vec<u8>>().unwrap();
        prop_assert_eq!(first, oid);
        prop_assert_eq!(read_back, bytes);
    }

    #[test]
    fn test_iteration_yields_every_object_newest_first(values in payloads()) {
        let mut pool = empty_pool();
        for (tag, v) in values.iter().enumerate() {
            pool.allocate(v, tag as u64).unwrap();
        }

        let found: Vec<Vec<u8>> = pool.iter::<Vec<u8>>().map(|r| r.unwrap().1).collect();
        let expected: Vec<Vec<u8>> = values.iter().rev().cloned().collect();
        prop_assert_eq!(found, expected);

        // The (n + 1)-th step reports the end of the chain
        if let Some(last) = pool.oids().last() {
            prop_assert!(matches!(pool.next_oid(last.unwrap()), Err(PoolError::NoSuchObject)));
        } else {
            prop_assert!(matches!(pool.first_oid(), Err(PoolError::NoSuchObject)));
        }
    }

    #[test]
    fn test_reopen_preserves_contents(values in payloads()) {
        let region = VolatileRegion::new(REGION_SIZE);
        let handle = region.crash_handle();
        let mut pool = Pool::create_in(region, "props").unwrap();
        for v in &values {
            pool.allocate(v, 0).unwrap();
        }
        handle.freeze_after(0);
        drop(pool);

        let pool = Pool::open_in(handle.image(), "props").unwrap();
        let found: Vec<Vec<u8>> = pool.iter::<Vec<u8>>().map(|r| r.unwrap().1).collect();
        let expected: Vec<Vec<u8>> = values.iter().rev().cloned().collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn test_free_keeps_remaining_multiset(values in payloads(), mask in any::<u32>()) {
        let mut pool = empty_pool();
        let oids: Vec<Oid> = values.iter().map(|v| pool.allocate(v, 0).unwrap()).collect();

        let mut kept = Vec::new();
        for (i, (oid, v)) in oids.iter().zip(&values).enumerate() {
            if mask & (1 << (i % 32)) != 0 {
                pool.free(*oid).unwrap();
            } else {
                kept.push(v.clone());
            }
        }

        let mut found: Vec<Vec<u8>> = pool.iter::<Vec<u8>>().map(|r| r.unwrap().1).collect();
        found.sort();
        kept.sort();
        prop_assert_eq!(found, kept);
    }

    #[test]
    fn test_integer_round_trip(value in any::<u64>(), signed in any::<i32>()) {
        let mut pool = empty_pool();
        let a = pool.allocate(&value, 1).unwrap();
        let b = pool.allocate(&signed, 2).unwrap();

        prop_assert_eq!(pool.read::<u64>(a).unwrap(), value);
        prop_assert_eq!(pool.read::<i32>(b).unwrap(), signed);
    }
}
