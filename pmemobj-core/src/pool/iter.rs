//! Chain iterators.

use super::region::DurableRegion;
use super::store::Pool;
use crate::error::{PoolError, Result};
use crate::payload::TypedPayload;
use crate::types::Oid;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Start,
    At(Oid),
    Done,
}

/// Iterator over object ids, newest first.
///
/// Yields `Err` once and then stops if the pool is closed or a link fails
/// validation.
pub struct Oids<'a, R: DurableRegion> {
    pool: &'a Pool<R>,
    cursor: Cursor,
}

impl<'a, R: DurableRegion> Oids<'a, R> {
    pub(crate) fn new(pool: &'a Pool<R>) -> Self {
        Self {
            pool,
            cursor: Cursor::Start,
        }
    }
}

impl<R: DurableRegion> Iterator for Oids<'_, R> {
    type Item = Result<Oid>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match self.cursor {
            Cursor::Start => self.pool.first_oid(),
            Cursor::At(oid) => self.pool.next_oid(oid),
            Cursor::Done => return None,
        };

        match step {
            Ok(oid) => {
                self.cursor = Cursor::At(oid);
                Some(Ok(oid))
            }
            Err(PoolError::NoSuchObject) => {
                self.cursor = Cursor::Done;
                None
            }
            Err(e) => {
                self.cursor = Cursor::Done;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over objects and their payloads, newest first.
pub struct Iter<'a, R: DurableRegion, T> {
    oids: Oids<'a, R>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, R: DurableRegion, T> Iter<'a, R, T> {
    pub(crate) fn new(pool: &'a Pool<R>) -> Self {
        Self {
            oids: Oids::new(pool),
            _marker: PhantomData,
        }
    }
}

impl<R: DurableRegion, T: TypedPayload + Default> Iterator for Iter<'_, R, T> {
    type Item = Result<(Oid, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = match self.oids.next()? {
            Ok(oid) => oid,
            Err(e) => return Some(Err(e)),
        };
        Some(self.oids.pool.read(oid).map(|value| (oid, value)))
    }
}
