//! Object identifiers.

use std::fmt;

/// Stable reference to an object allocated in a pool.
///
/// An `Oid` is a byte offset from the start of the pool region, never an
/// absolute address, so it stays valid when the pool is closed and mapped
/// again at a different base. Offset 0 is the superblock and doubles as the
/// null id.
///
/// An `Oid` does not borrow the pool. Dereferencing always goes through a
/// [`Pool`](crate::Pool) method, which validates it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Oid(u64);

impl Oid {
    /// The null id. Never refers to an object.
    pub const NULL: Self = Self(0);

    /// Create an id from a raw region offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the raw region offset.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.0
    }

    /// Check if this is the null id.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u64> for Oid {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

impl From<Oid> for u64 {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}
