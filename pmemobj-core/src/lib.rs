//! Persistent memory object store.
//!
//! This crate manages a single memory-mapped pool file holding a heap of
//! independently allocated objects. Each object is named by an [`Oid`], a
//! region-relative offset that stays valid across process restarts.
//!
//! # Key Components
//!
//! - **Pool**: create/open/close lifecycle, allocation, iteration and free
//! - **Regions**: the durable byte range a pool lives in, with `persist`
//! - **Allocator**: first-fit extent reservation inside the data region
//! - **Payloads**: the [`TypedPayload`] contract for values moved in and out
//!
//! # Example
//!
//! ```no_run
//! use pmemobj_core::prelude::*;
//!
//! # fn main() -> pmemobj_core::Result<()> {
//! let mut pool = Pool::create("/tmp/example.pool", "", 10 * 1024 * 1024, 0o666)?;
//!
//! pool.allocate(&888u64, 1)?;
//! pool.allocate(&999u64, 1)?;
//!
//! // Newest allocation first
//! let (head, value) = pool.first::<u64>()?;
//! assert_eq!(value, 999);
//! let (_, value) = head.next::<u64, _>(&pool)?;
//! assert_eq!(value, 888);
//! pool.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod payload;
pub mod pool;
pub mod prelude;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{PoolError, Result};
pub use payload::TypedPayload;
pub use pool::{DurableRegion, MappedRegion, Pool, PoolConfig, VolatileRegion};
pub use types::Oid;
