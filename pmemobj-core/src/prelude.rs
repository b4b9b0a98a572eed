//! Prelude for convenient imports.
//!
//! ```ignore
//! use pmemobj_core::prelude::*;
//! ```

pub use crate::error::{PoolError, Result};
pub use crate::payload::TypedPayload;
pub use crate::pool::{
    DurableRegion, MappedRegion, Pool, PoolConfig, PoolStats, SpaceAllocator, VolatileRegion,
};
pub use crate::types::Oid;
