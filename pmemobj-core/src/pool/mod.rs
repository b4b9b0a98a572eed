//! Persistent object pool over a durable region.
//!
//! A pool is one file (or other [`DurableRegion`]) holding a superblock and
//! a heap of object records. Records are linked into a single chain rooted
//! in the superblock. All links are region-relative offsets, so a pool can
//! be mapped at any address.
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Superblock (128 bytes)                                          │
//! │ [layout: 64][size: u64][root_offset: u64][magic][version]...    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Data Region (8-byte aligned records, any order)                 │
//! │ ┌─────────────────────────────────────────────────────────────┐ │
//! │ │ [payload_size: u64][type_tag: u64][next_offset: u64][bytes] │ │
//! │ ├─────────────────────────────────────────────────────────────┤ │
//! │ │ free                                                        │ │
//! │ ├─────────────────────────────────────────────────────────────┤ │
//! │ │ [payload_size: u64][type_tag: u64][next_offset: u64][bytes] │ │
//! │ └─────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Durability
//!
//! An allocation writes and persists its record first, then stores and
//! persists the new `root_offset`. A crash between the two leaves the root
//! untouched, so the record is unreachable. Free space is not persisted at
//! all: on open it is rebuilt from the reachable records, which reclaims
//! such orphans.

mod allocation;
mod config;
mod header;
mod iter;
mod region;
mod store;

pub use allocation::{ExtentAllocator, SpaceAllocator};
pub use config::{DEFAULT_MODE, DEFAULT_POOL_SIZE, MIN_POOL_SIZE, PoolConfig};
pub use header::{
    OBJECT_HEADER_SIZE, ObjectHeader, POOL_MAGIC, POOL_VERSION, RECORD_ALIGNMENT, SUPERBLOCK_SIZE,
    Superblock,
};
pub use iter::{Iter, Oids};
pub use region::{CrashHandle, DurableRegion, MappedRegion, VolatileRegion};
pub use store::{Pool, PoolStats};
