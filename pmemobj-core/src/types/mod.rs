//! Core types for the object store.
//!
//! - `Oid`: region-relative reference to an allocated object

mod oid;

pub use oid::Oid;
