//! Pool creation settings.

use super::header::{OBJECT_HEADER_SIZE, SUPERBLOCK_SIZE};

/// Default pool size: 8 MB.
pub const DEFAULT_POOL_SIZE: u64 = 8 * 1024 * 1024;

/// Minimum pool size: one page.
///
/// Always large enough for the superblock and at least one header.
pub const MIN_POOL_SIZE: u64 = 4096;

/// Default unix permission bits for new pool files.
pub const DEFAULT_MODE: u32 = 0o666;

const _: () = assert!(MIN_POOL_SIZE >= (SUPERBLOCK_SIZE + OBJECT_HEADER_SIZE) as u64);

/// Configuration for pool creation and opening.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool size in bytes.
    pub size: u64,
    /// Unix permission bits for the pool file.
    pub mode: u32,
    /// Layout tag recorded in the superblock.
    pub layout: String,
    /// Whether `persist` flushes to media. Turning this off trades
    /// durability for speed in tests and benchmarks.
    pub persist_on_write: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            mode: DEFAULT_MODE,
            layout: String::new(),
            persist_on_write: true,
        }
    }
}

impl PoolConfig {
    /// Set the pool size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the file mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Set the layout tag.
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Enable or disable flushing on persist.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist_on_write = persist;
        self
    }
}
