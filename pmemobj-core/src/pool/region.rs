//! Durable byte regions backing a pool.
//!
//! A region is a fixed-length byte range plus a `persist` primitive that
//! makes a sub-range durable and orders it before any later persist. The
//! pool core only talks to regions through [`DurableRegion`].

use super::header::SUPERBLOCK_SIZE;
use crate::error::{PoolError, Result};
use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A persistent byte range.
pub trait DurableRegion {
    /// Length of the region in bytes.
    fn size(&self) -> u64;

    /// Read access to the whole region.
    fn as_slice(&self) -> &[u8];

    /// Write access to the whole region.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Make `len` bytes at `offset` durable.
    ///
    /// When this returns `Ok`, the range has reached the media and is
    /// ordered before anything persisted afterwards.
    fn persist(&mut self, offset: u64, len: u64) -> Result<()>;

    /// Make the whole region durable.
    fn flush(&mut self) -> Result<()>;

    /// Backing file, if any. Used for error context.
    fn path(&self) -> Option<&Path> {
        None
    }
}

fn check_range(size: u64, offset: u64, len: u64) -> io::Result<(usize, usize)> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok((offset as usize, len as usize)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("persist range {}+{} exceeds region size {}", offset, len, size),
        )),
    }
}

fn lock_error(path: &Path, err: io::Error) -> PoolError {
    if err.kind() == fs2::lock_contended_error().kind() {
        PoolError::Locked {
            path: path.to_path_buf(),
        }
    } else {
        PoolError::from_io(path, err)
    }
}

/// A region backed by a memory-mapped file.
///
/// The file is held under an exclusive advisory lock for as long as the
/// region lives. `persist` maps to `msync` on the affected pages.
pub struct MappedRegion {
    mmap: MmapMut,
    file: File,
    path: PathBuf,
    persist_on_write: bool,
}

impl MappedRegion {
    /// Create a new zero-filled file of `size` bytes and map it.
    ///
    /// Fails if the file already exists. The file is removed again if any
    /// later step fails.
    pub fn create(
        path: impl AsRef<Path>,
        size: u64,
        mode: u32,
        persist_on_write: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = options
            .open(&path)
            .map_err(|e| PoolError::from_io(&path, e))?;

        Self::init(file, &path, size, persist_on_write).inspect_err(|_| {
            let _ = std::fs::remove_file(&path);
        })
    }

    fn init(file: File, path: &Path, size: u64, persist_on_write: bool) -> Result<Self> {
        file.try_lock_exclusive().map_err(|e| lock_error(path, e))?;

        // set_len zero-fills the new file
        file.set_len(size).map_err(|e| PoolError::from_io(path, e))?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(size as usize)
                .map_mut(&file)
                .map_err(|e| PoolError::from_io(path, e))?
        };

        Ok(Self {
            mmap,
            file,
            path: path.to_path_buf(),
            persist_on_write,
        })
    }

    /// Map an existing pool file.
    pub fn open(path: impl AsRef<Path>, persist_on_write: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PoolError::from_io(&path, e))?;

        file.try_lock_exclusive().map_err(|e| lock_error(&path, e))?;

        let size = file
            .metadata()
            .map_err(|e| PoolError::from_io(&path, e))?
            .len();

        if size < SUPERBLOCK_SIZE as u64 {
            return Err(PoolError::corrupt(
                0,
                format!("File is {} bytes, too short for a superblock", size),
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(size as usize)
                .map_mut(&file)
                .map_err(|e| PoolError::from_io(&path, e))?
        };

        Ok(Self {
            mmap,
            file,
            path,
            persist_on_write,
        })
    }
}

impl DurableRegion for MappedRegion {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    fn persist(&mut self, offset: u64, len: u64) -> Result<()> {
        let (offset, len) =
            check_range(self.size(), offset, len).map_err(|e| PoolError::from_io(&self.path, e))?;
        if !self.persist_on_write || len == 0 {
            return Ok(());
        }
        self.mmap
            .flush_range(offset, len)
            .map_err(|e| PoolError::from_io(&self.path, e))
    }

    fn flush(&mut self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| PoolError::from_io(&self.path, e))
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Persist bookkeeping shared between a [`VolatileRegion`] and its
/// [`CrashHandle`]s.
#[derive(Debug)]
struct CrashState {
    /// Bytes that have been persisted and would survive power loss.
    durable: Vec<u8>,
    /// Persists still allowed to reach `durable`; `None` is unlimited.
    budget: Option<usize>,
    /// Fail the next persist with an I/O error.
    fail_next: bool,
}

/// A heap-backed region that tracks which bytes were persisted.
///
/// Writes land in a working copy. Only `persist`ed ranges are copied into
/// the durable image, so [`CrashHandle::image`] shows exactly what a
/// restart after power loss would see.
pub struct VolatileRegion {
    bytes: Vec<u8>,
    state: Arc<Mutex<CrashState>>,
}

impl VolatileRegion {
    /// Create a zero-filled region.
    pub fn new(size: u64) -> Self {
        Self::from_bytes(vec![0u8; size as usize])
    }

    /// Create a region whose contents are already durable.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let state = CrashState {
            durable: bytes.clone(),
            budget: None,
            fail_next: false,
        };
        Self {
            bytes,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Handle for inspecting the durable image after the region is moved
    /// into a pool.
    pub fn crash_handle(&self) -> CrashHandle {
        CrashHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl DurableRegion for VolatileRegion {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn persist(&mut self, offset: u64, len: u64) -> Result<()> {
        let (offset, len) = check_range(self.size(), offset, len).map_err(|e| PoolError::Io {
            path: PathBuf::new(),
            source: e,
        })?;

        let mut state = self.state.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(PoolError::Io {
                path: PathBuf::new(),
                source: io::Error::other("injected persist failure"),
            });
        }
        if let Some(n) = state.budget.as_mut() {
            if *n == 0 {
                return Ok(());
            }
            *n -= 1;
        }
        state.durable[offset..offset + len].copy_from_slice(&self.bytes[offset..offset + len]);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let len = self.size();
        self.persist(0, len)
    }
}

/// Test-side view of a [`VolatileRegion`]'s durable image.
#[derive(Clone)]
pub struct CrashHandle {
    state: Arc<Mutex<CrashState>>,
}

impl CrashHandle {
    /// Let `n` more persists through, then drop all later ones.
    ///
    /// Models power loss right after the `n`-th persist.
    pub fn freeze_after(&self, n: usize) {
        self.state.lock().budget = Some(n);
    }

    /// Fail the next persist with an I/O error.
    pub fn fail_next_persist(&self) {
        self.state.lock().fail_next = true;
    }

    /// A fresh region holding only the persisted bytes.
    pub fn image(&self) -> VolatileRegion {
        VolatileRegion::from_bytes(self.state.lock().durable.clone())
    }
}
