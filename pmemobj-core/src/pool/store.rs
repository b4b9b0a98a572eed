//! The durable object store.

use super::allocation::{ExtentAllocator, SpaceAllocator};
use super::config::{MIN_POOL_SIZE, PoolConfig};
use super::header::{
    NEXT_OFFSET_POS, OBJECT_HEADER_SIZE, ObjectHeader, RECORD_ALIGNMENT, ROOT_OFFSET_POS,
    SUPERBLOCK_SIZE, Superblock, encode_layout, record_extent,
};
use super::iter::{Iter, Oids};
use super::region::{DurableRegion, MappedRegion};
use crate::error::{PoolError, Result};
use crate::payload::TypedPayload;
use crate::types::Oid;
use byteorder::{ByteOrder, LittleEndian};
use std::io;
use std::path::Path;

/// Space accounting snapshot of an open pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of live objects.
    pub objects: usize,
    /// Bytes occupied by live records, headers included.
    pub used_bytes: u64,
    /// Bytes available for new records.
    pub free_bytes: u64,
    /// Largest record that can currently be allocated.
    pub largest_free: u64,
}

/// State that only exists while the pool is open.
struct OpenPool<R> {
    region: R,
    allocator: ExtentAllocator,
    /// Cached copy of the superblock's `root_offset`.
    root: u64,
}

/// A persistent object store over one durable region.
///
/// Objects are kept in a singly linked chain. Each allocation is linked as
/// the new head, so iteration visits objects newest first.
///
/// The pool does no locking of its own: allocation and free take
/// `&mut self`, reads take `&self`.
pub struct Pool<R: DurableRegion = MappedRegion> {
    state: Option<OpenPool<R>>,
    layout: String,
    size: u64,
}

impl Pool<MappedRegion> {
    /// Create a new pool file.
    ///
    /// Fails if `path` exists or `size` is below [`MIN_POOL_SIZE`].
    pub fn create(path: impl AsRef<Path>, layout: &str, size: u64, mode: u32) -> Result<Self> {
        let config = PoolConfig::default()
            .with_layout(layout)
            .with_size(size)
            .with_mode(mode);
        Self::create_with(path, &config)
    }

    /// Create a new pool file from a configuration.
    pub fn create_with(path: impl AsRef<Path>, config: &PoolConfig) -> Result<Self> {
        let path = path.as_ref();

        // Reject bad arguments before anything touches the filesystem
        encode_layout(&config.layout)?;
        check_size(config.size)?;

        let region =
            MappedRegion::create(path, config.size, config.mode, config.persist_on_write)?;
        Self::create_in(region, &config.layout).inspect_err(|_| {
            let _ = std::fs::remove_file(path);
        })
    }

    /// Open an existing pool file.
    pub fn open(path: impl AsRef<Path>, layout: &str) -> Result<Self> {
        let config = PoolConfig::default().with_layout(layout);
        Self::open_with(path, &config)
    }

    /// Open an existing pool file, taking the layout and persist setting
    /// from a configuration. The configured size and mode are ignored.
    pub fn open_with(path: impl AsRef<Path>, config: &PoolConfig) -> Result<Self> {
        let region = MappedRegion::open(path, config.persist_on_write)?;
        Self::open_in(region, &config.layout)
    }
}

impl<R: DurableRegion> Pool<R> {
    /// Format `region` as an empty pool.
    ///
    /// Only the superblock is written; the rest of the region is never read
    /// before an allocation writes it. The superblock is persisted before
    /// this returns.
    pub fn create_in(mut region: R, layout: &str) -> Result<Self> {
        let size = region.size();
        check_size(size)?;

        let superblock = Superblock::new(layout, size)?;
        let bytes = superblock.to_bytes().map_err(|e| io_error(&region, e))?;
        region.as_mut_slice()[..SUPERBLOCK_SIZE].copy_from_slice(&bytes);
        region.persist(0, SUPERBLOCK_SIZE as u64)?;

        tracing::info!(layout, size, "Created pool");

        Ok(Self {
            state: Some(OpenPool {
                region,
                allocator: ExtentAllocator::new(SUPERBLOCK_SIZE as u64, size),
                root: 0,
            }),
            layout: layout.to_string(),
            size,
        })
    }

    /// Attach to a pool previously formatted in `region`.
    ///
    /// Validates the superblock and every record reachable from the root,
    /// then rebuilds the free space map from those records.
    pub fn open_in(region: R, layout: &str) -> Result<Self> {
        let size = region.size();
        if size < SUPERBLOCK_SIZE as u64 {
            return Err(PoolError::corrupt(0, "Region too short for a superblock"));
        }

        let superblock = Superblock::from_bytes(&region.as_slice()[..SUPERBLOCK_SIZE])
            .map_err(|e| PoolError::corrupt(0, e.to_string()))?;
        superblock
            .validate(size)
            .map_err(|cause| PoolError::corrupt(0, cause))?;

        let found = superblock.layout()?;
        if found != layout {
            return Err(PoolError::LayoutMismatch {
                expected: layout.to_string(),
                found,
            });
        }

        let live = walk_chain(region.as_slice(), superblock.root_offset)?;
        let objects = live.len();
        let allocator = ExtentAllocator::from_live(SUPERBLOCK_SIZE as u64, size, live)
            .map_err(|(offset, cause)| PoolError::corrupt(offset, cause))?;

        tracing::info!(
            layout,
            size,
            objects,
            free_bytes = allocator.free_bytes(),
            "Opened pool"
        );

        Ok(Self {
            state: Some(OpenPool {
                region,
                allocator,
                root: superblock.root_offset,
            }),
            layout: found,
            size,
        })
    }

    /// Flush and release the region.
    ///
    /// Later operations fail with [`PoolError::PoolClosed`]. Closing an
    /// already closed pool does nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };

        let result = state.region.flush();
        if let Err(e) = &result {
            tracing::warn!(layout = %self.layout, error = %e, "Flush on close failed");
        }
        tracing::info!(layout = %self.layout, "Closed pool");
        result
    }

    /// Whether the pool is open.
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Layout tag recorded in the superblock.
    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Pool size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Space accounting for the open pool.
    pub fn stats(&self) -> Result<PoolStats> {
        let state = self.state()?;
        Ok(PoolStats {
            objects: state.allocator.extent_count(),
            used_bytes: state.allocator.used_bytes(),
            free_bytes: state.allocator.free_bytes(),
            largest_free: state.allocator.largest_free(),
        })
    }

    /// Allocate a new object holding `payload` and link it as chain head.
    ///
    /// The record is persisted before the root is updated to point at it,
    /// so a crash in between leaves the pool as if nothing happened.
    pub fn allocate<T: TypedPayload + ?Sized>(
        &mut self,
        payload: &T,
        type_tag: u64,
    ) -> Result<Oid> {
        let state = self.state_mut()?;

        let payload_size = payload.size() as u64;
        let extent = record_extent(payload_size).ok_or_else(|| PoolError::OutOfSpace {
            requested: payload_size,
            available: state.allocator.largest_free(),
        })?;
        let offset = state.allocator.reserve(extent)?;

        if let Err(e) = state.write_record(offset, extent, payload, type_tag) {
            state.allocator.release(offset);
            return Err(e);
        }

        let oid = Oid::new(offset);
        tracing::debug!(%oid, payload_size, type_tag, "Allocated object");
        Ok(oid)
    }

    /// Allocate a new object holding raw bytes.
    pub fn allocate_bytes(&mut self, bytes: &[u8], type_tag: u64) -> Result<Oid> {
        self.allocate(bytes, type_tag)
    }

    /// Unlink `oid` from the chain and release its space.
    ///
    /// The unlink is a single persisted 8-byte store, either to the root or
    /// to the predecessor's link field.
    pub fn free(&mut self, oid: Oid) -> Result<()> {
        let state = self.state_mut()?;
        let header = state.header(oid)?;

        if state.root == oid.offset() {
            state.write_link(ROOT_OFFSET_POS as u64, header.next_offset)?;
            state.root = header.next_offset;
        } else {
            let mut cursor = state.root;
            loop {
                if cursor == 0 {
                    return Err(PoolError::invalid_oid(oid, "Object is not linked in the chain"));
                }
                let current = state.header(Oid::new(cursor))?;
                if current.next_offset == oid.offset() {
                    state.write_link(cursor + NEXT_OFFSET_POS as u64, header.next_offset)?;
                    break;
                }
                cursor = current.next_offset;
            }
        }

        state.allocator.release(oid.offset());
        tracing::debug!(%oid, payload_size = header.payload_size, "Freed object");
        Ok(())
    }

    /// The chain head, i.e. the most recently allocated live object.
    pub fn first_oid(&self) -> Result<Oid> {
        match self.state()?.root {
            0 => Err(PoolError::NoSuchObject),
            root => Ok(Oid::new(root)),
        }
    }

    /// The object after `oid` in the chain.
    pub fn next_oid(&self, oid: Oid) -> Result<Oid> {
        match self.state()?.header(oid)?.next_offset {
            0 => Err(PoolError::NoSuchObject),
            next => Ok(Oid::new(next)),
        }
    }

    /// The chain head together with its payload.
    pub fn first<T: TypedPayload + Default>(&self) -> Result<(Oid, T)> {
        let oid = self.first_oid()?;
        Ok((oid, self.read(oid)?))
    }

    /// The object after `oid` together with its payload.
    pub fn next<T: TypedPayload + Default>(&self, oid: Oid) -> Result<(Oid, T)> {
        let next = self.next_oid(oid)?;
        Ok((next, self.read(next)?))
    }

    /// Read the payload of `oid` into a new value.
    pub fn read<T: TypedPayload + Default>(&self, oid: Oid) -> Result<T> {
        let mut value = T::default();
        self.read_into(oid, &mut value)?;
        Ok(value)
    }

    /// Read the payload of `oid` into `value`.
    ///
    /// Fails with [`PoolError::SizeMismatch`] if `value` cannot hold the
    /// stored payload size.
    pub fn read_into<T: TypedPayload + ?Sized>(&self, oid: Oid, value: &mut T) -> Result<()> {
        let state = self.state()?;
        let header = state.header(oid)?;

        let stored = header.payload_size as usize;
        if !value.accepts_size(stored) {
            return Err(PoolError::SizeMismatch {
                expected: value.size() as u64,
                found: header.payload_size,
            });
        }
        value.read_from(state.payload(oid, &header))
    }

    /// Copy out the raw payload of `oid`.
    pub fn read_bytes(&self, oid: Oid) -> Result<Vec<u8>> {
        let state = self.state()?;
        let header = state.header(oid)?;
        Ok(state.payload(oid, &header).to_vec())
    }

    /// Type tag recorded for `oid`.
    pub fn type_tag(&self, oid: Oid) -> Result<u64> {
        Ok(self.state()?.header(oid)?.type_tag)
    }

    /// Payload size recorded for `oid`.
    pub fn payload_size(&self, oid: Oid) -> Result<u64> {
        Ok(self.state()?.header(oid)?.payload_size)
    }

    /// Iterate over all objects, newest first, materializing each payload.
    pub fn iter<T: TypedPayload + Default>(&self) -> Iter<'_, R, T> {
        Iter::new(self)
    }

    /// Iterate over all object ids, newest first.
    pub fn oids(&self) -> Oids<'_, R> {
        Oids::new(self)
    }

    fn state(&self) -> Result<&OpenPool<R>> {
        self.state.as_ref().ok_or(PoolError::PoolClosed)
    }

    fn state_mut(&mut self) -> Result<&mut OpenPool<R>> {
        self.state.as_mut().ok_or(PoolError::PoolClosed)
    }
}

impl<R: DurableRegion> Drop for Pool<R> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Oid {
    /// The object after this one in `pool`'s chain, with its payload.
    pub fn next<T, R>(self, pool: &Pool<R>) -> Result<(Oid, T)>
    where
        T: TypedPayload + Default,
        R: DurableRegion,
    {
        pool.next(self)
    }
}

impl<R: DurableRegion> OpenPool<R> {
    /// Validate `oid` and decode its header.
    fn header(&self, oid: Oid) -> Result<ObjectHeader> {
        let offset = oid.offset();
        if oid.is_null() {
            return Err(PoolError::invalid_oid(oid, "Null oid"));
        }
        if offset < SUPERBLOCK_SIZE as u64 || offset % RECORD_ALIGNMENT != 0 {
            return Err(PoolError::invalid_oid(oid, "Not a record boundary"));
        }
        let in_bounds = offset
            .checked_add(OBJECT_HEADER_SIZE as u64)
            .is_some_and(|end| end <= self.region.size());
        if !in_bounds {
            return Err(PoolError::invalid_oid(oid, "Outside the pool region"));
        }
        let Some(extent) = self.allocator.extent_at(offset) else {
            return Err(PoolError::invalid_oid(oid, "No live object at this offset"));
        };

        let start = offset as usize;
        let header = ObjectHeader::from_bytes(
            &self.region.as_slice()[start..start + OBJECT_HEADER_SIZE],
        )
        .map_err(|e| PoolError::invalid_oid(oid, e.to_string()))?;

        if header.extent() != Some(extent) {
            return Err(PoolError::corrupt(
                offset,
                format!(
                    "Header claims {} payload bytes, record holds {} bytes",
                    header.payload_size, extent
                ),
            ));
        }

        Ok(header)
    }

    /// Payload bytes of a record whose header was validated.
    fn payload(&self, oid: Oid, header: &ObjectHeader) -> &[u8] {
        let start = oid.offset() as usize + OBJECT_HEADER_SIZE;
        &self.region.as_slice()[start..start + header.payload_size as usize]
    }

    /// Write and persist a record at `offset`, then link it as chain head.
    fn write_record<T: TypedPayload + ?Sized>(
        &mut self,
        offset: u64,
        extent: u64,
        payload: &T,
        type_tag: u64,
    ) -> Result<()> {
        let payload_size = payload.size();
        let header = ObjectHeader::new(payload_size as u64, type_tag, self.root);
        let header_bytes = header.to_bytes().map_err(|e| io_error(&self.region, e))?;

        let start = offset as usize;
        let payload_start = start + OBJECT_HEADER_SIZE;
        let payload_end = payload_start + payload_size;
        let end = start + extent as usize;

        let buf = self.region.as_mut_slice();
        buf[start..payload_start].copy_from_slice(&header_bytes);
        payload.write_into(&mut buf[payload_start..payload_end]);
        buf[payload_end..end].fill(0);

        // The record must be durable before anything points at it
        self.region.persist(offset, extent)?;

        self.write_link(ROOT_OFFSET_POS as u64, offset)?;
        self.root = offset;
        Ok(())
    }

    /// Store and persist an 8-byte link field at `pos`.
    ///
    /// On persist failure the previous value is put back.
    fn write_link(&mut self, pos: u64, value: u64) -> Result<()> {
        let at = pos as usize;
        let buf = self.region.as_mut_slice();
        let previous = LittleEndian::read_u64(&buf[at..at + 8]);
        LittleEndian::write_u64(&mut buf[at..at + 8], value);

        if let Err(e) = self.region.persist(pos, 8) {
            LittleEndian::write_u64(&mut self.region.as_mut_slice()[at..at + 8], previous);
            return Err(e);
        }
        Ok(())
    }
}

fn check_size(size: u64) -> Result<()> {
    if size < MIN_POOL_SIZE {
        return Err(PoolError::TooSmall {
            size,
            minimum: MIN_POOL_SIZE,
        });
    }
    Ok(())
}

fn io_error<R: DurableRegion>(region: &R, source: io::Error) -> PoolError {
    PoolError::Io {
        path: region.path().map(Path::to_path_buf).unwrap_or_default(),
        source,
    }
}

/// Walk the chain from `root` and collect each record's extent.
///
/// Every record must start at an aligned offset inside the data region and
/// end within `bytes`. A chain longer than the region could hold is a
/// cycle.
fn walk_chain(bytes: &[u8], root: u64) -> Result<Vec<(u64, u64)>> {
    let size = bytes.len() as u64;
    let max_records = (size - SUPERBLOCK_SIZE as u64) / OBJECT_HEADER_SIZE as u64;

    let mut live = Vec::new();
    let mut cursor = root;
    while cursor != 0 {
        if live.len() as u64 >= max_records {
            return Err(PoolError::corrupt(cursor, "Chain contains a cycle"));
        }
        if cursor < SUPERBLOCK_SIZE as u64 || cursor % RECORD_ALIGNMENT != 0 {
            return Err(PoolError::corrupt(cursor, "Link is not a record boundary"));
        }
        let header_end = cursor
            .checked_add(OBJECT_HEADER_SIZE as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| PoolError::corrupt(cursor, "Header outside the pool region"))?;

        let header = ObjectHeader::from_bytes(&bytes[cursor as usize..header_end as usize])
            .map_err(|e| PoolError::corrupt(cursor, e.to_string()))?;
        let extent = header
            .extent()
            .filter(|&extent| cursor.checked_add(extent).is_some_and(|end| end <= size))
            .ok_or_else(|| PoolError::corrupt(cursor, "Payload outside the pool region"))?;

        live.push((cursor, extent));
        cursor = header.next_offset;
    }

    Ok(live)
}
