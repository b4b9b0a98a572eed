//! On-media structures: the pool superblock and per-object headers.

use crate::error::{PoolError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Magic number identifying a pool file ("PPMEMOBJ" in hex).
pub const POOL_MAGIC: u64 = 0x5050_4D45_4D4F_424A;

/// Current pool format version.
pub const POOL_VERSION: u32 = 1;

/// Fixed size of the superblock in bytes. The data region starts here.
pub const SUPERBLOCK_SIZE: usize = 128;

/// Bytes reserved for the layout tag, including its NUL terminator.
pub const LAYOUT_TAG_SIZE: usize = 64;

/// Longest layout tag that fits in the superblock.
pub const MAX_LAYOUT_LEN: usize = LAYOUT_TAG_SIZE - 1;

/// Position of `root_offset` inside the superblock.
///
/// Aligned to 8 bytes so that linking a new chain head is one aligned store.
pub const ROOT_OFFSET_POS: usize = LAYOUT_TAG_SIZE + 8;

/// Fixed size of an object header in bytes.
pub const OBJECT_HEADER_SIZE: usize = 24;

/// Position of `next_offset` inside an object header.
pub const NEXT_OFFSET_POS: usize = 16;

/// Alignment of every object record.
pub const RECORD_ALIGNMENT: u64 = 8;

/// Bytes occupied by a record holding `payload_size` payload bytes.
///
/// Returns `None` if the size overflows.
#[must_use]
pub fn record_extent(payload_size: u64) -> Option<u64> {
    payload_size
        .checked_add(OBJECT_HEADER_SIZE as u64 + RECORD_ALIGNMENT - 1)
        .map(|n| n & !(RECORD_ALIGNMENT - 1))
}

/// Pool superblock, stored at offset 0 of every pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Layout tag, NUL padded.
    pub layout: [u8; LAYOUT_TAG_SIZE],
    /// Total pool size in bytes.
    pub size: u64,
    /// Offset of the chain head, 0 when the pool is empty.
    pub root_offset: u64,
    /// Magic number for file identification.
    pub magic: u64,
    /// Pool format version.
    pub version: u32,
    /// Flags (reserved for future use).
    pub flags: u32,
    /// Reserved for alignment and future use.
    pub _reserved: [u8; 32],
}

impl Superblock {
    /// Create a superblock for an empty pool.
    pub fn new(layout: &str, size: u64) -> Result<Self> {
        Ok(Self {
            layout: encode_layout(layout)?,
            size,
            root_offset: 0,
            magic: POOL_MAGIC,
            version: POOL_VERSION,
            flags: 0,
            _reserved: [0u8; 32],
        })
    }

    /// The layout tag as a string.
    pub fn layout(&self) -> Result<String> {
        let end = self
            .layout
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LAYOUT_TAG_SIZE);
        std::str::from_utf8(&self.layout[..end])
            .map(str::to_owned)
            .map_err(|e| PoolError::corrupt(0, format!("Layout tag is not UTF-8: {}", e)))
    }

    /// Validate the superblock against the length of the region holding it.
    pub fn validate(&self, region_len: u64) -> std::result::Result<(), &'static str> {
        if self.magic != POOL_MAGIC {
            return Err("Invalid magic number");
        }
        if self.version != POOL_VERSION {
            return Err("Unsupported pool version");
        }
        if self.size != region_len {
            return Err("Recorded size does not match region length");
        }
        if self.layout[MAX_LAYOUT_LEN] != 0 {
            return Err("Layout tag is not NUL terminated");
        }
        Ok(())
    }

    /// Read a superblock from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Buffer too small for superblock",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let mut layout = [0u8; LAYOUT_TAG_SIZE];
        cursor.read_exact(&mut layout)?;
        let size = cursor.read_u64::<LittleEndian>()?;
        let root_offset = cursor.read_u64::<LittleEndian>()?;
        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;

        let mut reserved = [0u8; 32];
        cursor.read_exact(&mut reserved)?;

        Ok(Self {
            layout,
            size,
            root_offset,
            magic,
            version,
            flags,
            _reserved: reserved,
        })
    }

    /// Write the superblock to a byte buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE);

        buf.write_all(&self.layout)?;
        buf.write_u64::<LittleEndian>(self.size)?;
        buf.write_u64::<LittleEndian>(self.root_offset)?;
        buf.write_u64::<LittleEndian>(self.magic)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_all(&self._reserved)?;

        debug_assert_eq!(buf.len(), SUPERBLOCK_SIZE);

        Ok(buf)
    }
}

/// Encode a layout tag into its fixed superblock field.
pub fn encode_layout(layout: &str) -> Result<[u8; LAYOUT_TAG_SIZE]> {
    if layout.len() > MAX_LAYOUT_LEN {
        return Err(PoolError::InvalidLayout {
            layout: layout.to_string(),
            cause: format!("longer than {} bytes", MAX_LAYOUT_LEN),
        });
    }
    if layout.as_bytes().contains(&0) {
        return Err(PoolError::InvalidLayout {
            layout: layout.escape_default().to_string(),
            cause: "contains a NUL byte".to_string(),
        });
    }

    let mut tag = [0u8; LAYOUT_TAG_SIZE];
    tag[..layout.len()].copy_from_slice(layout.as_bytes());
    Ok(tag)
}

/// Metadata prefixed to every object payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Payload length in bytes.
    pub payload_size: u64,
    /// Caller-defined type tag.
    pub type_tag: u64,
    /// Offset of the next header in the chain, 0 at the tail.
    pub next_offset: u64,
}

impl ObjectHeader {
    /// Create a header.
    pub fn new(payload_size: u64, type_tag: u64, next_offset: u64) -> Self {
        Self {
            payload_size,
            type_tag,
            next_offset,
        }
    }

    /// Bytes occupied by this record, header and padding included.
    #[must_use]
    pub fn extent(&self) -> Option<u64> {
        record_extent(self.payload_size)
    }

    /// Read a header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = io::Cursor::new(bytes);

        let payload_size = cursor.read_u64::<LittleEndian>()?;
        let type_tag = cursor.read_u64::<LittleEndian>()?;
        let next_offset = cursor.read_u64::<LittleEndian>()?;

        Ok(Self {
            payload_size,
            type_tag,
            next_offset,
        })
    }

    /// Write the header to a byte buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(OBJECT_HEADER_SIZE);

        buf.write_u64::<LittleEndian>(self.payload_size)?;
        buf.write_u64::<LittleEndian>(self.type_tag)?;
        buf.write_u64::<LittleEndian>(self.next_offset)?;

        debug_assert_eq!(buf.len(), OBJECT_HEADER_SIZE);

        Ok(buf)
    }
}
