use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::PathBuf;

use crate::error::PatchError;

pub const MAGIC: &[u8; 4] = b"ZDLT";
pub const FORMAT_VERSION: u32 = 1;
pub const PATCH_EXTENSION: &str = "zdelta";

/// 64 MiB, matching the default xdelta source window.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on the chunk size accepted on creation or found in a header.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchHeader {
    pub version: u32,
    /// Chunk size used at creation; apply must re-chunk the source identically.
    pub chunk_size: u64,
    /// Target files in linearized order.
    pub manifest: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub size: u64,
    /// Always forward-slash separated.
    pub path: String,
    pub blake3_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    Copy { offset: u64, length: u64 },
    Insert { data: Vec<u8> },
}

#[derive(Debug)]
pub struct CreateSummary {
    pub patch_path: PathBuf,
    pub source_entries: usize,
    pub target_entries: usize,
    pub target_bytes: u64,
    pub records: usize,
    pub patch_bytes: u64,
}

#[derive(Debug, Default)]
pub struct ApplySummary {
    pub files_written: usize,
    pub bytes_written: u64,
    pub records_applied: usize,
}

/// Writes the preamble on construction, then one record per call.
///
/// ```text
/// MAGIC (4 bytes) | bincode(PatchHeader) | record*
/// record = u64 little-endian length | bytes
/// ```
///
/// Records run until end of file; their count is not stored.
pub struct PatchWriter<W: Write> {
    inner: W,
    records: usize,
}

impl<W: Write> PatchWriter<W> {
    pub fn new(mut inner: W, header: &PatchHeader) -> Result<Self> {
        inner.write_all(MAGIC)?;
        bincode::serialize_into(&mut inner, header).context("Failed to serialize patch header")?;
        Ok(Self { inner, records: 0 })
    }

    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.inner.write_u64::<LittleEndian>(record.len() as u64)?;
        self.inner.write_all(record)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Validate the magic and decode the header. The returned reader yields the
/// records that follow, borrowing them from `data`.
pub fn read_patch(data: &[u8]) -> Result<(PatchHeader, RecordReader<'_>)> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(PatchError::BadMagic {
            found: data[..data.len().min(MAGIC.len())].to_vec(),
        }
        .into());
    }

    let mut cursor = Cursor::new(&data[MAGIC.len()..]);
    let header: PatchHeader = bincode::deserialize_from(&mut cursor)
        .map_err(|e| PatchError::Corrupt(format!("unreadable header: {e}")))?;
    let pos = MAGIC.len() + cursor.position() as usize;

    Ok((header, RecordReader { data, pos }))
}

/// Lazily decodes length-framed records until end of file.
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn read_record(&mut self) -> Result<&'a [u8]> {
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let len = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| PatchError::Truncated(format!("partial record length at offset {}", self.pos)))?;
        let start = self.pos + 8;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                PatchError::Truncated(format!(
                    "record of {len} bytes at offset {} runs past end of file",
                    self.pos
                ))
            })?;
        self.pos = end;
        Ok(&self.data[start..end])
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let record = self.read_record();
        if record.is_err() {
            // nothing after a bad frame can be trusted
            self.pos = self.data.len();
        }
        Some(record)
    }
}
