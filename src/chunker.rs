use anyhow::{Context, Result};
use std::io::Read;

use crate::archive::{Archive, Entry};
use crate::error::PatchError;
use crate::patch_format::MAX_CHUNK_SIZE;

/// Streams the concatenated bytes of `order` as fixed-size chunks.
///
/// Every chunk holds exactly `capacity` bytes except the last, which holds
/// whatever is left and may be empty. The last chunk is always yielded, so an
/// archive with no bytes still produces one (empty) chunk. Chunk boundaries
/// ignore entry boundaries: an entry may span many chunks and a chunk may
/// hold many entries.
///
/// Each chunk is a freshly allocated `Vec`, so the caller may keep it while
/// pulling the next one. Not restartable; build a new `Chunker` per pass.
pub struct Chunker<'a> {
    archive: &'a dyn Archive,
    order: std::slice::Iter<'a, Entry>,
    current: Option<OpenEntry<'a>>,
    capacity: usize,
    /// Bytes still to stream across the rest of `order`
    remaining: u64,
    done: bool,
}

struct OpenEntry<'a> {
    entry: &'a Entry,
    reader: Box<dyn Read + 'a>,
    read: u64,
}

/// Validate a chunk size from the command line or a patch header.
pub fn checked_capacity(size: u64) -> Result<usize, PatchError> {
    usize::try_from(size)
        .ok()
        .filter(|&size| size > 0 && size <= MAX_CHUNK_SIZE)
        .ok_or(PatchError::InvalidChunkSize(size))
}

impl<'a> Chunker<'a> {
    pub fn new(archive: &'a dyn Archive, order: &'a [Entry], capacity: usize) -> Result<Self> {
        let capacity = checked_capacity(capacity as u64)?;
        let remaining = order
            .iter()
            .fold(0u64, |total, entry| total.saturating_add(entry.size));
        Ok(Self {
            archive,
            order: order.iter(),
            current: None,
            capacity,
            remaining,
            done: false,
        })
    }

    /// Next entry that still has bytes to give, opened.
    fn open_next(&mut self) -> Result<Option<OpenEntry<'a>>> {
        for entry in self.order.by_ref() {
            if entry.size == 0 {
                continue;
            }
            let reader = self
                .archive
                .open(&entry.path)
                .with_context(|| format!("Failed to open archive entry: {}", entry.path))?;
            return Ok(Some(OpenEntry {
                entry,
                reader,
                read: 0,
            }));
        }
        Ok(None)
    }

    fn fill(&mut self) -> Result<Vec<u8>> {
        // never allocate more than the archive can still deliver
        let target = self.remaining.min(self.capacity as u64) as usize;
        let mut buf = vec![0u8; target];
        let mut filled = 0;

        while filled < target {
            if self.current.is_none() {
                self.current = self.open_next()?;
            }
            let Some(open) = self.current.as_mut() else {
                break;
            };

            let left_in_entry = open.entry.size - open.read;
            let want = left_in_entry.min((target - filled) as u64) as usize;
            let n = open
                .reader
                .read(&mut buf[filled..filled + want])
                .with_context(|| format!("Failed to read archive entry: {}", open.entry.path))?;
            if n == 0 {
                return Err(PatchError::ShortEntry {
                    path: open.entry.path.clone(),
                    expected: open.entry.size,
                    actual: open.read,
                }
                .into());
            }

            filled += n;
            open.read += n as u64;
            self.remaining = self.remaining.saturating_sub(n as u64);
            if open.read == open.entry.size {
                self.current = None;
            }
        }

        if filled < self.capacity {
            self.done = true;
            buf.truncate(filled);
        }
        Ok(buf)
    }
}

impl Iterator for Chunker<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let chunk = self.fill();
        if chunk.is_err() {
            self.done = true;
        }
        Some(chunk)
    }
}
