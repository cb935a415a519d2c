use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::chunker::{self, Chunker};
use crate::create::index_archive;
use crate::delta;
use crate::error::PatchError;
use crate::patch_format::{read_patch, ApplySummary, RecordReader, FORMAT_VERSION};
use crate::util::{self, HashingWriter};

/// Pairs source chunks with diff records and serves the rebuilt bytes.
///
/// Records and source chunks advance together, one pair per slice; a source
/// stream that runs out first contributes empty chunks.
struct Reconstructor<'a> {
    source: Chunker<'a>,
    records: RecordReader<'a>,
    slice: Vec<u8>,
    pos: usize,
    applied: usize,
}

impl<'a> Reconstructor<'a> {
    fn new(source: Chunker<'a>, records: RecordReader<'a>) -> Self {
        Self {
            source,
            records,
            slice: Vec::new(),
            pos: 0,
            applied: 0,
        }
    }

    /// Decode the next record. Returns false once the patch has no more.
    fn advance(&mut self) -> Result<bool> {
        let Some(record) = self.records.next().transpose()? else {
            return Ok(false);
        };
        let source_chunk = self.source.next().transpose()?.unwrap_or_default();
        self.slice = delta::decode(&source_chunk, record)
            .with_context(|| format!("Failed to apply diff record #{}", self.applied))?;
        self.pos = 0;
        self.applied += 1;
        log::debug!(
            "Record {}: {} source bytes -> {} bytes",
            self.applied - 1,
            source_chunk.len(),
            self.slice.len()
        );
        Ok(true)
    }

    /// Write exactly `len` rebuilt bytes to `out`.
    fn copy_to<W: Write>(&mut self, out: &mut W, len: u64, path: &str) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            if self.pos == self.slice.len() {
                if !self.advance()? {
                    return Err(PatchError::PatchExhausted {
                        path: path.to_string(),
                        remaining,
                    }
                    .into());
                }
                continue;
            }
            let take = remaining.min((self.slice.len() - self.pos) as u64) as usize;
            out.write_all(&self.slice[self.pos..self.pos + take])
                .with_context(|| format!("Failed to write file: {path}"))?;
            self.pos += take;
            remaining -= take as u64;
        }
        Ok(())
    }
}

/// Rebuild the patch's target files under `out_dir` from `source`.
pub async fn apply_patch(source: &Path, patch_path: &Path, out_dir: &Path) -> Result<ApplySummary> {
    if out_dir.is_file() {
        return Err(PatchError::OutputIsFile(out_dir.to_path_buf()).into());
    }

    let source = source.to_path_buf();
    let patch_path = patch_path.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    tokio::task::spawn_blocking(move || apply_blocking(&source, &patch_path, &out_dir)).await?
}

fn apply_blocking(source: &Path, patch_path: &Path, out_dir: &Path) -> Result<ApplySummary> {
    let raw = util::mmap_file(patch_path)?;
    let (header, records) = read_patch(&raw)
        .with_context(|| format!("Failed to read patch: {}", patch_path.display()))?;

    if header.version != FORMAT_VERSION {
        log::warn!(
            "Patch format version {} differs from {}; applying anyway",
            header.version,
            FORMAT_VERSION
        );
    }

    if header.manifest.is_empty() {
        log::info!("Patch has an empty manifest; nothing to write");
        return Ok(ApplySummary::default());
    }

    let chunk_size = chunker::checked_capacity(header.chunk_size)?;

    let (archive, order) = index_archive(source)?;
    log::info!(
        "Rebuilding {} files from {} source entries",
        header.manifest.len(),
        order.len()
    );

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let chunks = Chunker::new(archive.as_ref(), &order, chunk_size)?;
    let mut stream = Reconstructor::new(chunks, records);
    let mut summary = ApplySummary::default();

    for entry in &header.manifest {
        let full = util::output_path(out_dir, &entry.path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = std::fs::File::create(&full)
            .with_context(|| format!("Failed to create file: {}", full.display()))?;
        let mut writer = HashingWriter::new(BufWriter::new(file));
        stream.copy_to(&mut writer, entry.size, &entry.path)?;

        let (mut file, hash) = writer.finalize();
        file.flush()
            .with_context(|| format!("Failed to write file: {}", full.display()))?;
        if hash.as_bytes() != &entry.blake3_hash {
            return Err(PatchError::HashMismatch(entry.path.clone()).into());
        }

        summary.files_written += 1;
        summary.bytes_written += entry.size;
    }

    if stream.pos < stream.slice.len() || stream.records.next().is_some() {
        log::warn!("Patch holds data past the last manifest entry; ignoring it");
    }

    summary.records_applied = stream.applied;
    Ok(summary)
}
