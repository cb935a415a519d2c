use anyhow::{Context, Result};
use rayon::prelude::*;
use std::io::{BufWriter, Read};
use std::path::Path;

use crate::archive::{self, Archive, Entry};
use crate::chunker::{self, Chunker};
use crate::delta;
use crate::error::PatchError;
use crate::linearize;
use crate::patch_format::{
    CreateSummary, ManifestEntry, PatchHeader, PatchWriter, DEFAULT_CHUNK_SIZE, FORMAT_VERSION,
};
use crate::util;

#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Bytes per chunk handed to the diff primitive.
    pub chunk_size: usize,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Open an archive and order its entries for streaming.
pub fn index_archive(path: &Path) -> Result<(Box<dyn Archive>, Vec<Entry>)> {
    let archive = archive::open_archive(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    let order = linearize::linearize(archive.entries());
    Ok((archive, order))
}

/// BLAKE3 every target entry for the manifest, in parallel.
fn build_manifest(archive: &dyn Archive, order: &[Entry]) -> Result<Vec<ManifestEntry>> {
    order
        .par_iter()
        .map(|entry| -> Result<ManifestEntry> {
            let reader = archive
                .open(&entry.path)
                .with_context(|| format!("Failed to open archive entry: {}", entry.path))?;
            let mut hasher = blake3::Hasher::new();
            let copied = std::io::copy(&mut reader.take(entry.size), &mut hasher)
                .with_context(|| format!("Failed to hash archive entry: {}", entry.path))?;
            if copied != entry.size {
                return Err(PatchError::ShortEntry {
                    path: entry.path.clone(),
                    expected: entry.size,
                    actual: copied,
                }
                .into());
            }
            Ok(ManifestEntry {
                size: entry.size,
                path: entry.path.clone(),
                blake3_hash: *hasher.finalize().as_bytes(),
            })
        })
        .collect()
}

/// Create a patch that rebuilds `target`'s files from `source`.
///
/// Both archives are indexed concurrently; the diff itself is a single
/// sequential pass over both chunk streams on the blocking pool.
pub async fn create_patch(
    source: &Path,
    target: &Path,
    output: &Path,
    options: &CreateOptions,
) -> Result<CreateSummary> {
    let chunk_size = chunker::checked_capacity(options.chunk_size as u64)?;

    // Stage 1: open and linearize both archives concurrently
    let source_owned = source.to_path_buf();
    let target_owned = target.to_path_buf();
    let (source_index, target_index) = tokio::try_join!(
        tokio::task::spawn_blocking(move || index_archive(&source_owned)),
        tokio::task::spawn_blocking(move || index_archive(&target_owned)),
    )?;
    let (source_archive, source_order) = source_index?;
    let (target_archive, target_order) = target_index?;

    log::info!(
        "Source has {} entries, target has {} entries",
        source_order.len(),
        target_order.len()
    );

    // Stage 2: manifest + streamed diff
    let output = util::with_patch_extension(output);
    tokio::task::spawn_blocking(move || {
        write_patch(
            source_archive.as_ref(),
            &source_order,
            target_archive.as_ref(),
            &target_order,
            &output,
            chunk_size,
        )
    })
    .await?
}

fn write_patch(
    source: &dyn Archive,
    source_order: &[Entry],
    target: &dyn Archive,
    target_order: &[Entry],
    output: &Path,
    chunk_size: usize,
) -> Result<CreateSummary> {
    let manifest = build_manifest(target, target_order)?;
    let target_bytes: u64 = linearize::sizes(target_order).iter().sum();

    let header = PatchHeader {
        version: FORMAT_VERSION,
        chunk_size: chunk_size as u64,
        manifest,
    };

    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    let mut patch = PatchWriter::new(BufWriter::new(file), &header)?;

    // zip-longest over the two chunk streams: a missing source chunk diffs
    // against nothing; once the target runs dry nothing more is needed
    let mut source_chunks = Chunker::new(source, source_order, chunk_size)?;
    let mut target_chunks = Chunker::new(target, target_order, chunk_size)?;
    loop {
        let target_chunk = match target_chunks.next().transpose()? {
            Some(chunk) if !chunk.is_empty() => chunk,
            _ => break,
        };
        let source_chunk = source_chunks.next().transpose()?.unwrap_or_default();

        let record = delta::encode(&source_chunk, &target_chunk)?;
        if record.is_empty() {
            break;
        }
        log::debug!(
            "Record {}: {} source bytes, {} target bytes -> {} bytes",
            patch.records(),
            source_chunk.len(),
            target_chunk.len(),
            record.len()
        );
        patch.write_record(&record)?;
    }

    let records = patch.records();
    patch
        .finish()
        .with_context(|| format!("Failed to write patch file: {}", output.display()))?;

    let patch_bytes = std::fs::metadata(output)
        .with_context(|| format!("Failed to stat patch file: {}", output.display()))?
        .len();

    Ok(CreateSummary {
        patch_path: output.to_path_buf(),
        source_entries: source_order.len(),
        target_entries: target_order.len(),
        target_bytes,
        records,
        patch_bytes,
    })
}
