use anyhow::{Context, Result};

use crate::binary_diff;
use crate::binary_patch;
use crate::error::PatchError;
use crate::patch_format::DeltaOp;

const ZSTD_LEVEL: i32 = 3;

/// Diff `target` against `source` into an opaque record: the bincode op list
/// from [`binary_diff`], zstd-compressed. Never returns an empty record.
pub fn encode(source: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    let ops = binary_diff::compute_diff(source, target);
    let encoded = bincode::serialize(&ops).context("Failed to serialize delta ops")?;
    zstd::bulk::compress(&encoded, ZSTD_LEVEL).context("Failed to compress delta record")
}

/// Rebuild the target chunk from `source` and a record produced by [`encode`].
pub fn decode(source: &[u8], record: &[u8]) -> Result<Vec<u8>> {
    let decoder = zstd::Decoder::new(record).context("Failed to create zstd decoder")?;
    let ops: Vec<DeltaOp> = bincode::deserialize_from(decoder)
        .map_err(|e| PatchError::Corrupt(format!("undecodable delta record: {e}")))?;
    binary_patch::apply_diff(source, &ops)
}
