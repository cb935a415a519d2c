use anyhow::Result;

use crate::error::PatchError;
use crate::patch_format::DeltaOp;

const RESERVE_LIMIT: u64 = 256 << 20;

/// Rebuild the target from the source chunk and its ops.
///
/// Copy ranges come from a file on disk, so each is checked against the
/// source before slicing.
pub fn apply_diff(source: &[u8], ops: &[DeltaOp]) -> Result<Vec<u8>> {
    let estimated_size: u64 = ops
        .iter()
        .map(|op| match op {
            DeltaOp::Copy { length, .. } => *length,
            DeltaOp::Insert { data } => data.len() as u64,
        })
        .fold(0u64, u64::saturating_add);

    // a corrupt op list can claim any length
    let mut result = Vec::with_capacity(estimated_size.min(RESERVE_LIMIT) as usize);

    for op in ops {
        match op {
            DeltaOp::Copy { offset, length } => {
                let range = usize::try_from(*offset)
                    .ok()
                    .zip(usize::try_from(*length).ok())
                    .and_then(|(start, len)| Some(start..start.checked_add(len)?))
                    .filter(|range| range.end <= source.len())
                    .ok_or(PatchError::CopyOutOfRange {
                        offset: *offset,
                        length: *length,
                        source_len: source.len(),
                    })?;
                result.extend_from_slice(&source[range]);
            }
            DeltaOp::Insert { data } => {
                result.extend_from_slice(data);
            }
        }
    }

    Ok(result)
}
