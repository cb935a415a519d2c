use rayon::prelude::*;
use std::collections::HashMap;

use crate::patch_format::DeltaOp;
use crate::rolling_hash::RollingHash;

pub const BLOCK_SIZE: usize = 4096;

struct BlockSignature {
    weak: u32,
    strong: blake3::Hash,
    offset: u64,
    len: usize,
}

/// Block signatures of the source, looked up by weak checksum.
struct BlockIndex {
    blocks: Vec<BlockSignature>,
    by_weak: HashMap<u32, Vec<usize>>,
}

impl BlockIndex {
    fn build(source: &[u8]) -> Self {
        // Source chunks are up to the full chunk size; hash blocks in parallel.
        let blocks: Vec<BlockSignature> = source
            .par_chunks(BLOCK_SIZE)
            .enumerate()
            .map(|(i, block)| BlockSignature {
                weak: RollingHash::over(block).value(),
                strong: blake3::hash(block),
                offset: (i * BLOCK_SIZE) as u64,
                len: block.len(),
            })
            .collect();

        let mut by_weak: HashMap<u32, Vec<usize>> = HashMap::with_capacity(blocks.len());
        for (idx, block) in blocks.iter().enumerate() {
            by_weak.entry(block.weak).or_default().push(idx);
        }

        Self { blocks, by_weak }
    }

    /// Source block identical to `window`, as (offset, length).
    fn find(&self, weak: u32, window: &[u8]) -> Option<(u64, u64)> {
        let candidates = self.by_weak.get(&weak)?;
        let strong = blake3::hash(window);
        candidates
            .iter()
            .map(|&idx| &self.blocks[idx])
            .find(|block| block.len == window.len() && block.strong == strong)
            .map(|block| (block.offset, block.len as u64))
    }
}

/// Accumulates ops, merging adjacent copies and buffering literal bytes.
#[derive(Default)]
struct OpBuilder {
    ops: Vec<DeltaOp>,
    literal: Vec<u8>,
}

impl OpBuilder {
    fn copy(&mut self, offset: u64, length: u64) {
        self.flush_literal();
        if let Some(DeltaOp::Copy {
            offset: prev_offset,
            length: prev_length,
        }) = self.ops.last_mut()
        {
            if *prev_offset + *prev_length == offset {
                *prev_length += length;
                return;
            }
        }
        self.ops.push(DeltaOp::Copy { offset, length });
    }

    fn insert(&mut self, bytes: &[u8]) {
        self.literal.extend_from_slice(bytes);
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            self.ops.push(DeltaOp::Insert {
                data: std::mem::take(&mut self.literal),
            });
        }
    }

    fn finish(mut self) -> Vec<DeltaOp> {
        self.flush_literal();
        self.ops
    }
}

/// Compute the ops that rebuild `target` from `source`.
///
/// Rsync-style block matching:
/// 1. Split source into fixed-size blocks and index them by weak checksum
/// 2. Slide a window over target with a rolling checksum
/// 3. Confirm weak hits with BLAKE3 and emit a Copy, else emit the byte as literal
pub fn compute_diff(source: &[u8], target: &[u8]) -> Vec<DeltaOp> {
    let mut builder = OpBuilder::default();

    if source.is_empty() || target.len() < BLOCK_SIZE {
        builder.insert(target);
        return builder.finish();
    }

    let index = BlockIndex::build(source);
    let mut rolling = RollingHash::over(&target[..BLOCK_SIZE]);
    let mut pos = 0usize;

    while pos + BLOCK_SIZE <= target.len() {
        let window = &target[pos..pos + BLOCK_SIZE];

        if let Some((offset, length)) = index.find(rolling.value(), window) {
            builder.copy(offset, length);
            pos += length as usize;
            if pos + BLOCK_SIZE <= target.len() {
                rolling = RollingHash::over(&target[pos..pos + BLOCK_SIZE]);
            }
        } else {
            builder.insert(&target[pos..pos + 1]);
            pos += 1;
            if pos + BLOCK_SIZE <= target.len() {
                rolling.roll(target[pos - 1], target[pos + BLOCK_SIZE - 1]);
            }
        }
    }

    // tail shorter than a block
    builder.insert(&target[pos..]);
    builder.finish()
}
