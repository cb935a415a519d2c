use std::path::PathBuf;
use thiserror::Error;

/// Failures that callers (and tests) need to tell apart.
///
/// Everything else travels as a plain `anyhow::Error` with context attached.
#[derive(Error, Debug)]
pub enum PatchError {
    /// The apply destination exists and is not a directory
    #[error("Can't write patched files into {0}: it is a file")]
    OutputIsFile(PathBuf),

    /// Chunk size of zero was requested or recorded
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    /// The patch does not start with the expected magic
    #[error("Invalid patch file: bad magic {found:02x?}")]
    BadMagic {
        /// First bytes of the file (at most four)
        found: Vec<u8>,
    },

    /// The patch ended in the middle of a value
    #[error("Truncated patch file: {0}")]
    Truncated(String),

    /// The patch holds a value that can't be decoded
    #[error("Corrupt patch file: {0}")]
    Corrupt(String),

    /// A manifest path would escape the output directory
    #[error("Unsafe path in patch manifest: {0}")]
    UnsafePath(String),

    /// No diff record was left while a file still needed bytes
    #[error("Patch ran out of data with {remaining} bytes of {path} still to write")]
    PatchExhausted {
        /// Manifest path being written
        path: String,
        /// Bytes still owed to that file
        remaining: u64,
    },

    /// A reconstructed file does not hash to the manifest digest
    #[error("Hash mismatch after patching file: {0}")]
    HashMismatch(String),

    /// A delta op references bytes past the end of the source chunk
    #[error("Copy of {length} bytes at offset {offset} exceeds source chunk of {source_len} bytes")]
    CopyOutOfRange {
        /// Start of the copy
        offset: u64,
        /// Length of the copy
        length: u64,
        /// Length of the source chunk
        source_len: usize,
    },

    /// An archive entry yielded fewer bytes than its declared size
    #[error("Entry {path} ended after {actual} of {expected} bytes")]
    ShortEntry {
        /// Entry path
        path: String,
        /// Declared size
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// A zip entry uses a compression method we can't inflate
    #[error("Unsupported compression method {method} for entry {path}")]
    UnsupportedCompression {
        /// Entry path
        path: String,
        /// Method as reported by the zip directory
        method: String,
    },

    /// A zip entry's stored bytes don't match its recorded CRC-32
    #[error("CRC-32 mismatch in entry {path}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Entry path
        path: String,
        /// CRC-32 from the zip directory
        expected: u32,
        /// CRC-32 of the bytes read
        actual: u32,
    },

    /// A zip entry is encrypted
    #[error("Encrypted entry not supported: {0}")]
    Encrypted(String),
}
