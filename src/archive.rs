use anyhow::{anyhow, Context, Result};
use flate2::read::DeflateDecoder;
use memmap2::Mmap;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive};

use crate::error::PatchError;
use crate::util;

/// One file-like member of an archive. Never a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Slash-separated path inside the archive
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// Read-only view of an archive: list its files and stream any one of them.
pub trait Archive: Send + Sync {
    /// Non-directory entries, in whatever order the container stores them.
    fn entries(&self) -> &[Entry];

    /// Open an entry for sequential reading.
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>>;
}

/// Open a zip file, or treat a directory as an archive of its files.
pub fn open_archive(path: &Path) -> Result<Box<dyn Archive>> {
    if path.is_dir() {
        Ok(Box::new(DirArchive::open(path)?))
    } else {
        Ok(Box::new(ZipFileArchive::open(path)?))
    }
}

#[derive(Debug, Clone, Copy)]
struct ZipLocation {
    data_start: u64,
    compressed_size: u64,
    size: u64,
    crc32: u32,
    method: CompressionMethod,
}

/// Checks a zip entry's CRC-32 once its declared size has been read.
struct CrcReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    remaining: u64,
    expected: u32,
    path: String,
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);

        let before = self.remaining;
        self.remaining = self.remaining.saturating_sub(n as u64);
        if before > 0 && self.remaining == 0 {
            let actual = self.hasher.clone().finalize();
            if actual != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    PatchError::ChecksumMismatch {
                        path: self.path.clone(),
                        expected: self.expected,
                        actual,
                    },
                ));
            }
        }
        Ok(n)
    }
}

/// A memory-mapped zip file.
///
/// The central directory is parsed once on open; entry payloads are then
/// sliced straight out of the mapping, so any number of entries can be open
/// at the same time without borrowing the zip reader.
pub struct ZipFileArchive {
    path: PathBuf,
    data: Mmap,
    entries: Vec<Entry>,
    locations: HashMap<String, ZipLocation>,
}

impl ZipFileArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let data = util::mmap_file(path)?;

        let mut entries = Vec::new();
        let mut locations = HashMap::new();
        {
            let mut zip = ZipArchive::new(Cursor::new(&data[..]))
                .with_context(|| format!("Failed to read zip directory: {}", path.display()))?;

            for index in 0..zip.len() {
                let file = zip
                    .by_index_raw(index)
                    .with_context(|| format!("Failed to read zip entry #{index} in {}", path.display()))?;
                if file.is_dir() {
                    continue;
                }
                let name = file.name().to_string();
                if file.encrypted() {
                    return Err(PatchError::Encrypted(name).into());
                }
                locations.insert(
                    name.clone(),
                    ZipLocation {
                        data_start: file.data_start(),
                        compressed_size: file.compressed_size(),
                        size: file.size(),
                        crc32: file.crc32(),
                        method: file.compression(),
                    },
                );
                entries.push(Entry {
                    path: name,
                    size: file.size(),
                });
            }
        }

        log::debug!("Indexed {} entries in {}", entries.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            data,
            entries,
            locations,
        })
    }
}

impl Archive for ZipFileArchive {
    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let location = self
            .locations
            .get(path)
            .ok_or_else(|| anyhow!("Entry {} not found in {}", path, self.path.display()))?;

        let start = usize::try_from(location.data_start)?;
        let end = start
            .checked_add(usize::try_from(location.compressed_size)?)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                anyhow!(
                    "Entry {} extends past the end of {}",
                    path,
                    self.path.display()
                )
            })?;
        let raw = &self.data[start..end];

        let payload: Box<dyn Read + '_> = match location.method {
            CompressionMethod::Stored => Box::new(raw),
            CompressionMethod::Deflated => Box::new(DeflateDecoder::new(raw)),
            other => {
                return Err(PatchError::UnsupportedCompression {
                    path: path.to_string(),
                    method: format!("{other:?}"),
                }
                .into())
            }
        };
        Ok(Box::new(CrcReader {
            inner: payload,
            hasher: crc32fast::Hasher::new(),
            remaining: location.size,
            expected: location.crc32,
            path: path.to_string(),
        }))
    }
}

/// A directory tree read as if it were an archive of its regular files.
pub struct DirArchive {
    root: PathBuf,
    entries: Vec<Entry>,
}

impl DirArchive {
    /// Walk `root` and record every regular file with a forward-slash relative path.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to canonicalize path: {}", root.display()))?;

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to read directory entry in {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&root)
                .with_context(|| "Failed to compute relative path")?;
            let path = relative
                .to_str()
                .with_context(|| format!("Non-UTF8 path: {}", relative.display()))?
                .replace('\\', "/");

            let size = entry
                .metadata()
                .with_context(|| format!("Failed to read metadata: {}", entry.path().display()))?
                .len();

            entries.push(Entry { path, size });
        }

        log::debug!("Indexed {} files under {}", entries.len(), root.display());

        Ok(Self { root, entries })
    }
}

impl Archive for DirArchive {
    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let full = self.root.join(path);
        let file = std::fs::File::open(&full)
            .with_context(|| format!("Failed to open file: {}", full.display()))?;
        Ok(Box::new(file))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &[u8], CompressionMethod)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.add_directory("empty/", SimpleFileOptions::default())
            .unwrap();
        for (name, data, method) in files {
            let options = SimpleFileOptions::default().compression_method(*method);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_all(archive: &dyn Archive, path: &str) -> Vec<u8> {
        let mut out = Vec::new();
        archive.open(path).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_zip_stored_and_deflated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        let text = b"deflate me ".repeat(500);
        write_zip(
            &zip_path,
            &[
                ("raw.bin", &[1, 2, 3, 4], CompressionMethod::Stored),
                ("docs/text.txt", &text, CompressionMethod::Deflated),
            ],
        );

        let archive = ZipFileArchive::open(&zip_path).unwrap();
        let mut paths: Vec<_> = archive.entries().iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["docs/text.txt", "raw.bin"]);

        assert_eq!(read_all(&archive, "raw.bin"), vec![1, 2, 3, 4]);
        assert_eq!(read_all(&archive, "docs/text.txt"), text);

        let text_entry = archive
            .entries()
            .iter()
            .find(|e| e.path == "docs/text.txt")
            .unwrap();
        assert_eq!(text_entry.size, text.len() as u64);
    }

    #[test]
    fn test_zip_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        write_zip(&zip_path, &[("x", b"x", CompressionMethod::Stored)]);
        let archive = ZipFileArchive::open(&zip_path).unwrap();
        assert!(archive.open("nope").is_err());
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(open_archive(&path).is_err());
    }

    #[test]
    fn test_directory_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("top.bin"), b"top").unwrap();
        std::fs::write(dir.path().join("sub/deeper/leaf.bin"), b"leaf!").unwrap();

        let archive = open_archive(dir.path()).unwrap();
        let mut entries = archive.entries().to_vec();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            entries,
            vec![
                Entry {
                    path: "sub/deeper/leaf.bin".into(),
                    size: 5
                },
                Entry {
                    path: "top.bin".into(),
                    size: 3
                },
            ]
        );
        assert_eq!(read_all(archive.as_ref(), "sub/deeper/leaf.bin"), b"leaf!");
    }

    #[test]
    fn test_zip_corrupted_payload_fails_crc() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        write_zip(
            &zip_path,
            &[("x.bin", b"PAYLOADPAYLOAD", CompressionMethod::Stored)],
        );

        let mut bytes = std::fs::read(&zip_path).unwrap();
        let at = bytes
            .windows(14)
            .position(|w| w == b"PAYLOADPAYLOAD")
            .unwrap();
        bytes[at] = b'Q';
        std::fs::write(&zip_path, &bytes).unwrap();

        let archive = ZipFileArchive::open(&zip_path).unwrap();
        let mut out = Vec::new();
        let err = archive
            .open("x.bin")
            .unwrap()
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<PatchError>()),
            Some(PatchError::ChecksumMismatch { path, .. }) if path == "x.bin"
        ));
    }

    #[test]
    fn test_zip_intact_payload_passes_crc() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        let text = b"checksummed ".repeat(300);
        write_zip(&zip_path, &[("t.txt", &text, CompressionMethod::Deflated)]);

        let archive = ZipFileArchive::open(&zip_path).unwrap();
        let mut partial = vec![0u8; 10];
        archive.open("t.txt").unwrap().read_exact(&mut partial).unwrap();
        assert_eq!(read_all(&archive, "t.txt"), text);
    }
}
