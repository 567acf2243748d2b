use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;

use crate::config::ReaderConfig;
use crate::error::{Error, Result};

/// A compressed-file suffix recognized on read, per §6's framing: `.gz`,
/// `.bz2`, `.xz`, `.zip`. The core never implements these codecs itself —
/// it only recognizes the suffix and hands the compressed bytes to
/// whatever [`Decoder`] the caller registered on [`ReaderConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFormat {
    Gzip,
    Bzip2,
    Xz,
    Zip,
}

impl CompressionFormat {
    /// Detects a compression format from a path's extension. `None` for an
    /// uncompressed path or one without a recognized suffix.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "gz" => Some(CompressionFormat::Gzip),
            "bz2" => Some(CompressionFormat::Bzip2),
            "xz" => Some(CompressionFormat::Xz),
            "zip" => Some(CompressionFormat::Zip),
            _ => None,
        }
    }
}

/// A caller-supplied streaming decoder for one [`CompressionFormat`].
/// Compression libraries are an external collaborator this crate consumes
/// as byte streams, never a dependency of the core itself (SPEC §0,
/// "out of scope").
pub trait Decoder: Send + Sync {
    fn decode(&self, compressed: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Opens `path` as a [`ByteSource`], recognizing a compressed suffix and
/// routing it through the matching registered [`Decoder`] if one exists.
/// An uncompressed path is memory-mapped directly; a recognized compressed
/// suffix with no registered decoder is an [`Error::codec`] error rather
/// than a silent pass-through, since mapping compressed bytes as if they
/// were the decoded content would corrupt every downstream read.
pub(crate) fn open_source(path: &Path, config: &ReaderConfig) -> Result<ByteSource> {
    match CompressionFormat::from_path(path) {
        None => ByteSource::mmap_file(path),
        Some(format) => {
            let decoder = config.decoder_for(format).ok_or_else(|| {
                Error::codec(format!(
                    "no decoder registered for {:?}-compressed input; call ReaderConfig::decoder to register one",
                    format
                ))
            })?;

            let compressed = std::fs::read(path)?;
            let decoded = decoder
                .decode(&compressed)
                .map_err(|err| Error::codec(format!("decoding {:?} input: {}", format, err)))?;

            Ok(ByteSource::from_bytes(decoded))
        }
    }
}

/// A contiguous, immutable byte region the indexer scans once and every
/// column reads from lazily afterwards.
///
/// Backed by a memory mapping when the input is a seekable, uncompressed
/// file, or by a fully materialized buffer when it isn't (an in-memory
/// blob, a pipe, or the output of a decompressor). Both variants expose
/// the same slice-based interface so the indexer and column store never
/// need to know which one they're holding.
pub enum ByteSource {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ByteSource {
    /// Memory-maps `path`. The mapping is read-only; the file must outlive
    /// nothing beyond this call, since the OS owns the backing pages.
    pub fn mmap_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and not observed to mutate
        // concurrently with this process's own access.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ByteSource::Mapped(mmap))
    }

    /// Reads all of `reader` into memory. Used for non-seekable sources
    /// (pipes, decompressor output) where mmap isn't an option.
    pub fn read_all(mut reader: impl Read) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(ByteSource::Owned(buf))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ByteSource::Owned(bytes)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Mapped(mmap) => mmap,
            ByteSource::Owned(buf) => buf,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn slice(&self, lo: usize, hi: usize) -> &[u8] {
        &self.as_slice()[lo..hi]
    }

    pub fn starts_with(&self, offset: usize, needle: &[u8]) -> bool {
        let slice = self.as_slice();
        offset + needle.len() <= slice.len() && &slice[offset..offset + needle.len()] == needle
    }

    /// Whether this source is backed by a memory mapping, which the indexer
    /// uses to decide whether parallel chunked scanning is worthwhile.
    pub fn is_mapped(&self) -> bool {
        matches!(self, ByteSource::Mapped(_))
    }

    /// Advisory hint for the page cache. A no-op on platforms without
    /// `madvise`, and harmless to call on an owned buffer.
    #[cfg(unix)]
    pub fn advise_sequential(&self) {
        if let ByteSource::Mapped(mmap) = self {
            let _ = mmap.advise(memmap2::Advice::Sequential);
        }
    }

    #[cfg(unix)]
    pub fn advise_random(&self) {
        if let ByteSource::Mapped(mmap) = self {
            let _ = mmap.advise(memmap2::Advice::Random);
        }
    }

    #[cfg(not(unix))]
    pub fn advise_sequential(&self) {}

    #[cfg(not(unix))]
    pub fn advise_random(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_owned_slice() {
        let source = ByteSource::from_bytes(b"a,b,c\n1,2,3\n".to_vec());
        assert_eq!(source.len(), 12);
        assert_eq!(source.slice(0, 5), b"a,b,c");
        assert!(source.starts_with(0, b"a,b"));
        assert!(!source.is_mapped());
    }

    #[test]
    fn test_read_all() {
        let source = ByteSource::read_all(Cursor::new(b"hello".to_vec())).unwrap();
        assert_eq!(source.as_slice(), b"hello");
    }

    #[test]
    fn test_compression_format_from_suffix() {
        assert_eq!(
            CompressionFormat::from_path(Path::new("data.csv.gz")),
            Some(CompressionFormat::Gzip)
        );
        assert_eq!(
            CompressionFormat::from_path(Path::new("data.csv.xz")),
            Some(CompressionFormat::Xz)
        );
        assert_eq!(CompressionFormat::from_path(Path::new("data.csv")), None);
    }

    #[test]
    fn test_open_source_without_registered_decoder_errors() {
        let mut path = std::env::temp_dir();
        path.push(format!("lazytab_bytesource_test_{}.csv.gz", std::process::id()));
        std::fs::write(&path, b"not really gzip").unwrap();

        let config = crate::config::ReaderConfig::new();
        let result = open_source(&path, &config);
        assert!(result.is_err());

        std::fs::remove_file(&path).ok();
    }
}
