use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, IoContext, Result};

// ── Shard layout ───────────────────────────────────────────────────────────

/// Manifest written into every shard directory before compression.
pub const MANIFEST_FILE: &str = "ann.json";

/// Extension of a compressed shard.
pub const ARCHIVE_EXT: &str = ".tar.gz";

/// Stem shared by shard directories and archives.
pub const SHARD_STEM: &str = "dataset";

/// `(shardIndex, sampleCount)` as encoded in a local shard archive name:
/// `dataset-<shardIndex>-<sampleCount>.tar.gz`.
///
/// The sample count in the name is what lets a reader map global indices to
/// shards from a directory listing alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardName {
    pub index: u64,
    pub sample_count: u64,
}

impl ShardName {
    pub fn new(index: u64, sample_count: u64) -> Self {
        Self {
            index,
            sample_count,
        }
    }

    /// Directory a shard is assembled in before compression.
    pub fn dir_name(index: u64) -> String {
        format!("{SHARD_STEM}-{index}")
    }

    pub fn file_name(&self) -> String {
        format!("{SHARD_STEM}-{}-{}{ARCHIVE_EXT}", self.index, self.sample_count)
    }

    /// Parse an archive file name; returns `None` for anything else.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ARCHIVE_EXT)?;
        let rest = stem.strip_prefix(SHARD_STEM)?.strip_prefix('-')?;
        let (index, count) = rest.split_once('-')?;
        Some(Self {
            index: index.parse().ok()?,
            sample_count: count.parse().ok()?,
        })
    }
}

/// Join a shard member name onto `dir`.
///
/// Names come from manifests and folder listings inside archives, so
/// anything but a single plain path component is rejected.
pub fn member_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(name)),
        _ => Err(Error::format(dir, format!("invalid member name '{name}'"))),
    }
}

// ── Built-in codec tags ────────────────────────────────────────────────────

pub const TAG_TEXT: &str = "textfile";
pub const TAG_BOOL: &str = "bool";
pub const TAG_FREE_ARRAY: &str = "arr";
pub const TAG_ARRAY: &str = "enforced_arr";
pub const TAG_JSON: &str = "json";
pub const TAG_TENSOR: &str = "ten";
pub const TAG_NUMERIC: &str = "num";
pub const TAG_FOLDER: &str = "folder";

// ── Codec blob files ───────────────────────────────────────────────────────

/// Magic bytes opening every binary codec file.
pub const BLOB_MAGIC: &[u8; 8] = b"SHRDBLB1";

pub const BLOB_VERSION: u16 = 1;

/// Fixed size of the blob header in bytes.
///   magic[8] + version:u16 + kind:u16 + reserved:u32
///   + count:u64 + payload_len:u64 + checksum:u64 + reserved[8]
///   = 8 + 2 + 2 + 4 + 8 + 8 + 8 + 8 = 48
pub const BLOB_HEADER_SIZE: usize = 48;

// Payload kinds. A file whose kind disagrees with the loading codec is corrupt.
pub const BLOB_NUMERIC: u16 = 1;
pub const BLOB_FREE_ARRAY: u16 = 2;
pub const BLOB_STACKED_F64: u16 = 3;
pub const BLOB_STACKED_F32: u16 = 4;

/// Decoded representation of the 48-byte blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub version: u16,
    pub kind: u16,
    /// Number of values encoded in the payload.
    pub count: u64,
    pub payload_len: u64,
    /// xxhash3-64 of the payload bytes as stored.
    pub checksum: u64,
}

impl BlobHeader {
    pub fn to_bytes(&self) -> [u8; BLOB_HEADER_SIZE] {
        let mut buf = [0u8; BLOB_HEADER_SIZE];
        buf[..8].copy_from_slice(BLOB_MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.kind.to_le_bytes());
        // buf[12..16] reserved
        buf[16..24].copy_from_slice(&self.count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[32..40].copy_from_slice(&self.checksum.to_le_bytes());
        // buf[40..48] reserved
        buf
    }

    /// Returns a plain message on failure; callers attach the path.
    pub fn from_bytes(buf: &[u8; BLOB_HEADER_SIZE]) -> std::result::Result<Self, String> {
        if &buf[..8] != BLOB_MAGIC {
            return Err("invalid blob magic bytes".into());
        }
        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(b)
        };
        Ok(Self {
            version: u16_at(8),
            kind: u16_at(10),
            count: u64_at(16),
            payload_len: u64_at(24),
            checksum: u64_at(32),
        })
    }
}

/// Write `payload` behind a checksummed header.
pub fn write_blob(path: &Path, kind: u16, count: u64, payload: &[u8]) -> Result<()> {
    let header = BlobHeader {
        version: BLOB_VERSION,
        kind,
        count,
        payload_len: payload.len() as u64,
        checksum: xxh3_64(payload),
    };
    let file = File::create(path).at(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(&header.to_bytes()).at(path)?;
    out.write_all(payload).at(path)?;
    out.flush().at(path)?;
    Ok(())
}

/// Read a blob written by [`write_blob`], verifying magic, version, kind,
/// length, and checksum.
pub fn read_blob(path: &Path, expected_kind: u16) -> Result<(BlobHeader, Vec<u8>)> {
    let mut file = File::open(path).at(path)?;
    let mut header_buf = [0u8; BLOB_HEADER_SIZE];
    file.read_exact(&mut header_buf)
        .map_err(|_| Error::format(path, "file shorter than blob header"))?;
    let header = BlobHeader::from_bytes(&header_buf).map_err(|m| Error::format(path, m))?;

    if header.version != BLOB_VERSION {
        return Err(Error::format(
            path,
            format!("unsupported blob version {} (expected {BLOB_VERSION})", header.version),
        ));
    }
    if header.kind != expected_kind {
        return Err(Error::format(
            path,
            format!("blob kind mismatch: file has {} but codec expects {expected_kind}", header.kind),
        ));
    }

    let stored = file
        .metadata()
        .at(path)?
        .len()
        .saturating_sub(BLOB_HEADER_SIZE as u64);
    if stored != header.payload_len {
        return Err(Error::format(
            path,
            format!("payload is {stored} bytes but header says {}", header.payload_len),
        ));
    }
    let mut payload = Vec::new();
    file.read_to_end(&mut payload).at(path)?;
    if payload.len() as u64 != header.payload_len {
        return Err(Error::format(path, "payload changed while reading"));
    }
    let computed = xxh3_64(&payload);
    if computed != header.checksum {
        return Err(Error::format(
            path,
            format!("checksum mismatch: expected {:016x}, got {computed:016x}", header.checksum),
        ));
    }
    Ok((header, payload))
}
