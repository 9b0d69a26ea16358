use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoContext, Result};
use crate::format::{member_path, MANIFEST_FILE};

/// One `[file_name, tag]` pair of a shard manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ManifestEntry {
    pub file_name: String,
    pub tag: String,
}

impl From<(String, String)> for ManifestEntry {
    fn from((file_name, tag): (String, String)) -> Self {
        Self { file_name, tag }
    }
}

impl From<ManifestEntry> for (String, String) {
    fn from(e: ManifestEntry) -> Self {
        (e.file_name, e.tag)
    }
}

/// Ordered codec list of one shard, stored as `ann.json`.
///
/// The order is the producer's declared codec order and is the only record of
/// a sample's tuple shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `ann.json` into `shard_dir`.
    pub fn write(&self, shard_dir: &Path) -> Result<()> {
        let path = shard_dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec(self)?;
        fs::write(&path, json).at(&path)
    }

    /// Read `ann.json` from an extracted shard directory.
    pub fn read(shard_dir: &Path) -> Result<Self> {
        let path = shard_dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::format(shard_dir, "shard has no manifest"));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::format(&path, format!("corrupt manifest: {e}")))?;
        if manifest.is_empty() {
            return Err(Error::format(&path, "manifest lists no codecs"));
        }
        for entry in &manifest.entries {
            member_path(shard_dir, &entry.file_name)?;
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_array_of_pairs() {
        let m = Manifest::new(vec![
            ("a.txt".to_string(), "textfile".to_string()).into(),
            ("b.bin".to_string(), "num".to_string()).into(),
        ]);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"[["a.txt","textfile"],["b.bin","num"]]"#);
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn missing_manifest_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::read(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn corrupt_manifest_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{not json").unwrap();
        let err = Manifest::read(dir.path()).err().unwrap();
        assert!(err.to_string().contains("corrupt manifest"), "got: {err}");
    }

    #[test]
    fn entries_escaping_the_shard_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), br#"[["../../outside.bin","num"]]"#).unwrap();
        let err = Manifest::read(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Format { .. }), "got: {err}");
    }
}
