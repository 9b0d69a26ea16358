use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use shardstream_core::format::TAG_FOLDER;
use shardstream_core::{
    member_path, CodecFile, Error, IoContext, Result, SampleCodec, Value, MANIFEST_FILE,
};

/// Raw files copied into a per-shard subdirectory.
///
/// The subdirectory carries its own `ann.json`: a JSON list of the copied
/// file names in append order. Decoding yields the extracted paths.
pub struct FolderCodec {
    file: CodecFile,
    prepared: bool,
    /// Destination paths on encode, extracted paths on decode.
    files: Vec<PathBuf>,
    names: HashSet<String>,
}

impl Default for FolderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new(""),
            prepared: false,
            files: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let listing = dir.join(MANIFEST_FILE);
        let file = File::open(&listing).at(&listing)?;
        let names: Vec<String> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::format(&listing, format!("invalid folder listing: {e}")))?;

        let mut codec = Self::new();
        for name in names {
            let path = member_path(dir, &name)?;
            if name == MANIFEST_FILE || !path.is_file() {
                return Err(Error::format(&path, "listed file missing from folder"));
            }
            codec.files.push(path);
            codec.names.insert(name);
        }
        tracing::debug!(path = %dir.display(), files = codec.files.len(), "loaded folder codec");
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }
}

impl SampleCodec for FolderCodec {
    fn tag(&self) -> &str {
        TAG_FOLDER
    }

    fn file_name(&self) -> &str {
        self.file.file_name()
    }

    fn set_prefix(&mut self, prefix: &Path) -> Result<()> {
        self.file.set_prefix(prefix);
        let dir = self.file.save_path();
        fs::create_dir_all(&dir).at(&dir)?;
        self.prepared = true;
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<()> {
        let Value::Path(source) = value else {
            return Err(Error::validation(
                TAG_FOLDER,
                format!("expected path, got {}", value.kind()),
            ));
        };
        if !self.prepared {
            return Err(Error::validation(TAG_FOLDER, "append before set_prefix"));
        }
        if !source.is_file() {
            return Err(Error::validation(
                TAG_FOLDER,
                format!("'{}' is not a regular file", source.display()),
            ));
        }
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::validation(TAG_FOLDER, "file name is not valid UTF-8"))?
            .to_owned();
        if name == MANIFEST_FILE {
            return Err(Error::validation(
                TAG_FOLDER,
                format!("'{MANIFEST_FILE}' is reserved for the folder listing"),
            ));
        }
        if self.names.contains(&name) {
            return Err(Error::validation(
                TAG_FOLDER,
                format!("duplicate file name '{name}' in one shard"),
            ));
        }

        let dest = self.file.save_path().join(&name);
        fs::copy(&source, &dest).at(&dest)?;
        self.files.push(dest);
        self.names.insert(name);
        Ok(())
    }

    fn save(&mut self) -> Result<(String, String)> {
        let names: Vec<&str> = self
            .files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        let listing = self.file.save_path().join(MANIFEST_FILE);
        let file = File::create(&listing).at(&listing)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer(&mut out, &names)?;
        out.flush().at(&listing)?;
        Ok((self.file.file_name().to_owned(), TAG_FOLDER.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.prepared = false;
        self.files.clear();
        self.names.clear();
    }

    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.files
            .get(index)
            .map(|p| Value::Path(p.clone()))
            .ok_or_else(|| {
                Error::validation(
                    TAG_FOLDER,
                    format!("index {index} out of range for {} values", self.files.len()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn copies_files_and_lists_them_in_order() {
        let src = tempfile::tempdir().unwrap();
        let shard = tempfile::tempdir().unwrap();
        let a = source_file(src.path(), "a.png", b"\x89PNG");
        let b = source_file(src.path(), "b.wav", b"RIFF");

        let mut codec = FolderCodec::new();
        codec.set_prefix(shard.path()).unwrap();
        assert!(shard.path().join(codec.file_name()).is_dir());
        codec.append(Value::Path(b)).unwrap();
        codec.append(Value::Path(a)).unwrap();
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "folder");

        let loaded = FolderCodec::open(&shard.path().join(name)).unwrap();
        assert_eq!(loaded.len(), 2);
        let first = loaded.get(0).unwrap();
        let first = first.as_path().unwrap();
        assert_eq!(first.file_name().unwrap(), "b.wav");
        assert_eq!(fs::read(first).unwrap(), b"RIFF");
        assert_eq!(
            fs::read(loaded.get(1).unwrap().as_path().unwrap()).unwrap(),
            b"\x89PNG"
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let src = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let shard = tempfile::tempdir().unwrap();
        let a = source_file(src.path(), "x.txt", b"1");
        let b = source_file(other.path(), "x.txt", b"2");

        let mut codec = FolderCodec::new();
        codec.set_prefix(shard.path()).unwrap();
        codec.append(Value::Path(a)).unwrap();
        let err = codec.append(Value::Path(b)).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
        assert_eq!(codec.len(), 1);
    }

    #[test]
    fn reset_moves_to_a_fresh_subdirectory() {
        let src = tempfile::tempdir().unwrap();
        let shard = tempfile::tempdir().unwrap();
        let a = source_file(src.path(), "x.txt", b"1");

        let mut codec = FolderCodec::new();
        codec.set_prefix(shard.path()).unwrap();
        codec.append(Value::Path(a.clone())).unwrap();
        let first = codec.file_name().to_owned();
        codec.reset();
        assert!(codec.append(Value::Path(a.clone())).is_err());

        codec.set_prefix(shard.path()).unwrap();
        assert_ne!(codec.file_name(), first);
        codec.append(Value::Path(a)).unwrap();
        assert_eq!(codec.len(), 1);
    }

    #[test]
    fn listing_cannot_point_outside_the_folder() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("bench-x");
        fs::create_dir_all(&folder).unwrap();
        source_file(root.path(), "secret.txt", b"s");
        for listing in [r#"["../secret.txt"]"#, r#"["/etc/passwd"]"#, r#"["ann.json"]"#] {
            fs::write(folder.join(MANIFEST_FILE), listing).unwrap();
            let err = FolderCodec::open(&folder).err().unwrap();
            assert!(matches!(err, Error::Format { .. }), "{listing}: {err}");
        }
    }

    #[test]
    fn missing_sources_and_wrong_kinds_fail() {
        let shard = tempfile::tempdir().unwrap();
        let mut codec = FolderCodec::new();
        codec.set_prefix(shard.path()).unwrap();
        assert!(codec.append(Value::Path(shard.path().join("nope"))).is_err());
        assert!(codec.append(Value::from("x.txt")).is_err());
        assert!(codec.is_empty());
    }
}
