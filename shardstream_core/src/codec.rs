use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Result;
use crate::value::Value;

/// Name and destination bookkeeping shared by every codec.
///
/// The file name is `bench-<uuid>` plus a codec-specific suffix and is
/// regenerated on every [`reset`](CodecFile::reset), so two shards never
/// share member names even though the same codec instance wrote both.
#[derive(Debug, Clone)]
pub struct CodecFile {
    suffix: &'static str,
    file_name: String,
    prefix: PathBuf,
}

impl CodecFile {
    pub fn new(suffix: &'static str) -> Self {
        Self {
            suffix,
            file_name: Self::generate(suffix),
            prefix: PathBuf::new(),
        }
    }

    fn generate(suffix: &str) -> String {
        format!("bench-{}{}", Uuid::new_v4(), suffix)
    }

    pub fn reset(&mut self) {
        self.file_name = Self::generate(self.suffix);
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn set_prefix(&mut self, prefix: &Path) {
        self.prefix = prefix.to_path_buf();
    }

    /// `prefix/file_name`
    pub fn save_path(&self) -> PathBuf {
        self.prefix.join(&self.file_name)
    }
}

/// Typed encoder/decoder for one field of a sample.
///
/// A codec is used in two modes:
/// - **encode**: the writer points it at a shard directory with
///   [`set_prefix`](SampleCodec::set_prefix), the producer calls
///   [`append`](SampleCodec::append) once per sample, the writer calls
///   [`save`](SampleCodec::save) (possibly several times per shard, each
///   call rewrites the same file) and [`reset`](SampleCodec::reset) between
///   shards.
/// - **decode**: a [`CodecRegistry`](crate::CodecRegistry) loader rebuilds the
///   codec from its saved file and the reader calls [`get`](SampleCodec::get).
///
/// Invariant: after `save()`, loading the written file and calling `get(i)`
/// returns exactly the `i`-th appended value.
pub trait SampleCodec: Send {
    /// Tag stored in the shard manifest and used for decode dispatch.
    fn tag(&self) -> &str;

    /// Current output file (or directory) name inside the prefix.
    fn file_name(&self) -> &str;

    /// Point the codec at the directory of the shard being written.
    fn set_prefix(&mut self, prefix: &Path) -> Result<()>;

    /// Validate and buffer one value. On error the buffer is unchanged.
    fn append(&mut self, value: Value) -> Result<()>;

    /// Flush the buffered values to `prefix/file_name`; returns `(file_name, tag)`.
    fn save(&mut self) -> Result<(String, String)>;

    /// Drop buffered values and pick a fresh file name for the next shard.
    fn reset(&mut self);

    /// Number of buffered or loaded values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the `index`-th value.
    fn get(&self, index: usize) -> Result<Value>;
}
