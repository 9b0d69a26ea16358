use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::codec::SampleCodec;
use crate::error::{Error, Result};

/// Rebuilds a populated codec from a shard member file.
pub type CodecLoader = fn(&Path) -> Result<Box<dyn SampleCodec>>;

/// Open map from manifest tag to the loader that decodes it.
///
/// `shardstream_codecs::builtin_registry()` returns one pre-filled with the
/// bundled tags; integrators [`register`](CodecRegistry::register) their own
/// codecs on top and every shard containing that tag decodes transparently.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    loaders: HashMap<String, CodecLoader>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tag` to `loader`, replacing any previous binding.
    pub fn register(&mut self, tag: impl Into<String>, loader: CodecLoader) -> &mut Self {
        self.loaders.insert(tag.into(), loader);
        self
    }

    pub fn with(mut self, tag: impl Into<String>, loader: CodecLoader) -> Self {
        self.register(tag, loader);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.loaders.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Decode the member file at `path` with the codec registered for `tag`.
    pub fn load(&self, tag: &str, path: &Path) -> Result<Box<dyn SampleCodec>> {
        let loader = self.loaders.get(tag).ok_or_else(|| Error::unknown_codec(tag))?;
        tracing::debug!(tag, path = %path.display(), "loading codec");
        loader(path)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry").field("tags", &self.tags()).finish()
    }
}
