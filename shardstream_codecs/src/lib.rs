mod array;
mod blob;
mod folder;
mod json;
mod numeric;
mod text;

pub use array::{ArrayCodec, Element, FreeArrayCodec, StackedCodec, TensorCodec};
pub use folder::FolderCodec;
pub use json::JsonCodec;
pub use numeric::NumericCodec;
pub use text::{BoolCodec, TextCodec};

use shardstream_core::format::{
    TAG_ARRAY, TAG_BOOL, TAG_FOLDER, TAG_FREE_ARRAY, TAG_JSON, TAG_NUMERIC, TAG_TENSOR, TAG_TEXT,
};
use shardstream_core::CodecRegistry;

/// Registry with every bundled codec bound to its tag.
///
/// Used by the reader and the CLI to decode existing shards; extend it with
/// [`CodecRegistry::register`] for custom codecs.
pub fn builtin_registry() -> CodecRegistry {
    CodecRegistry::new()
        .with(TAG_TEXT, TextCodec::load)
        .with(TAG_BOOL, BoolCodec::load)
        .with(TAG_FREE_ARRAY, FreeArrayCodec::load)
        .with(TAG_ARRAY, ArrayCodec::load)
        .with(TAG_JSON, JsonCodec::load)
        .with(TAG_TENSOR, TensorCodec::load)
        .with(TAG_NUMERIC, NumericCodec::load)
        .with(TAG_FOLDER, FolderCodec::load)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_every_bundled_tag() {
        let registry = builtin_registry();
        assert_eq!(
            registry.tags(),
            vec!["arr", "bool", "enforced_arr", "folder", "json", "num", "ten", "textfile"]
        );
    }
}
