use std::path::Path;

use rand::seq::SliceRandom;

use crate::codec::SampleCodec;
use crate::error::Result;
use crate::manifest::{Manifest, ManifestEntry};

/// User-implemented source of samples.
///
/// A producer owns its codecs. For every index the writer asks for, it calls
/// `append` on each codec with that sample's projection; the writer never
/// looks at sample contents, it only drives [`produce`](SampleProducer::produce)
/// and drains the codecs at shard boundaries.
///
/// ```ignore
/// struct Labels { text: TextCodec, label: BoolCodec }
///
/// impl SampleProducer for Labels {
///     fn len(&self) -> usize { 1_000 }
///     fn produce(&mut self, index: usize) -> Result<()> {
///         self.text.append(format!("sample {index}").into())?;
///         self.label.append((index % 2 == 0).into())
///     }
///     fn codecs_mut(&mut self) -> Vec<&mut dyn SampleCodec> {
///         vec![&mut self.text, &mut self.label]
///     }
/// }
/// ```
pub trait SampleProducer {
    /// Total sample count, fixed for the whole pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append sample `index` to the codecs.
    fn produce(&mut self, index: usize) -> Result<()>;

    /// The codecs in declaration order. This order becomes the manifest order
    /// and therefore the decoded tuple order; it must not change between calls.
    fn codecs_mut(&mut self) -> Vec<&mut dyn SampleCodec>;

    /// Order in which a pass visits indices: a fresh random permutation of
    /// `0..len()` so consecutive shards mix the source order.
    fn visit_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut rand::rng());
        order
    }

    /// Point every codec at the shard directory `prefix`.
    fn prepare(&mut self, prefix: &Path) -> Result<()> {
        for codec in self.codecs_mut() {
            codec.set_prefix(prefix)?;
        }
        Ok(())
    }

    /// Save every codec, returning the manifest in declaration order.
    fn save_codecs(&mut self) -> Result<Manifest> {
        let mut entries = Vec::new();
        for codec in self.codecs_mut() {
            let (file_name, tag) = codec.save()?;
            entries.push(ManifestEntry { file_name, tag });
        }
        Ok(Manifest::new(entries))
    }

    /// Reset every codec for the next shard. The instances are reused.
    fn reset_codecs(&mut self) {
        for codec in self.codecs_mut() {
            codec.reset();
        }
    }
}
