use std::fs;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::config::WriterConfig;
use crate::error::{Error, IoContext, Result};
use crate::format::ShardName;
use crate::producer::SampleProducer;

/// One closed shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub index: u64,
    pub sample_count: u64,
    /// Size of the compressed archive.
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Result of a full write pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub sample_count: u64,
    pub shards: Vec<ShardInfo>,
}

impl WriteSummary {
    /// Total compressed bytes across all shards.
    pub fn total_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.size_bytes).sum()
    }
}

/// Turns a [`SampleProducer`] into a directory of size-bounded shards.
///
/// # Write pass
/// ```text
/// root/dataset-0/            ← codecs write here
///   every `check_interval` samples: save codecs, measure dir bytes + files
///   over a limit → ann.json, compress, delete dir
/// root/dataset-0-<n0>.tar.gz
/// root/dataset-1/            ← same codec instances, reset
/// ...
/// root/dataset-<k>-<nk>.tar.gz   ← final shard, always closed
/// ```
///
/// Measuring the real directory (instead of estimating from buffered values)
/// accounts for each codec's file format overhead. A shard can overshoot the
/// limits by up to `check_interval` samples.
///
/// A failed pass leaves `root` partially populated; nothing is cleaned up.
pub struct ShardWriter {
    root: PathBuf,
    config: WriterConfig,
}

impl ShardWriter {
    /// Create the dataset root. Fails if `root` already exists.
    pub fn create(root: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            return Err(Error::destination_conflict(root));
        }
        fs::create_dir_all(&root).at(&root)?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drive `producer` to exhaustion, rolling over shards as they fill up.
    ///
    /// Any codec error aborts the pass.
    pub fn write<P: SampleProducer + ?Sized>(self, producer: &mut P) -> Result<WriteSummary> {
        let order = producer.visit_order();
        let total = order.len();
        tracing::info!(root = %self.root.display(), samples = total, "starting write pass");

        let mut shards = Vec::new();
        let mut shard_index = 0u64;
        let mut in_shard = 0u64;
        let mut shard_dir = self.open_shard(producer, shard_index)?;

        for (pos, index) in order.into_iter().enumerate() {
            producer.produce(index)?;
            in_shard += 1;

            let remaining = total - pos - 1;
            if in_shard % self.config.check_interval != 0 || remaining == 0 {
                continue;
            }

            producer.save_codecs()?;
            let (bytes, files) = archive::dir_usage(&shard_dir)?;
            tracing::debug!(shard = shard_index, samples = in_shard, bytes, files, "measured shard");

            if bytes > self.config.max_shard_bytes || files > self.config.max_shard_files {
                shards.push(self.close_shard(producer, &shard_dir, shard_index, in_shard)?);
                shard_index += 1;
                in_shard = 0;
                producer.reset_codecs();
                shard_dir = self.open_shard(producer, shard_index)?;
            }
        }

        shards.push(self.close_shard(producer, &shard_dir, shard_index, in_shard)?);

        let summary = WriteSummary {
            sample_count: total as u64,
            shards,
        };
        tracing::info!(
            samples = summary.sample_count,
            shards = summary.shards.len(),
            bytes = summary.total_bytes(),
            "write pass complete"
        );
        Ok(summary)
    }

    fn open_shard<P: SampleProducer + ?Sized>(&self, producer: &mut P, index: u64) -> Result<PathBuf> {
        let dir = self.root.join(ShardName::dir_name(index));
        fs::create_dir(&dir).at(&dir)?;
        producer.prepare(&dir)?;
        Ok(dir)
    }

    fn close_shard<P: SampleProducer + ?Sized>(
        &self,
        producer: &mut P,
        dir: &Path,
        index: u64,
        sample_count: u64,
    ) -> Result<ShardInfo> {
        let manifest = producer.save_codecs()?;
        manifest.write(dir)?;

        let path = self.root.join(ShardName::new(index, sample_count).file_name());
        let size_bytes = archive::compress_dir(dir, &path)?;
        tracing::info!(shard = index, samples = sample_count, bytes = size_bytes, "closed shard");

        Ok(ShardInfo {
            index,
            sample_count,
            size_bytes,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SampleCodec;

    struct Empty;

    impl SampleProducer for Empty {
        fn len(&self) -> usize {
            0
        }
        fn produce(&mut self, _index: usize) -> Result<()> {
            Ok(())
        }
        fn codecs_mut(&mut self) -> Vec<&mut dyn SampleCodec> {
            Vec::new()
        }
    }

    #[test]
    fn existing_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShardWriter::create(dir.path(), WriterConfig::default()).err().unwrap();
        assert!(matches!(err, Error::DestinationConflict { .. }));
    }

    #[test]
    fn invalid_config_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ds");
        let config = WriterConfig {
            check_interval: 0,
            ..WriterConfig::default()
        };
        assert!(ShardWriter::create(&root, config).is_err());
        assert!(!root.exists());
    }

    #[test]
    fn empty_producer_still_closes_one_shard() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ds");
        let summary = ShardWriter::create(&root, WriterConfig::default())
            .unwrap()
            .write(&mut Empty)
            .unwrap();
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.shards.len(), 1);
        assert!(root.join("dataset-0-0.tar.gz").is_file());
        assert!(!root.join("dataset-0").exists());
    }
}
