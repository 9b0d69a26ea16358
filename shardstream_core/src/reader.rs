use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::archive;
use crate::catalog::{Catalog, ChunkDescriptor};
use crate::codec::SampleCodec;
use crate::config::ReaderConfig;
use crate::error::{Error, IoContext, Result};
use crate::format::{member_path, ShardName, ARCHIVE_EXT};
use crate::manifest::Manifest;
use crate::partition::WorkerPartition;
use crate::registry::CodecRegistry;
use crate::value::Sample;

/// Where a shard archive lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardLocation {
    /// Archive in a local dataset directory, extracted in place.
    Local(PathBuf),
    /// Chunk in remote storage, downloaded through a presigned URL.
    Remote(ChunkDescriptor),
}

/// One entry of the ordered shard list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRef {
    /// Shard index (local) or order number (remote).
    pub number: u64,
    pub sample_count: u64,
    pub location: ShardLocation,
}

impl ShardRef {
    /// Archive file name, used to name the download and extraction dirs.
    pub fn file_name(&self) -> String {
        let from_path = match &self.location {
            ShardLocation::Local(path) => path.file_name(),
            ShardLocation::Remote(chunk) => Path::new(&chunk.location).file_name(),
        };
        from_path
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("chunk-{}{ARCHIVE_EXT}", self.number))
    }
}

/// Scan `dir` for `dataset-<i>-<n>.tar.gz` archives, ordered by shard index.
pub fn list_local_shards(dir: &Path) -> Result<Vec<ShardRef>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(ShardName::parse) else {
            continue;
        };
        shards.push(ShardRef {
            number: name.index,
            sample_count: name.sample_count,
            location: ShardLocation::Local(entry.path()),
        });
    }
    shards.sort_by_key(|s| s.number);
    Ok(shards)
}

/// Decodes samples from an ordered list of shards.
///
/// The reader resolves the shard list once, when opened. Each call to
/// [`stream`](ShardReader::stream) starts an independent read pass over one
/// worker's partition; passes share nothing, so each worker process opens its
/// own reader and streams its own range.
pub struct ShardReader {
    shards: Vec<ShardRef>,
    catalog: Option<Arc<dyn Catalog>>,
    registry: CodecRegistry,
    config: ReaderConfig,
}

impl ShardReader {
    /// Read the shards of a local dataset directory.
    pub fn open_local(dir: impl AsRef<Path>, registry: CodecRegistry, config: ReaderConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let shards = list_local_shards(dir)?;
        tracing::debug!(dir = %dir.display(), shards = shards.len(), "resolved local shards");
        Ok(Self {
            shards,
            catalog: None,
            registry,
            config,
        })
    }

    /// Read the chunks of a remote dataset, ordered by their order number.
    pub fn open_remote(
        catalog: Arc<dyn Catalog>,
        dataset_id: &str,
        registry: CodecRegistry,
        config: ReaderConfig,
    ) -> Result<Self> {
        let shards = catalog
            .all_chunks(dataset_id)?
            .into_iter()
            .map(|chunk| ShardRef {
                number: chunk.number,
                sample_count: chunk.file_count,
                location: ShardLocation::Remote(chunk),
            })
            .collect::<Vec<_>>();
        tracing::debug!(dataset_id, shards = shards.len(), "resolved remote chunks");
        Ok(Self {
            shards,
            catalog: Some(catalog),
            registry,
            config,
        })
    }

    pub fn shards(&self) -> &[ShardRef] {
        &self.shards
    }

    /// Total number of samples across all shards.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.sample_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map a global index to `(position in shard list, offset within shard)`.
    pub fn locate(&self, index: u64) -> Option<(usize, u64)> {
        let mut before = 0u64;
        for (pos, shard) in self.shards.iter().enumerate() {
            let cumulative = before + shard.sample_count;
            if cumulative > index {
                return Some((pos, index - before));
            }
            before = cumulative;
        }
        None
    }

    /// Stream every sample with a single worker.
    pub fn iter(&self) -> Result<ShardStream> {
        self.stream(WorkerPartition::whole(0..self.len()))
    }

    /// Stream worker `worker_id`'s share of the whole dataset.
    pub fn stream_worker(&self, worker_id: usize, num_workers: usize) -> Result<ShardStream> {
        self.stream(WorkerPartition::compute(0..self.len(), worker_id, num_workers)?)
    }

    /// Stream the samples in `partition`, in increasing global index order.
    pub fn stream(&self, partition: WorkerPartition) -> Result<ShardStream> {
        let len = self.len();
        if partition.end > len {
            return Err(Error::config(format!(
                "requested range {}..{} exceeds dataset length {len}",
                partition.start, partition.end
            )));
        }
        fs::create_dir_all(&self.config.scratch_dir).at(&self.config.scratch_dir)?;
        tracing::debug!(
            worker = partition.worker_id,
            workers = partition.num_workers,
            start = partition.start,
            end = partition.end,
            "starting read pass"
        );
        Ok(ShardStream {
            pending: self.shards.iter().cloned().collect(),
            catalog: self.catalog.clone(),
            registry: self.registry.clone(),
            scratch_dir: self.config.scratch_dir.clone(),
            first: partition.start,
            start: partition.start,
            end: partition.end,
            current_count: 0,
            previous_count: 0,
            current: None,
            finished: false,
        })
    }
}

/// An extracted shard with its codecs loaded.
struct HydratedShard {
    number: u64,
    dir: TempDir,
    codecs: Vec<Box<dyn SampleCodec>>,
}

impl HydratedShard {
    fn close(self) {
        let path = self.dir.path().to_path_buf();
        drop(self.codecs);
        if let Err(e) = self.dir.close() {
            tracing::warn!(shard = self.number, dir = %path.display(), error = %e, "failed to remove shard scratch dir");
        }
    }
}

/// One worker's read pass.
///
/// Holds at most one extracted shard at a time: when the cursor crosses into
/// the next shard, that shard is fetched and the previous one's scratch
/// directory is deleted. Download and extraction block the caller.
pub struct ShardStream {
    pending: VecDeque<ShardRef>,
    catalog: Option<Arc<dyn Catalog>>,
    registry: CodecRegistry,
    scratch_dir: PathBuf,
    first: u64,
    start: u64,
    end: u64,
    /// Cumulative sample count of every shard popped so far.
    current_count: u64,
    /// Cumulative count before the current shard.
    previous_count: u64,
    current: Option<HydratedShard>,
    finished: bool,
}

impl ShardStream {
    /// Next global index to be yielded.
    pub fn position(&self) -> u64 {
        self.start
    }

    /// Fraction of this pass already yielded, between 0.0 and 1.0.
    pub fn progress(&self) -> f64 {
        let total = self.end - self.first;
        if total == 0 {
            return 1.0;
        }
        ((self.start - self.first) as f64 / total as f64).min(1.0)
    }

    /// Decode the next sample, or `None` once the range is exhausted.
    ///
    /// Paths inside a decoded sample point into the shard's scratch directory
    /// and stay valid until the call that moves past that shard.
    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        if self.start >= self.end {
            self.release();
            return Ok(None);
        }

        while self.current_count <= self.start {
            let shard = self.pending.pop_front().ok_or_else(|| {
                Error::format(
                    &self.scratch_dir,
                    format!("shard list exhausted before global index {}", self.start),
                )
            })?;
            self.previous_count = self.current_count;
            self.current_count += shard.sample_count;

            if self.current_count > self.start {
                let hydrated = self.hydrate(&shard)?;
                if let Some(previous) = self.current.replace(hydrated) {
                    previous.close();
                }
            }
        }

        let offset = (self.start - self.previous_count) as usize;
        let shard = self
            .current
            .as_ref()
            .ok_or_else(|| Error::format(&self.scratch_dir, "no shard hydrated for current index"))?;
        let values = shard
            .codecs
            .iter()
            .map(|codec| codec.get(offset))
            .collect::<Result<Vec<_>>>()?;

        self.start += 1;
        Ok(Some(Sample::from_values(values)))
    }

    fn release(&mut self) {
        if let Some(shard) = self.current.take() {
            shard.close();
        }
    }

    /// Fetch, extract, and load one shard into a fresh scratch directory.
    fn hydrate(&self, shard: &ShardRef) -> Result<HydratedShard> {
        let dir = tempfile::Builder::new()
            .prefix("shard-")
            .tempdir_in(&self.scratch_dir)
            .at(&self.scratch_dir)?;
        let stem = ShardName::dir_name(shard.number);

        let archive_path = match &shard.location {
            ShardLocation::Local(path) => path.clone(),
            ShardLocation::Remote(chunk) => {
                let catalog = self.catalog.as_ref().ok_or_else(|| {
                    Error::config(format!("chunk {} is remote but no catalog is configured", chunk.id))
                })?;
                let download = dir.path().join(format!("{stem}{ARCHIVE_EXT}"));
                catalog.download_chunk(chunk, &download)?;
                download
            }
        };

        let extracted = dir.path().join(&stem);
        archive::extract(&archive_path, &extracted)?;
        if matches!(shard.location, ShardLocation::Remote(_)) {
            fs::remove_file(&archive_path).at(&archive_path)?;
        }

        let manifest = Manifest::read(&extracted)?;
        let mut codecs = Vec::with_capacity(manifest.len());
        for entry in &manifest.entries {
            let member = member_path(&extracted, &entry.file_name)?;
            let codec = self.registry.load(&entry.tag, &member)?;
            if codec.len() as u64 != shard.sample_count {
                return Err(Error::format(
                    member,
                    format!(
                        "codec '{}' holds {} values but shard declares {} samples",
                        entry.tag,
                        codec.len(),
                        shard.sample_count
                    ),
                ));
            }
            codecs.push(codec);
        }

        tracing::info!(shard = shard.number, samples = shard.sample_count, codecs = codecs.len(), "hydrated shard");
        Ok(HydratedShard {
            number: shard.number,
            dir,
            codecs,
        })
    }
}

impl Iterator for ShardStream {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                self.release();
                Some(Err(e))
            }
        }
    }
}
