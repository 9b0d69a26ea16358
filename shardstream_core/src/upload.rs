use std::fs;
use std::path::Path;

use crate::catalog::{Catalog, DatasetDescriptor};
use crate::error::{Error, IoContext, Result};
use crate::reader::{list_local_shards, ShardLocation};

/// Outcome of an upload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    /// Shards the catalog already had from an earlier, interrupted pass.
    pub skipped: usize,
    pub bytes: u64,
}

/// Sample count and compressed size of a local dataset directory.
pub fn local_dataset_stats(dir: &Path) -> Result<(u64, u64)> {
    let mut samples = 0u64;
    let mut bytes = 0u64;
    for shard in list_local_shards(dir)? {
        samples += shard.sample_count;
        if let ShardLocation::Local(path) = &shard.location {
            bytes += fs::metadata(path).at(path)?.len();
        }
    }
    Ok((samples, bytes))
}

/// Upload every local shard of `dir` to `dataset_id`, in shard order.
///
/// Shards the catalog already counts are skipped, so re-running after a
/// failure resumes where the previous pass stopped.
pub fn upload_dataset(dir: &Path, catalog: &dyn Catalog, dataset_id: &str) -> Result<UploadSummary> {
    let shards = list_local_shards(dir)?;
    if shards.is_empty() {
        return Err(Error::format(dir, "dataset directory holds no shards"));
    }

    let skipped = (catalog.latest_chunk_number(dataset_id)? as usize).min(shards.len());
    let mut summary = UploadSummary {
        skipped,
        ..UploadSummary::default()
    };

    for shard in shards.iter().skip(skipped) {
        let ShardLocation::Local(path) = &shard.location else {
            continue;
        };
        let file_name = shard.file_name();
        let size = fs::metadata(path).at(path)?.len();

        let target = catalog.upload_target(dataset_id, size, &file_name, shard.sample_count)?;
        catalog.upload_chunk(&target, path, &file_name)?;

        summary.uploaded += 1;
        summary.bytes += size;
        tracing::info!(shard = shard.number, samples = shard.sample_count, bytes = size, "uploaded shard");
    }
    Ok(summary)
}

/// Register `dir` as dataset `name` and upload it.
///
/// A dataset with the same name is deleted first; the new descriptor carries
/// the local sample count and compressed size.
pub fn publish_dataset(dir: &Path, name: &str, catalog: &dyn Catalog) -> Result<DatasetDescriptor> {
    let (samples, bytes) = local_dataset_stats(dir)?;
    if samples == 0 {
        return Err(Error::format(dir, "dataset holds no samples"));
    }

    if let Some(existing) = catalog.find_dataset(name)? {
        tracing::info!(dataset = name, id = %existing.id, "replacing existing dataset");
        catalog.delete_dataset(&existing.id)?;
    }
    let dataset = catalog.create_dataset(name, samples, bytes)?;
    upload_dataset(dir, catalog, &dataset.id)?;
    Ok(dataset)
}
