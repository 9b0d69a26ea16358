//! Sharded sample storage and streaming.
//!
//! A [`SampleProducer`] feeds typed [`SampleCodec`]s; a [`ShardWriter`] rolls
//! their output into size-bounded `dataset-<i>-<n>.tar.gz` shards; a
//! [`ShardReader`] streams the shards back as [`Sample`]s, one worker
//! partition at a time, decoding each member file through a [`CodecRegistry`].

pub mod archive;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod manifest;
pub mod partition;
pub mod producer;
pub mod reader;
pub mod registry;
pub mod upload;
pub mod value;
pub mod writer;

pub use catalog::{Catalog, ChunkDescriptor, ChunkPage, DatasetDescriptor, HttpCatalog, UploadTarget};
pub use codec::{CodecFile, SampleCodec};
pub use config::{CatalogConfig, PipelineConfig, ReaderConfig, WriterConfig};
pub use error::{Error, IoContext, Result};
pub use format::{member_path, ShardName, MANIFEST_FILE};
pub use manifest::{Manifest, ManifestEntry};
pub use partition::WorkerPartition;
pub use producer::SampleProducer;
pub use reader::{ShardLocation, ShardReader, ShardRef, ShardStream};
pub use registry::{CodecLoader, CodecRegistry};
pub use upload::{publish_dataset, upload_dataset, UploadSummary};
pub use value::{Sample, Value};
pub use writer::{ShardInfo, ShardWriter, WriteSummary};
