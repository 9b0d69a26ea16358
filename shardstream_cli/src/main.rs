use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shardstream_codecs::{builtin_registry, FolderCodec, TextCodec};
use shardstream_core::reader::list_local_shards;
use shardstream_core::upload::local_dataset_stats;
use shardstream_core::{
    publish_dataset, upload_dataset, HttpCatalog, PipelineConfig, SampleCodec, SampleProducer,
    ShardLocation, ShardReader, ShardStream, ShardWriter, Value, WorkerPartition,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "shardstream",
    about = "Pack, inspect, stream, and publish sharded sample datasets",
    version
)]
struct Cli {
    /// TOML configuration file; SHARDSTREAM_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack every file of a directory into a new dataset, one sample per file
    ///
    /// Each sample is (file name, file copy), so the dataset decodes as
    /// a text value followed by a path.
    Pack {
        /// Directory whose regular files become samples
        input: PathBuf,
        /// Dataset root to create (must not exist)
        output: PathBuf,
    },
    /// List the shards of a local dataset
    Inspect {
        /// Dataset root
        dir: PathBuf,
    },
    /// Print samples of a local dataset as JSON lines
    Dump {
        /// Dataset root
        dir: PathBuf,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Print samples of a remote dataset as JSON lines
    Fetch {
        /// Catalog id of the dataset
        dataset_id: String,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Show how a dataset of LEN samples splits across workers
    Partition {
        len: u64,
        #[arg(short, long)]
        workers: usize,
    },
    /// Register a local dataset under NAME and upload all shards
    ///
    /// A dataset with the same name is deleted first.
    Publish {
        /// Dataset root
        dir: PathBuf,
        #[arg(short, long)]
        name: String,
    },
    /// Upload the shards a remote dataset is still missing
    Upload {
        /// Dataset root
        dir: PathBuf,
        /// Catalog id of the dataset
        #[arg(long)]
        dataset_id: String,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[derive(Args)]
struct WorkerArgs {
    /// Zero-based id of this worker
    #[arg(long, default_value_t = 0)]
    worker: usize,
    /// Total number of workers
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Stop after this many samples
    #[arg(short, long)]
    limit: Option<usize>,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn catalog(config: &PipelineConfig) -> anyhow::Result<HttpCatalog> {
    if config.catalog.api_key.is_empty() {
        tracing::warn!("no API key configured; set SHARDSTREAM_API_KEY or catalog.api_key");
    }
    HttpCatalog::new(&config.catalog).context("building catalog client")
}

/// One sample per regular file of a directory: its name and a copy of it.
struct FileProducer {
    files: Vec<PathBuf>,
    names: TextCodec,
    contents: FolderCodec,
}

impl FileProducer {
    fn scan(dir: &Path) -> anyhow::Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {:?}", dir))? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self {
            files,
            names: TextCodec::new(),
            contents: FolderCodec::new(),
        })
    }
}

impl SampleProducer for FileProducer {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn produce(&mut self, index: usize) -> shardstream_core::Result<()> {
        let path = &self.files[index];
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.names.append(Value::Text(name))?;
        self.contents.append(Value::Path(path.clone()))
    }

    fn codecs_mut(&mut self) -> Vec<&mut dyn SampleCodec> {
        vec![&mut self.names, &mut self.contents]
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_pack(input: PathBuf, output: PathBuf, config: &PipelineConfig) -> anyhow::Result<()> {
    let mut producer = FileProducer::scan(&input)?;
    let writer = ShardWriter::create(&output, config.writer.clone())
        .with_context(|| format!("creating dataset {:?}", output))?;

    let t0 = Instant::now();
    let summary = writer.write(&mut producer)?;
    let elapsed = t0.elapsed();

    eprintln!("  samples     : {}", summary.sample_count);
    eprintln!("  shards      : {}", summary.shards.len());
    eprintln!("  compressed  : {}", human_bytes(summary.total_bytes()));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(dir: PathBuf) -> anyhow::Result<()> {
    let shards = list_local_shards(&dir)?;
    let (samples, bytes) = local_dataset_stats(&dir)?;

    println!("=== Dataset: {:?} ===", dir);
    println!();
    println!("  shards     : {}", shards.len());
    println!("  samples    : {}", samples);
    println!("  compressed : {}", human_bytes(bytes));
    if shards.is_empty() {
        return Ok(());
    }

    println!();
    println!("  {:>6}  {:>10}  {:>12}  {:>12}  file", "shard", "samples", "first index", "size");
    println!("  {}", "-".repeat(64));
    let mut first = 0u64;
    for shard in &shards {
        let size = match &shard.location {
            ShardLocation::Local(path) => std::fs::metadata(path)?.len(),
            ShardLocation::Remote(chunk) => chunk.size,
        };
        println!(
            "  {:>6}  {:>10}  {:>12}  {:>12}  {}",
            shard.number,
            shard.sample_count,
            first,
            human_bytes(size),
            shard.file_name()
        );
        first += shard.sample_count;
    }
    Ok(())
}

fn print_samples(mut stream: ShardStream, limit: Option<usize>) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let t0 = Instant::now();
    let mut printed = 0usize;

    while limit.map_or(true, |max| printed < max) {
        let Some(sample) = stream.next_sample()? else {
            break;
        };
        serde_json::to_writer(&mut out, &sample.to_json())?;
        out.write_all(b"\n")?;
        printed += 1;
    }
    out.flush()?;

    eprintln!(
        "  {} samples in {:.3}s ({:.0}% of range)",
        printed,
        t0.elapsed().as_secs_f64(),
        stream.progress() * 100.0
    );
    Ok(())
}

fn run_dump(dir: PathBuf, args: WorkerArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let reader = ShardReader::open_local(&dir, builtin_registry(), config.reader.clone())
        .with_context(|| format!("opening dataset {:?}", dir))?;
    print_samples(reader.stream_worker(args.worker, args.workers)?, args.limit)
}

fn run_fetch(dataset_id: String, args: WorkerArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let catalog = Arc::new(catalog(config)?);
    let reader = ShardReader::open_remote(catalog, &dataset_id, builtin_registry(), config.reader.clone())
        .with_context(|| format!("listing chunks of dataset {}", dataset_id))?;
    print_samples(reader.stream_worker(args.worker, args.workers)?, args.limit)
}

fn run_partition(len: u64, workers: usize) -> anyhow::Result<()> {
    println!("  {:>6}  {:>12}  {:>12}  {:>10}", "worker", "start", "end", "samples");
    for p in WorkerPartition::all(0..len, workers)? {
        println!("  {:>6}  {:>12}  {:>12}  {:>10}", p.worker_id, p.start, p.end, p.len());
    }
    Ok(())
}

fn run_publish(dir: PathBuf, name: String, config: &PipelineConfig) -> anyhow::Result<()> {
    let catalog = catalog(config)?;
    let t0 = Instant::now();
    let dataset = publish_dataset(&dir, &name, &catalog)
        .with_context(|| format!("publishing {:?} as '{}'", dir, name))?;

    println!("  dataset id  : {}", dataset.id);
    println!("  samples     : {}", dataset.sample_count);
    println!("  size        : {}", human_bytes(dataset.size));
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_upload(dir: PathBuf, dataset_id: String, config: &PipelineConfig) -> anyhow::Result<()> {
    let catalog = catalog(config)?;
    let summary = upload_dataset(&dir, &catalog, &dataset_id)
        .with_context(|| format!("uploading {:?} to dataset {}", dir, dataset_id))?;

    println!("  uploaded    : {}", summary.uploaded);
    println!("  skipped     : {}", summary.skipped);
    println!("  bytes       : {}", human_bytes(summary.bytes));
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Pack { input, output } => run_pack(input, output, &config),
        Commands::Inspect { dir } => run_inspect(dir),
        Commands::Dump { dir, worker } => run_dump(dir, worker, &config),
        Commands::Fetch { dataset_id, worker } => run_fetch(dataset_id, worker, &config),
        Commands::Partition { len, workers } => run_partition(len, workers),
        Commands::Publish { dir, name } => run_publish(dir, name, &config),
        Commands::Upload { dir, dataset_id } => run_upload(dir, dataset_id, &config),
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
