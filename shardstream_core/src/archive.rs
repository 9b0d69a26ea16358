use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};

/// Compress the contents of `dir` into a gzip tar at `output`, then delete `dir`.
///
/// Members are stored relative to `dir`, so extracting yields the codec files
/// and `ann.json` at the top level. Returns the archive size in bytes.
pub fn compress_dir(dir: &Path, output: &Path) -> Result<u64> {
    let file = File::create(output).at(output)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", dir).at(dir)?;
    let encoder = builder.into_inner().at(output)?;
    let mut out = encoder.finish().at(output)?;
    std::io::Write::flush(&mut out).at(output)?;
    drop(out);

    fs::remove_dir_all(dir).at(dir)?;
    Ok(fs::metadata(output).at(output)?.len())
}

/// Extract a gzip tar produced by [`compress_dir`] into `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).at(archive)?;
    fs::create_dir_all(dest).at(dest)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.unpack(dest)
        .map_err(|e| Error::format(archive, format!("failed to extract shard: {e}")))
}

/// On-disk usage of a shard directory: total bytes and number of files, recursively.
pub fn dir_usage(dir: &Path) -> Result<(u64, u64)> {
    let mut bytes = 0u64;
    let mut files = 0u64;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map_err(|e| Error::io(entry.path(), e.into()))?.len();
        }
    }
    Ok((bytes, files))
}
