use std::path::Path;

use shardstream_core::format::{read_blob, write_blob};
use shardstream_core::{Error, IoContext, Result};

/// zstd level used for every binary codec payload.
pub(crate) const ZSTD_LEVEL: i32 = 3;

/// Compress `raw` with zstd and write it behind a blob header.
pub(crate) fn save(path: &Path, kind: u16, count: usize, raw: &[u8]) -> Result<()> {
    let compressed = zstd::bulk::compress(raw, ZSTD_LEVEL).at(path)?;
    write_blob(path, kind, count as u64, &compressed)
}

/// Read a blob of `kind` and return `(count, decompressed payload)`.
pub(crate) fn load(path: &Path, kind: u16) -> Result<(usize, Vec<u8>)> {
    let (header, payload) = read_blob(path, kind)?;
    let raw = zstd::decode_all(payload.as_slice())
        .map_err(|e| Error::format(path, format!("zstd decode failed: {e}")))?;
    Ok((header.count as usize, raw))
}

/// Little-endian cursor over a decoded payload. Running past the end is a
/// format error, never a panic.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8], path: &'a Path) -> Self {
        Self { buf, pos: 0, path }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| Error::format(self.path, "payload truncated"))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| Error::format(self.path, "payload truncated"))?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| Error::format(self.path, "payload truncated"))?;
        self.pos = end;
        Ok(slice)
    }

    /// A shape written as `ndim:u32` followed by `ndim` u64 dims.
    pub(crate) fn shape(&mut self) -> Result<Vec<usize>> {
        let ndim = self.u32()? as usize;
        (0..ndim).map(|_| Ok(self.u64()? as usize)).collect()
    }

    /// Element count of `shape`, or a format error if it overflows.
    pub(crate) fn elements(&self, shape: &[usize]) -> Result<usize> {
        shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| Error::format(self.path, "declared shape overflows"))
    }

    /// Error unless every byte has been consumed.
    pub(crate) fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(Error::format(
                self.path,
                format!("{} trailing payload bytes", self.buf.len() - self.pos),
            ));
        }
        Ok(())
    }
}

pub(crate) fn put_shape(out: &mut Vec<u8>, shape: &[usize]) {
    out.extend_from_slice(&(shape.len() as u32).to_le_bytes());
    for &dim in shape {
        out.extend_from_slice(&(dim as u64).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_payload_is_a_format_error() {
        let path = Path::new("mem");
        let mut reader = ByteReader::new(&[1, 2, 3], path);
        assert_eq!(reader.u8().unwrap(), 1);
        assert!(matches!(reader.u32(), Err(Error::Format { .. })));
    }

    #[test]
    fn oversized_lengths_do_not_panic() {
        let path = Path::new("mem");
        let mut reader = ByteReader::new(&[0; 4], path);
        reader.u8().unwrap();
        assert!(matches!(reader.bytes(usize::MAX), Err(Error::Format { .. })));
        assert!(matches!(
            reader.elements(&[usize::MAX, 2]),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn shape_survives_encoding() {
        let mut out = Vec::new();
        put_shape(&mut out, &[2, 3, 4]);
        let path = Path::new("mem");
        let mut reader = ByteReader::new(&out, path);
        assert_eq!(reader.shape().unwrap(), vec![2, 3, 4]);
        reader.finish().unwrap();
    }
}
