use std::path::Path;

use shardstream_core::format::{BLOB_NUMERIC, TAG_NUMERIC};
use shardstream_core::{CodecFile, Error, Result, SampleCodec, Value};

use crate::blob::{self, ByteReader};

const INT: u8 = 0;
const FLOAT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

/// Scalar integers and floats, kept apart so an integer never decodes as a
/// float.
///
/// Payload: one `kind:u8` plus eight little-endian bytes per value,
/// zstd-compressed inside a blob file.
pub struct NumericCodec {
    file: CodecFile,
    values: Vec<Number>,
}

impl Default for NumericCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl NumericCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new("-num.bin"),
            values: Vec::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let (count, raw) = blob::load(path, BLOB_NUMERIC)?;
        let mut reader = ByteReader::new(&raw, path);
        // nine payload bytes per value bound any honest count
        let mut values = Vec::with_capacity(count.min(raw.len() / 9));
        for _ in 0..count {
            let number = match reader.u8()? {
                INT => Number::Int(reader.i64()?),
                FLOAT => Number::Float(reader.f64()?),
                other => return Err(Error::format(path, format!("unknown numeric kind {other}"))),
            };
            values.push(number);
        }
        reader.finish()?;
        tracing::debug!(path = %path.display(), values = values.len(), "loaded numeric codec");

        let mut codec = Self::new();
        codec.values = values;
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 9);
        for value in &self.values {
            match *value {
                Number::Int(i) => {
                    out.push(INT);
                    out.extend_from_slice(&i.to_le_bytes());
                }
                Number::Float(f) => {
                    out.push(FLOAT);
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
        }
        out
    }
}

impl SampleCodec for NumericCodec {
    fn tag(&self) -> &str {
        TAG_NUMERIC
    }

    fn file_name(&self) -> &str {
        self.file.file_name()
    }

    fn set_prefix(&mut self, prefix: &Path) -> Result<()> {
        self.file.set_prefix(prefix);
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<()> {
        let number = match value {
            Value::Int(i) => Number::Int(i),
            Value::Float(f) => Number::Float(f),
            other => {
                return Err(Error::validation(
                    TAG_NUMERIC,
                    format!("expected int or float, got {}", other.kind()),
                ))
            }
        };
        self.values.push(number);
        Ok(())
    }

    fn save(&mut self) -> Result<(String, String)> {
        blob::save(&self.file.save_path(), BLOB_NUMERIC, self.values.len(), &self.encode())?;
        Ok((self.file.file_name().to_owned(), TAG_NUMERIC.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.values.clear();
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        match self.values.get(index) {
            Some(Number::Int(i)) => Ok(Value::Int(*i)),
            Some(Number::Float(f)) => Ok(Value::Float(*f)),
            None => Err(Error::validation(
                TAG_NUMERIC,
                format!("index {index} out of range for {} values", self.values.len()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_and_floats_keep_their_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = NumericCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        let inputs = [
            Value::Int(i64::MIN),
            Value::Float(0.1),
            Value::Int(42),
            Value::Float(f64::INFINITY),
            Value::Float(-0.0),
        ];
        for v in inputs.clone() {
            codec.append(v).unwrap();
        }
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "num");

        let loaded = NumericCodec::open(&dir.path().join(name)).unwrap();
        assert_eq!(loaded.len(), inputs.len());
        for (i, expected) in inputs.iter().enumerate() {
            assert_eq!(&loaded.get(i).unwrap(), expected);
        }
    }

    #[test]
    fn nan_survives_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = NumericCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        codec.append(Value::Float(f64::NAN)).unwrap();
        let (name, _) = codec.save().unwrap();
        let loaded = NumericCodec::open(&dir.path().join(name)).unwrap();
        assert!(loaded.get(0).unwrap().as_f64().unwrap().is_nan());
    }

    #[test]
    fn corrupt_header_counts_are_format_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = NumericCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        codec.append(Value::Int(1)).unwrap();
        codec.append(Value::Float(2.0)).unwrap();
        let (name, _) = codec.save().unwrap();
        let path = dir.path().join(name);
        let clean = std::fs::read(&path).unwrap();

        // count at 16..24, payload_len at 24..32
        for field in [16..24, 24..32] {
            for value in [u64::MAX, 1 << 40] {
                let mut bytes = clean.clone();
                bytes[field.clone()].copy_from_slice(&value.to_le_bytes());
                std::fs::write(&path, bytes).unwrap();
                let err = NumericCodec::open(&path).err().unwrap();
                assert!(matches!(err, Error::Format { .. }), "{field:?}={value}: {err}");
            }
        }
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let mut codec = NumericCodec::new();
        assert!(matches!(
            codec.append(Value::from("7")),
            Err(Error::Validation { .. })
        ));
        assert!(codec.is_empty());
    }

    #[test]
    fn empty_codec_saves_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = NumericCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        let (name, _) = codec.save().unwrap();
        assert!(NumericCodec::open(&dir.path().join(name)).unwrap().is_empty());
    }
}
