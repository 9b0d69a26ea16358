use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use shardstream_core::format::TAG_JSON;
use shardstream_core::{CodecFile, Error, IoContext, Result, SampleCodec, Value};

/// JSON arrays and objects, saved together as one JSON array.
pub struct JsonCodec {
    file: CodecFile,
    documents: Vec<serde_json::Value>,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new("-json.json"),
            documents: Vec::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at(path)?;
        let documents: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::format(path, format!("invalid JSON codec file: {e}")))?;
        tracing::debug!(path = %path.display(), documents = documents.len(), "loaded json codec");
        let mut codec = Self::new();
        codec.documents = documents;
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }
}

impl SampleCodec for JsonCodec {
    fn tag(&self) -> &str {
        TAG_JSON
    }

    fn file_name(&self) -> &str {
        self.file.file_name()
    }

    fn set_prefix(&mut self, prefix: &Path) -> Result<()> {
        self.file.set_prefix(prefix);
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Json(doc) if doc.is_array() || doc.is_object() => {
                self.documents.push(doc);
                Ok(())
            }
            Value::Json(_) => Err(Error::validation(
                TAG_JSON,
                "only JSON arrays and objects are accepted",
            )),
            other => Err(Error::validation(
                TAG_JSON,
                format!("expected json, got {}", other.kind()),
            )),
        }
    }

    fn save(&mut self) -> Result<(String, String)> {
        let path = self.file.save_path();
        let file = File::create(&path).at(&path)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer(&mut out, &self.documents)?;
        out.flush().at(&path)?;
        Ok((self.file.file_name().to_owned(), TAG_JSON.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.documents.clear();
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.documents
            .get(index)
            .map(|doc| Value::Json(doc.clone()))
            .ok_or_else(|| {
                Error::validation(
                    TAG_JSON,
                    format!("index {index} out of range for {} values", self.documents.len()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn documents_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = JsonCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        let docs = [
            json!({"label": "cat", "boxes": [[0, 0, 4, 4]]}),
            json!([1, "two", null]),
            json!({}),
        ];
        for d in &docs {
            codec.append(Value::Json(d.clone())).unwrap();
        }
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "json");

        let loaded = JsonCodec::open(&dir.path().join(name)).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(0).unwrap(), Value::Json(docs[0].clone()));
        assert_eq!(loaded.get(2).unwrap(), Value::Json(json!({})));
    }

    #[test]
    fn scalars_are_rejected() {
        let mut codec = JsonCodec::new();
        assert!(codec.append(Value::Json(json!(5))).is_err());
        assert!(codec.append(Value::Json(json!("s"))).is_err());
        assert!(codec.append(Value::from("{}")).is_err());
        assert!(codec.is_empty());
    }

    #[test]
    fn garbage_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonCodec::open(&path), Err(Error::Format { .. })));
    }
}
