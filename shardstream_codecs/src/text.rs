use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use shardstream_core::format::{TAG_BOOL, TAG_TEXT};
use shardstream_core::{CodecFile, Error, IoContext, Result, SampleCodec, Value};

fn write_lines<'a>(path: &Path, lines: impl Iterator<Item = &'a str>) -> Result<()> {
    let file = File::create(path).at(path)?;
    let mut out = BufWriter::new(file);
    for line in lines {
        out.write_all(line.as_bytes()).at(path)?;
        out.write_all(b"\n").at(path)?;
    }
    out.flush().at(path)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).at(path)?;
    Ok(contents.lines().map(str::to_owned).collect())
}

fn out_of_range(tag: &str, index: usize, len: usize) -> Error {
    Error::validation(tag, format!("index {index} out of range for {len} values"))
}

/// One UTF-8 string per line.
///
/// Strings containing a line break are rejected on append, otherwise they
/// would decode as several values.
pub struct TextCodec {
    file: CodecFile,
    lines: Vec<String>,
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new("-text.txt"),
            lines: Vec::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut codec = Self::new();
        codec.lines = read_lines(path)?;
        tracing::debug!(path = %path.display(), lines = codec.lines.len(), "loaded text codec");
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }
}

impl SampleCodec for TextCodec {
    fn tag(&self) -> &str {
        TAG_TEXT
    }

    fn file_name(&self) -> &str {
        self.file.file_name()
    }

    fn set_prefix(&mut self, prefix: &Path) -> Result<()> {
        self.file.set_prefix(prefix);
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<()> {
        let Value::Text(text) = value else {
            return Err(Error::validation(
                TAG_TEXT,
                format!("expected text, got {}", value.kind()),
            ));
        };
        if text.contains(['\n', '\r']) {
            return Err(Error::validation(TAG_TEXT, "text may not contain line breaks"));
        }
        self.lines.push(text);
        Ok(())
    }

    fn save(&mut self) -> Result<(String, String)> {
        write_lines(&self.file.save_path(), self.lines.iter().map(String::as_str))?;
        Ok((self.file.file_name().to_owned(), TAG_TEXT.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.lines.clear();
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.lines
            .get(index)
            .map(|line| Value::Text(line.clone()))
            .ok_or_else(|| out_of_range(TAG_TEXT, index, self.lines.len()))
    }
}

/// Booleans stored as `0`/`1` lines.
pub struct BoolCodec {
    file: CodecFile,
    values: Vec<bool>,
}

impl Default for BoolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BoolCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new("-bool.txt"),
            values: Vec::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let values = read_lines(path)?
            .iter()
            .enumerate()
            .map(|(line_no, line)| match line.as_str() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(Error::format(
                    path,
                    format!("line {}: expected 0 or 1, found '{other}'", line_no + 1),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        let mut codec = Self::new();
        codec.values = values;
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }
}

impl SampleCodec for BoolCodec {
    fn tag(&self) -> &str {
        TAG_BOOL
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
            Value::Bool(b) => {
                self.values.push(b);
                Ok(())
            }
            other => Err(Error::validation(
                TAG_BOOL,
                format!("expected bool, got {}", other.kind()),
            )),
        }
    }

    fn save(&mut self) -> Result<(String, String)> {
        let lines = self.values.iter().map(|&b| if b { "1" } else { "0" });
        write_lines(&self.file.save_path(), lines)?;
        Ok((self.file.file_name().to_owned(), TAG_BOOL.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.values.clear();
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.values
            .get(index)
            .map(|&b| Value::Bool(b))
            .ok_or_else(|| out_of_range(TAG_BOOL, index, self.values.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved_path(codec: &mut dyn SampleCodec, dir: &Path) -> std::path::PathBuf {
        let (name, _) = codec.save().unwrap();
        dir.join(name)
    }

    #[test]
    fn text_round_trip_keeps_empty_and_unicode_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = TextCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        for s in ["hello", "", "grüße 🌍", "  padded  "] {
            codec.append(Value::from(s)).unwrap();
        }
        let path = saved_path(&mut codec, dir.path());
        assert!(codec.file_name().starts_with("bench-"));
        assert!(codec.file_name().ends_with("-text.txt"));

        let loaded = TextCodec::open(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.get(1).unwrap(), Value::from(""));
        assert_eq!(loaded.get(2).unwrap(), Value::from("grüße 🌍"));
        assert_eq!(loaded.get(3).unwrap(), Value::from("  padded  "));
    }

    #[test]
    fn text_rejects_line_breaks_and_other_kinds() {
        let mut codec = TextCodec::new();
        let err = codec.append(Value::from("a\nb")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(codec.append(Value::from("a\r")).is_err());
        assert!(codec.append(Value::Int(3)).is_err());
        assert!(codec.is_empty());
    }

    #[test]
    fn reset_clears_buffer_and_renames() {
        let mut codec = TextCodec::new();
        codec.append(Value::from("x")).unwrap();
        let before = codec.file_name().to_owned();
        codec.reset();
        assert!(codec.is_empty());
        assert_ne!(codec.file_name(), before);
    }

    #[test]
    fn bool_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = BoolCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        for b in [true, false, false, true] {
            codec.append(Value::Bool(b)).unwrap();
        }
        let path = saved_path(&mut codec, dir.path());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n0\n0\n1\n");

        let loaded = BoolCodec::open(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.get(0).unwrap(), Value::Bool(true));
        assert_eq!(loaded.get(2).unwrap(), Value::Bool(false));
        assert!(loaded.get(4).is_err());
    }

    #[test]
    fn bool_rejects_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        fs::write(&path, "1\nyes\n").unwrap();
        let err = BoolCodec::open(&path).err().unwrap();
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }
}
