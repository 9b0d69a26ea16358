use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use shardstream_core::format::{
    BLOB_FREE_ARRAY, BLOB_STACKED_F32, BLOB_STACKED_F64, TAG_ARRAY, TAG_FREE_ARRAY, TAG_TENSOR,
};
use shardstream_core::{CodecFile, Error, Result, SampleCodec, Value};

use crate::blob::{self, put_shape, ByteReader};

fn out_of_range(tag: &str, index: usize, len: usize) -> Error {
    Error::validation(tag, format!("index {index} out of range for {len} values"))
}

// ── Free-shape arrays ──────────────────────────────────────────────────────

/// Arrays of any shape, each stored under its own `np-<n>` key in append
/// order.
///
/// Payload per entry: `key_len:u32`, key bytes, `ndim:u32`, dims as u64,
/// then the elements as little-endian f64 in logical (row-major) order.
pub struct FreeArrayCodec {
    file: CodecFile,
    arrays: Vec<ArrayD<f64>>,
}

impl Default for FreeArrayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeArrayCodec {
    pub fn new() -> Self {
        Self {
            file: CodecFile::new("-array.bin"),
            arrays: Vec::new(),
        }
    }

    fn key(index: usize) -> String {
        format!("np-{index}")
    }

    pub fn open(path: &Path) -> Result<Self> {
        let (count, raw) = blob::load(path, BLOB_FREE_ARRAY)?;
        let mut reader = ByteReader::new(&raw, path);
        let mut arrays = Vec::with_capacity(count.min(raw.len() / 8));
        for index in 0..count {
            let key_len = reader.u32()? as usize;
            let key = std::str::from_utf8(reader.bytes(key_len)?)
                .map_err(|_| Error::format(path, "array key is not UTF-8"))?;
            let expected = Self::key(index);
            if key != expected {
                return Err(Error::format(
                    path,
                    format!("expected key '{expected}', found '{key}'"),
                ));
            }

            let shape = reader.shape()?;
            let elements = reader.elements(&shape)?;
            let data = (0..elements)
                .map(|_| reader.f64())
                .collect::<Result<Vec<_>>>()?;
            let array = ArrayD::from_shape_vec(IxDyn(&shape), data)
                .map_err(|e| Error::format(path, format!("bad array '{key}': {e}")))?;
            arrays.push(array);
        }
        reader.finish()?;
        tracing::debug!(path = %path.display(), arrays = arrays.len(), "loaded free array codec");

        let mut codec = Self::new();
        codec.arrays = arrays;
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, array) in self.arrays.iter().enumerate() {
            let key = Self::key(index);
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            put_shape(&mut out, array.shape());
            for x in array.iter() {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        out
    }
}

impl SampleCodec for FreeArrayCodec {
    fn tag(&self) -> &str {
        TAG_FREE_ARRAY
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
            Value::Array(array) => {
                self.arrays.push(array);
                Ok(())
            }
            other => Err(Error::validation(
                TAG_FREE_ARRAY,
                format!("expected array, got {}", other.kind()),
            )),
        }
    }

    fn save(&mut self) -> Result<(String, String)> {
        blob::save(&self.file.save_path(), BLOB_FREE_ARRAY, self.arrays.len(), &self.encode())?;
        Ok((self.file.file_name().to_owned(), TAG_FREE_ARRAY.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.arrays.clear();
    }

    fn len(&self) -> usize {
        self.arrays.len()
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.arrays
            .get(index)
            .map(|a| Value::Array(a.clone()))
            .ok_or_else(|| out_of_range(TAG_FREE_ARRAY, index, self.arrays.len()))
    }
}

// ── Fixed-shape stacks ─────────────────────────────────────────────────────

/// Element type of a [`StackedCodec`].
pub trait Element: Copy + Send + 'static {
    const TAG: &'static str;
    const SUFFIX: &'static str;
    const BLOB_KIND: u16;
    /// Encoded width in bytes.
    const SIZE: usize;

    fn put(self, out: &mut Vec<u8>);
    /// `bytes` is exactly [`SIZE`](Element::SIZE) long.
    fn from_le_slice(bytes: &[u8]) -> Self;
    fn wrap(array: ArrayD<Self>) -> Value;
    /// Hands the value back when it is the wrong variant.
    fn unwrap(value: Value) -> std::result::Result<ArrayD<Self>, Value>;
}

impl Element for f64 {
    const TAG: &'static str = TAG_ARRAY;
    const SUFFIX: &'static str = "-enforced-array.bin";
    const BLOB_KIND: u16 = BLOB_STACKED_F64;
    const SIZE: usize = 8;

    fn put(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut b = [0u8; 8];
        b.copy_from_slice(bytes);
        f64::from_le_bytes(b)
    }

    fn wrap(array: ArrayD<Self>) -> Value {
        Value::Array(array)
    }

    fn unwrap(value: Value) -> std::result::Result<ArrayD<Self>, Value> {
        match value {
            Value::Array(a) => Ok(a),
            other => Err(other),
        }
    }
}

impl Element for f32 {
    const TAG: &'static str = TAG_TENSOR;
    const SUFFIX: &'static str = "-ten.bin";
    const BLOB_KIND: u16 = BLOB_STACKED_F32;
    const SIZE: usize = 4;

    fn put(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut b = [0u8; 4];
        b.copy_from_slice(bytes);
        f32::from_le_bytes(b)
    }

    fn wrap(array: ArrayD<Self>) -> Value {
        Value::Tensor(array)
    }

    fn unwrap(value: Value) -> std::result::Result<ArrayD<Self>, Value> {
        match value {
            Value::Tensor(t) => Ok(t),
            other => Err(other),
        }
    }
}

/// Arrays that must all match one declared shape, stacked along a new
/// leading axis.
///
/// The declared shape is written into the file, so a loaded codec recovers
/// it without being told.
pub struct StackedCodec<T: Element> {
    file: CodecFile,
    shape: Vec<usize>,
    /// Row-major elements of every appended array, back to back.
    data: Vec<T>,
    count: usize,
}

/// Fixed-shape f64 arrays.
pub type ArrayCodec = StackedCodec<f64>;
/// Fixed-shape f32 tensors.
pub type TensorCodec = StackedCodec<f32>;

impl<T: Element> StackedCodec<T> {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            file: CodecFile::new(T::SUFFIX),
            shape: shape.to_vec(),
            data: Vec::new(),
            count: 0,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn stride(&self) -> usize {
        self.shape.iter().product()
    }

    /// Every appended array as one `[len, ..shape]` array.
    pub fn stacked(&self) -> Result<ArrayD<T>> {
        let mut full = Vec::with_capacity(self.shape.len() + 1);
        full.push(self.count);
        full.extend_from_slice(&self.shape);
        ArrayD::from_shape_vec(IxDyn(&full), self.data.clone())
            .map_err(|e| Error::validation(T::TAG, e.to_string()))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let (count, raw) = blob::load(path, T::BLOB_KIND)?;
        let mut reader = ByteReader::new(&raw, path);
        let shape = reader.shape()?;

        let stride = reader.elements(&shape)?;
        let mut codec = Self::new(&shape);
        let byte_len = count
            .checked_mul(stride)
            .and_then(|n| n.checked_mul(T::SIZE))
            .ok_or_else(|| Error::format(path, "declared size overflows"))?;
        let bytes = reader.bytes(byte_len)?;
        reader.finish()?;

        codec.data = bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect();
        codec.count = count;
        tracing::debug!(path = %path.display(), tag = T::TAG, count, shape = ?codec.shape, "loaded stacked codec");
        Ok(codec)
    }

    pub fn load(path: &Path) -> Result<Box<dyn SampleCodec>> {
        Ok(Box::new(Self::open(path)?))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * T::SIZE + 4 + self.shape.len() * 8);
        put_shape(&mut out, &self.shape);
        for &x in &self.data {
            x.put(&mut out);
        }
        out
    }
}

impl<T: Element> SampleCodec for StackedCodec<T> {
    fn tag(&self) -> &str {
        T::TAG
    }

    fn file_name(&self) -> &str {
        self.file.file_name()
    }

    fn set_prefix(&mut self, prefix: &Path) -> Result<()> {
        self.file.set_prefix(prefix);
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<()> {
        let array = T::unwrap(value).map_err(|other| {
            Error::validation(T::TAG, format!("unexpected {} value", other.kind()))
        })?;
        if array.shape() != self.shape.as_slice() {
            return Err(Error::validation(
                T::TAG,
                format!("shape mismatch: expected {:?}, got {:?}", self.shape, array.shape()),
            ));
        }
        self.data.extend(array.iter().copied());
        self.count += 1;
        Ok(())
    }

    fn save(&mut self) -> Result<(String, String)> {
        blob::save(&self.file.save_path(), T::BLOB_KIND, self.count, &self.encode())?;
        Ok((self.file.file_name().to_owned(), T::TAG.to_owned()))
    }

    fn reset(&mut self) {
        self.file.reset();
        self.data.clear();
        self.count = 0;
    }

    fn len(&self) -> usize {
        self.count
    }

    fn get(&self, index: usize) -> Result<Value> {
        if index >= self.count {
            return Err(out_of_range(T::TAG, index, self.count));
        }
        let stride = self.stride();
        let slice = self.data[index * stride..(index + 1) * stride].to_vec();
        let array = ArrayD::from_shape_vec(IxDyn(&self.shape), slice)
            .map_err(|e| Error::validation(T::TAG, e.to_string()))?;
        Ok(T::wrap(array))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr0, array};

    use super::*;

    #[test]
    fn corrupt_counts_never_allocate_blindly() {
        let dir = tempfile::tempdir().unwrap();
        let mut free = FreeArrayCodec::new();
        free.set_prefix(dir.path()).unwrap();
        free.append(Value::Array(array![1.0, 2.0].into_dyn())).unwrap();
        let (free_name, _) = free.save().unwrap();

        let mut stacked = TensorCodec::new(&[2]);
        stacked.set_prefix(dir.path()).unwrap();
        stacked.append(Value::Tensor(array![1.0f32, 2.0].into_dyn())).unwrap();
        let (stacked_name, _) = stacked.save().unwrap();

        for value in [u64::MAX, 1 << 40] {
            for name in [&free_name, &stacked_name] {
                let path = dir.path().join(name);
                let mut bytes = std::fs::read(&path).unwrap();
                bytes[16..24].copy_from_slice(&value.to_le_bytes());
                std::fs::write(&path, bytes).unwrap();
            }
            let err = FreeArrayCodec::open(&dir.path().join(&free_name)).err().unwrap();
            assert!(matches!(err, Error::Format { .. }), "free {value}: {err}");
            let err = TensorCodec::open(&dir.path().join(&stacked_name)).err().unwrap();
            assert!(matches!(err, Error::Format { .. }), "stacked {value}: {err}");
        }
    }

    #[test]
    fn free_arrays_keep_their_own_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = FreeArrayCodec::new();
        codec.set_prefix(dir.path()).unwrap();
        let inputs = vec![
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn(),
            arr0(7.5).into_dyn(),
            ArrayD::<f64>::zeros(IxDyn(&[0, 4])),
            // column-major input must come back in logical order
            array![[1.0, 2.0], [3.0, 4.0]].reversed_axes().into_dyn(),
        ];
        for a in &inputs {
            codec.append(Value::Array(a.clone())).unwrap();
        }
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "arr");

        let loaded = FreeArrayCodec::open(&dir.path().join(name)).unwrap();
        assert_eq!(loaded.len(), inputs.len());
        for (i, a) in inputs.iter().enumerate() {
            assert_eq!(loaded.get(i).unwrap(), Value::Array(a.clone()));
        }
    }

    #[test]
    fn free_array_rejects_tensors() {
        let mut codec = FreeArrayCodec::new();
        let t = ArrayD::<f32>::zeros(IxDyn(&[2]));
        assert!(matches!(
            codec.append(Value::Tensor(t)),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn stacked_array_round_trip_recovers_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = ArrayCodec::new(&[2, 2]);
        codec.set_prefix(dir.path()).unwrap();
        codec.append(Value::Array(array![[1.0, 2.0], [3.0, 4.0]].into_dyn())).unwrap();
        codec.append(Value::Array(array![[5.0, 6.0], [7.0, 8.0]].into_dyn())).unwrap();
        assert_eq!(codec.stacked().unwrap().shape(), &[2, 2, 2]);
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "enforced_arr");
        assert!(name.ends_with("-enforced-array.bin"));

        let loaded = ArrayCodec::open(&dir.path().join(name)).unwrap();
        assert_eq!(loaded.shape(), &[2, 2]);
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get(1).unwrap(),
            Value::Array(array![[5.0, 6.0], [7.0, 8.0]].into_dyn())
        );
    }

    #[test]
    fn shape_mismatch_leaves_buffer_unchanged() {
        let mut codec = ArrayCodec::new(&[3]);
        codec.append(Value::Array(array![1.0, 2.0, 3.0].into_dyn())).unwrap();
        let err = codec
            .append(Value::Array(array![1.0, 2.0].into_dyn()))
            .unwrap_err();
        assert!(err.to_string().contains("shape mismatch"), "got: {err}");
        assert_eq!(codec.len(), 1);
        assert_eq!(codec.stacked().unwrap().len(), 3);
    }

    #[test]
    fn tensor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = TensorCodec::new(&[3]);
        codec.set_prefix(dir.path()).unwrap();
        let t = array![0.5f32, -1.25, 3.0].into_dyn();
        codec.append(Value::Tensor(t.clone())).unwrap();
        assert!(codec.append(Value::Array(array![1.0, 2.0, 3.0].into_dyn())).is_err());
        let (name, tag) = codec.save().unwrap();
        assert_eq!(tag, "ten");

        let loaded = TensorCodec::open(&dir.path().join(name)).unwrap();
        assert_eq!(loaded.get(0).unwrap(), Value::Tensor(t));
        assert!(loaded.get(1).is_err());
    }

    #[test]
    fn tensor_file_does_not_load_as_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = TensorCodec::new(&[1]);
        codec.set_prefix(dir.path()).unwrap();
        let (name, _) = codec.save().unwrap();
        let err = ArrayCodec::open(&dir.path().join(name)).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
    }
}
