use std::fmt;
use std::path::PathBuf;

use ndarray::ArrayD;

/// One decoded (or to-be-encoded) field of a sample.
///
/// Each built-in codec accepts exactly one of these variants; anything else
/// is a validation error at `append` time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Text(String),
    Int(i64),
    Float(f64),
    /// Numeric array, free or fixed shape.
    Array(ArrayD<f64>),
    /// Single-precision tensor block.
    Tensor(ArrayD<f32>),
    /// JSON array or object.
    Json(serde_json::Value),
    /// A file on disk: the source on encode, the extracted copy on decode.
    Path(PathBuf),
}

impl Value {
    /// Short variant name used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Array(_) => "array",
            Value::Tensor(_) => "tensor",
            Value::Json(_) => "json",
            Value::Path(_) => "path",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Render as JSON for display. Arrays become nested lists with their shape.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Bool(b) => json!(b),
            Value::Text(s) => json!(s),
            Value::Int(n) => json!(n),
            Value::Float(x) => json!(x),
            Value::Array(a) => json!({ "shape": a.shape(), "data": a.iter().collect::<Vec<_>>() }),
            Value::Tensor(t) => json!({ "shape": t.shape(), "data": t.iter().collect::<Vec<_>>() }),
            Value::Json(j) => j.clone(),
            Value::Path(p) => json!(p.display().to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(a: ArrayD<f64>) -> Self {
        Value::Array(a)
    }
}

impl From<ArrayD<f32>> for Value {
    fn from(t: ArrayD<f32>) -> Self {
        Value::Tensor(t)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

/// One decoded sample, shaped by its shard manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// The manifest had exactly one entry.
    Single(Value),
    /// Values in manifest order.
    Tuple(Vec<Value>),
}

impl Sample {
    pub fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Sample::Single(values.remove(0))
        } else {
            Sample::Tuple(values)
        }
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Sample::Single(v) => std::slice::from_ref(v),
            Sample::Tuple(vs) => vs,
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Sample::Single(v) => vec![v],
            Sample::Tuple(vs) => vs,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Sample::Single(v) => v.to_json(),
            Sample::Tuple(vs) => serde_json::Value::Array(vs.iter().map(Value::to_json).collect()),
        }
    }
}
