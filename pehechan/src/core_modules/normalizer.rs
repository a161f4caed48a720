// THEORY:
// Model backends speak in machine types: fixed-width integers, single-precision
// floats, n-dimensional tensors. The browser speaks JSON. `ModelValue` is the
// vocabulary at the model boundary, and `normalize` is the one-way bridge to a
// portable `serde_json::Value`.
//
// Two guarantees hold:
// - Idempotence: a normalized value, lifted back into a `ModelValue`, normalizes
//   to itself.
// - Termination: values are trees (owned, no sharing), so structural recursion
//   always bottoms out.

use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, Axis};
use serde_json::{Map, Number, Value};

/// An ordered mapping of named model outputs.
pub type ModelMap = IndexMap<String, ModelValue>;

/// A value produced by a face-analysis backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    U8(u8),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    /// A dense numeric tensor of any rank.
    Array(ArrayD<f64>),
    Seq(Vec<ModelValue>),
    Map(ModelMap),
    /// Already JSON; passed through untouched.
    Json(Value),
}

impl ModelValue {
    /// Numeric view of scalar variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ModelValue::I32(v) => Some(*v as f64),
            ModelValue::I64(v) => Some(*v as f64),
            ModelValue::U8(v) => Some(*v as f64),
            ModelValue::U32(v) => Some(*v as f64),
            ModelValue::U64(v) => Some(*v as f64),
            ModelValue::F32(v) => Some(*v as f64),
            ModelValue::F64(v) => Some(*v),
            ModelValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ModelMap> {
        match self {
            ModelValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

fn float(v: f64) -> Value {
    // JSON has no NaN or infinity.
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn tensor(view: ArrayViewD<'_, f64>) -> Value {
    if view.ndim() == 0 {
        return view.iter().next().map(|v| float(*v)).unwrap_or(Value::Null);
    }
    Value::Array(view.axis_iter(Axis(0)).map(tensor).collect())
}

/// Converts a model output into a JSON-safe value.
pub fn normalize(value: &ModelValue) -> Value {
    match value {
        ModelValue::Null => Value::Null,
        ModelValue::Bool(b) => Value::Bool(*b),
        ModelValue::I32(v) => Value::from(*v),
        ModelValue::I64(v) => Value::from(*v),
        ModelValue::U8(v) => Value::from(*v),
        ModelValue::U32(v) => Value::from(*v),
        ModelValue::U64(v) => Value::from(*v),
        ModelValue::F32(v) => float(*v as f64),
        ModelValue::F64(v) => float(*v),
        ModelValue::Text(s) => Value::String(s.clone()),
        ModelValue::Array(array) => tensor(array.view()),
        ModelValue::Seq(items) => Value::Array(items.iter().map(normalize).collect()),
        ModelValue::Map(map) => Value::Object(normalize_map(map)),
        ModelValue::Json(v) => v.clone(),
    }
}

pub fn normalize_map(map: &ModelMap) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), normalize(v))).collect()
}

impl From<Value> for ModelValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ModelValue::Null,
            Value::Bool(b) => ModelValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ModelValue::I64(i)
                } else if let Some(u) = n.as_u64() {
                    ModelValue::U64(u)
                } else {
                    n.as_f64().map(ModelValue::F64).unwrap_or(ModelValue::Null)
                }
            }
            Value::String(s) => ModelValue::Text(s),
            Value::Array(items) => ModelValue::Seq(items.into_iter().map(ModelValue::from).collect()),
            Value::Object(map) => ModelValue::Map(map.into_iter().map(|(k, v)| (k, ModelValue::from(v))).collect()),
        }
    }
}
