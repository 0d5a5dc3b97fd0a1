//! Restricted Python pickle decoder.
//!
//! Only data is reconstructed: globals are never executed. A small set of
//! well-known callables (numpy arrays, dtypes and scalars, `set`, `bytearray`,
//! `_codecs.encode`) is interpreted; anything else decodes to an opaque
//! [`Object`] that keeps its constructor arguments and state.

mod numpy;
mod unpickler;

use std::rc::Rc;

pub use numpy::{Dtype, NdArray, ScalarKind};
pub use unpickler::Unpickler;

use crate::matrix::Matrix;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<Vec<(Value, Value)>>),
    Set(Rc<Vec<Value>>),
    Global { module: String, name: String },
    Object(Rc<Object>),
    Dtype(Dtype),
    Array(Rc<NdArray>),
}

/// Instance of a class the decoder does not interpret.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: Value,
    pub args: Value,
    pub state: Option<Value>,
    pub list_items: Vec<Value>,
    pub dict_items: Vec<(Value, Value)>,
}

impl Value {
    pub fn object(class: Value, args: Value) -> Self {
        Value::Object(Rc::new(Object {
            class,
            args,
            state: None,
            list_items: Vec::new(),
            dict_items: Vec::new(),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Global { .. } => "global",
            Value::Object(_) => "object",
            Value::Dtype(_) => "dtype",
            Value::Array(_) => "ndarray",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Int(value) => usize::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Numeric view of a Python number, numpy scalar or 0-d array.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            Value::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Value::Array(array) if array.ndim() == 0 => array.data().first().copied(),
            _ => None,
        }
    }

    pub fn sequence_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn dict_items(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Dict(items) => Some(items.as_slice()),
            Value::Object(object) if !object.dict_items.is_empty() => {
                Some(object.dict_items.as_slice())
            }
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        self.dict_items().is_some()
    }

    /// Looks up a string key in a dict (or dict-like object such as `OrderedDict`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.dict_items()?.iter().find_map(|(candidate, value)| {
            let matches = match candidate {
                Value::Str(name) => name == key,
                Value::Bytes(name) => name.as_slice() == key.as_bytes(),
                _ => false,
            };
            matches.then_some(value)
        })
    }

    /// Dense 1-D numeric view: a 1-D ndarray or a flat sequence of numbers.
    pub fn to_vector(&self) -> Result<Vec<f64>, String> {
        match self {
            Value::Array(array) if array.ndim() == 1 => Ok(array.data().to_vec()),
            Value::Array(array) => Err(format!(
                "expected a 1-D array, found shape {:?}",
                array.shape()
            )),
            Value::List(_) | Value::Tuple(_) => self
                .sequence_items()
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.as_f64().ok_or_else(|| {
                        format!("element {index} is a {}, not a number", item.type_name())
                    })
                })
                .collect(),
            other => Err(format!("expected a numeric array, found {}", other.type_name())),
        }
    }

    /// Dense 2-D numeric view: a 2-D ndarray or a rectangular sequence of rows.
    pub fn to_matrix(&self) -> Result<Matrix, String> {
        match self {
            Value::Array(array) if array.ndim() == 2 => {
                let shape = array.shape();
                Matrix::from_row_major(shape[0], shape[1], array.data().to_vec())
                    .ok_or_else(|| "array data does not match its shape".to_string())
            }
            Value::Array(array) => Err(format!(
                "expected a 2-D array, found shape {:?}",
                array.shape()
            )),
            Value::List(_) | Value::Tuple(_) => {
                let rows = self
                    .sequence_items()
                    .unwrap_or_default()
                    .iter()
                    .enumerate()
                    .map(|(index, row)| {
                        row.to_vector().map_err(|reason| format!("row {index}: {reason}"))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                Matrix::from_rows(rows).ok_or_else(|| "rows have different lengths".to_string())
            }
            other => Err(format!("expected a 2-D numeric array, found {}", other.type_name())),
        }
    }
}
