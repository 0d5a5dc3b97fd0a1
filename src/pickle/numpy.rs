use super::Value;

const MULTIARRAY_MODULES: [&str; 2] = ["numpy.core.multiarray", "numpy._core.multiarray"];
const NUMERIC_MODULES: [&str; 2] = ["numpy.core.numeric", "numpy._core.numeric"];

pub fn is_multiarray_module(module: &str) -> bool {
    MULTIARRAY_MODULES.contains(&module)
}

/// Home of `_frombuffer`, which protocol 5 pickles use for contiguous arrays.
pub fn is_numeric_module(module: &str) -> bool {
    NUMERIC_MODULES.contains(&module)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    UInt,
    Bool,
}

/// numpy dtype as pickled by `numpy.dtype(code, align, copy)` plus its `BUILD` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dtype {
    code: String,
    layout: Option<(ScalarKind, usize)>,
    big_endian: bool,
}

impl Dtype {
    pub fn from_code(code: &str) -> Self {
        let big_endian = code.starts_with('>');
        let trimmed = code.trim_start_matches(['<', '>', '|', '=']);
        let mut chars = trimmed.chars();
        let kind = chars.next();
        let size = chars.as_str().parse::<usize>().ok();
        let layout = match (kind, size) {
            (Some('f'), Some(size @ (2 | 4 | 8))) => Some((ScalarKind::Float, size)),
            (Some('i'), Some(size @ (1 | 2 | 4 | 8))) => Some((ScalarKind::Int, size)),
            (Some('u'), Some(size @ (1 | 2 | 4 | 8))) => Some((ScalarKind::UInt, size)),
            (Some('b'), Some(1)) => Some((ScalarKind::Bool, 1)),
            _ => None,
        };
        Self {
            code: code.to_string(),
            layout,
            big_endian,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_object(&self) -> bool {
        self.code.trim_start_matches(['<', '>', '|', '=']).starts_with('O')
    }

    pub fn layout(&self) -> Option<(ScalarKind, usize)> {
        self.layout
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Applies `(version, byteorder, subarray, names, fields, elsize, alignment, flags)`.
    pub fn apply_state(&mut self, state: &Value) {
        let Some(items) = state.sequence_items() else {
            return;
        };
        match items.get(1).and_then(Value::as_str) {
            Some(">") => self.big_endian = true,
            Some("<") => self.big_endian = false,
            _ => {}
        }
        let has_subarray = items.get(2).map(|value| !value.is_none()).unwrap_or(false);
        let has_fields = items.get(4).map(|value| !value.is_none()).unwrap_or(false);
        if has_subarray || has_fields {
            self.layout = None;
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Option<Vec<f64>> {
        let (kind, size) = self.layout?;
        if raw.len() % size != 0 {
            return None;
        }
        Some(
            raw.chunks_exact(size)
                .map(|chunk| decode_element(kind, size, self.big_endian, chunk))
                .collect(),
        )
    }
}

fn decode_element(kind: ScalarKind, size: usize, big_endian: bool, chunk: &[u8]) -> f64 {
    let mut bytes = [0u8; 8];
    bytes[..size].copy_from_slice(chunk);
    if big_endian {
        bytes[..size].reverse();
    }
    match (kind, size) {
        (ScalarKind::Float, 2) => f16_to_f64(u16::from_le_bytes([bytes[0], bytes[1]])),
        (ScalarKind::Float, 4) => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
        (ScalarKind::Float, _) => f64::from_le_bytes(bytes),
        (ScalarKind::Bool, _) => {
            if bytes[0] != 0 {
                1.0
            } else {
                0.0
            }
        }
        (ScalarKind::UInt, _) => u64::from_le_bytes(bytes) as f64,
        (ScalarKind::Int, _) => {
            let shift = 64 - 8 * size as u32;
            ((i64::from_le_bytes(bytes) << shift) >> shift) as f64
        }
    }
}

fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f64::from(bits & 0x03ff);
    match exponent {
        0 => sign * mantissa * 2f64.powi(-24),
        0x1f if mantissa == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f64.powi(exponent - 15),
    }
}

/// ndarray with its elements widened to `f64`, stored in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        (element_count(&shape).ok() == Some(data.len())).then_some(Self { shape, data })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Reconstructs an ndarray from the state passed to `ndarray.__setstate__`.
///
/// `Ok(None)` means the array is well formed but uses a dtype that has no
/// numeric reading (strings, records, datetimes...).
pub fn build_array(state: &Value) -> Result<Option<NdArray>, String> {
    let items = state
        .sequence_items()
        .ok_or_else(|| format!("ndarray state is a {}, not a tuple", state.type_name()))?;
    let items = match items.len() {
        5 => &items[1..],
        4 => items,
        len => return Err(format!("unexpected ndarray state with {len} items")),
    };

    let shape = parse_shape(&items[0])?;
    let Value::Dtype(dtype) = &items[1] else {
        return Ok(None);
    };
    let fortran_order = items[2].as_bool().unwrap_or(false);
    let count = element_count(&shape)?;

    let data = match &items[3] {
        Value::Bytes(raw) => match decode_buffer(&shape, dtype, raw)? {
            Some(values) => values,
            None => return Ok(None),
        },
        Value::Str(text) => {
            let raw = text.chars().map(|ch| ch as u32 as u8).collect::<Vec<_>>();
            match dtype.decode(&raw) {
                Some(values) if values.len() == count => values,
                _ => return Ok(None),
            }
        }
        Value::List(values) if dtype.is_object() => {
            match values.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
                Some(values) if values.len() == count => values,
                _ => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    Ok(into_array(shape, data, fortran_order))
}

/// Decodes `numpy.core.numeric._frombuffer(buffer, dtype, shape, order)`.
pub fn build_from_buffer(args: &Value) -> Result<Option<NdArray>, String> {
    let items = args
        .sequence_items()
        .ok_or_else(|| format!("_frombuffer arguments are a {}, not a tuple", args.type_name()))?;
    let [buffer, dtype, shape, order] = items else {
        return Err(format!("_frombuffer takes 4 arguments, found {}", items.len()));
    };
    let shape = parse_shape(shape)?;
    let (Value::Dtype(dtype), Value::Bytes(raw)) = (dtype, buffer) else {
        return Ok(None);
    };
    let Some(data) = decode_buffer(&shape, dtype, raw)? else {
        return Ok(None);
    };
    Ok(into_array(shape, data, order.as_str() == Some("F")))
}

fn parse_shape(value: &Value) -> Result<Vec<usize>, String> {
    value
        .sequence_items()
        .ok_or_else(|| "ndarray shape is not a tuple".to_string())?
        .iter()
        .map(|dim| {
            dim.as_usize()
                .ok_or_else(|| format!("invalid ndarray dimension: {dim:?}"))
        })
        .collect()
}

fn element_count(shape: &[usize]) -> Result<usize, String> {
    shape
        .iter()
        .try_fold(1usize, |count, dim| count.checked_mul(*dim))
        .ok_or_else(|| format!("ndarray shape {shape:?} overflows"))
}

/// Raw element bytes; the length must match the shape exactly.
fn decode_buffer(shape: &[usize], dtype: &Dtype, raw: &[u8]) -> Result<Option<Vec<f64>>, String> {
    let Some((_, size)) = dtype.layout() else {
        return Ok(None);
    };
    let expected = element_count(shape)?
        .checked_mul(size)
        .ok_or_else(|| format!("ndarray shape {shape:?} overflows"))?;
    if raw.len() != expected {
        return Err(format!(
            "ndarray of shape {shape:?} and dtype {} needs {expected} bytes, found {}",
            dtype.code(),
            raw.len()
        ));
    }
    Ok(dtype.decode(raw))
}

fn into_array(shape: Vec<usize>, data: Vec<f64>, fortran_order: bool) -> Option<NdArray> {
    let data = if fortran_order && shape.len() > 1 {
        fortran_to_c_order(&shape, &data)
    } else {
        data
    };
    NdArray::new(shape, data)
}

fn fortran_to_c_order(shape: &[usize], data: &[f64]) -> Vec<f64> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1usize;
    for dim in shape {
        strides.push(stride);
        stride *= dim;
    }

    let mut index = vec![0usize; shape.len()];
    let mut ordered = Vec::with_capacity(data.len());
    for _ in 0..data.len() {
        let offset = index
            .iter()
            .zip(&strides)
            .map(|(position, stride)| position * stride)
            .sum::<usize>();
        ordered.push(data[offset]);
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    ordered
}

/// Decodes `numpy.core.multiarray.scalar(dtype, raw)`.
pub fn build_scalar(args: &Value) -> Option<Value> {
    let items = args.sequence_items()?;
    let Value::Dtype(dtype) = items.first()? else {
        return None;
    };
    if dtype.is_object() {
        return items.get(1).cloned();
    }
    let raw = match items.get(1)? {
        Value::Bytes(raw) => raw.clone(),
        Value::Str(text) => text.chars().map(|ch| ch as u32 as u8).collect(),
        _ => return None,
    };
    let (kind, _) = dtype.layout()?;
    let values = dtype.decode(&raw)?;
    let [value] = values.as_slice() else {
        return None;
    };
    Some(match kind {
        ScalarKind::Float => Value::Float(*value),
        ScalarKind::Int | ScalarKind::UInt => Value::Int(*value as i64),
        ScalarKind::Bool => Value::Bool(*value != 0.0),
    })
}
