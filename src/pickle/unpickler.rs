use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::rc::Rc;

use tracing::trace;

use super::Value;
use super::numpy::{self, Dtype};
use crate::error::AlphaPickleError;

const HIGHEST_PROTOCOL: u8 = 5;

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const PERSID: u8 = b'P';
    pub const BINPERSID: u8 = b'Q';
    pub const REDUCE: u8 = b'R';
    pub const STRING: u8 = b'S';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const UNICODE: u8 = b'V';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const INST: u8 = b'i';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const OBJ: u8 = b'o';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';

    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const EXT1: u8 = 0x82;
    pub const EXT2: u8 = 0x83;
    pub const EXT4: u8 = 0x84;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;

    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';

    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;

    pub const BYTEARRAY8: u8 = 0x96;
    pub const NEXT_BUFFER: u8 = 0x97;
    pub const READONLY_BUFFER: u8 = 0x98;
}

struct Slot {
    value: Value,
    memo_keys: Vec<u32>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            memo_keys: Vec::new(),
        }
    }
}

enum MemoEntry {
    OnStack,
    Value(Value),
}

/// Decodes consecutive pickles from one reader, like repeated `pickle.load` calls.
///
/// Memo entries of objects still on the stack are resolved lazily, so an object
/// memoized before being filled (containers) or built (`BUILD`) is seen in its
/// final state by later `GET`s.
pub struct Unpickler<R> {
    reader: R,
    stack: Vec<Slot>,
    marks: Vec<usize>,
    memo: HashMap<u32, MemoEntry>,
    offset: u64,
}

impl<R: BufRead> Unpickler<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            offset: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Decodes the next pickle; `Ok(None)` when the stream ends at a record boundary.
    pub fn load(&mut self) -> Result<Option<Value>, AlphaPickleError> {
        let at_end = match self.reader.fill_buf() {
            Ok(buf) => buf.is_empty(),
            Err(err) => return Err(AlphaPickleError::PickleDecode(format!("read failed: {err}"))),
        };
        if at_end {
            return Ok(None);
        }

        self.stack.clear();
        self.marks.clear();
        self.memo.clear();
        let start = self.offset;

        loop {
            let opcode = self.read_u8()?;
            if opcode == op::STOP {
                let value = self.pop()?;
                trace!(bytes = self.offset - start, "decoded pickle record");
                return Ok(Some(value));
            }
            self.dispatch(opcode)?;
        }
    }

    fn dispatch(&mut self, opcode: u8) -> Result<(), AlphaPickleError> {
        match opcode {
            op::PROTO => {
                let version = self.read_u8()?;
                if version > HIGHEST_PROTOCOL {
                    return Err(self.error(format!("unsupported pickle protocol {version}")));
                }
            }
            op::FRAME => {
                self.read_u64()?;
            }
            op::MARK => self.marks.push(self.stack.len()),
            op::POP => {
                if self.marks.last() == Some(&self.stack.len()) {
                    self.marks.pop();
                } else {
                    self.pop()?;
                }
            }
            op::POP_MARK => {
                self.pop_mark()?;
            }
            op::DUP => {
                let top = self
                    .stack
                    .last()
                    .ok_or_else(|| self.error("DUP on empty stack".to_string()))?;
                let slot = Slot {
                    value: top.value.clone(),
                    memo_keys: top.memo_keys.clone(),
                };
                self.stack.push(slot);
            }

            op::NONE => self.push(Value::None),
            op::NEWTRUE => self.push(Value::Bool(true)),
            op::NEWFALSE => self.push(Value::Bool(false)),
            op::INT => {
                let line = self.read_line()?;
                let value = match line.as_str() {
                    "00" => Value::Bool(false),
                    "01" => Value::Bool(true),
                    text => parse_int_text(text)
                        .ok_or_else(|| self.error(format!("invalid INT literal {text:?}")))?,
                };
                self.push(value);
            }
            op::LONG => {
                let line = self.read_line()?;
                let text = line.trim_end_matches('L');
                let value = parse_int_text(text)
                    .ok_or_else(|| self.error(format!("invalid LONG literal {line:?}")))?;
                self.push(value);
            }
            op::BININT => {
                let value = i32::from_le_bytes(self.read_array::<4>()?);
                self.push(Value::Int(i64::from(value)));
            }
            op::BININT1 => {
                let value = self.read_u8()?;
                self.push(Value::Int(i64::from(value)));
            }
            op::BININT2 => {
                let value = u16::from_le_bytes(self.read_array::<2>()?);
                self.push(Value::Int(i64::from(value)));
            }
            op::LONG1 => {
                let len = usize::from(self.read_u8()?);
                let bytes = self.read_bytes(len as u64)?;
                self.push(decode_long(&bytes));
            }
            op::LONG4 => {
                let len = i32::from_le_bytes(self.read_array::<4>()?);
                let len = u64::try_from(len)
                    .map_err(|_| self.error("negative LONG4 length".to_string()))?;
                let bytes = self.read_bytes(len)?;
                self.push(decode_long(&bytes));
            }
            op::FLOAT => {
                let line = self.read_line()?;
                let value = line
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid FLOAT literal {line:?}")))?;
                self.push(Value::Float(value));
            }
            op::BINFLOAT => {
                let value = f64::from_be_bytes(self.read_array::<8>()?);
                self.push(Value::Float(value));
            }

            op::STRING => {
                let line = self.read_line()?;
                let bytes = unquote_string(&line)
                    .ok_or_else(|| self.error(format!("invalid STRING literal {line:?}")))?;
                self.push(Value::Str(latin1(&bytes)));
            }
            op::BINSTRING => {
                let len = i32::from_le_bytes(self.read_array::<4>()?);
                let len = u64::try_from(len)
                    .map_err(|_| self.error("negative BINSTRING length".to_string()))?;
                let bytes = self.read_bytes(len)?;
                self.push(Value::Str(latin1(&bytes)));
            }
            op::SHORT_BINSTRING => {
                let len = u64::from(self.read_u8()?);
                let bytes = self.read_bytes(len)?;
                self.push(Value::Str(latin1(&bytes)));
            }
            op::UNICODE => {
                let line = self.read_line()?;
                let text = decode_raw_unicode_escape(&line)
                    .ok_or_else(|| self.error(format!("invalid UNICODE literal {line:?}")))?;
                self.push(Value::Str(text));
            }
            op::SHORT_BINUNICODE => {
                let len = u64::from(self.read_u8()?);
                let text = self.read_utf8(len)?;
                self.push(Value::Str(text));
            }
            op::BINUNICODE => {
                let len = u64::from(u32::from_le_bytes(self.read_array::<4>()?));
                let text = self.read_utf8(len)?;
                self.push(Value::Str(text));
            }
            op::BINUNICODE8 => {
                let len = self.read_u64()?;
                let text = self.read_utf8(len)?;
                self.push(Value::Str(text));
            }
            op::SHORT_BINBYTES => {
                let len = u64::from(self.read_u8()?);
                let bytes = self.read_bytes(len)?;
                self.push(Value::Bytes(bytes));
            }
            op::BINBYTES => {
                let len = u64::from(u32::from_le_bytes(self.read_array::<4>()?));
                let bytes = self.read_bytes(len)?;
                self.push(Value::Bytes(bytes));
            }
            op::BINBYTES8 | op::BYTEARRAY8 => {
                let len = self.read_u64()?;
                let bytes = self.read_bytes(len)?;
                self.push(Value::Bytes(bytes));
            }

            op::EMPTY_TUPLE => self.push(Value::Tuple(Rc::new(Vec::new()))),
            op::TUPLE => {
                let items = self.pop_mark()?;
                self.push(Value::Tuple(Rc::new(items)));
            }
            op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                let count = usize::from(opcode - op::TUPLE1 + 1);
                let items = self.pop_n(count)?;
                self.push(Value::Tuple(Rc::new(items)));
            }
            op::EMPTY_LIST => self.push(Value::List(Rc::new(Vec::new()))),
            op::LIST => {
                let items = self.pop_mark()?;
                self.push(Value::List(Rc::new(items)));
            }
            op::EMPTY_DICT => self.push(Value::Dict(Rc::new(Vec::new()))),
            op::DICT => {
                let items = self.pop_mark()?;
                let pairs = self.pairs(items)?;
                let mut dict = Value::Dict(Rc::new(Vec::new()));
                self.set_items(&mut dict, pairs)?;
                self.push(dict);
            }
            op::EMPTY_SET => self.push(Value::Set(Rc::new(Vec::new()))),
            op::FROZENSET => {
                let items = self.pop_mark()?;
                self.push(Value::Set(Rc::new(items)));
            }

            op::APPEND => {
                let value = self.pop()?;
                self.with_top(|this, target| this.append(target, vec![value]))?;
            }
            op::APPENDS => {
                let items = self.pop_mark()?;
                self.with_top(|this, target| this.append(target, items))?;
            }
            op::SETITEM => {
                let value = self.pop()?;
                let key = self.pop()?;
                self.with_top(|this, target| this.set_items(target, vec![(key, value)]))?;
            }
            op::SETITEMS => {
                let items = self.pop_mark()?;
                let pairs = self.pairs(items)?;
                self.with_top(|this, target| this.set_items(target, pairs))?;
            }
            op::ADDITEMS => {
                let items = self.pop_mark()?;
                self.with_top(|this, target| match target {
                    Value::Set(set) => {
                        Rc::make_mut(set).extend(items);
                        Ok(())
                    }
                    other => Err(this.error(format!("ADDITEMS on {}", other.type_name()))),
                })?;
            }

            op::GLOBAL => {
                let module = self.read_line()?;
                let name = self.read_line()?;
                self.push(Value::Global { module, name });
            }
            op::STACK_GLOBAL => {
                let name = self.pop()?;
                let module = self.pop()?;
                match (module, name) {
                    (Value::Str(module), Value::Str(name)) => {
                        self.push(Value::Global { module, name })
                    }
                    _ => return Err(self.error("STACK_GLOBAL expects two strings".to_string())),
                }
            }
            op::REDUCE => {
                let args = self.pop()?;
                let callable = self.pop()?;
                let value = self.reduce(callable, args)?;
                self.push(value);
            }
            op::NEWOBJ => {
                let args = self.pop()?;
                let class = self.pop()?;
                self.push(Value::object(class, args));
            }
            op::NEWOBJ_EX => {
                let _kwargs = self.pop()?;
                let args = self.pop()?;
                let class = self.pop()?;
                self.push(Value::object(class, args));
            }
            op::INST => {
                let module = self.read_line()?;
                let name = self.read_line()?;
                let args = self.pop_mark()?;
                let callable = Value::Global { module, name };
                let value = self.reduce(callable, Value::Tuple(Rc::new(args)))?;
                self.push(value);
            }
            op::OBJ => {
                let mut items = self.pop_mark()?;
                if items.is_empty() {
                    return Err(self.error("OBJ without a class".to_string()));
                }
                let class = items.remove(0);
                let value = self.reduce(class, Value::Tuple(Rc::new(items)))?;
                self.push(value);
            }
            op::BUILD => {
                let state = self.pop()?;
                self.with_top(|this, target| this.build(target, state))?;
            }

            op::PUT => {
                let line = self.read_line()?;
                let key = line
                    .parse::<u32>()
                    .map_err(|_| self.error(format!("invalid PUT index {line:?}")))?;
                self.memoize(key)?;
            }
            op::BINPUT => {
                let key = u32::from(self.read_u8()?);
                self.memoize(key)?;
            }
            op::LONG_BINPUT => {
                let key = u32::from_le_bytes(self.read_array::<4>()?);
                self.memoize(key)?;
            }
            op::MEMOIZE => {
                let key = u32::try_from(self.memo.len())
                    .map_err(|_| self.error("memo overflow".to_string()))?;
                self.memoize(key)?;
            }
            op::GET => {
                let line = self.read_line()?;
                let key = line
                    .parse::<u32>()
                    .map_err(|_| self.error(format!("invalid GET index {line:?}")))?;
                self.recall(key)?;
            }
            op::BINGET => {
                let key = u32::from(self.read_u8()?);
                self.recall(key)?;
            }
            op::LONG_BINGET => {
                let key = u32::from_le_bytes(self.read_array::<4>()?);
                self.recall(key)?;
            }

            op::PERSID | op::BINPERSID => {
                return Err(self.error("persistent ids are not supported".to_string()));
            }
            op::EXT1 | op::EXT2 | op::EXT4 => {
                return Err(self.error("extension registry codes are not supported".to_string()));
            }
            op::NEXT_BUFFER | op::READONLY_BUFFER => {
                return Err(self.error("out-of-band buffers are not supported".to_string()));
            }
            other => return Err(self.error(format!("unknown opcode 0x{other:02x}"))),
        }
        Ok(())
    }

    fn reduce(&self, callable: Value, args: Value) -> Result<Value, AlphaPickleError> {
        let (module, name) = match &callable {
            Value::Global { module, name } => (module.clone(), name.clone()),
            _ => return Ok(Value::object(callable, args)),
        };
        let items = args.sequence_items().unwrap_or_default().to_vec();

        let value = match (module.as_str(), name.as_str()) {
            ("numpy", "dtype") => match items.first() {
                Some(Value::Str(code)) => Value::Dtype(Dtype::from_code(code)),
                _ => Value::object(callable, args),
            },
            (module, "scalar") if numpy::is_multiarray_module(module) => {
                numpy::build_scalar(&args).unwrap_or_else(|| Value::object(callable, args))
            }
            (module, "_frombuffer") if numpy::is_numeric_module(module) => {
                match numpy::build_from_buffer(&args).map_err(|reason| self.error(reason))? {
                    Some(array) => Value::Array(Rc::new(array)),
                    None => Value::object(callable, args),
                }
            }
            ("_codecs", "encode") => match items.as_slice() {
                [Value::Str(text), Value::Str(encoding)] => {
                    Value::Bytes(encode_text(text, encoding))
                }
                [Value::Str(text)] => Value::Bytes(text.as_bytes().to_vec()),
                _ => Value::object(callable, args),
            },
            ("builtins" | "__builtin__", "set" | "frozenset") => match items.first() {
                Some(Value::List(values) | Value::Tuple(values) | Value::Set(values)) => {
                    Value::Set(values.clone())
                }
                None => Value::Set(Rc::new(Vec::new())),
                _ => Value::object(callable, args),
            },
            ("builtins" | "__builtin__", "bytes" | "bytearray") => match items.first() {
                Some(Value::Bytes(bytes)) => Value::Bytes(bytes.clone()),
                None => Value::Bytes(Vec::new()),
                _ => Value::object(callable, args),
            },
            _ => Value::object(callable, args),
        };
        Ok(value)
    }

    fn build(&self, target: &mut Value, state: Value) -> Result<(), AlphaPickleError> {
        let is_array = matches!(
            target,
            Value::Object(object) if is_array_constructor(&object.class)
        );
        if is_array {
            match numpy::build_array(&state) {
                Ok(Some(array)) => *target = Value::Array(Rc::new(array)),
                Ok(None) => {
                    if let Value::Object(object) = target {
                        Rc::make_mut(object).state = Some(state);
                    }
                }
                Err(reason) => return Err(self.error(reason)),
            }
            return Ok(());
        }

        match target {
            Value::Dtype(dtype) => dtype.apply_state(&state),
            Value::Object(object) => Rc::make_mut(object).state = Some(state),
            other => return Err(self.error(format!("BUILD on {}", other.type_name()))),
        }
        Ok(())
    }

    fn append(&self, target: &mut Value, items: Vec<Value>) -> Result<(), AlphaPickleError> {
        match target {
            Value::List(list) => Rc::make_mut(list).extend(items),
            Value::Object(object) => Rc::make_mut(object).list_items.extend(items),
            other => return Err(self.error(format!("APPEND on {}", other.type_name()))),
        }
        Ok(())
    }

    fn set_items(
        &self,
        target: &mut Value,
        pairs: Vec<(Value, Value)>,
    ) -> Result<(), AlphaPickleError> {
        let entries = match target {
            Value::Dict(dict) => Rc::make_mut(dict),
            Value::Object(object) => &mut Rc::make_mut(object).dict_items,
            other => return Err(self.error(format!("SETITEM on {}", other.type_name()))),
        };
        for (key, value) in pairs {
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(())
    }

    fn pairs(&self, items: Vec<Value>) -> Result<Vec<(Value, Value)>, AlphaPickleError> {
        if items.len() % 2 != 0 {
            return Err(self.error("odd number of items for a mapping".to_string()));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    fn with_top<F>(&mut self, f: F) -> Result<(), AlphaPickleError>
    where
        F: FnOnce(&Self, &mut Value) -> Result<(), AlphaPickleError>,
    {
        let mut slot = self
            .stack
            .pop()
            .ok_or_else(|| self.error("stack underflow".to_string()))?;
        let result = f(self, &mut slot.value);
        self.stack.push(slot);
        result
    }

    fn memoize(&mut self, key: u32) -> Result<(), AlphaPickleError> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| AlphaPickleError::PickleDecode("memoize on empty stack".to_string()))?;
        top.memo_keys.push(key);
        self.memo.insert(key, MemoEntry::OnStack);
        Ok(())
    }

    fn recall(&mut self, key: u32) -> Result<(), AlphaPickleError> {
        let value = match self.memo.get(&key) {
            Some(MemoEntry::Value(value)) => value.clone(),
            Some(MemoEntry::OnStack) => self
                .stack
                .iter()
                .rev()
                .find(|slot| slot.memo_keys.contains(&key))
                .map(|slot| slot.value.clone())
                .ok_or_else(|| self.error(format!("memo key {key} lost")))?,
            None => return Err(self.error(format!("memo key {key} not found"))),
        };
        self.stack.push(Slot {
            value,
            memo_keys: vec![key],
        });
        Ok(())
    }

    fn release(&mut self, slot: Slot) -> Value {
        for key in slot.memo_keys {
            self.memo.insert(key, MemoEntry::Value(slot.value.clone()));
        }
        slot.value
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Slot::new(value));
    }

    fn pop(&mut self) -> Result<Value, AlphaPickleError> {
        if self.marks.last().is_some_and(|mark| *mark >= self.stack.len()) {
            return Err(self.error("pop past mark".to_string()));
        }
        let slot = self
            .stack
            .pop()
            .ok_or_else(|| self.error("stack underflow".to_string()))?;
        Ok(self.release(slot))
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, AlphaPickleError> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() < floor + count {
            return Err(self.error("stack underflow".to_string()));
        }
        let slots = self.stack.split_off(self.stack.len() - count);
        Ok(slots.into_iter().map(|slot| self.release(slot)).collect())
    }

    fn pop_mark(&mut self) -> Result<Vec<Value>, AlphaPickleError> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| self.error("missing MARK".to_string()))?;
        if mark > self.stack.len() {
            return Err(self.error("corrupted MARK".to_string()));
        }
        let slots = self.stack.split_off(mark);
        Ok(slots.into_iter().map(|slot| self.release(slot)).collect())
    }

    fn read_u8(&mut self) -> Result<u8, AlphaPickleError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u64(&mut self) -> Result<u64, AlphaPickleError> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], AlphaPickleError> {
        let mut buf = [0u8; N];
        let result = self.reader.read_exact(&mut buf);
        result.map_err(|_| self.error("pickle data was truncated".to_string()))?;
        self.offset += N as u64;
        Ok(buf)
    }

    fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, AlphaPickleError> {
        let mut buf = Vec::new();
        let result = (&mut self.reader).take(len).read_to_end(&mut buf);
        let read = result.map_err(|err| self.error(format!("read failed: {err}")))?;
        self.offset += read as u64;
        if (read as u64) < len {
            return Err(self.error("pickle data was truncated".to_string()));
        }
        Ok(buf)
    }

    fn read_utf8(&mut self, len: u64) -> Result<String, AlphaPickleError> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| self.error("invalid UTF-8 string".to_string()))
    }

    fn read_line(&mut self) -> Result<String, AlphaPickleError> {
        let mut buf = Vec::new();
        let result = self.reader.read_until(b'\n', &mut buf);
        let read = result.map_err(|err| self.error(format!("read failed: {err}")))?;
        self.offset += read as u64;
        if buf.pop() != Some(b'\n') {
            return Err(self.error("pickle data was truncated".to_string()));
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(latin1(&buf))
    }

    fn error(&self, message: String) -> AlphaPickleError {
        AlphaPickleError::PickleDecode(format!("{message} (byte {})", self.offset))
    }
}

fn is_array_constructor(class: &Value) -> bool {
    matches!(
        class,
        Value::Global { module, name }
            if name == "_reconstruct" && numpy::is_multiarray_module(module)
    )
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| char::from(*byte)).collect()
}

fn encode_text(text: &str, encoding: &str) -> Vec<u8> {
    match encoding.to_ascii_lowercase().as_str() {
        "latin1" | "latin-1" | "iso-8859-1" => text.chars().map(|ch| ch as u32 as u8).collect(),
        _ => text.as_bytes().to_vec(),
    }
}

fn parse_int_text(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(Value::Int(value));
    }
    text.parse::<f64>()
        .ok()
        .filter(|_| text.chars().all(|ch| ch.is_ascii_digit() || ch == '-' || ch == '+'))
        .map(Value::Float)
}

/// Little-endian two's complement integer; values beyond `i64` widen to `f64`.
fn decode_long(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Int(0);
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    if bytes.len() <= 8 {
        let fill = if negative { 0xff } else { 0x00 };
        let mut buf = [fill; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        return Value::Int(i64::from_le_bytes(buf));
    }
    let magnitude = bytes
        .iter()
        .rev()
        .fold(0.0f64, |acc, byte| acc * 256.0 + f64::from(*byte));
    let value = if negative {
        magnitude - 256f64.powi(bytes.len() as i32)
    } else {
        magnitude
    };
    Value::Float(value)
}

/// Parses a protocol 0 `repr()` string literal.
fn unquote_string(line: &str) -> Option<Vec<u8>> {
    let quote = line.chars().next().filter(|ch| *ch == '\'' || *ch == '"')?;
    let inner = line.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch as u32 as u8);
            continue;
        }
        match chars.next()? {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            '0' => out.push(0),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(u8::from_str_radix(&hex, 16).ok()?);
            }
            other => out.push(other as u32 as u8),
        }
    }
    Some(out)
}

fn decode_raw_unicode_escape(line: &str) -> Option<String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        let width = match (ch, chars.peek()) {
            ('\\', Some('u')) => 4,
            ('\\', Some('U')) => 8,
            _ => {
                out.push(ch);
                continue;
            }
        };
        chars.next();
        let hex: String = chars.by_ref().take(width).collect();
        let code = u32::from_str_radix(&hex, 16).ok()?;
        out.push(char::from_u32(code)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn load_one(bytes: &[u8]) -> Value {
        Unpickler::new(Cursor::new(bytes.to_vec()))
            .load()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn protocol_zero_literals() {
        // pickle.dumps([1, 2.5, 'ab'], protocol=0)
        let value = load_one(b"(lp0\nI1\naF2.5\naVab\np1\na.");
        assert_eq!(
            value,
            Value::List(Rc::new(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Str("ab".to_string()),
            ]))
        );
    }

    #[test]
    fn memo_sees_filled_container() {
        // x = [7]; pickle.dumps((x, x), protocol=2)
        let value = load_one(b"\x80\x02]q\x00K\x07ah\x00\x86q\x01.");
        let inner = Value::List(Rc::new(vec![Value::Int(7)]));
        assert_eq!(value, Value::Tuple(Rc::new(vec![inner.clone(), inner])));
    }

    #[test]
    fn empty_bytes_from_protocol_two() {
        // pickle.dumps(b'', protocol=2)
        let value = load_one(b"\x80\x02c__builtin__\nbytes\nq\x00)Rq\x01.");
        assert_eq!(value, Value::Bytes(Vec::new()));
    }

    #[test]
    fn long1_sign_extension() {
        assert_eq!(decode_long(&[0xff]), Value::Int(-1));
        assert_eq!(decode_long(&[0x00, 0x01]), Value::Int(256));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let mut unpickler = Unpickler::new(Cursor::new(vec![0xffu8]));
        assert!(matches!(
            unpickler.load(),
            Err(AlphaPickleError::PickleDecode(_))
        ));
    }

    #[test]
    fn escaped_strings() {
        assert_eq!(unquote_string("'a\\'b\\x41'"), Some(b"a'bA".to_vec()));
        assert_eq!(decode_raw_unicode_escape("\\u00c5x").as_deref(), Some("Åx"));
    }
}
