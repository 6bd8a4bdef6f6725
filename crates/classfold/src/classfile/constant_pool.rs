//! Constant pool: structural decode, deduplicating append, re-encode.

use super::reader::{put_u16, put_u32, ByteReader};
use crate::bytecode::Value;
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Modified UTF-8, kept as raw bytes so it round-trips exactly.
    Utf8(Vec<u8>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Long and double entries take two pool indices.
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Dedup key for numeric constants; floats are compared by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NumericKey {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
}

impl From<Value> for NumericKey {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(v) => NumericKey::Int(v),
            Value::Long(v) => NumericKey::Long(v),
            Value::Float(v) => NumericKey::Float(v.to_bits()),
            Value::Double(v) => NumericKey::Double(v.to_bits()),
        }
    }
}

/// Position in the pool that [`ConstantPool::rollback`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMark(usize);

/// The constant pool of a class.
///
/// Index 0 is never valid; the index after a long or double entry is an
/// unusable placeholder (`None`).
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
    numeric: HashMap<NumericKey, u16>,
    utf8: HashMap<Vec<u8>, u16>,
}

impl ConstantPool {
    /// An empty pool (only the reserved index 0).
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            numeric: HashMap::new(),
            utf8: HashMap::new(),
        }
    }

    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.u16().context("reading constant_pool_count")?;
        ensure!(count >= 1, "constant_pool_count must be at least 1");
        let mut pool = Self::new();
        while pool.entries.len() < count as usize {
            let index = pool.entries.len();
            let constant = parse_constant(r)
                .with_context(|| format!("reading constant pool entry {}", index))?;
            pool.insert(constant);
        }
        ensure!(
            pool.entries.len() == count as usize,
            "long/double entry overruns constant_pool_count {}",
            count
        );
        Ok(pool)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.entries.len() as u16);
        for constant in self.entries.iter().flatten() {
            write_constant(constant, out);
        }
    }

    /// `constant_pool_count`: one more than the highest usable index.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)?.as_ref()
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Value of an `Integer`, `Float`, `Long` or `Double` entry.
    pub fn numeric(&self, index: u16) -> Option<Value> {
        match *self.get(index)? {
            Constant::Integer(v) => Some(Value::Int(v)),
            Constant::Float(v) => Some(Value::Float(v)),
            Constant::Long(v) => Some(Value::Long(v)),
            Constant::Double(v) => Some(Value::Double(v)),
            _ => None,
        }
    }

    /// Name of a `Class` entry.
    pub fn class_name(&self, index: u16) -> Option<&str> {
        match *self.get(index)? {
            Constant::Class(name) => self.utf8(name),
            _ => None,
        }
    }

    /// Descriptor of the field, method or call site a member reference names.
    pub fn member_descriptor(&self, index: u16) -> Option<&str> {
        let name_and_type = match *self.get(index)? {
            Constant::FieldRef { name_and_type, .. }
            | Constant::MethodRef { name_and_type, .. }
            | Constant::InterfaceMethodRef { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. }
            | Constant::Dynamic { name_and_type, .. } => name_and_type,
            _ => return None,
        };
        match *self.get(name_and_type)? {
            Constant::NameAndType { descriptor, .. } => self.utf8(descriptor),
            _ => None,
        }
    }

    /// Index of an existing entry equal to `value`, or a newly appended one.
    pub fn add_numeric(&mut self, value: Value) -> Result<u16> {
        if let Some(&index) = self.numeric.get(&NumericKey::from(value)) {
            return Ok(index);
        }
        let constant = match value {
            Value::Int(v) => Constant::Integer(v),
            Value::Long(v) => Constant::Long(v),
            Value::Float(v) => Constant::Float(v),
            Value::Double(v) => Constant::Double(v),
        };
        self.append(constant)
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add_numeric(Value::Int(value))
    }

    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.add_numeric(Value::Long(value))
    }

    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        self.add_numeric(Value::Float(value))
    }

    pub fn add_double(&mut self, value: f64) -> Result<u16> {
        self.add_numeric(Value::Double(value))
    }

    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        if let Some(&index) = self.utf8.get(text.as_bytes()) {
            return Ok(index);
        }
        self.append(Constant::Utf8(text.as_bytes().to_vec()))
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let existing = self
            .entries
            .iter()
            .position(|c| c.as_ref() == Some(&Constant::Class(name)));
        match existing {
            Some(index) => Ok(index as u16),
            None => self.append(Constant::Class(name)),
        }
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.append(Constant::NameAndType { name, descriptor })
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.append(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.append(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Current end of the pool.
    pub fn mark(&self) -> PoolMark {
        PoolMark(self.entries.len())
    }

    /// Drops every entry appended after `mark`.
    pub fn rollback(&mut self, mark: PoolMark) {
        if mark.0 >= self.entries.len() {
            return;
        }
        self.entries.truncate(mark.0.max(1));
        self.numeric.retain(|_, index| (*index as usize) < mark.0);
        self.utf8.retain(|_, index| (*index as usize) < mark.0);
    }

    fn append(&mut self, constant: Constant) -> Result<u16> {
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            bail!("constant pool is full ({} entries)", self.entries.len());
        }
        Ok(self.insert(constant))
    }

    fn insert(&mut self, constant: Constant) -> u16 {
        let index = self.entries.len() as u16;
        match &constant {
            Constant::Integer(v) => {
                self.numeric.entry(NumericKey::Int(*v)).or_insert(index);
            }
            Constant::Long(v) => {
                self.numeric.entry(NumericKey::Long(*v)).or_insert(index);
            }
            Constant::Float(v) => {
                self.numeric
                    .entry(NumericKey::Float(v.to_bits()))
                    .or_insert(index);
            }
            Constant::Double(v) => {
                self.numeric
                    .entry(NumericKey::Double(v.to_bits()))
                    .or_insert(index);
            }
            Constant::Utf8(bytes) => {
                self.utf8.entry(bytes.clone()).or_insert(index);
            }
            _ => {}
        }
        let wide = constant.is_wide();
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        index
    }
}

fn parse_constant(r: &mut ByteReader<'_>) -> Result<Constant> {
    let tag = r.u8()?;
    Ok(match tag {
        TAG_UTF8 => {
            let len = r.u16()? as usize;
            Constant::Utf8(r.bytes(len)?.to_vec())
        }
        TAG_INTEGER => Constant::Integer(r.i32()?),
        TAG_FLOAT => Constant::Float(f32::from_bits(r.u32()?)),
        TAG_LONG => Constant::Long(r.u64()? as i64),
        TAG_DOUBLE => Constant::Double(f64::from_bits(r.u64()?)),
        TAG_CLASS => Constant::Class(r.u16()?),
        TAG_STRING => Constant::String(r.u16()?),
        TAG_FIELDREF => Constant::FieldRef {
            class: r.u16()?,
            name_and_type: r.u16()?,
        },
        TAG_METHODREF => Constant::MethodRef {
            class: r.u16()?,
            name_and_type: r.u16()?,
        },
        TAG_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
            class: r.u16()?,
            name_and_type: r.u16()?,
        },
        TAG_NAME_AND_TYPE => Constant::NameAndType {
            name: r.u16()?,
            descriptor: r.u16()?,
        },
        TAG_METHOD_HANDLE => Constant::MethodHandle {
            kind: r.u8()?,
            reference: r.u16()?,
        },
        TAG_METHOD_TYPE => Constant::MethodType(r.u16()?),
        TAG_DYNAMIC => Constant::Dynamic {
            bootstrap: r.u16()?,
            name_and_type: r.u16()?,
        },
        TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap: r.u16()?,
            name_and_type: r.u16()?,
        },
        TAG_MODULE => Constant::Module(r.u16()?),
        TAG_PACKAGE => Constant::Package(r.u16()?),
        _ => bail!("unknown constant pool tag {}", tag),
    })
}

fn write_constant(constant: &Constant, out: &mut Vec<u8>) {
    let pair = |out: &mut Vec<u8>, tag: u8, a: u16, b: u16| {
        out.push(tag);
        put_u16(out, a);
        put_u16(out, b);
    };
    match *constant {
        Constant::Utf8(ref bytes) => {
            out.push(TAG_UTF8);
            put_u16(out, bytes.len() as u16);
            out.extend_from_slice(bytes);
        }
        Constant::Integer(v) => {
            out.push(TAG_INTEGER);
            put_u32(out, v as u32);
        }
        Constant::Float(v) => {
            out.push(TAG_FLOAT);
            put_u32(out, v.to_bits());
        }
        Constant::Long(v) => {
            out.push(TAG_LONG);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Constant::Double(v) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Constant::Class(name) => {
            out.push(TAG_CLASS);
            put_u16(out, name);
        }
        Constant::String(text) => {
            out.push(TAG_STRING);
            put_u16(out, text);
        }
        Constant::FieldRef {
            class,
            name_and_type,
        } => pair(out, TAG_FIELDREF, class, name_and_type),
        Constant::MethodRef {
            class,
            name_and_type,
        } => pair(out, TAG_METHODREF, class, name_and_type),
        Constant::InterfaceMethodRef {
            class,
            name_and_type,
        } => pair(out, TAG_INTERFACE_METHODREF, class, name_and_type),
        Constant::NameAndType { name, descriptor } => {
            pair(out, TAG_NAME_AND_TYPE, name, descriptor)
        }
        Constant::MethodHandle { kind, reference } => {
            out.push(TAG_METHOD_HANDLE);
            out.push(kind);
            put_u16(out, reference);
        }
        Constant::MethodType(descriptor) => {
            out.push(TAG_METHOD_TYPE);
            put_u16(out, descriptor);
        }
        Constant::Dynamic {
            bootstrap,
            name_and_type,
        } => pair(out, TAG_DYNAMIC, bootstrap, name_and_type),
        Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } => pair(out, TAG_INVOKE_DYNAMIC, bootstrap, name_and_type),
        Constant::Module(name) => {
            out.push(TAG_MODULE);
            put_u16(out, name);
        }
        Constant::Package(name) => {
            out.push(TAG_PACKAGE);
            put_u16(out, name);
        }
    }
}
