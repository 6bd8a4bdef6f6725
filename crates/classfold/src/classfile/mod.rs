//! Class file container.
//!
//! Reads a `.class` file into an editable form and writes it back. Only the
//! constant pool and `Code` attributes are decoded; every other attribute is
//! carried as opaque bytes, so a class whose methods were not touched is
//! written back byte-for-byte.

mod code;
mod constant_pool;
pub mod descriptor;
mod reader;

pub use code::{
    parse_line_numbers, parse_local_variables, write_line_numbers, write_local_variables,
    CodeAttribute, ExceptionTableEntry, LineNumberEntry, LocalVariableEntry,
};
pub use constant_pool::{Constant, ConstantPool, PoolMark};
pub use reader::ByteReader;

use anyhow::{bail, ensure, Context, Result};
use reader::{put_u16, put_u32};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_STATIC: u16 = 0x0008;

/// Attribute with an undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub(crate) fn parse_list(r: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = r.u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = r.u16()?;
            let len = r.u32()? as usize;
            let info = r.bytes(len)?.to_vec();
            attributes.push(AttributeInfo { name_index, info });
        }
        Ok(attributes)
    }

    pub(crate) fn write_list(attributes: &[Self], out: &mut Vec<u8>) {
        put_u16(out, attributes.len() as u16);
        for attribute in attributes {
            put_u16(out, attribute.name_index);
            put_u32(out, attribute.info.len() as u32);
            out.extend_from_slice(&attribute.info);
        }
    }

    /// Attribute name, resolved through the constant pool.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Option<&'a str> {
        pool.utf8(self.name_index)
    }
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

pub type FieldInfo = MemberInfo;
pub type MethodInfo = MemberInfo;

impl MemberInfo {
    fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: AttributeInfo::parse_list(r)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.access_flags);
        put_u16(out, self.name_index);
        put_u16(out, self.descriptor_index);
        AttributeInfo::write_list(&self.attributes, out);
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Position of the `Code` attribute in `attributes`.
    pub fn code_index(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name(pool) == Some("Code"))
    }
}

/// An editable class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Parses a complete class file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32().context("reading magic")?;
        if magic != MAGIC {
            bail!("not a class file: bad magic 0x{:08X}", magic);
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r).context("reading constant pool")?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }

        let field_count = r.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for i in 0..field_count {
            fields.push(MemberInfo::parse(&mut r).with_context(|| format!("reading field {}", i))?);
        }

        let method_count = r.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for i in 0..method_count {
            methods
                .push(MemberInfo::parse(&mut r).with_context(|| format!("reading method {}", i))?);
        }

        let attributes = AttributeInfo::parse_list(&mut r).context("reading class attributes")?;
        ensure!(
            r.is_empty(),
            "{} trailing bytes after class file",
            bytes.len() - r.position()
        );

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serializes the class file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4096);
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.constant_pool.write(&mut out);
        put_u16(&mut out, self.access_flags);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u16(&mut out, *interface);
        }
        put_u16(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            field.write(&mut out);
        }
        put_u16(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            method.write(&mut out);
        }
        AttributeInfo::write_list(&self.attributes, &mut out);
        out
    }

    pub fn class_name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn method_name(&self, index: usize) -> Option<&str> {
        self.constant_pool.utf8(self.methods.get(index)?.name_index)
    }

    pub fn method_descriptor(&self, index: usize) -> Option<&str> {
        self.constant_pool
            .utf8(self.methods.get(index)?.descriptor_index)
    }

    /// Index of the first method with the given name.
    pub fn find_method(&self, name: &str) -> Option<usize> {
        (0..self.methods.len()).find(|&i| self.method_name(i) == Some(name))
    }

    /// Decoded `Code` attribute of a method; `None` for abstract and native
    /// methods.
    pub fn method_code(&self, index: usize) -> Result<Option<CodeAttribute>> {
        let method = self
            .methods
            .get(index)
            .with_context(|| format!("no method at index {}", index))?;
        let Some(at) = method.code_index(&self.constant_pool) else {
            return Ok(None);
        };
        let code = CodeAttribute::parse(&method.attributes[at].info)
            .with_context(|| format!("decoding Code of method {}", index))?;
        Ok(Some(code))
    }

    /// Replaces the `Code` attribute of a method.
    pub fn set_method_code(&mut self, index: usize, code: &CodeAttribute) -> Result<()> {
        let pool = &self.constant_pool;
        let method = self
            .methods
            .get_mut(index)
            .with_context(|| format!("no method at index {}", index))?;
        let at = method
            .code_index(pool)
            .with_context(|| format!("method {} has no Code attribute", index))?;
        method.attributes[at].info = code.to_info();
        Ok(())
    }
}
