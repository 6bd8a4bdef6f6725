//! The `Code` attribute and the debug tables nested inside it.

use super::reader::{put_u16, put_u32, ByteReader};
use super::AttributeInfo;
use anyhow::{ensure, Context, Result};

/// One row of a `Code` attribute's exception table (raw offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool index of the caught class, 0 for `finally`.
    pub catch_type: u16,
}

/// Decoded `Code` attribute. Instructions stay as raw bytes here; see
/// [`crate::bytecode::decode`] for the editable form.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code_len = r.u32()? as usize;
        ensure!(
            code_len > 0 && code_len < 65536,
            "invalid code length {}",
            code_len
        );
        let code = r.bytes(code_len).context("reading code bytes")?.to_vec();

        let table_len = r.u16()?;
        let mut exception_table = Vec::with_capacity(table_len as usize);
        for _ in 0..table_len {
            exception_table.push(ExceptionTableEntry {
                start_pc: r.u16()?,
                end_pc: r.u16()?,
                handler_pc: r.u16()?,
                catch_type: r.u16()?,
            });
        }

        let attributes = AttributeInfo::parse_list(&mut r).context("reading Code attributes")?;
        ensure!(r.is_empty(), "trailing bytes after Code attribute");
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Serializes the attribute body (everything after `attribute_length`).
    pub fn to_info(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u16(&mut out, self.exception_table.len() as u16);
        for entry in &self.exception_table {
            put_u16(&mut out, entry.start_pc);
            put_u16(&mut out, entry.end_pc);
            put_u16(&mut out, entry.handler_pc);
            put_u16(&mut out, entry.catch_type);
        }
        AttributeInfo::write_list(&self.attributes, &mut out);
        out
    }
}

/// `LineNumberTable` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line: u16,
}

pub fn parse_line_numbers(info: &[u8]) -> Result<Vec<LineNumberEntry>> {
    let mut r = ByteReader::new(info);
    let len = r.u16()?;
    let mut entries = Vec::with_capacity(len as usize);
    for _ in 0..len {
        entries.push(LineNumberEntry {
            start_pc: r.u16()?,
            line: r.u16()?,
        });
    }
    Ok(entries)
}

pub fn write_line_numbers(entries: &[LineNumberEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + entries.len() * 4);
    put_u16(&mut out, entries.len() as u16);
    for entry in entries {
        put_u16(&mut out, entry.start_pc);
        put_u16(&mut out, entry.line);
    }
    out
}

/// `LocalVariableTable` / `LocalVariableTypeTable` row. The two tables share
/// a layout; only the meaning of `descriptor` differs (descriptor vs.
/// generic signature).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: u16,
    pub descriptor: u16,
    pub slot: u16,
}

pub fn parse_local_variables(info: &[u8]) -> Result<Vec<LocalVariableEntry>> {
    let mut r = ByteReader::new(info);
    let len = r.u16()?;
    let mut entries = Vec::with_capacity(len as usize);
    for _ in 0..len {
        entries.push(LocalVariableEntry {
            start_pc: r.u16()?,
            length: r.u16()?,
            name: r.u16()?,
            descriptor: r.u16()?,
            slot: r.u16()?,
        });
    }
    Ok(entries)
}

pub fn write_local_variables(entries: &[LocalVariableEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + entries.len() * 10);
    put_u16(&mut out, entries.len() as u16);
    for entry in entries {
        put_u16(&mut out, entry.start_pc);
        put_u16(&mut out, entry.length);
        put_u16(&mut out, entry.name);
        put_u16(&mut out, entry.descriptor);
        put_u16(&mut out, entry.slot);
    }
    out
}
