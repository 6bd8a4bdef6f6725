//! A method body in editable form.
//!
//! [`MethodBody`] owns the instruction stream together with every table that
//! points into it. Those tables hold [`InsnId`]s instead of byte offsets, so
//! instructions can be replaced and removed freely; offsets are only
//! materialized again by [`MethodBody::to_code`].

use super::decode::decode;
use super::encode::encode;
use super::list::InsnList;
use super::types::InsnId;
use crate::classfile::{
    parse_line_numbers, parse_local_variables, write_line_numbers, write_local_variables,
    AttributeInfo, CodeAttribute, ConstantPool, ExceptionTableEntry, LineNumberEntry,
    LocalVariableEntry,
};
use anyhow::{ensure, Context, Result};
use std::collections::{HashMap, HashSet};

/// Attributes whose contents describe stack frames or instruction offsets
/// that edits invalidate.
const VERIFICATION_ATTRIBUTES: [&str; 3] = [
    "StackMapTable",
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
];

/// Exception table row. `end == None` means the range runs to the end of
/// the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    pub start: InsnId,
    pub end: Option<InsnId>,
    pub handler: InsnId,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start: InsnId,
    pub line: u16,
}

/// Local variable (or local variable type) table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: InsnId,
    pub end: Option<InsnId>,
    pub name: u16,
    pub descriptor: u16,
    pub slot: u16,
}

/// An attribute nested in `Code`.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeAttr {
    LineNumbers {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    /// `LocalVariableTable`, or `LocalVariableTypeTable` when `typed`.
    LocalVariables {
        name_index: u16,
        typed: bool,
        entries: Vec<LocalVariable>,
    },
    /// Offset-dependent verification data, dropped after any edit.
    Verification(AttributeInfo),
    Opaque(AttributeInfo),
}

/// Decoded `Code` attribute.
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub insns: InsnList,
    pub handlers: Vec<Handler>,
    pub attributes: Vec<CodeAttr>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl MethodBody {
    pub fn from_code(code: &CodeAttribute, pool: &ConstantPool) -> Result<Self> {
        let insns = decode(&code.code)?;
        let code_len = code.code.len() as u32;
        let at = |offset: u16| -> Result<InsnId> {
            insns
                .id_at_offset(offset as u32)
                .with_context(|| format!("offset {} is not an instruction boundary", offset))
        };
        let end_at = |offset: u32| -> Result<Option<InsnId>> {
            if offset == code_len {
                Ok(None)
            } else {
                insns
                    .id_at_offset(offset)
                    .map(Some)
                    .with_context(|| format!("offset {} is not an instruction boundary", offset))
            }
        };

        let mut handlers = Vec::with_capacity(code.exception_table.len());
        for entry in &code.exception_table {
            handlers.push(Handler {
                start: at(entry.start_pc).context("exception table start")?,
                end: end_at(entry.end_pc as u32).context("exception table end")?,
                handler: at(entry.handler_pc).context("exception handler")?,
                catch_type: entry.catch_type,
            });
        }

        let mut attributes = Vec::with_capacity(code.attributes.len());
        for attribute in &code.attributes {
            let name = attribute.name(pool).unwrap_or_default();
            let decoded = match name {
                "LineNumberTable" => {
                    let mut entries = Vec::new();
                    for e in parse_line_numbers(&attribute.info)? {
                        entries.push(LineNumber {
                            start: at(e.start_pc).context("LineNumberTable")?,
                            line: e.line,
                        });
                    }
                    CodeAttr::LineNumbers {
                        name_index: attribute.name_index,
                        entries,
                    }
                }
                "LocalVariableTable" | "LocalVariableTypeTable" => {
                    let mut entries = Vec::new();
                    for e in parse_local_variables(&attribute.info)? {
                        entries.push(LocalVariable {
                            start: at(e.start_pc).with_context(|| name.to_string())?,
                            end: end_at(e.start_pc as u32 + e.length as u32)
                                .with_context(|| name.to_string())?,
                            name: e.name,
                            descriptor: e.descriptor,
                            slot: e.slot,
                        });
                    }
                    CodeAttr::LocalVariables {
                        name_index: attribute.name_index,
                        typed: name == "LocalVariableTypeTable",
                        entries,
                    }
                }
                _ if VERIFICATION_ATTRIBUTES.contains(&name) => {
                    CodeAttr::Verification(attribute.clone())
                }
                _ => CodeAttr::Opaque(attribute.clone()),
            };
            attributes.push(decoded);
        }

        Ok(Self {
            insns,
            handlers,
            attributes,
            max_stack: code.max_stack,
            max_locals: code.max_locals,
        })
    }

    /// Lays out and encodes the body.
    pub fn to_code(&mut self) -> Result<CodeAttribute> {
        self.insns.layout();
        let code = encode(&self.insns)?;
        let code_len = code.len() as u32;
        let offsets: HashMap<InsnId, u32> =
            self.insns.iter().map(|n| (n.id, n.offset)).collect();
        let offset = |id: InsnId| -> Result<u16> {
            let at = offsets
                .get(&id)
                .with_context(|| format!("reference to removed instruction {}", id))?;
            Ok(*at as u16)
        };
        let end_offset = |id: Option<InsnId>| -> Result<u32> {
            match id {
                Some(id) => offset(id).map(u32::from),
                None => Ok(code_len),
            }
        };

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for h in &self.handlers {
            let start_pc = offset(h.start)?;
            let end_pc = end_offset(h.end)?;
            ensure!(
                (start_pc as u32) < end_pc,
                "empty exception range at {}",
                start_pc
            );
            exception_table.push(ExceptionTableEntry {
                start_pc,
                end_pc: end_pc as u16,
                handler_pc: offset(h.handler)?,
                catch_type: h.catch_type,
            });
        }

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            let info = match attribute {
                CodeAttr::LineNumbers {
                    name_index,
                    entries,
                } => {
                    let mut rows = Vec::with_capacity(entries.len());
                    for e in entries {
                        rows.push(LineNumberEntry {
                            start_pc: offset(e.start)?,
                            line: e.line,
                        });
                    }
                    AttributeInfo {
                        name_index: *name_index,
                        info: write_line_numbers(&rows),
                    }
                }
                CodeAttr::LocalVariables {
                    name_index,
                    entries,
                    ..
                } => {
                    let mut rows = Vec::with_capacity(entries.len());
                    for e in entries {
                        let start_pc = offset(e.start)?;
                        let end = end_offset(e.end)?;
                        ensure!(
                            end >= start_pc as u32,
                            "local variable range ends before it starts"
                        );
                        rows.push(LocalVariableEntry {
                            start_pc,
                            length: (end - start_pc as u32) as u16,
                            name: e.name,
                            descriptor: e.descriptor,
                            slot: e.slot,
                        });
                    }
                    AttributeInfo {
                        name_index: *name_index,
                        info: write_local_variables(&rows),
                    }
                }
                CodeAttr::Verification(raw) | CodeAttr::Opaque(raw) => raw.clone(),
            };
            attributes.push(info);
        }

        Ok(CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Points every branch, handler bound and debug entry at the live
    /// instruction its id was redirected to.
    pub fn resolve_references(&mut self) {
        self.insns.retarget();
        let insns = &self.insns;
        let end = |id: Option<InsnId>| id.map(|id| insns.resolve(id));
        for h in &mut self.handlers {
            h.start = insns.resolve(h.start);
            h.end = end(h.end);
            h.handler = insns.resolve(h.handler);
        }
        for attribute in &mut self.attributes {
            match attribute {
                CodeAttr::LineNumbers { entries, .. } => {
                    for e in entries.iter_mut() {
                        e.start = insns.resolve(e.start);
                    }
                }
                CodeAttr::LocalVariables { entries, .. } => {
                    for e in entries.iter_mut() {
                        e.start = insns.resolve(e.start);
                        e.end = end(e.end);
                    }
                }
                CodeAttr::Verification(_) | CodeAttr::Opaque(_) => {}
            }
        }
    }

    /// Instructions control can reach other than by falling through: branch
    /// and switch targets, and exception handler entry points and bounds.
    /// Ids are resolved through the redirect map.
    pub fn control_targets(&self) -> HashSet<InsnId> {
        let insns = &self.insns;
        let mut targets = HashSet::new();
        for node in insns {
            node.insn.for_each_target(|t| {
                targets.insert(insns.resolve(t));
            });
        }
        for h in &self.handlers {
            targets.insert(insns.resolve(h.start));
            targets.insert(insns.resolve(h.handler));
            if let Some(end) = h.end {
                targets.insert(insns.resolve(end));
            }
        }
        targets
    }

    /// Exception handler entry points.
    pub fn handler_entries(&self) -> Vec<InsnId> {
        self.handlers.iter().map(|h| h.handler).collect()
    }

    /// Drops offset-dependent verification attributes; returns how many were
    /// removed.
    pub fn strip_verification(&mut self) -> usize {
        let before = self.attributes.len();
        self.attributes
            .retain(|a| !matches!(a, CodeAttr::Verification(_)));
        before - self.attributes.len()
    }

    /// Local variable table rows (typed and untyped).
    pub fn local_variables(&self) -> impl Iterator<Item = &LocalVariable> {
        self.attributes.iter().flat_map(local_rows)
    }
}

fn local_rows(attribute: &CodeAttr) -> &[LocalVariable] {
    match attribute {
        CodeAttr::LocalVariables { entries, .. } => entries,
        _ => &[],
    }
}
