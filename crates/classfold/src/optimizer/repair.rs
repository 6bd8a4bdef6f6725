//! Post-pass repair of a rewritten method body.
//!
//! After the passes have run, the body's tables may still name removed
//! instructions and its recorded limits may be stale. [`repair`] brings it
//! back to a state [`MethodBody::to_code`] can encode:
//!
//! - every reference is resolved to a live instruction;
//! - exception ranges that collapsed to nothing are dropped;
//! - line number rows that now share an instruction are deduplicated;
//! - local variable rows with an empty or inverted range are dropped;
//! - `max_stack` and `max_locals` are recomputed;
//! - verification attributes (`StackMapTable` and friends) are removed.

use crate::bytecode::{max_stack, CodeAttr, Insn, InsnId, MethodBody};
use crate::classfile::descriptor::{field_slots, MethodDescriptor};
use crate::classfile::ConstantPool;
use std::collections::HashSet;
use tracing::debug;

pub fn repair(
    body: &mut MethodBody,
    descriptor: &MethodDescriptor,
    is_static: bool,
    pool: &ConstantPool,
) {
    body.resolve_references();
    let positions = body.insns.positions();
    let len = body.insns.len();
    let index = |id: Option<InsnId>| -> usize {
        id.and_then(|id| positions.get(&id).copied()).unwrap_or(len)
    };

    let before = body.handlers.len();
    body.handlers
        .retain(|h| index(Some(h.start)) < index(h.end));
    if body.handlers.len() != before {
        debug!(
            "repair: dropped {} empty exception ranges",
            before - body.handlers.len()
        );
    }

    for attribute in &mut body.attributes {
        match attribute {
            CodeAttr::LineNumbers { entries, .. } => {
                let mut seen = HashSet::new();
                entries.retain(|e| seen.insert(e.start));
            }
            CodeAttr::LocalVariables { entries, .. } => {
                entries.retain(|e| index(Some(e.start)) < index(e.end));
            }
            CodeAttr::Verification(_) | CodeAttr::Opaque(_) => {}
        }
    }

    body.insns.layout();
    match max_stack(&body.insns, &body.handler_entries(), pool) {
        Some(depth) => body.max_stack = depth,
        None => debug!("repair: keeping max_stack {}", body.max_stack),
    }
    body.max_locals = max_locals(body, descriptor, is_static, pool);

    let stripped = body.strip_verification();
    if stripped > 0 {
        debug!("repair: removed {} verification attributes", stripped);
    }
    body.insns.clear_redirects();
}

/// Highest local slot any instruction, argument or local variable row needs.
fn max_locals(
    body: &MethodBody,
    descriptor: &MethodDescriptor,
    is_static: bool,
    pool: &ConstantPool,
) -> u16 {
    let receiver = u16::from(!is_static);
    let mut locals = u32::from(descriptor.param_slots) + u32::from(receiver);
    for node in &body.insns {
        let top = match node.insn {
            Insn::Load { cat, slot } | Insn::Store { cat, slot } => {
                u32::from(slot) + u32::from(cat.slots())
            }
            Insn::ALoad(slot) | Insn::AStore(slot) | Insn::Iinc { slot, .. } | Insn::Ret(slot) => {
                u32::from(slot) + 1
            }
            _ => continue,
        };
        locals = locals.max(top);
    }

    // The type table's signatures are generic, so widths come from the
    // untyped table only.
    for attribute in &body.attributes {
        let CodeAttr::LocalVariables {
            typed: false,
            entries,
            ..
        } = attribute
        else {
            continue;
        };
        for e in entries {
            let width = pool
                .utf8(e.descriptor)
                .and_then(|d| field_slots(d).ok())
                .unwrap_or(1);
            locals = locals.max(u32::from(e.slot) + u32::from(width));
        }
    }

    u16::try_from(locals).unwrap_or(u16::MAX)
}
