//! Constant propagation through local variable slots.
//!
//! ## What it does
//!
//! Rewrites a load of a slot that provably holds a constant into a push of
//! that constant (`iload_1` -> `bipush 62`). The push has the same stack
//! effect as the load, so nothing else in the method changes.
//!
//! ## Algorithm
//!
//! 1. Lay the method out and build a [`SlotTracker`] over it.
//! 2. For every numeric load, look up the interval covering its offset. The
//!    interval's value is used only if its category matches the load and the
//!    interval `[start, end)` is sealed:
//!    - nothing but the push falls into the store; no branch, switch or
//!      handler targets it;
//!    - a branch or switch from outside the interval may only target its
//!      push at `start`;
//!    - a handler entry inside the interval only protects instructions
//!      between the store and `end`.
//!
//!    The interval holds no write besides its store, so every path that
//!    reaches an instruction past the store has run the push and the store
//!    since it last entered the interval. Loops that stay inside the
//!    interval keep the constant.
//! 3. Apply all accepted rewrites. Each replacement redirects the old id so
//!    branches to the load follow it.
//!
//! Methods using `jsr`/`ret` are left alone.

use super::encoding::select_push;
use super::tracker::SlotTracker;
use crate::bytecode::{Insn, InsnId, InsnList, MethodBody, Value};
use crate::classfile::ConstantPool;
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

// ── Public entry point ────────────────────────────────────────────────────────

/// Propagates constants into loads; returns the number of rewritten loads.
pub fn propagate(body: &mut MethodBody, pool: &mut ConstantPool) -> Result<usize> {
    if body.insns.iter().any(|n| n.insn.is_subroutine()) {
        debug!("const_prop: skipping method with jsr/ret");
        return Ok(0);
    }
    body.resolve_references();
    body.insns.layout();

    let tracker = SlotTracker::scan(&body.insns, pool);
    let entries = EntryPoints::collect(body);

    let mut rewrites: Vec<(usize, Value)> = Vec::new();
    for (index, node) in body.insns.iter().enumerate() {
        let Insn::Load { cat, slot } = node.insn else {
            continue;
        };
        let Some(interval) = tracker.interval_at(slot, node.offset) else {
            continue;
        };
        if interval.value.category() != cat {
            continue;
        }
        if !entries.seals(interval.start, interval.end) {
            debug!(
                "const_prop: slot {} at offset {} is reachable around its store",
                slot, node.offset
            );
            continue;
        }
        rewrites.push((index, interval.value));
    }

    for &(index, value) in &rewrites {
        let push = select_push(value, &mut *pool)?;
        let id = body.insns.replace(index, Insn::Push(push));
        debug!("const_prop: load at index {} -> {:?} ({})", index, push, id);
    }
    Ok(rewrites.len())
}

// ── Control-flow entry points ─────────────────────────────────────────────────

/// Every non-fallthrough transfer of control, by byte offset.
struct EntryPoints {
    /// `(source, target)` of every branch and switch arm.
    edges: Vec<(u32, u32)>,
    handlers: Vec<HandlerRange>,
    /// Offset of the instruction following each instruction.
    next: HashMap<u32, u32>,
}

/// A handler entry and the `[start, end)` range it protects.
struct HandlerRange {
    start: u32,
    end: u32,
    entry: u32,
}

impl EntryPoints {
    /// Expects references resolved and offsets current.
    fn collect(body: &MethodBody) -> Self {
        let offsets = offsets(&body.insns);
        let mut edges = Vec::new();
        for node in &body.insns {
            node.insn.for_each_target(|t| {
                // Targets are resolved, so every id is live.
                if let Some(&to) = offsets.get(&t) {
                    edges.push((node.offset, to));
                }
            });
        }
        let code_len = body.insns.code_len();
        let handlers = body
            .handlers
            .iter()
            .filter_map(|h| {
                Some(HandlerRange {
                    start: *offsets.get(&h.start)?,
                    end: match h.end {
                        Some(end) => *offsets.get(&end)?,
                        None => code_len,
                    },
                    entry: *offsets.get(&h.handler)?,
                })
            })
            .collect();
        let next = body
            .insns
            .nodes()
            .windows(2)
            .map(|pair| (pair[0].offset, pair[1].offset))
            .collect();
        Self {
            edges,
            handlers,
            next,
        }
    }

    /// `true` if control can reach the interval starting with the push at
    /// `start` only through that push, so everything past its store sees
    /// the stored constant. An open interval runs to the end of the method.
    fn seals(&self, start: u32, end: Option<u32>) -> bool {
        let Some(&store) = self.next.get(&start) else {
            return false;
        };
        let end = end.unwrap_or(u32::MAX);
        let inside = |offset: u32| start <= offset && offset < end;
        let edges_ok = self
            .edges
            .iter()
            .all(|&(from, to)| to != store && (to == start || !inside(to) || inside(from)));
        let handlers_ok = self.handlers.iter().all(|h| {
            h.entry != store
                && (h.entry == start || !inside(h.entry) || (store < h.start && h.end <= end))
        });
        edges_ok && handlers_ok
    }
}

fn offsets(insns: &InsnList) -> HashMap<InsnId, u32> {
    insns.iter().map(|n| (n.id, n.offset)).collect()
}
