//! Peephole arithmetic folding.
//!
//! ## What it does
//!
//! Rewrites `push a; push b; <op>` into a single push of `a <op> b` when both
//! pushes are numeric constants of the operator's category and `<op>` is
//! `add`, `sub`, `mul`, `div` or `rem`.
//!
//! ## Algorithm
//!
//! 1. Collect the instructions control can jump to (branch and switch
//!    targets, exception handler bounds).
//! 2. Slide a three-instruction window over the stream. A window is folded
//!    only if its second and third instructions are not jump targets, since
//!    control entering there would see a different stack.
//! 3. On a fold, the first node is replaced with the narrowest push of the
//!    result and the other two are removed, redirecting to the replacement.
//!    The window then steps back one position so a freshly produced push can
//!    combine with the instruction before it.
//!
//! ## Safety
//!
//! `div` and `rem` by a constant zero are never folded, whatever the
//! category; the instructions stay so the runtime behavior is preserved.

use super::encoding::select_push;
use super::eval::try_eval_arith;
use crate::bytecode::{Insn, InsnId, InsnList, MethodBody, Value};
use crate::classfile::ConstantPool;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::debug;

// ── Public entry point ────────────────────────────────────────────────────────

/// Folds every constant-constant-operator window; returns the number of
/// folds.
pub fn fold(body: &mut MethodBody, pool: &mut ConstantPool) -> Result<usize> {
    let mut blocked = body.control_targets();
    let mut folds = 0;
    let mut i = 0;
    while i + 2 < body.insns.len() {
        let Some(result) = match_window(&body.insns, i, &blocked, pool) else {
            i += 1;
            continue;
        };
        let push = select_push(result, pool)?;
        let old = body.insns.id_at(i).context("window start out of range")?;
        let new = body.insns.replace(i, Insn::Push(push));
        if blocked.remove(&old) {
            blocked.insert(new);
        }
        body.insns.remove(i + 1, new);
        body.insns.remove(i + 1, new);
        debug!("peephole: folded window at {} into {:?}", old, push);
        folds += 1;
        i = i.saturating_sub(1);
    }
    Ok(folds)
}

// ── Window matching ───────────────────────────────────────────────────────────

/// Value of the window starting at `i`, or `None` if it does not fold.
fn match_window(
    insns: &InsnList,
    i: usize,
    blocked: &HashSet<InsnId>,
    pool: &ConstantPool,
) -> Option<Value> {
    let (first, second, third) = (insns.get(i)?, insns.get(i + 1)?, insns.get(i + 2)?);
    let Insn::Arith { cat, op } = third.insn else {
        return None;
    };
    if blocked.contains(&second.id) || blocked.contains(&third.id) {
        return None;
    }
    let lhs = first.insn.as_push()?.value(pool)?;
    let rhs = second.insn.as_push()?.value(pool)?;
    if lhs.category() != cat || rhs.category() != cat {
        return None;
    }
    try_eval_arith(op, lhs, rhs)
}
