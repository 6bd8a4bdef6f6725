//! Whole-method folding by abstract interpretation.
//!
//! ## What it does
//!
//! Executes a method body on constant values. If every instruction that runs
//! is statically known and the method returns a numeric value, the body is
//! replaced with `push <result>; <t>return`.
//!
//! ## Algorithm
//!
//! 1. Only methods without exception handlers, switches and `jsr`/`ret`
//!    qualify.
//! 2. Interpretation starts at the first instruction with an empty stack and
//!    no known slots, following control flow:
//!    - pushes, loads, stores, `iinc`, arithmetic, bitwise ops, conversions
//!      and comparisons compute on [`Value`]s with the folder's semantics;
//!    - one `if<cond>` / `if_icmp<cond>` may be resolved statically, after
//!      which interpretation continues on the taken arm;
//!    - `goto` is followed forward only.
//! 3. Anything else (a second conditional, a backward jump, an unknown slot,
//!    a zero divisor, a void return, an instruction with side effects) leaves
//!    the method unresolved and untouched.
//!
//! A body that already has the folded shape is not rewritten again.

use super::encoding::select_push;
use super::eval::{convert, eval_neg, narrow, try_compare, try_eval_arith, try_eval_bitwise};
use crate::bytecode::{Category, Insn, InsnId, InsnList, MethodBody, Value};
use crate::classfile::ConstantPool;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Result of interpreting a method.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    /// Straight-line code returned `Value`.
    Resolved(Value),
    /// Returned `Value` after statically resolving one conditional branch.
    ResolvedViaBranch(Value),
    Unresolved(Unresolved),
}

impl FoldOutcome {
    pub fn value(&self) -> Option<Value> {
        match self {
            FoldOutcome::Resolved(v) | FoldOutcome::ResolvedViaBranch(v) => Some(*v),
            FoldOutcome::Unresolved(_) => None,
        }
    }
}

/// Why a method could not be folded.
#[derive(Debug, Clone, PartialEq)]
pub enum Unresolved {
    HasHandlers,
    HasSwitch,
    HasSubroutine,
    Empty,
    VoidReturn,
    UnknownSlot(u16),
    NonNumericConstant(InsnId),
    ZeroDivisor(InsnId),
    TypeMismatch(InsnId),
    StackUnderflow(InsnId),
    SecondBranch(InsnId),
    BackwardJump(InsnId),
    Unsupported(InsnId),
    FellOffEnd,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unresolved::HasHandlers => write!(f, "method has exception handlers"),
            Unresolved::HasSwitch => write!(f, "method has a switch"),
            Unresolved::HasSubroutine => write!(f, "method uses jsr/ret"),
            Unresolved::Empty => write!(f, "method has no instructions"),
            Unresolved::VoidReturn => write!(f, "method returns void"),
            Unresolved::UnknownSlot(slot) => write!(f, "load of unknown slot {}", slot),
            Unresolved::NonNumericConstant(id) => {
                write!(f, "non-numeric constant at {}", id)
            }
            Unresolved::ZeroDivisor(id) => write!(f, "division by zero at {}", id),
            Unresolved::TypeMismatch(id) => write!(f, "operand type mismatch at {}", id),
            Unresolved::StackUnderflow(id) => write!(f, "stack underflow at {}", id),
            Unresolved::SecondBranch(id) => write!(f, "second conditional branch at {}", id),
            Unresolved::BackwardJump(id) => write!(f, "backward jump at {}", id),
            Unresolved::Unsupported(id) => write!(f, "unsupported instruction at {}", id),
            Unresolved::FellOffEnd => write!(f, "execution ran past the last instruction"),
        }
    }
}

// ── Public entry points ───────────────────────────────────────────────────────

/// Folds the method if it resolves to a constant; returns `true` if the body
/// was rewritten.
pub fn fold(body: &mut MethodBody, pool: &mut ConstantPool) -> Result<bool> {
    body.resolve_references();
    let outcome = interpret(body, pool);
    let (value, via_branch) = match outcome {
        FoldOutcome::Resolved(v) => (v, false),
        FoldOutcome::ResolvedViaBranch(v) => (v, true),
        FoldOutcome::Unresolved(reason) => {
            debug!("method_fold: unresolved: {}", reason);
            return Ok(false);
        }
    };

    let push = select_push(value, pool)?;
    let ret = Insn::Return(Some(value.category()));
    if is_folded_shape(&body.insns, &Insn::Push(push), &ret) {
        return Ok(false);
    }
    body.insns.replace_all(vec![Insn::Push(push), ret]);
    debug!(
        "method_fold: body reduced to {}{}",
        value,
        if via_branch { " (branch resolved)" } else { "" }
    );
    Ok(true)
}

/// Interprets `body` without modifying it.
pub fn interpret(body: &MethodBody, pool: &ConstantPool) -> FoldOutcome {
    if let Err(reason) = qualify(body) {
        return FoldOutcome::Unresolved(reason);
    }
    let mut machine = Machine {
        insns: &body.insns,
        positions: body.insns.positions(),
        pool,
        stack: Vec::new(),
        slots: HashMap::new(),
        branched: false,
    };
    match machine.run() {
        Ok(value) if machine.branched => FoldOutcome::ResolvedViaBranch(value),
        Ok(value) => FoldOutcome::Resolved(value),
        Err(reason) => FoldOutcome::Unresolved(reason),
    }
}

fn qualify(body: &MethodBody) -> Result<(), Unresolved> {
    if !body.handlers.is_empty() {
        return Err(Unresolved::HasHandlers);
    }
    if body.insns.is_empty() {
        return Err(Unresolved::Empty);
    }
    for node in &body.insns {
        match node.insn {
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                return Err(Unresolved::HasSwitch)
            }
            _ if node.insn.is_subroutine() => return Err(Unresolved::HasSubroutine),
            _ => {}
        }
    }
    Ok(())
}

fn is_folded_shape(insns: &InsnList, push: &Insn, ret: &Insn) -> bool {
    insns.len() == 2 && insns.insn(0) == Some(push) && insns.insn(1) == Some(ret)
}

// ── Abstract machine ──────────────────────────────────────────────────────────

struct Machine<'a> {
    insns: &'a InsnList,
    positions: HashMap<InsnId, usize>,
    pool: &'a ConstantPool,
    stack: Vec<Value>,
    slots: HashMap<u16, Value>,
    /// Set once the single allowed conditional branch has been resolved.
    branched: bool,
}

impl Machine<'_> {
    fn run(&mut self) -> Result<Value, Unresolved> {
        let insns = self.insns;
        let mut pc = 0;
        // Jumps only go forward, so every instruction runs at most once.
        for _ in 0..=insns.len() {
            let node = insns.get(pc).ok_or(Unresolved::FellOffEnd)?;
            let id = node.id;
            match node.insn {
                Insn::Nop => {}
                Insn::Push(push) => {
                    let value = push
                        .value(self.pool)
                        .ok_or(Unresolved::NonNumericConstant(id))?;
                    self.stack.push(value);
                }
                Insn::Load { cat, slot } => {
                    let value = *self.slots.get(&slot).ok_or(Unresolved::UnknownSlot(slot))?;
                    if value.category() != cat {
                        return Err(Unresolved::TypeMismatch(id));
                    }
                    self.stack.push(value);
                }
                Insn::Store { cat, slot } => {
                    let value = self.pop_cat(cat, id)?;
                    self.store(slot, value);
                }
                Insn::Iinc { slot, delta } => match self.slots.get(&slot) {
                    Some(Value::Int(v)) => {
                        let v = v.wrapping_add(delta as i32);
                        self.slots.insert(slot, Value::Int(v));
                    }
                    Some(_) => return Err(Unresolved::TypeMismatch(id)),
                    None => return Err(Unresolved::UnknownSlot(slot)),
                },
                Insn::Arith { cat, op } => {
                    let rhs = self.pop_cat(cat, id)?;
                    let lhs = self.pop_cat(cat, id)?;
                    if op.is_division() && rhs.is_zero() {
                        return Err(Unresolved::ZeroDivisor(id));
                    }
                    let result =
                        try_eval_arith(op, lhs, rhs).ok_or(Unresolved::TypeMismatch(id))?;
                    self.stack.push(result);
                }
                Insn::Neg(cat) => {
                    let value = self.pop_cat(cat, id)?;
                    self.stack.push(eval_neg(value));
                }
                Insn::Bitwise { cat, op } => {
                    let rhs = self.pop(id)?;
                    let lhs = self.pop(id)?;
                    let result = try_eval_bitwise(cat, op, lhs, rhs)
                        .ok_or(Unresolved::TypeMismatch(id))?;
                    self.stack.push(result);
                }
                Insn::Convert { from, to } => {
                    let value = self.pop_cat(from, id)?;
                    self.stack.push(convert(value, to));
                }
                Insn::Narrow(kind) => {
                    let Value::Int(v) = self.pop_cat(Category::Int, id)? else {
                        return Err(Unresolved::TypeMismatch(id));
                    };
                    self.stack.push(Value::Int(narrow(kind, v)));
                }
                Insn::Compare(kind) => {
                    let cat = kind.operand_category();
                    let rhs = self.pop_cat(cat, id)?;
                    let lhs = self.pop_cat(cat, id)?;
                    let result = try_compare(kind, lhs, rhs).ok_or(Unresolved::TypeMismatch(id))?;
                    self.stack.push(Value::Int(result));
                }
                Insn::If { cond, target } => {
                    let v = self.pop_int(id)?;
                    if cond.holds(v, 0) {
                        pc = self.branch(pc, target, id, true)?;
                        continue;
                    }
                    self.mark_branch(id)?;
                }
                Insn::IfICmp { cond, target } => {
                    let rhs = self.pop_int(id)?;
                    let lhs = self.pop_int(id)?;
                    if cond.holds(lhs, rhs) {
                        pc = self.branch(pc, target, id, true)?;
                        continue;
                    }
                    self.mark_branch(id)?;
                }
                Insn::Goto(target) => {
                    pc = self.branch(pc, target, id, false)?;
                    continue;
                }
                Insn::Return(None) => return Err(Unresolved::VoidReturn),
                Insn::Return(Some(cat)) => return self.pop_cat(cat, id),
                _ => return Err(Unresolved::Unsupported(id)),
            }
            pc += 1;
        }
        Err(Unresolved::FellOffEnd)
    }

    fn pop(&mut self, at: InsnId) -> Result<Value, Unresolved> {
        self.stack.pop().ok_or(Unresolved::StackUnderflow(at))
    }

    fn pop_cat(&mut self, cat: Category, at: InsnId) -> Result<Value, Unresolved> {
        let value = self.pop(at)?;
        if value.category() != cat {
            return Err(Unresolved::TypeMismatch(at));
        }
        Ok(value)
    }

    fn pop_int(&mut self, at: InsnId) -> Result<i32, Unresolved> {
        match self.pop(at)? {
            Value::Int(v) => Ok(v),
            _ => Err(Unresolved::TypeMismatch(at)),
        }
    }

    /// Writes a slot; a two-slot value also invalidates the slot above, and
    /// any write breaks a two-slot value starting one below.
    fn store(&mut self, slot: u16, value: Value) {
        if value.category().slots() == 2 {
            if let Some(next) = slot.checked_add(1) {
                self.slots.remove(&next);
            }
        }
        if let Some(below) = slot.checked_sub(1) {
            if matches!(self.slots.get(&below), Some(v) if v.category().slots() == 2) {
                self.slots.remove(&below);
            }
        }
        self.slots.insert(slot, value);
    }

    fn mark_branch(&mut self, at: InsnId) -> Result<(), Unresolved> {
        if self.branched {
            return Err(Unresolved::SecondBranch(at));
        }
        self.branched = true;
        Ok(())
    }

    /// Position of a forward jump target.
    fn branch(
        &mut self,
        pc: usize,
        target: InsnId,
        at: InsnId,
        conditional: bool,
    ) -> Result<usize, Unresolved> {
        if conditional {
            self.mark_branch(at)?;
        }
        let to = *self
            .positions
            .get(&target)
            .ok_or(Unresolved::Unsupported(at))?;
        if to <= pc {
            return Err(Unresolved::BackwardJump(at));
        }
        Ok(to)
    }
}
