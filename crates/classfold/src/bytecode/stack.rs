//! Operand-stack effects and maximum stack depth.

use super::list::InsnList;
use super::opcodes::*;
use super::types::{Category, Insn, InsnId};
use crate::classfile::descriptor::{field_slots, MethodDescriptor};
use crate::classfile::ConstantPool;

/// Slots popped and pushed by `insn`, or `None` if the effect depends on
/// something that cannot be resolved (a malformed descriptor, a bad pool
/// index).
pub fn stack_effect(insn: &Insn, pool: &ConstantPool) -> Option<(u16, u16)> {
    let effect = match insn {
        Insn::Nop | Insn::Iinc { .. } | Insn::Goto(_) | Insn::Ret(_) => (0, 0),
        Insn::Push(push) => (0, push.slots()),
        Insn::Load { cat, .. } => (0, cat.slots()),
        Insn::Store { cat, .. } => (cat.slots(), 0),
        Insn::ALoad(_) => (0, 1),
        Insn::AStore(_) => (1, 0),
        Insn::Arith { cat, .. } => (2 * cat.slots(), cat.slots()),
        Insn::Neg(cat) => (cat.slots(), cat.slots()),
        Insn::Bitwise { cat, op } => {
            let s = cat.slots();
            // Shift distances are always an int.
            if op.is_shift() {
                (s + 1, s)
            } else {
                (2 * s, s)
            }
        }
        Insn::Convert { from, to } => (from.slots(), to.slots()),
        Insn::Narrow(_) => (1, 1),
        Insn::Compare(kind) => (2 * kind.operand_category().slots(), 1),
        Insn::If { .. } => (1, 0),
        Insn::IfICmp { .. } => (2, 0),
        Insn::Jump { opcode, .. } => match *opcode {
            IF_ACMPEQ | IF_ACMPNE => (2, 0),
            IFNULL | IFNONNULL => (1, 0),
            JSR | JSR_W => (0, 1),
            _ => (0, 0),
        },
        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => (1, 0),
        Insn::Return(cat) => (cat.map_or(0, Category::slots), 0),
        Insn::Other { opcode, operands } => return other_effect(*opcode, operands, pool),
    };
    Some(effect)
}

fn other_effect(opcode: u8, operands: &[u8], pool: &ConstantPool) -> Option<(u16, u16)> {
    let index = || Some(u16::from_be_bytes([*operands.first()?, *operands.get(1)?]));
    let member = |index: u16| pool.member_descriptor(index);
    let effect = match opcode {
        ACONST_NULL | NEW => (0, 1),
        LALOAD | DALOAD => (2, 2),
        IALOAD..=SALOAD => (2, 1),
        LASTORE | DASTORE => (4, 0),
        IASTORE..=SASTORE => (3, 0),
        POP => (1, 0),
        POP2 => (2, 0),
        DUP => (1, 2),
        DUP_X1 => (2, 3),
        DUP_X2 => (3, 4),
        DUP2 => (2, 4),
        DUP2_X1 => (3, 5),
        DUP2_X2 => (4, 6),
        SWAP => (2, 2),
        ARETURN | ATHROW | MONITORENTER | MONITOREXIT => (1, 0),
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | CHECKCAST | INSTANCEOF => (1, 1),
        MULTIANEWARRAY => (*operands.get(2)? as u16, 1),
        GETSTATIC => (0, field_slots(member(index()?)?).ok()?),
        PUTSTATIC => (field_slots(member(index()?)?).ok()?, 0),
        GETFIELD => (1, field_slots(member(index()?)?).ok()?),
        PUTFIELD => (1 + field_slots(member(index()?)?).ok()?, 0),
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKEINTERFACE | INVOKESTATIC | INVOKEDYNAMIC => {
            let d = MethodDescriptor::parse(member(index()?)?).ok()?;
            let receiver = u16::from(!matches!(opcode, INVOKESTATIC | INVOKEDYNAMIC));
            (d.param_slots + receiver, d.return_slots)
        }
        _ => return None,
    };
    Some(effect)
}

/// Maximum operand-stack depth over every reachable path.
///
/// `handlers` are the entry points of exception handlers, which start with
/// the thrown reference on the stack. Returns `None` if an effect is unknown,
/// the stack underflows, two paths disagree on the depth at a merge point, or
/// the method uses `jsr`/`ret`.
pub fn max_stack(list: &InsnList, handlers: &[InsnId], pool: &ConstantPool) -> Option<u16> {
    if list.iter().any(|n| n.insn.is_subroutine()) {
        return None;
    }
    let positions = list.positions();
    let mut depth_at: Vec<Option<u32>> = vec![None; list.len()];
    let mut worklist: Vec<(usize, u32)> = Vec::new();
    if !list.is_empty() {
        worklist.push((0, 0));
    }
    for handler in handlers {
        worklist.push((*positions.get(handler)?, 1));
    }

    let mut max = 0u32;
    while let Some((index, depth)) = worklist.pop() {
        match depth_at[index] {
            Some(seen) if seen == depth => continue,
            Some(_) => return None,
            None => depth_at[index] = Some(depth),
        }
        let node = list.get(index)?;
        let (pops, pushes) = stack_effect(&node.insn, pool)?;
        let after = depth.checked_sub(pops as u32)? + pushes as u32;
        max = max.max(depth).max(after);

        if !node.insn.ends_flow() && index + 1 < list.len() {
            worklist.push((index + 1, after));
        }
        let mut missing = false;
        node.insn.for_each_target(|t| match positions.get(&t) {
            Some(&to) => worklist.push((to, after)),
            None => missing = true,
        });
        if missing {
            return None;
        }
    }
    u16::try_from(max).ok()
}
