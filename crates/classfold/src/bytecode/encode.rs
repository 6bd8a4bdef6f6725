//! Instruction sizes and byte emission.
//!
//! The encoder always picks the narrowest form of an instruction: `ldc`
//! over `ldc_w`, the `_<n>` forms of loads and stores, and `wide` only when a
//! slot or `iinc` delta does not fit in a byte.

use super::list::InsnList;
use super::opcodes::*;
use super::types::{BitOp, Category, CmpKind, Insn, InsnId, Narrow, Push};
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;

/// Largest legal `code_length`.
pub const MAX_CODE_LEN: u32 = 65535;

/// Padding after a switch opcode at `offset` so the operands are 4-aligned.
fn switch_padding(offset: u32) -> u32 {
    3 - (offset % 4)
}

fn local_size(slot: u16) -> u32 {
    match slot {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

/// Encoded size of `insn` when placed at `offset`.
pub fn insn_size(insn: &Insn, offset: u32) -> u32 {
    match insn {
        Insn::Nop
        | Insn::Arith { .. }
        | Insn::Neg(_)
        | Insn::Bitwise { .. }
        | Insn::Convert { .. }
        | Insn::Narrow(_)
        | Insn::Compare(_)
        | Insn::Return(_) => 1,
        Insn::Push(push) => match push {
            Push::IConst(_) | Push::LConst(_) | Push::FConst(_) | Push::DConst(_) => 1,
            Push::BiPush(_) => 2,
            Push::SiPush(_) | Push::Ldc2(_) => 3,
            Push::Ldc(index) => {
                if *index <= 255 {
                    2
                } else {
                    3
                }
            }
        },
        Insn::Load { slot, .. } | Insn::Store { slot, .. } => local_size(*slot),
        Insn::ALoad(slot) | Insn::AStore(slot) => local_size(*slot),
        Insn::Iinc { slot, delta } => {
            if *slot <= 255 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::If { .. } | Insn::IfICmp { .. } | Insn::Goto(_) => 3,
        Insn::Jump { opcode, .. } => {
            if matches!(*opcode, GOTO_W | JSR_W) {
                5
            } else {
                3
            }
        }
        Insn::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
        }
        Insn::LookupSwitch { pairs, .. } => {
            1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
        }
        Insn::Ret(slot) => {
            if *slot <= 255 {
                2
            } else {
                4
            }
        }
        Insn::Other { operands, .. } => 1 + operands.len() as u32,
    }
}

/// Encodes a laid-out instruction list.
///
/// Offsets must be current (see [`InsnList::layout`]) and every branch
/// target must name a live instruction.
pub fn encode(list: &InsnList) -> Result<Vec<u8>> {
    let code_len = list.code_len();
    ensure!(code_len > 0, "method has no instructions");
    ensure!(
        code_len <= MAX_CODE_LEN,
        "code length {} exceeds {}",
        code_len,
        MAX_CODE_LEN
    );
    let offsets: HashMap<InsnId, u32> = list.iter().map(|n| (n.id, n.offset)).collect();

    let mut out = Vec::with_capacity(code_len as usize);
    for node in list {
        let start = out.len();
        debug_assert_eq!(start as u32, node.offset);
        let target = |id: InsnId| -> Result<i32> {
            let to = offsets
                .get(&id)
                .with_context(|| format!("branch target {} is not in the method", id))?;
            Ok(*to as i32 - node.offset as i32)
        };
        emit(&node.insn, node.offset, &target, &mut out)
            .with_context(|| format!("encoding instruction at offset {}", node.offset))?;
        debug_assert_eq!(
            (out.len() - start) as u32,
            insn_size(&node.insn, node.offset)
        );
    }
    Ok(out)
}

fn short_branch(rel: i32) -> Result<[u8; 2]> {
    let rel = i16::try_from(rel).with_context(|| format!("branch offset {} overflows", rel))?;
    Ok(rel.to_be_bytes())
}

fn emit_local(base_short: u8, base_n: u8, type_index: u8, slot: u16, out: &mut Vec<u8>) {
    match slot {
        0..=3 => out.push(base_n + type_index * 4 + slot as u8),
        4..=255 => {
            out.push(base_short + type_index);
            out.push(slot as u8);
        }
        _ => {
            out.push(WIDE);
            out.push(base_short + type_index);
            out.extend_from_slice(&slot.to_be_bytes());
        }
    }
}

fn emit_push(push: &Push, out: &mut Vec<u8>) -> Result<()> {
    match *push {
        Push::IConst(v) => {
            ensure!((-1..=5).contains(&v), "iconst value {} out of range", v);
            out.push((ICONST_0 as i32 + v) as u8);
        }
        Push::BiPush(v) => {
            out.push(BIPUSH);
            out.push(v as u8);
        }
        Push::SiPush(v) => {
            out.push(SIPUSH);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Push::LConst(v) => match v {
            0 => out.push(LCONST_0),
            1 => out.push(LCONST_1),
            _ => bail!("lconst value {} out of range", v),
        },
        Push::FConst(v) => {
            let opcode = [0.0f32, 1.0, 2.0]
                .iter()
                .position(|c| c.to_bits() == v.to_bits())
                .with_context(|| format!("fconst value {} out of range", v))?;
            out.push(FCONST_0 + opcode as u8);
        }
        Push::DConst(v) => {
            let opcode = [0.0f64, 1.0]
                .iter()
                .position(|c| c.to_bits() == v.to_bits())
                .with_context(|| format!("dconst value {} out of range", v))?;
            out.push(DCONST_0 + opcode as u8);
        }
        Push::Ldc(index) => {
            if index <= 255 {
                out.push(LDC);
                out.push(index as u8);
            } else {
                out.push(LDC_W);
                out.extend_from_slice(&index.to_be_bytes());
            }
        }
        Push::Ldc2(index) => {
            out.push(LDC2_W);
            out.extend_from_slice(&index.to_be_bytes());
        }
    }
    Ok(())
}

fn bit_opcode(cat: Category, op: BitOp) -> Result<u8> {
    let wide = match cat {
        Category::Int => 0,
        Category::Long => 1,
        _ => bail!("no bitwise instruction for {}", cat),
    };
    let op_index = match op {
        BitOp::Shl => 0,
        BitOp::Shr => 1,
        BitOp::Ushr => 2,
        BitOp::And => 3,
        BitOp::Or => 4,
        BitOp::Xor => 5,
    };
    Ok(ISHL + op_index * 2 + wide)
}

fn emit<F>(insn: &Insn, offset: u32, target: &F, out: &mut Vec<u8>) -> Result<()>
where
    F: Fn(InsnId) -> Result<i32>,
{
    match insn {
        Insn::Nop => out.push(NOP),
        Insn::Push(push) => emit_push(push, out)?,
        Insn::Load { cat, slot } => emit_local(ILOAD, ILOAD_0, cat.index(), *slot, out),
        Insn::ALoad(slot) => emit_local(ILOAD, ILOAD_0, 4, *slot, out),
        Insn::Store { cat, slot } => emit_local(ISTORE, ISTORE_0, cat.index(), *slot, out),
        Insn::AStore(slot) => emit_local(ISTORE, ISTORE_0, 4, *slot, out),
        Insn::Iinc { slot, delta } => {
            if *slot <= 255 && i8::try_from(*delta).is_ok() {
                out.push(IINC);
                out.push(*slot as u8);
                out.push(*delta as i8 as u8);
            } else {
                out.push(WIDE);
                out.push(IINC);
                out.extend_from_slice(&slot.to_be_bytes());
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Insn::Arith { cat, op } => out.push(IADD + op.index() * 4 + cat.index()),
        Insn::Neg(cat) => out.push(INEG + cat.index()),
        Insn::Bitwise { cat, op } => out.push(bit_opcode(*cat, *op)?),
        Insn::Convert { from, to } => {
            let index = CONVERSIONS
                .iter()
                .position(|&(f, t)| f == from.index() && t == to.index())
                .with_context(|| format!("no conversion from {} to {}", from, to))?;
            out.push(I2L + index as u8);
        }
        Insn::Narrow(narrow) => out.push(match narrow {
            Narrow::Byte => I2B,
            Narrow::Char => I2C,
            Narrow::Short => I2S,
        }),
        Insn::Compare(kind) => out.push(match kind {
            CmpKind::Long => LCMP,
            CmpKind::FloatL => FCMPL,
            CmpKind::FloatG => FCMPG,
            CmpKind::DoubleL => DCMPL,
            CmpKind::DoubleG => DCMPG,
        }),
        Insn::If { cond, target: to } => {
            out.push(IFEQ + cond.index());
            out.extend_from_slice(&short_branch(target(*to)?)?);
        }
        Insn::IfICmp { cond, target: to } => {
            out.push(IF_ICMPEQ + cond.index());
            out.extend_from_slice(&short_branch(target(*to)?)?);
        }
        Insn::Goto(to) => {
            out.push(GOTO);
            out.extend_from_slice(&short_branch(target(*to)?)?);
        }
        Insn::Jump { opcode, target: to } => {
            out.push(*opcode);
            if matches!(*opcode, GOTO_W | JSR_W) {
                out.extend_from_slice(&target(*to)?.to_be_bytes());
            } else {
                out.extend_from_slice(&short_branch(target(*to)?)?);
            }
        }
        Insn::TableSwitch {
            default,
            low,
            targets,
        } => {
            ensure!(!targets.is_empty(), "tableswitch without targets");
            out.push(TABLESWITCH);
            out.extend(std::iter::repeat(0).take(switch_padding(offset) as usize));
            let high = *low + (targets.len() as i32 - 1);
            out.extend_from_slice(&target(*default)?.to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for to in targets {
                out.extend_from_slice(&target(*to)?.to_be_bytes());
            }
        }
        Insn::LookupSwitch { default, pairs } => {
            out.push(LOOKUPSWITCH);
            out.extend(std::iter::repeat(0).take(switch_padding(offset) as usize));
            out.extend_from_slice(&target(*default)?.to_be_bytes());
            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            for (key, to) in pairs {
                out.extend_from_slice(&key.to_be_bytes());
                out.extend_from_slice(&target(*to)?.to_be_bytes());
            }
        }
        Insn::Ret(slot) => {
            if *slot <= 255 {
                out.push(RET);
                out.push(*slot as u8);
            } else {
                out.push(WIDE);
                out.push(RET);
                out.extend_from_slice(&slot.to_be_bytes());
            }
        }
        Insn::Return(None) => out.push(RETURN),
        Insn::Return(Some(cat)) => out.push(IRETURN + cat.index()),
        Insn::Other { opcode, operands } => {
            out.push(*opcode);
            out.extend_from_slice(operands);
        }
    }
    Ok(())
}
