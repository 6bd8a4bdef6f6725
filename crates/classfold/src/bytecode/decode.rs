//! Bytecode decoder.
//!
//! Decoding runs in two passes: the first reads every instruction and keeps
//! branch targets as absolute byte offsets, the second maps those offsets to
//! instruction ids. A target that does not land on an instruction boundary
//! is an error.

use super::list::InsnList;
use super::opcodes::*;
use super::types::{ArithOp, BitOp, Category, CmpKind, Cond, Insn, InsnId, Narrow, Push};
use crate::classfile::ByteReader;
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;

/// Decodes the `code` array of a method.
pub fn decode(code: &[u8]) -> Result<InsnList> {
    let mut r = ByteReader::new(code);
    let mut decoded: Vec<(u32, Insn)> = Vec::new();
    while !r.is_empty() {
        let offset = r.position() as u32;
        let insn = decode_one(&mut r, offset, code.len())
            .with_context(|| format!("decoding instruction at offset {}", offset))?;
        decoded.push((offset, insn));
    }

    // Ids of a freshly decoded list are the instruction positions.
    let by_offset: HashMap<u32, u32> = decoded
        .iter()
        .enumerate()
        .map(|(index, (offset, _))| (*offset, index as u32))
        .collect();
    for (offset, insn) in &mut decoded {
        let mut bad = None;
        insn.for_each_target_mut(|t| match by_offset.get(&t.0) {
            Some(&index) => *t = InsnId(index),
            None => bad = Some(t.0),
        });
        if let Some(to) = bad {
            bail!(
                "branch at offset {} targets {}, which is not an instruction boundary",
                offset,
                to
            );
        }
    }
    Ok(InsnList::from_decoded(decoded))
}

/// Absolute target offset, stored in an `InsnId` until ids are assigned.
fn branch_target(offset: u32, rel: i32, code_len: usize) -> Result<InsnId> {
    let to = offset as i64 + rel as i64;
    ensure!(
        to >= 0 && (to as usize) < code_len,
        "branch target {} outside the code array",
        to
    );
    Ok(InsnId(to as u32))
}

fn decode_one(r: &mut ByteReader<'_>, offset: u32, code_len: usize) -> Result<Insn> {
    let opcode = r.u8()?;
    let insn = match opcode {
        NOP => Insn::Nop,
        ICONST_M1..=ICONST_5 => Insn::Push(Push::IConst(opcode as i32 - ICONST_0 as i32)),
        LCONST_0 | LCONST_1 => Insn::Push(Push::LConst((opcode - LCONST_0) as i64)),
        FCONST_0..=FCONST_2 => Insn::Push(Push::FConst((opcode - FCONST_0) as f32)),
        DCONST_0 | DCONST_1 => Insn::Push(Push::DConst((opcode - DCONST_0) as f64)),
        BIPUSH => Insn::Push(Push::BiPush(r.i8()?)),
        SIPUSH => Insn::Push(Push::SiPush(r.i16()?)),
        LDC => Insn::Push(Push::Ldc(r.u8()? as u16)),
        LDC_W => Insn::Push(Push::Ldc(r.u16()?)),
        LDC2_W => Insn::Push(Push::Ldc2(r.u16()?)),

        ILOAD..=ALOAD => load(opcode - ILOAD, r.u8()? as u16),
        ILOAD_0..=ALOAD_3 => {
            let k = opcode - ILOAD_0;
            load(k / 4, (k % 4) as u16)
        }
        ISTORE..=ASTORE => store(opcode - ISTORE, r.u8()? as u16),
        ISTORE_0..=ASTORE_3 => {
            let k = opcode - ISTORE_0;
            store(k / 4, (k % 4) as u16)
        }

        IADD..=DREM => {
            let k = opcode - IADD;
            match ArithOp::from_index(k / 4) {
                Some(op) => Insn::Arith {
                    cat: Category::from_index(k % 4),
                    op,
                },
                None => bail!("bad arithmetic opcode 0x{:02x}", opcode),
            }
        }
        INEG..=DNEG => Insn::Neg(Category::from_index(opcode - INEG)),
        ISHL..=LXOR => {
            let k = opcode - ISHL;
            let cat = if k % 2 == 0 {
                Category::Int
            } else {
                Category::Long
            };
            let op = match k / 2 {
                0 => BitOp::Shl,
                1 => BitOp::Shr,
                2 => BitOp::Ushr,
                3 => BitOp::And,
                4 => BitOp::Or,
                _ => BitOp::Xor,
            };
            Insn::Bitwise { cat, op }
        }
        IINC => Insn::Iinc {
            slot: r.u8()? as u16,
            delta: r.i8()? as i16,
        },
        I2L..=D2F => {
            let (from, to) = CONVERSIONS[(opcode - I2L) as usize];
            Insn::Convert {
                from: Category::from_index(from),
                to: Category::from_index(to),
            }
        }
        I2B => Insn::Narrow(Narrow::Byte),
        I2C => Insn::Narrow(Narrow::Char),
        I2S => Insn::Narrow(Narrow::Short),
        LCMP => Insn::Compare(CmpKind::Long),
        FCMPL => Insn::Compare(CmpKind::FloatL),
        FCMPG => Insn::Compare(CmpKind::FloatG),
        DCMPL => Insn::Compare(CmpKind::DoubleL),
        DCMPG => Insn::Compare(CmpKind::DoubleG),

        IFEQ..=IFLE => Insn::If {
            cond: cond(opcode - IFEQ)?,
            target: branch_target(offset, r.i16()? as i32, code_len)?,
        },
        IF_ICMPEQ..=IF_ICMPLE => Insn::IfICmp {
            cond: cond(opcode - IF_ICMPEQ)?,
            target: branch_target(offset, r.i16()? as i32, code_len)?,
        },
        GOTO => Insn::Goto(branch_target(offset, r.i16()? as i32, code_len)?),
        IF_ACMPEQ | IF_ACMPNE | IFNULL | IFNONNULL | JSR => Insn::Jump {
            opcode,
            target: branch_target(offset, r.i16()? as i32, code_len)?,
        },
        GOTO_W | JSR_W => Insn::Jump {
            opcode,
            target: branch_target(offset, r.i32()?, code_len)?,
        },
        RET => Insn::Ret(r.u8()? as u16),

        TABLESWITCH => {
            r.skip((3 - offset % 4) as usize)?;
            let default = branch_target(offset, r.i32()?, code_len)?;
            let low = r.i32()?;
            let high = r.i32()?;
            ensure!(high >= low, "tableswitch high {} below low {}", high, low);
            let count = (high as i64 - low as i64 + 1) as usize;
            ensure!(
                count * 4 <= r.remaining(),
                "tableswitch with {} targets overruns code",
                count
            );
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(branch_target(offset, r.i32()?, code_len)?);
            }
            Insn::TableSwitch {
                default,
                low,
                targets,
            }
        }
        LOOKUPSWITCH => {
            r.skip((3 - offset % 4) as usize)?;
            let default = branch_target(offset, r.i32()?, code_len)?;
            let npairs = r.i32()?;
            ensure!(npairs >= 0, "lookupswitch with {} pairs", npairs);
            ensure!(
                npairs as usize * 8 <= r.remaining(),
                "lookupswitch with {} pairs overruns code",
                npairs
            );
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = r.i32()?;
                pairs.push((key, branch_target(offset, r.i32()?, code_len)?));
            }
            Insn::LookupSwitch { default, pairs }
        }

        IRETURN..=DRETURN => Insn::Return(Some(Category::from_index(opcode - IRETURN))),
        RETURN => Insn::Return(None),

        WIDE => {
            let inner = r.u8()?;
            match inner {
                ILOAD..=ALOAD => load(inner - ILOAD, r.u16()?),
                ISTORE..=ASTORE => store(inner - ISTORE, r.u16()?),
                RET => Insn::Ret(r.u16()?),
                IINC => Insn::Iinc {
                    slot: r.u16()?,
                    delta: r.i16()?,
                },
                _ => bail!("opcode 0x{:02x} cannot follow wide", inner),
            }
        }

        _ => match other_operand_len(opcode) {
            Some(len) => Insn::Other {
                opcode,
                operands: r.bytes(len)?.to_vec(),
            },
            None => bail!("unknown opcode 0x{:02x}", opcode),
        },
    };
    Ok(insn)
}

/// `type_index` follows the i/l/f/d/a opcode order.
fn load(type_index: u8, slot: u16) -> Insn {
    match type_index {
        4 => Insn::ALoad(slot),
        t => Insn::Load {
            cat: Category::from_index(t),
            slot,
        },
    }
}

fn store(type_index: u8, slot: u16) -> Insn {
    match type_index {
        4 => Insn::AStore(slot),
        t => Insn::Store {
            cat: Category::from_index(t),
            slot,
        },
    }
}

fn cond(index: u8) -> Result<Cond> {
    Cond::from_index(index).with_context(|| format!("bad condition index {}", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encode;

    // int b = 62; int c = (b + 764) * 3; return c + 1234 - b;
    const METHOD_ONE: [u8; 19] = [
        0x10, 0x3e, 0x3c, 0x1b, 0x11, 0x02, 0xfc, 0x60, 0x06, 0x68, 0x3d, 0x1c, 0x11, 0x04, 0xd2,
        0x60, 0x1b, 0x64, 0xac,
    ];

    #[test]
    fn decodes_straight_line_method() {
        let list = decode(&METHOD_ONE).unwrap();
        assert_eq!(list.len(), 14);
        assert_eq!(list.insn(0), Some(&Insn::Push(Push::BiPush(62))));
        assert_eq!(
            list.insn(1),
            Some(&Insn::Store {
                cat: Category::Int,
                slot: 1
            })
        );
        assert_eq!(list.insn(3), Some(&Insn::Push(Push::SiPush(764))));
        assert_eq!(
            list.insn(5),
            Some(&Insn::Arith {
                cat: Category::Int,
                op: ArithOp::Mul
            })
        );
        assert_eq!(list.insn(13), Some(&Insn::Return(Some(Category::Int))));
        assert_eq!(list.get(13).map(|n| n.offset), Some(18));
    }

    #[test]
    fn reencoding_is_identical() {
        let mut list = decode(&METHOD_ONE).unwrap();
        list.layout();
        assert_eq!(encode(&list).unwrap(), METHOD_ONE.to_vec());
    }

    #[test]
    fn branch_targets_become_ids() {
        // iload_1; iload_2; if_icmple +7; iconst_1; goto +4; iconst_0; ireturn
        let code = [0x1b, 0x1c, 0xa4, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x03, 0xac];
        let list = decode(&code).unwrap();
        assert_eq!(
            list.insn(2),
            Some(&Insn::IfICmp {
                cond: Cond::Le,
                target: InsnId(5)
            })
        );
        assert_eq!(list.insn(4), Some(&Insn::Goto(InsnId(6))));
    }

    #[test]
    fn misaligned_target_is_rejected() {
        // goto into the middle of sipush
        let code = [0xa7, 0x00, 0x04, 0x11, 0x01, 0x00, 0xb1];
        let err = decode(&code).unwrap_err();
        assert!(format!("{err:#}").contains("instruction boundary"));
    }

    #[test]
    fn wide_forms() {
        let code = [WIDE, 0x36, 0x01, 0x00, WIDE, IINC, 0x01, 0x00, 0xff, 0x38, RETURN];
        let list = decode(&code).unwrap();
        assert_eq!(
            list.insn(0),
            Some(&Insn::Store {
                cat: Category::Int,
                slot: 256
            })
        );
        assert_eq!(
            list.insn(1),
            Some(&Insn::Iinc {
                slot: 256,
                delta: -200
            })
        );
    }

    #[test]
    fn lookupswitch_padding() {
        // nop; lookupswitch (pad 2) default +19, 1 pair {5: +19}; return
        let mut code = vec![NOP, LOOKUPSWITCH, 0, 0];
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&19i32.to_be_bytes());
        code.push(RETURN);
        let list = decode(&code).unwrap();
        assert_eq!(
            list.insn(1),
            Some(&Insn::LookupSwitch {
                default: InsnId(2),
                pairs: vec![(5, InsnId(2))]
            })
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert!(decode(&[0xca]).is_err());
    }
}
