//! Instruction model.
//!
//! JVM instructions are decoded into a closed enum over
//! {category x operation kind}. Everything the folding passes never look
//! inside (field access, invocation, array and stack shuffling ops) is kept
//! as [`Insn::Other`] with its raw operand bytes.

use crate::classfile::ConstantPool;
use std::fmt;

/// Stable identity of an instruction inside an [`InsnList`](super::InsnList).
///
/// Branch targets, exception handler bounds and debug tables refer to
/// instructions through this id, never through byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The four numeric categories arithmetic is typed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Int,
    Long,
    Float,
    Double,
}

impl Category {
    /// Number of local-variable / operand-stack slots a value occupies.
    pub fn slots(self) -> u16 {
        match self {
            Category::Int | Category::Float => 1,
            Category::Long | Category::Double => 2,
        }
    }

    /// Position of the category inside the I/L/F/D opcode groups.
    pub(crate) fn index(self) -> u8 {
        match self {
            Category::Int => 0,
            Category::Long => 1,
            Category::Float => 2,
            Category::Double => 3,
        }
    }

    pub(crate) fn from_index(index: u8) -> Self {
        match index & 3 {
            0 => Category::Int,
            1 => Category::Long,
            2 => Category::Float,
            _ => Category::Double,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Int => write!(f, "int"),
            Category::Long => write!(f, "long"),
            Category::Float => write!(f, "float"),
            Category::Double => write!(f, "double"),
        }
    }
}

/// A numeric constant tagged with its category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn category(&self) -> Category {
        match self {
            Value::Int(_) => Category::Int,
            Value::Long(_) => Category::Long,
            Value::Float(_) => Category::Float,
            Value::Double(_) => Category::Double,
        }
    }

    /// `true` for integer zero and for both float zeros.
    pub fn is_zero(&self) -> bool {
        match *self {
            Value::Int(v) => v == 0,
            Value::Long(v) => v == 0,
            Value::Float(v) => v == 0.0,
            Value::Double(v) => v == 0.0,
        }
    }

    /// Bit-exact equality: distinguishes `-0.0` from `0.0` and treats equal
    /// NaN payloads as equal.
    pub fn same_bits(&self, other: &Value) -> bool {
        match (*self, *other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
        }
    }
}

/// Binary arithmetic operations (`add`, `sub`, `mul`, `div`, `rem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub(crate) fn index(self) -> u8 {
        match self {
            ArithOp::Add => 0,
            ArithOp::Sub => 1,
            ArithOp::Mul => 2,
            ArithOp::Div => 3,
            ArithOp::Rem => 4,
        }
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => ArithOp::Add,
            1 => ArithOp::Sub,
            2 => ArithOp::Mul,
            3 => ArithOp::Div,
            4 => ArithOp::Rem,
            _ => return None,
        })
    }

    /// Division and remainder fault on a zero integer divisor.
    pub fn is_division(self) -> bool {
        matches!(self, ArithOp::Div | ArithOp::Rem)
    }
}

/// Bitwise and shift operations; only defined for `int` and `long`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl BitOp {
    pub fn is_shift(self) -> bool {
        matches!(self, BitOp::Shl | BitOp::Shr | BitOp::Ushr)
    }
}

/// `i2b`, `i2c`, `i2s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrow {
    Byte,
    Char,
    Short,
}

/// Comparison instructions that push -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    /// `lcmp`
    Long,
    /// `fcmpl`: NaN compares as -1
    FloatL,
    /// `fcmpg`: NaN compares as 1
    FloatG,
    /// `dcmpl`
    DoubleL,
    /// `dcmpg`
    DoubleG,
}

impl CmpKind {
    pub fn operand_category(self) -> Category {
        match self {
            CmpKind::Long => Category::Long,
            CmpKind::FloatL | CmpKind::FloatG => Category::Float,
            CmpKind::DoubleL | CmpKind::DoubleG => Category::Double,
        }
    }
}

/// Branch condition shared by `if<cond>` and `if_icmp<cond>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    pub(crate) fn index(self) -> u8 {
        match self {
            Cond::Eq => 0,
            Cond::Ne => 1,
            Cond::Lt => 2,
            Cond::Ge => 3,
            Cond::Gt => 4,
            Cond::Le => 5,
        }
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Cond::Eq,
            1 => Cond::Ne,
            2 => Cond::Lt,
            3 => Cond::Ge,
            4 => Cond::Gt,
            5 => Cond::Le,
            _ => return None,
        })
    }

    /// Evaluates `lhs <cond> rhs`.
    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
            Cond::Lt => lhs < rhs,
            Cond::Ge => lhs >= rhs,
            Cond::Gt => lhs > rhs,
            Cond::Le => lhs <= rhs,
        }
    }
}

/// Constant push encodings, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Push {
    /// `iconst_m1` .. `iconst_5`
    IConst(i32),
    /// `bipush`
    BiPush(i8),
    /// `sipush`
    SiPush(i16),
    /// `lconst_0`, `lconst_1`
    LConst(i64),
    /// `fconst_0` .. `fconst_2`
    FConst(f32),
    /// `dconst_0`, `dconst_1`
    DConst(f64),
    /// `ldc` / `ldc_w` of a single-slot constant (the encoder picks the form)
    Ldc(u16),
    /// `ldc2_w`
    Ldc2(u16),
}

impl Push {
    /// The numeric value pushed, or `None` for `ldc` of a string, class,
    /// method handle or dynamic constant.
    pub fn value(&self, pool: &ConstantPool) -> Option<Value> {
        match *self {
            Push::IConst(v) => Some(Value::Int(v)),
            Push::BiPush(v) => Some(Value::Int(v as i32)),
            Push::SiPush(v) => Some(Value::Int(v as i32)),
            Push::LConst(v) => Some(Value::Long(v)),
            Push::FConst(v) => Some(Value::Float(v)),
            Push::DConst(v) => Some(Value::Double(v)),
            Push::Ldc(index) | Push::Ldc2(index) => pool.numeric(index),
        }
    }

    /// Operand-stack slots this push occupies.
    pub fn slots(&self) -> u16 {
        match self {
            Push::LConst(_) | Push::DConst(_) | Push::Ldc2(_) => 2,
            _ => 1,
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Nop,
    Push(Push),
    /// `iload`, `lload`, `fload`, `dload` (all widths)
    Load { cat: Category, slot: u16 },
    /// `istore`, `lstore`, `fstore`, `dstore` (all widths)
    Store { cat: Category, slot: u16 },
    ALoad(u16),
    AStore(u16),
    Iinc { slot: u16, delta: i16 },
    Arith { cat: Category, op: ArithOp },
    Neg(Category),
    Bitwise { cat: Category, op: BitOp },
    Convert { from: Category, to: Category },
    Narrow(Narrow),
    Compare(CmpKind),
    /// `if<cond>`: compares the popped int against zero.
    If { cond: Cond, target: InsnId },
    /// `if_icmp<cond>`
    IfICmp { cond: Cond, target: InsnId },
    Goto(InsnId),
    /// `if_acmp*`, `ifnull`, `ifnonnull`, `goto_w`, `jsr`, `jsr_w`
    Jump { opcode: u8, target: InsnId },
    TableSwitch {
        default: InsnId,
        low: i32,
        targets: Vec<InsnId>,
    },
    LookupSwitch {
        default: InsnId,
        pairs: Vec<(i32, InsnId)>,
    },
    Ret(u16),
    /// `ireturn`, `lreturn`, `freturn`, `dreturn`, or `return` for `None`.
    Return(Option<Category>),
    Other { opcode: u8, operands: Vec<u8> },
}

impl Insn {
    pub fn as_push(&self) -> Option<&Push> {
        match self {
            Insn::Push(push) => Some(push),
            _ => None,
        }
    }

    /// Calls `f` with every instruction this one may transfer control to.
    pub fn for_each_target<F: FnMut(InsnId)>(&self, mut f: F) {
        match self {
            Insn::If { target, .. }
            | Insn::IfICmp { target, .. }
            | Insn::Goto(target)
            | Insn::Jump { target, .. } => f(*target),
            Insn::TableSwitch {
                default, targets, ..
            } => {
                f(*default);
                for t in targets {
                    f(*t);
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                f(*default);
                for (_, t) in pairs {
                    f(*t);
                }
            }
            _ => {}
        }
    }

    /// Mutable counterpart of [`Insn::for_each_target`].
    pub fn for_each_target_mut<F: FnMut(&mut InsnId)>(&mut self, mut f: F) {
        match self {
            Insn::If { target, .. }
            | Insn::IfICmp { target, .. }
            | Insn::Goto(target)
            | Insn::Jump { target, .. } => f(target),
            Insn::TableSwitch {
                default, targets, ..
            } => {
                f(default);
                for t in targets.iter_mut() {
                    f(t);
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                f(default);
                for (_, t) in pairs.iter_mut() {
                    f(t);
                }
            }
            _ => {}
        }
    }

    /// `true` if execution never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        use super::opcodes::*;
        match self {
            Insn::Goto(_)
            | Insn::TableSwitch { .. }
            | Insn::LookupSwitch { .. }
            | Insn::Ret(_)
            | Insn::Return(_) => true,
            Insn::Jump { opcode, .. } => *opcode == GOTO_W,
            Insn::Other { opcode, .. } => matches!(*opcode, ARETURN | ATHROW),
            _ => false,
        }
    }

    /// `true` for `jsr`, `jsr_w` and `ret`, whose control flow the passes do
    /// not model.
    pub fn is_subroutine(&self) -> bool {
        use super::opcodes::*;
        match self {
            Insn::Ret(_) => true,
            Insn::Jump { opcode, .. } => matches!(*opcode, JSR | JSR_W),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_slots() {
        assert_eq!(Category::Int.slots(), 1);
        assert_eq!(Category::Float.slots(), 1);
        assert_eq!(Category::Long.slots(), 2);
        assert_eq!(Category::Double.slots(), 2);
    }

    #[test]
    fn same_bits_distinguishes_signed_zero() {
        assert!(Value::Float(0.0).same_bits(&Value::Float(0.0)));
        assert!(!Value::Float(0.0).same_bits(&Value::Float(-0.0)));
        assert!(Value::Double(f64::NAN).same_bits(&Value::Double(f64::NAN)));
        assert!(!Value::Int(1).same_bits(&Value::Long(1)));
    }

    #[test]
    fn zero_detection_covers_negative_zero() {
        assert!(Value::Double(-0.0).is_zero());
        assert!(Value::Long(0).is_zero());
        assert!(!Value::Int(-1).is_zero());
    }

    #[test]
    fn cond_holds() {
        assert!(Cond::Le.holds(12345, 54321));
        assert!(!Cond::Gt.holds(12345, 54321));
        assert!(Cond::Ne.holds(0, 1));
    }

    #[test]
    fn switch_targets_are_visited() {
        let insn = Insn::TableSwitch {
            default: InsnId(9),
            low: 0,
            targets: vec![InsnId(3), InsnId(5)],
        };
        let mut seen = vec![];
        insn.for_each_target(|t| seen.push(t));
        assert_eq!(seen, vec![InsnId(9), InsnId(3), InsnId(5)]);
    }

    #[test]
    fn for_each_target_mut_rewrites_branch() {
        let mut insn = Insn::IfICmp {
            cond: Cond::Le,
            target: InsnId(4),
        };
        insn.for_each_target_mut(|t| *t = InsnId(7));
        assert_eq!(
            insn,
            Insn::IfICmp {
                cond: Cond::Le,
                target: InsnId(7)
            }
        );
    }
}
