//! Constant evaluation with JVM numeric semantics.
//!
//! Shared by the peephole folder and the whole-method interpreter so both
//! fold exactly the same way:
//!
//! - `int`/`long` arithmetic wraps; division truncates toward zero and
//!   `MIN / -1` wraps to `MIN` (`MIN % -1` is 0).
//! - `float`/`double` follow IEEE-754; `rem` is the truncated `fmod`.
//! - Shift distances are masked to 5 (`int`) or 6 (`long`) bits.
//! - Float to integer conversion saturates and maps NaN to 0.
//!
//! Division and remainder by zero are never evaluated, in any category, so
//! the runtime behavior of the original instruction survives.

use crate::bytecode::{ArithOp, BitOp, Category, CmpKind, Narrow, Value};
use std::cmp::Ordering;

// ── Arithmetic ───────────────────────────────────────────────────────────────

/// Evaluates `lhs <op> rhs`. Returns `None` when the operand categories
/// differ or the divisor of a `div`/`rem` is zero.
pub fn try_eval_arith(op: ArithOp, lhs: Value, rhs: Value) -> Option<Value> {
    if op.is_division() && rhs.is_zero() {
        return None;
    }
    let result = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Value::Int(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Rem => a.wrapping_rem(b),
        }),
        (Value::Long(a), Value::Long(b)) => Value::Long(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Rem => a.wrapping_rem(b),
        }),
        (Value::Float(a), Value::Float(b)) => Value::Float(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
        }),
        (Value::Double(a), Value::Double(b)) => Value::Double(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
        }),
        _ => return None,
    };
    Some(result)
}

pub fn eval_neg(value: Value) -> Value {
    match value {
        Value::Int(v) => Value::Int(v.wrapping_neg()),
        Value::Long(v) => Value::Long(v.wrapping_neg()),
        Value::Float(v) => Value::Float(-v),
        Value::Double(v) => Value::Double(-v),
    }
}

// ── Bitwise ──────────────────────────────────────────────────────────────────

/// Evaluates a bitwise or shift instruction of category `cat`. For `long`
/// shifts the distance is an `int`.
pub fn try_eval_bitwise(cat: Category, op: BitOp, lhs: Value, rhs: Value) -> Option<Value> {
    let result = match (cat, lhs, rhs) {
        (Category::Int, Value::Int(a), Value::Int(b)) => Value::Int(match op {
            BitOp::Shl => a.wrapping_shl(b as u32),
            BitOp::Shr => a.wrapping_shr(b as u32),
            BitOp::Ushr => (a as u32).wrapping_shr(b as u32) as i32,
            BitOp::And => a & b,
            BitOp::Or => a | b,
            BitOp::Xor => a ^ b,
        }),
        (Category::Long, Value::Long(a), Value::Int(b)) if op.is_shift() => {
            Value::Long(match op {
                BitOp::Shl => a.wrapping_shl(b as u32),
                BitOp::Shr => a.wrapping_shr(b as u32),
                _ => (a as u64).wrapping_shr(b as u32) as i64,
            })
        }
        (Category::Long, Value::Long(a), Value::Long(b)) if !op.is_shift() => {
            Value::Long(match op {
                BitOp::And => a & b,
                BitOp::Or => a | b,
                _ => a ^ b,
            })
        }
        _ => return None,
    };
    Some(result)
}

// ── Conversions ──────────────────────────────────────────────────────────────

/// Converts `value` to category `to` (`i2l`, `f2i`, `d2f`, ...).
pub fn convert(value: Value, to: Category) -> Value {
    match (value, to) {
        (Value::Int(v), Category::Long) => Value::Long(v as i64),
        (Value::Int(v), Category::Float) => Value::Float(v as f32),
        (Value::Int(v), Category::Double) => Value::Double(v as f64),
        (Value::Long(v), Category::Int) => Value::Int(v as i32),
        (Value::Long(v), Category::Float) => Value::Float(v as f32),
        (Value::Long(v), Category::Double) => Value::Double(v as f64),
        // `as` from float to int saturates and sends NaN to 0, like the JVM.
        (Value::Float(v), Category::Int) => Value::Int(v as i32),
        (Value::Float(v), Category::Long) => Value::Long(v as i64),
        (Value::Float(v), Category::Double) => Value::Double(v as f64),
        (Value::Double(v), Category::Int) => Value::Int(v as i32),
        (Value::Double(v), Category::Long) => Value::Long(v as i64),
        (Value::Double(v), Category::Float) => Value::Float(v as f32),
        (same, _) => same,
    }
}

/// `i2b`, `i2c`, `i2s`.
pub fn narrow(kind: Narrow, v: i32) -> i32 {
    match kind {
        Narrow::Byte => v as i8 as i32,
        Narrow::Char => v as u16 as i32,
        Narrow::Short => v as i16 as i32,
    }
}

// ── Comparisons ──────────────────────────────────────────────────────────────

/// `lcmp`, `fcmp<l|g>`, `dcmp<l|g>`: -1, 0 or 1. An unordered (NaN)
/// comparison yields -1 for the `l` forms and 1 for the `g` forms.
pub fn try_compare(kind: CmpKind, lhs: Value, rhs: Value) -> Option<i32> {
    let ordering = match (kind, lhs, rhs) {
        (CmpKind::Long, Value::Long(a), Value::Long(b)) => Some(a.cmp(&b)),
        (CmpKind::FloatL | CmpKind::FloatG, Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
        (CmpKind::DoubleL | CmpKind::DoubleG, Value::Double(a), Value::Double(b)) => {
            a.partial_cmp(&b)
        }
        _ => return None,
    };
    Some(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => match kind {
            CmpKind::FloatG | CmpKind::DoubleG => 1,
            _ => -1,
        },
    })
}
