//! Narrowest push instruction for a constant.

use crate::bytecode::{Push, Value};
use crate::classfile::ConstantPool;
use anyhow::Result;

/// Picks the shortest instruction that pushes exactly `value`.
///
/// Ints prefer `iconst_<n>`, then `bipush`, then `sipush`, then a pool load.
/// The other categories only have immediates for a few values, which must
/// match bit for bit (so `-0.0` and NaN always go through the pool). The only
/// failure is a full constant pool.
pub fn select_push(value: Value, pool: &mut ConstantPool) -> Result<Push> {
    let push = match value {
        Value::Int(v) => {
            if (-1..=5).contains(&v) {
                Push::IConst(v)
            } else if let Ok(b) = i8::try_from(v) {
                Push::BiPush(b)
            } else if let Ok(s) = i16::try_from(v) {
                Push::SiPush(s)
            } else {
                Push::Ldc(pool.add_integer(v)?)
            }
        }
        Value::Long(v) => match v {
            0 | 1 => Push::LConst(v),
            _ => Push::Ldc2(pool.add_long(v)?),
        },
        Value::Float(v) => {
            if [0.0f32, 1.0, 2.0].iter().any(|c| c.to_bits() == v.to_bits()) {
                Push::FConst(v)
            } else {
                Push::Ldc(pool.add_float(v)?)
            }
        }
        Value::Double(v) => {
            if [0.0f64, 1.0].iter().any(|c| c.to_bits() == v.to_bits()) {
                Push::DConst(v)
            } else {
                Push::Ldc2(pool.add_double(v)?)
            }
        }
    };
    Ok(push)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(value: Value) -> Push {
        select_push(value, &mut ConstantPool::new()).unwrap()
    }

    #[test]
    fn int_preference_order() {
        assert_eq!(select(Value::Int(-1)), Push::IConst(-1));
        assert_eq!(select(Value::Int(5)), Push::IConst(5));
        assert_eq!(select(Value::Int(6)), Push::BiPush(6));
        assert_eq!(select(Value::Int(-128)), Push::BiPush(-128));
        assert_eq!(select(Value::Int(128)), Push::SiPush(128));
        assert_eq!(select(Value::Int(3650)), Push::SiPush(3650));
        assert_eq!(select(Value::Int(-32768)), Push::SiPush(-32768));
        assert!(matches!(select(Value::Int(90000)), Push::Ldc(_)));
        assert!(matches!(select(Value::Int(32768)), Push::Ldc(_)));
    }

    #[test]
    fn pool_load_reuses_entries() {
        let mut pool = ConstantPool::new();
        let a = select_push(Value::Int(54321), &mut pool).unwrap();
        let b = select_push(Value::Int(54321), &mut pool).unwrap();
        assert_eq!(a, b);
        match a {
            Push::Ldc(index) => assert_eq!(pool.numeric(index), Some(Value::Int(54321))),
            other => panic!("expected Ldc, got {other:?}"),
        }
    }

    #[test]
    fn long_immediates() {
        assert_eq!(select(Value::Long(0)), Push::LConst(0));
        assert_eq!(select(Value::Long(1)), Push::LConst(1));
        assert!(matches!(select(Value::Long(2)), Push::Ldc2(_)));
        assert!(matches!(select(Value::Long(-1)), Push::Ldc2(_)));
    }

    #[test]
    fn float_immediates_are_bit_exact() {
        assert_eq!(select(Value::Float(2.0)), Push::FConst(2.0));
        assert!(matches!(select(Value::Float(-0.0)), Push::Ldc(_)));
        assert!(matches!(select(Value::Float(f32::NAN)), Push::Ldc(_)));
        assert_eq!(select(Value::Double(1.0)), Push::DConst(1.0));
        assert!(matches!(select(Value::Double(2.0)), Push::Ldc2(_)));
        assert!(matches!(select(Value::Double(-0.0)), Push::Ldc2(_)));
    }
}
