//! Field and method descriptors, reduced to what slot accounting needs.

use anyhow::{bail, Context, Result};

/// Slots taken by a value of the given field descriptor (`J`/`D` take two,
/// `V` none, everything else one).
pub fn field_slots(descriptor: &str) -> Result<u16> {
    match descriptor.as_bytes().first() {
        Some(b'J' | b'D') => Ok(2),
        Some(b'V') => Ok(0),
        Some(b'B' | b'C' | b'F' | b'I' | b'S' | b'Z' | b'L' | b'[') => Ok(1),
        _ => bail!("invalid field descriptor {:?}", descriptor),
    }
}

/// Slot footprint of a method descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Local slots the arguments occupy (without `this`).
    pub param_slots: u16,
    /// Operand-stack slots the return value occupies.
    pub return_slots: u16,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            bail!("method descriptor {:?} does not start with '('", descriptor);
        }
        let mut pos = 1;
        let mut param_slots: u16 = 0;
        while bytes.get(pos) != Some(&b')') {
            let (slots, next) = parse_field_type(bytes, pos)
                .with_context(|| format!("in method descriptor {:?}", descriptor))?;
            param_slots = match param_slots.checked_add(slots) {
                Some(total) => total,
                None => bail!("method descriptor {:?} has too many parameters", descriptor),
            };
            pos = next;
        }
        let return_type = &descriptor[pos + 1..];
        let return_slots = field_slots(return_type)
            .with_context(|| format!("in method descriptor {:?}", descriptor))?;
        Ok(Self {
            param_slots,
            return_slots,
        })
    }
}

/// Parses one field type at `pos`, returning its slot count and the position
/// after it.
fn parse_field_type(bytes: &[u8], pos: usize) -> Result<(u16, usize)> {
    match bytes.get(pos) {
        Some(b'J' | b'D') => Ok((2, pos + 1)),
        Some(b'B' | b'C' | b'F' | b'I' | b'S' | b'Z') => Ok((1, pos + 1)),
        Some(b'L') => {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .context("unterminated class type")?;
            Ok((1, pos + end + 1))
        }
        Some(b'[') => {
            let mut elem = pos;
            while bytes.get(elem) == Some(&b'[') {
                elem += 1;
            }
            let (_, next) = parse_field_type(bytes, elem)?;
            Ok((1, next))
        }
        Some(&other) => bail!("unexpected descriptor character {:?}", other as char),
        None => bail!("unterminated parameter list"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_parameters() {
        let d = MethodDescriptor::parse("(IJLjava/lang/String;[[DF)Z").unwrap();
        assert_eq!(d.param_slots, 1 + 2 + 1 + 1 + 1);
        assert_eq!(d.return_slots, 1);
    }

    #[test]
    fn void_and_wide_returns() {
        assert_eq!(MethodDescriptor::parse("()V").unwrap().return_slots, 0);
        assert_eq!(MethodDescriptor::parse("()D").unwrap().return_slots, 2);
    }

    #[test]
    fn malformed_descriptors_fail() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(Ljava/lang/String").is_err());
        assert!(MethodDescriptor::parse("(Q)V").is_err());
    }

    #[test]
    fn parameter_slot_overflow_fails() {
        let descriptor = format!("({})V", "J".repeat(32_768));
        let err = MethodDescriptor::parse(&descriptor).unwrap_err();
        assert!(err.to_string().contains("too many parameters"), "{err}");
    }

    #[test]
    fn field_slot_sizes() {
        assert_eq!(field_slots("J").unwrap(), 2);
        assert_eq!(field_slots("[J").unwrap(), 1);
        assert_eq!(field_slots("Ljava/lang/Object;").unwrap(), 1);
        assert!(field_slots("").is_err());
    }
}
