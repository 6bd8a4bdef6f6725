//! Per-slot history of constant assignments.
//!
//! A constant push immediately followed by a store of the same category opens
//! an interval `[start, end)` in which the slot holds that value, starting at
//! the push. Any later write to the slot closes the open interval at the
//! writing instruction: a constant store (which then opens its own), a
//! non-constant store, `iinc`, or a two-slot store overlapping the slot.
//!
//! Intervals are positional. They say nothing about which paths reach an
//! offset; callers that rewrite loads must check that control cannot enter
//! the interval from elsewhere.

use crate::bytecode::{Insn, InsnList, Value};
use crate::classfile::ConstantPool;
use std::collections::HashMap;

/// `value` is held in a slot for offsets in `start..end`; `end == None`
/// means until the end of the method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotInterval {
    pub value: Value,
    pub start: u32,
    pub end: Option<u32>,
}

impl SlotInterval {
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && self.end.map_or(true, |end| offset < end)
    }

    fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Constant intervals of every slot, in offset order.
#[derive(Debug, Clone, Default)]
pub struct SlotTracker {
    slots: HashMap<u16, Vec<SlotInterval>>,
}

impl SlotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `slot` from `start` on, closing the slot's open
    /// interval at `start`.
    pub fn add_value(&mut self, slot: u16, value: Value, start: u32) {
        self.close(slot, start);
        self.slots.entry(slot).or_default().push(SlotInterval {
            value,
            start,
            end: None,
        });
    }

    /// Closes the slot's open interval, if any, at `offset`.
    pub fn close(&mut self, slot: u16, offset: u32) {
        if let Some(last) = self.slots.get_mut(&slot).and_then(|v| v.last_mut()) {
            if last.is_open() {
                last.end = Some(offset.max(last.start));
            }
        }
    }

    pub fn interval_at(&self, slot: u16, offset: u32) -> Option<&SlotInterval> {
        self.slots.get(&slot)?.iter().find(|i| i.contains(offset))
    }

    /// Value held by `slot` at `offset`, if one was recorded.
    pub fn value_at(&self, slot: u16, offset: u32) -> Option<Value> {
        self.interval_at(slot, offset).map(|i| i.value)
    }

    pub fn intervals(&self, slot: u16) -> &[SlotInterval] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Builds the tracker from a laid-out instruction list.
    pub fn scan(insns: &InsnList, pool: &ConstantPool) -> Self {
        let mut tracker = Self::new();
        let mut previous: Option<&Insn> = None;
        let mut previous_offset = 0;
        for node in insns {
            match node.insn {
                Insn::Store { cat, slot } => {
                    let constant = previous
                        .and_then(Insn::as_push)
                        .and_then(|p| p.value(pool))
                        .filter(|v| v.category() == cat);
                    tracker.close_overlaps(slot, cat.slots(), node.offset);
                    match constant {
                        Some(value) => tracker.add_value(slot, value, previous_offset),
                        None => tracker.close(slot, node.offset),
                    }
                }
                Insn::AStore(slot) => {
                    tracker.close_overlaps(slot, 1, node.offset);
                    tracker.close(slot, node.offset);
                }
                Insn::Iinc { slot, .. } => tracker.close(slot, node.offset),
                _ => {}
            }
            previous = Some(&node.insn);
            previous_offset = node.offset;
        }
        tracker
    }

    /// A write of `width` slots at `slot` also clobbers `slot + 1` for wide
    /// values, and the second half of a wide value held in `slot - 1`.
    fn close_overlaps(&mut self, slot: u16, width: u16, offset: u32) {
        if width == 2 {
            if let Some(next) = slot.checked_add(1) {
                self.close(next, offset);
            }
        }
        if let Some(below) = slot.checked_sub(1) {
            let wide_below = self
                .slots
                .get(&below)
                .and_then(|v| v.last())
                .is_some_and(|i| i.is_open() && i.value.category().slots() == 2);
            if wide_below {
                self.close(below, offset);
            }
        }
    }
}
