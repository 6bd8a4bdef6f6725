//! Editable instruction stream with stable ids and a redirect map.

use super::encode::insn_size;
use super::types::{Insn, InsnId};
use std::collections::HashMap;

/// One instruction of a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: InsnId,
    /// Byte offset as of the last [`InsnList::layout`].
    pub offset: u32,
    pub insn: Insn,
}

/// Ordered instruction stream.
///
/// Removing or replacing a node records `old id -> replacement id` in the
/// redirect map. Anything still holding the old id (a branch, a handler
/// bound, a debug table entry) is pointed at the replacement by
/// [`InsnList::resolve`] when the method is repaired.
#[derive(Debug, Clone, Default)]
pub struct InsnList {
    nodes: Vec<Node>,
    next_id: u32,
    redirects: HashMap<InsnId, InsnId>,
}

impl InsnList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list whose ids are the positions `0..insns.len()`, then lays
    /// it out.
    pub fn from_insns(insns: Vec<Insn>) -> Self {
        let mut list = Self::new();
        for insn in insns {
            list.push(insn);
        }
        list.layout();
        list
    }

    /// Builds a list from decoded `(offset, insn)` pairs, keeping the original
    /// offsets so handler and debug table offsets can be mapped to ids.
    pub(crate) fn from_decoded(decoded: Vec<(u32, Insn)>) -> Self {
        let mut list = Self::new();
        for (offset, insn) in decoded {
            let id = list.alloc_id();
            list.nodes.push(Node { id, offset, insn });
        }
        list
    }

    /// Appends an instruction and returns its id. Offsets are stale until the
    /// next [`InsnList::layout`].
    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.alloc_id();
        self.nodes.push(Node {
            id,
            offset: 0,
            insn,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn insn(&self, index: usize) -> Option<&Insn> {
        self.nodes.get(index).map(|n| &n.insn)
    }

    pub fn id_at(&self, index: usize) -> Option<InsnId> {
        self.nodes.get(index).map(|n| n.id)
    }

    /// Position of a live instruction.
    pub fn index_of(&self, id: InsnId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Map from every live id to its position.
    pub fn positions(&self) -> HashMap<InsnId, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect()
    }

    /// Id of the instruction starting exactly at `offset`.
    pub fn id_at_offset(&self, offset: u32) -> Option<InsnId> {
        self.nodes
            .binary_search_by_key(&offset, |n| n.offset)
            .ok()
            .map(|i| self.nodes[i].id)
    }

    /// Replaces the instruction at `index` with a new node and returns its
    /// id. References to the old node follow it through the redirect map.
    pub fn replace(&mut self, index: usize, insn: Insn) -> InsnId {
        let id = self.alloc_id();
        let node = &mut self.nodes[index];
        self.redirects.insert(node.id, id);
        node.id = id;
        node.insn = insn;
        id
    }

    /// Removes the instruction at `index`; references to it are redirected to
    /// `replacement`.
    pub fn remove(&mut self, index: usize, replacement: InsnId) -> Node {
        let node = self.nodes.remove(index);
        self.redirects.insert(node.id, replacement);
        node
    }

    /// Swaps the whole stream for `insns`. Every old id is redirected to the
    /// first new instruction.
    pub fn replace_all(&mut self, insns: Vec<Insn>) -> Vec<InsnId> {
        let old: Vec<InsnId> = self.nodes.drain(..).map(|n| n.id).collect();
        let ids: Vec<InsnId> = insns.into_iter().map(|insn| self.push(insn)).collect();
        if let Some(&first) = ids.first() {
            for id in old {
                self.redirects.insert(id, first);
            }
        }
        self.layout();
        ids
    }

    /// Follows the redirect chain of `id` to a live (or never redirected)
    /// instruction.
    pub fn resolve(&self, id: InsnId) -> InsnId {
        resolve_in(&self.redirects, id)
    }

    /// Rewrites every branch and switch target through [`InsnList::resolve`].
    pub fn retarget(&mut self) {
        let redirects = &self.redirects;
        if redirects.is_empty() {
            return;
        }
        for node in &mut self.nodes {
            node.insn
                .for_each_target_mut(|t| *t = resolve_in(redirects, *t));
        }
    }

    /// Recomputes every offset and returns the code length.
    pub fn layout(&mut self) -> u32 {
        let mut offset = 0u32;
        for node in &mut self.nodes {
            node.offset = offset;
            offset += insn_size(&node.insn, offset);
        }
        offset
    }

    /// Code length as of the last layout.
    pub fn code_len(&self) -> u32 {
        self.nodes
            .last()
            .map(|n| n.offset + insn_size(&n.insn, n.offset))
            .unwrap_or(0)
    }

    pub fn has_redirects(&self) -> bool {
        !self.redirects.is_empty()
    }

    pub fn clear_redirects(&mut self) {
        self.redirects.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    fn alloc_id(&mut self) -> InsnId {
        let id = InsnId(self.next_id);
        self.next_id += 1;
        id
    }
}

fn resolve_in(redirects: &HashMap<InsnId, InsnId>, id: InsnId) -> InsnId {
    let mut current = id;
    // Ids are never reused, so chains are acyclic; the bound only guards
    // against a corrupted map.
    for _ in 0..=redirects.len() {
        match redirects.get(&current) {
            Some(&next) => current = next,
            None => break,
        }
    }
    current
}

impl<'a> IntoIterator for &'a InsnList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ArithOp, Category, Push};

    fn iconst(v: i32) -> Insn {
        Insn::Push(Push::IConst(v))
    }

    #[test]
    fn layout_assigns_monotonic_offsets() {
        let list = InsnList::from_insns(vec![
            Insn::Push(Push::SiPush(12345)),
            Insn::Store {
                cat: Category::Int,
                slot: 1,
            },
            Insn::Push(Push::Ldc(300)),
            Insn::Return(Some(Category::Int)),
        ]);
        let offsets: Vec<u32> = list.iter().map(|n| n.offset).collect();
        assert_eq!(offsets, vec![0, 3, 4, 7]);
        assert_eq!(list.code_len(), 8);
        assert_eq!(list.id_at_offset(4), Some(InsnId(2)));
        assert_eq!(list.id_at_offset(5), None);
    }

    #[test]
    fn replace_redirects_old_id() {
        let mut list = InsnList::from_insns(vec![iconst(1), iconst(2), Insn::Nop]);
        let new = list.replace(1, iconst(3));
        assert_ne!(new, InsnId(1));
        assert_eq!(list.resolve(InsnId(1)), new);
        assert_eq!(list.index_of(new), Some(1));
        assert_eq!(list.index_of(InsnId(1)), None);
    }

    #[test]
    fn redirect_chains_are_followed() {
        let mut list = InsnList::from_insns(vec![
            iconst(2),
            iconst(3),
            Insn::Arith {
                cat: Category::Int,
                op: ArithOp::Add,
            },
            Insn::Return(Some(Category::Int)),
        ]);
        let folded = list.replace(0, iconst(5));
        list.remove(1, folded);
        list.remove(1, folded);
        assert_eq!(list.resolve(InsnId(2)), folded);
        let again = list.replace(0, iconst(4));
        assert_eq!(list.resolve(InsnId(2)), again);
        assert_eq!(list.resolve(InsnId(0)), again);
    }

    #[test]
    fn retarget_rewrites_branches() {
        let mut list = InsnList::from_insns(vec![
            Insn::Goto(InsnId(2)),
            Insn::Nop,
            iconst(0),
            Insn::Return(Some(Category::Int)),
        ]);
        let new = list.replace(2, iconst(1));
        list.retarget();
        assert_eq!(list.insn(0), Some(&Insn::Goto(new)));
    }

    #[test]
    fn replace_all_redirects_everything_to_first() {
        let mut list = InsnList::from_insns(vec![iconst(1), Insn::Nop, Insn::Nop]);
        let ids = list.replace_all(vec![iconst(0), Insn::Return(Some(Category::Int))]);
        assert_eq!(list.len(), 2);
        for old in 0..3 {
            assert_eq!(list.resolve(InsnId(old)), ids[0]);
        }
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        let list = InsnList::from_insns(vec![
            Insn::Nop,
            Insn::TableSwitch {
                default: InsnId(2),
                low: 0,
                targets: vec![InsnId(2)],
            },
            Insn::Return(None),
        ]);
        // opcode at 1, two pad bytes, then default/low/high and one target.
        assert_eq!(list.get(2).map(|n| n.offset), Some(1 + 1 + 2 + 12 + 4));
    }
}
