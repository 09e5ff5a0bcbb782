use indextree::NodeId;

use crate::charutil::Span;
use crate::cur::CurId;
use crate::name::{NameId, PrefixId};
use crate::soap::SoapKind;

/// A node in a document tree.
///
/// This is a lightweight handle into the [`Locale`](crate::Locale) arena and
/// can be copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node(NodeId);

impl Node {
    #[inline]
    pub(crate) fn new(node_id: NodeId) -> Self {
        Node(node_id)
    }

    #[inline]
    pub(crate) fn get(&self) -> NodeId {
        self.0
    }
}

/// The kind of a node. Text is not a node kind: it lives in the `value` and
/// `after` spans of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Document root.
    Root,
    /// Element.
    Element,
    /// Attribute, including namespace declarations.
    Attr,
    /// Comment.
    Comment,
    /// Processing instruction.
    Procinst,
}

impl NodeKind {
    /// Can this node have children?
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Element)
    }
}

/// Capability tag of a node, used by external-facing facades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    #[default]
    Plain,
    Soap(SoapKind),
}

/// The kind of a run of chars as seen by the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharNodeKind {
    Text,
    CData,
}

/// A bookmarked sub-span of a text run, the identity of a DOM text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharNode {
    pub kind: CharNodeKind,
    pub cch: usize,
}

/// The char nodes of one span.
///
/// Empty means "not materialized": the whole span is one text node. When
/// present, the lengths always add up to the span length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharNodes(Vec<CharNode>);

impl CharNodes {
    pub fn new() -> Self {
        CharNodes(Vec::new())
    }

    pub fn is_materialized(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn nodes(&self) -> &[CharNode] {
        &self.0
    }

    pub(crate) fn total(&self) -> usize {
        self.0.iter().map(|n| n.cch).sum()
    }

    // materialize as a single text node covering `cch`
    fn materialize(&mut self, cch: usize) {
        if self.0.is_empty() && cch > 0 {
            self.0.push(CharNode {
                kind: CharNodeKind::Text,
                cch,
            });
        }
    }

    /// Append a run of the given kind to a span currently `cch` long.
    pub(crate) fn push(&mut self, cch_before: usize, kind: CharNodeKind, cch: usize) {
        if cch == 0 {
            return;
        }
        if kind == CharNodeKind::Text && !self.is_materialized() {
            return;
        }
        self.materialize(cch_before);
        match self.0.last_mut() {
            Some(last) if last.kind == kind => last.cch += cch,
            _ => self.0.push(CharNode { kind, cch }),
        }
    }

    /// Account for `cch` chars inserted at `off`. They join the node that
    /// contains the insertion point, preferring the node to the left.
    pub(crate) fn insert(&mut self, off: usize, cch: usize) {
        if !self.is_materialized() || cch == 0 {
            return;
        }
        let mut start = 0;
        for node in self.0.iter_mut() {
            if off <= start + node.cch {
                node.cch += cch;
                return;
            }
            start += node.cch;
        }
        unreachable!("insertion offset past the end of the char nodes");
    }

    /// Account for `cch` chars removed at `off`.
    pub(crate) fn remove(&mut self, off: usize, cch: usize) {
        if !self.is_materialized() || cch == 0 {
            return;
        }
        let end = off + cch;
        let mut start = 0;
        for node in self.0.iter_mut() {
            let node_end = start + node.cch;
            let overlap_start = off.max(start);
            let overlap_end = end.min(node_end);
            if overlap_start < overlap_end {
                node.cch -= overlap_end - overlap_start;
            }
            start = node_end;
        }
        self.0.retain(|n| n.cch > 0);
    }

    /// Split at `off`, keeping the left part and returning the right part.
    pub(crate) fn split_off(&mut self, off: usize) -> CharNodes {
        if !self.is_materialized() {
            return CharNodes::new();
        }
        let mut start = 0;
        for i in 0..self.0.len() {
            let node = self.0[i];
            if off < start + node.cch {
                let mut right = self.0.split_off(i);
                let left_part = off - start;
                if left_part > 0 {
                    right[0].cch -= left_part;
                    self.0.push(CharNode {
                        kind: node.kind,
                        cch: left_part,
                    });
                }
                return CharNodes(right);
            }
            start += node.cch;
        }
        CharNodes::new()
    }

    /// Insert the char nodes of an inserted run of `inserted_cch` chars at
    /// `off` into a span currently `cch` long.
    pub(crate) fn splice(&mut self, off: usize, cch: usize, inserted: CharNodes, inserted_cch: usize) {
        if !inserted.is_materialized() {
            self.insert(off, inserted_cch);
            return;
        }
        let mut left = std::mem::take(self);
        left.materialize(cch);
        let right = left.split_off(off);
        *self = left
            .concat(off, inserted, inserted_cch)
            .concat(off + inserted_cch, right, cch - off);
    }

    /// The char nodes of a sub-range.
    pub(crate) fn slice(&self, off: usize, cch: usize) -> CharNodes {
        if !self.is_materialized() {
            return CharNodes::new();
        }
        let mut copy = self.clone();
        let mut right = copy.split_off(off);
        right.split_off(cch);
        right
    }

    /// Concatenate the char nodes of two adjacent spans of the given lengths.
    pub(crate) fn concat(mut self, left_cch: usize, mut right: CharNodes, right_cch: usize) -> Self {
        if !self.is_materialized() && !right.is_materialized() {
            return self;
        }
        self.materialize(left_cch);
        right.materialize(right_cch);
        for node in right.0 {
            match self.0.last_mut() {
                Some(last) if last.kind == node.kind => last.cch += node.cch,
                _ => self.0.push(node),
            }
        }
        self
    }
}

/// The record behind a [`Node`].
#[derive(Debug, Clone)]
pub(crate) struct Xobj {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<NameId>,
    pub(crate) prefix: Option<PrefixId>,
    pub(crate) flavor: Flavor,
    pub(crate) value: Span,
    pub(crate) after: Span,
    pub(crate) value_nodes: CharNodes,
    pub(crate) after_nodes: CharNodes,
    // head of the list of cursors embedded in this node
    pub(crate) embedded: Option<CurId>,
}

impl Xobj {
    pub(crate) fn new(kind: NodeKind, name: Option<NameId>) -> Self {
        Xobj {
            kind,
            name,
            prefix: None,
            flavor: Flavor::Plain,
            value: Span::empty(),
            after: Span::empty(),
            value_nodes: CharNodes::new(),
            after_nodes: CharNodes::new(),
            embedded: None,
        }
    }

    #[inline]
    pub(crate) fn cch_value(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub(crate) fn cch_after(&self) -> usize {
        self.after.len()
    }

    /// Position of the end token when spelled out numerically.
    #[inline]
    pub(crate) fn pos_end(&self) -> i32 {
        self.cch_value() as i32 + 1
    }

    /// First position in the after text.
    #[inline]
    pub(crate) fn pos_after(&self) -> i32 {
        self.cch_value() as i32 + 2
    }

    /// Position just past the after text.
    #[inline]
    pub(crate) fn pos_max(&self) -> i32 {
        self.pos_after() + self.cch_after() as i32
    }

    #[inline]
    pub(crate) fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    #[inline]
    pub(crate) fn is_attr(&self) -> bool {
        self.kind == NodeKind::Attr
    }

    // copy without links to cursors
    pub(crate) fn duplicate(&self) -> Xobj {
        Xobj {
            embedded: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(runs: &[(CharNodeKind, usize)]) -> CharNodes {
        CharNodes(
            runs.iter()
                .map(|(kind, cch)| CharNode {
                    kind: *kind,
                    cch: *cch,
                })
                .collect(),
        )
    }

    use CharNodeKind::*;

    #[test]
    fn test_push_text_stays_lazy() {
        let mut char_nodes = CharNodes::new();
        char_nodes.push(0, Text, 3);
        assert!(!char_nodes.is_materialized());
        char_nodes.push(3, CData, 2);
        assert_eq!(char_nodes, nodes(&[(Text, 3), (CData, 2)]));
        char_nodes.push(5, Text, 1);
        assert_eq!(char_nodes, nodes(&[(Text, 3), (CData, 2), (Text, 1)]));
    }

    #[test]
    fn test_insert_prefers_left() {
        let mut char_nodes = nodes(&[(Text, 3), (CData, 2)]);
        char_nodes.insert(3, 4);
        assert_eq!(char_nodes, nodes(&[(Text, 7), (CData, 2)]));
        char_nodes.insert(9, 1);
        assert_eq!(char_nodes, nodes(&[(Text, 7), (CData, 3)]));
    }

    #[test]
    fn test_remove_across_nodes() {
        let mut char_nodes = nodes(&[(Text, 3), (CData, 2), (Text, 4)]);
        char_nodes.remove(2, 4);
        assert_eq!(char_nodes, nodes(&[(Text, 2), (Text, 3)]));
        assert_eq!(char_nodes.total(), 5);
    }

    #[test]
    fn test_split_off() {
        let mut char_nodes = nodes(&[(Text, 3), (CData, 2)]);
        let right = char_nodes.split_off(4);
        assert_eq!(char_nodes, nodes(&[(Text, 3), (CData, 1)]));
        assert_eq!(right, nodes(&[(CData, 1)]));
    }

    #[test]
    fn test_concat_materializes() {
        let left = CharNodes::new();
        let right = nodes(&[(CData, 2)]);
        let joined = left.concat(3, right, 2);
        assert_eq!(joined, nodes(&[(Text, 3), (CData, 2)]));
    }

    #[test]
    fn test_splice_keeps_kinds() {
        let mut char_nodes = nodes(&[(Text, 4)]);
        char_nodes.splice(2, 4, nodes(&[(CData, 3)]), 3);
        assert_eq!(char_nodes, nodes(&[(Text, 2), (CData, 3), (Text, 2)]));
        let mut plain = CharNodes::new();
        plain.splice(0, 0, nodes(&[(CData, 1)]), 1);
        assert_eq!(plain, nodes(&[(CData, 1)]));
    }

    #[test]
    fn test_slice() {
        let char_nodes = nodes(&[(Text, 2), (CData, 3), (Text, 2)]);
        assert_eq!(char_nodes.slice(1, 3), nodes(&[(Text, 1), (CData, 2)]));
        assert!(!CharNodes::new().slice(0, 2).is_materialized());
    }

    #[test]
    fn test_positions() {
        let mut xobj = Xobj::new(NodeKind::Element, None);
        xobj.value = Span::from_str("abc");
        xobj.after = Span::from_str("de");
        assert_eq!(xobj.pos_end(), 4);
        assert_eq!(xobj.pos_after(), 5);
        assert_eq!(xobj.pos_max(), 7);
    }
}
