use indextree::NodeId;
use std::cmp::Ordering;

use super::{CurId, END_POS};
use crate::locale::Locale;
use crate::name::QName;
use crate::xobj::{Node, NodeKind};

/// The token at a cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    StartDoc,
    EndDoc,
    Start,
    End,
    Text,
    Attr,
    Namespace,
    Comment,
    Procinst,
}

impl TokenKind {
    pub fn is_container(self) -> bool {
        matches!(self, TokenKind::StartDoc | TokenKind::Start)
    }

    pub fn is_finish(self) -> bool {
        matches!(self, TokenKind::EndDoc | TokenKind::End)
    }

    pub fn is_any_attr(self) -> bool {
        matches!(self, TokenKind::Attr | TokenKind::Namespace)
    }
}

// where a text position lies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextRun {
    // value text, offset into the value
    Value(usize),
    // after text, offset into the after text
    After(usize),
}

/// Positions and navigation.
impl Locale {
    pub(crate) fn parent_of(&self, x: NodeId) -> Option<NodeId> {
        self.arena[x].parent()
    }

    pub(crate) fn first_child_of(&self, x: NodeId) -> Option<NodeId> {
        self.arena[x].first_child()
    }

    pub(crate) fn last_child_of(&self, x: NodeId) -> Option<NodeId> {
        self.arena[x].last_child()
    }

    pub(crate) fn next_sibling_of(&self, x: NodeId) -> Option<NodeId> {
        self.arena[x].next_sibling()
    }

    pub(crate) fn prev_sibling_of(&self, x: NodeId) -> Option<NodeId> {
        self.arena[x].previous_sibling()
    }

    pub(crate) fn first_content_child_of(&self, x: NodeId) -> Option<NodeId> {
        let mut child = self.first_child_of(x);
        while let Some(c) = child {
            if !self.xobj(c).is_attr() {
                return Some(c);
            }
            child = self.next_sibling_of(c);
        }
        None
    }

    pub(crate) fn last_attr_of(&self, x: NodeId) -> Option<NodeId> {
        let mut last = None;
        let mut child = self.first_child_of(x);
        while let Some(c) = child {
            if !self.xobj(c).is_attr() {
                break;
            }
            last = Some(c);
            child = self.next_sibling_of(c);
        }
        last
    }

    /// Bring a position into normal form.
    ///
    /// The end of a container's value becomes its first child, or its end
    /// token when it has none. The end of a node's after text becomes its
    /// next sibling, or the end token of its parent. A leaf has no end
    /// token; that position is its after text.
    pub(crate) fn normalize(&self, x: NodeId, p: i32) -> (NodeId, i32) {
        let xobj = self.xobj(x);
        let container = xobj.is_container();
        let mut p = p;
        if p == END_POS {
            if container {
                return (x, END_POS);
            }
            p = xobj.pos_after();
        }
        debug_assert!(p >= 0 && p <= xobj.pos_max(), "position out of range");
        if p == xobj.pos_end() {
            if container {
                return match self.first_child_of(x) {
                    Some(child) => (child, 0),
                    None => (x, END_POS),
                };
            }
            p = xobj.pos_after();
        }
        if p == xobj.pos_max() && p >= xobj.pos_after() {
            if let Some(next) = self.next_sibling_of(x) {
                return (next, 0);
            }
            if let Some(parent) = self.parent_of(x) {
                return (parent, END_POS);
            }
        }
        (x, p)
    }

    /// The end of the text run that immediately precedes a position.
    ///
    /// The start of a node is the end of the after text of its previous
    /// sibling, or the end of its parent's value. The end token of a
    /// container is the end of its last child's after text, or the end of
    /// its own value. Text positions are returned unchanged. The start of a
    /// root has no preceding text and is also returned unchanged.
    pub(crate) fn denormalize(&self, x: NodeId, p: i32) -> (NodeId, i32) {
        if p == 0 {
            if let Some(prev) = self.prev_sibling_of(x) {
                return (prev, self.xobj(prev).pos_max());
            }
            if let Some(parent) = self.parent_of(x) {
                return (parent, self.xobj(parent).pos_end());
            }
            return (x, 0);
        }
        if p == END_POS {
            if let Some(last) = self.last_child_of(x) {
                return (last, self.xobj(last).pos_max());
            }
            return (x, self.xobj(x).pos_end());
        }
        (x, p)
    }

    // which text run a (possibly denormal) text position is in
    pub(crate) fn text_run(&self, x: NodeId, p: i32) -> Option<TextRun> {
        let xobj = self.xobj(x);
        if p >= 1 && p <= xobj.pos_end() {
            Some(TextRun::Value((p - 1) as usize))
        } else if p >= xobj.pos_after() {
            Some(TextRun::After((p - xobj.pos_after()) as usize))
        } else {
            None
        }
    }

    /// The token a cursor is at.
    pub fn kind(&self, id: CurId) -> TokenKind {
        let (x, p) = self.raw_pos(id);
        self.token_at(x, p)
    }

    pub(crate) fn token_at(&self, x: NodeId, p: i32) -> TokenKind {
        let xobj = self.xobj(x);
        match p {
            0 => match xobj.kind {
                NodeKind::Root => TokenKind::StartDoc,
                NodeKind::Element => TokenKind::Start,
                NodeKind::Attr if self.is_namespace_attr(Node::new(x)) => TokenKind::Namespace,
                NodeKind::Attr => TokenKind::Attr,
                NodeKind::Comment => TokenKind::Comment,
                NodeKind::Procinst => TokenKind::Procinst,
            },
            END_POS if xobj.kind == NodeKind::Root => TokenKind::EndDoc,
            END_POS => TokenKind::End,
            _ => TokenKind::Text,
        }
    }

    /// Number of chars right of the cursor in its text run.
    pub fn cch_right(&self, id: CurId) -> usize {
        let (x, p) = self.raw_pos(id);
        self.cch_right_at(x, p)
    }

    pub(crate) fn cch_right_at(&self, x: NodeId, p: i32) -> usize {
        let xobj = self.xobj(x);
        match self.text_run(x, p) {
            Some(TextRun::Value(off)) if p != END_POS && p > 0 => xobj.cch_value() - off,
            Some(TextRun::After(off)) => xobj.cch_after() - off,
            _ => 0,
        }
    }

    /// Number of chars left of the cursor in the preceding text run.
    pub fn cch_left(&self, id: CurId) -> usize {
        let (x, p) = self.raw_pos(id);
        let (y, q) = self.denormalize(x, p);
        match self.text_run(y, q) {
            Some(TextRun::Value(off)) | Some(TextRun::After(off)) => off,
            None => 0,
        }
    }

    /// Move to the next token. At the end of a document there is no next
    /// token and the cursor stays.
    pub fn next(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        let xobj = self.xobj(x);
        let target = match p {
            0 if xobj.is_container() => 1,
            0 => xobj.pos_after(),
            END_POS if xobj.kind == NodeKind::Root => return false,
            END_POS => xobj.pos_after(),
            _ if p < xobj.pos_after() => xobj.pos_end(),
            _ => xobj.pos_max(),
        };
        let (x, p) = self.normalize(x, target);
        self.set_pos(id, x, p);
        true
    }

    /// Move to the previous token. Inside text that is the start of the
    /// text run.
    pub fn prev(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        let (y, q) = match p {
            0 | END_POS => {
                let (y, q) = self.denormalize(x, p);
                if (y, q) == (x, p) {
                    return false;
                }
                match self.text_run(y, q) {
                    Some(TextRun::Value(off)) if off > 0 => (y, 1),
                    Some(TextRun::After(off)) if off > 0 => (y, self.xobj(y).pos_after()),
                    Some(TextRun::Value(_)) => (y, 0),
                    _ if self.xobj(y).is_container() => (y, END_POS),
                    _ => (y, 0),
                }
            }
            _ => {
                let xobj = self.xobj(x);
                if p < xobj.pos_after() {
                    if p > 1 {
                        (x, 1)
                    } else {
                        (x, 0)
                    }
                } else if p > xobj.pos_after() {
                    (x, xobj.pos_after())
                } else if xobj.is_container() {
                    (x, END_POS)
                } else {
                    (x, 0)
                }
            }
        };
        self.set_pos(id, y, q);
        true
    }

    /// Move right over at most `cch` chars of the current text run. Returns
    /// the number of chars moved over.
    pub fn next_chars(&mut self, id: CurId, cch: usize) -> usize {
        let (x, p) = self.raw_pos(id);
        let n = cch.min(self.cch_right_at(x, p));
        if n > 0 {
            let (x, p) = self.normalize(x, p + n as i32);
            self.set_pos(id, x, p);
        }
        n
    }

    /// Move left over at most `cch` chars of the preceding text run.
    pub fn prev_chars(&mut self, id: CurId, cch: usize) -> usize {
        let n = cch.min(self.cch_left(id));
        if n > 0 {
            let (x, p) = self.raw_pos(id);
            let (y, q) = self.denormalize(x, p);
            let (y, q) = self.normalize(y, q - n as i32);
            self.set_pos(id, y, q);
        }
        n
    }

    // the container a position is inside of
    pub(crate) fn container_at(&self, x: NodeId, p: i32) -> Option<NodeId> {
        if p == END_POS || (p >= 1 && p < self.xobj(x).pos_after()) {
            Some(x)
        } else {
            self.parent_of(x)
        }
    }

    /// Move to the start of the container that contains the cursor.
    pub fn to_parent(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        match self.container_at(x, p) {
            Some(parent) => {
                self.set_pos(id, parent, 0);
                true
            }
            None => false,
        }
    }

    /// Move from the start of a container to its first child that is not an
    /// attribute.
    pub fn to_first_child(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_container() {
            return false;
        }
        match self.first_content_child_of(x) {
            Some(child) => {
                self.set_pos(id, child, 0);
                true
            }
            None => false,
        }
    }

    /// Move from the start of a container to its last child that is not an
    /// attribute.
    pub fn to_last_child(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_container() {
            return false;
        }
        match self.last_child_of(x) {
            Some(child) if !self.xobj(child).is_attr() => {
                self.set_pos(id, child, 0);
                true
            }
            _ => false,
        }
    }

    /// Move from the start of a node to the start of its next sibling.
    pub fn to_next_sibling(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || self.xobj(x).is_attr() {
            return false;
        }
        match self.next_sibling_of(x) {
            Some(next) => {
                self.set_pos(id, next, 0);
                true
            }
            None => false,
        }
    }

    /// Move from the start of a node to the start of its previous sibling
    /// that is not an attribute.
    pub fn to_prev_sibling(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || self.xobj(x).is_attr() {
            return false;
        }
        match self.prev_sibling_of(x) {
            Some(prev) if !self.xobj(prev).is_attr() => {
                self.set_pos(id, prev, 0);
                true
            }
            _ => false,
        }
    }

    /// Move from the start of a container to its first attribute.
    pub fn to_first_attr(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_container() {
            return false;
        }
        match self.first_child_of(x) {
            Some(child) if self.xobj(child).is_attr() => {
                self.set_pos(id, child, 0);
                true
            }
            _ => false,
        }
    }

    /// Move from an attribute to the next attribute.
    pub fn to_next_attr(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_attr() {
            return false;
        }
        match self.next_sibling_of(x) {
            Some(next) if self.xobj(next).is_attr() => {
                self.set_pos(id, next, 0);
                true
            }
            _ => false,
        }
    }

    /// Move from an attribute to the previous attribute.
    pub fn to_prev_attr(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_attr() {
            return false;
        }
        match self.prev_sibling_of(x) {
            Some(prev) => {
                self.set_pos(id, prev, 0);
                true
            }
            None => false,
        }
    }

    /// Move from the start of a container to its attribute with `name`.
    pub fn to_attr(&mut self, id: CurId, name: &QName) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_container() {
            return false;
        }
        match self.find_attr(x, name) {
            Some(attr) => {
                self.set_pos(id, attr, 0);
                true
            }
            None => false,
        }
    }

    pub(crate) fn find_attr(&self, x: NodeId, name: &QName) -> Option<NodeId> {
        let name_id = self.names.name_id(name)?;
        let mut child = self.first_child_of(x);
        while let Some(c) = child {
            let xobj = self.xobj(c);
            if !xobj.is_attr() {
                break;
            }
            if xobj.name == Some(name_id) {
                return Some(c);
            }
            child = self.next_sibling_of(c);
        }
        None
    }

    /// Move from the start of a container to its end token.
    pub fn to_end(&mut self, id: CurId) -> bool {
        let (x, p) = self.raw_pos(id);
        if p != 0 || !self.xobj(x).is_container() {
            return false;
        }
        self.set_pos(id, x, END_POS);
        true
    }

    /// Move to the start of the document.
    pub fn to_root(&mut self, id: CurId) {
        let (x, _) = self.raw_pos(id);
        let root = self.root(Node::new(x));
        self.set_pos(id, root.get(), 0);
    }

    /// The position in document order, as a key that compares the way the
    /// positions do.
    fn order_key(&self, x: NodeId, p: i32) -> Vec<(u8, i64)> {
        let own = match p {
            0 => (0, 0),
            END_POS => (3, 0),
            _ if p < self.xobj(x).pos_after() => (1, p as i64),
            _ => (4, p as i64),
        };
        let mut key = vec![own];
        let mut current = x;
        while let Some(parent) = self.parent_of(current) {
            let index = parent
                .children(&self.arena)
                .position(|c| c == current)
                .unwrap_or(0);
            key.push((2, index as i64));
            current = parent;
        }
        key.reverse();
        key
    }

    /// Compare the positions of two cursors in document order. Cursors in
    /// different trees are unordered.
    pub fn compare_position(&self, a: CurId, b: CurId) -> Option<Ordering> {
        let (xa, pa) = self.raw_pos(a);
        let (xb, pb) = self.raw_pos(b);
        if (xa, pa) == (xb, pb) {
            return Some(Ordering::Equal);
        }
        if self.root(Node::new(xa)) != self.root(Node::new(xb)) {
            return None;
        }
        Some(self.order_key(xa, pa).cmp(&self.order_key(xb, pb)))
    }

    /// Is the cursor somewhere in the subtree of `node`, its after text
    /// excluded?
    pub(crate) fn is_in_subtree(&self, id: CurId, node: NodeId) -> bool {
        let (x, p) = self.raw_pos(id);
        if x == node {
            return p < self.xobj(x).pos_after() || p == END_POS;
        }
        x.ancestors(&self.arena).any(|a| a == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cur::CurClass;

    // <r>ab<a x="1"/>cd<!--c-->ef</r>
    fn sample() -> (Locale, Node, Node, Node, Node) {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let r = locale.create_element(&QName::new("r")).unwrap();
        let a = locale.create_element(&QName::new("a")).unwrap();
        let x = locale.create_attr(&QName::new("x"), "1").unwrap();
        let c = locale.create_comment("c").unwrap();
        root.get().append(r.get(), &mut locale.arena);
        r.get().append(a.get(), &mut locale.arena);
        a.get().append(x.get(), &mut locale.arena);
        r.get().append(c.get(), &mut locale.arena);
        locale.xobj_mut(r.get()).value = crate::charutil::Span::from_str("ab");
        locale.xobj_mut(a.get()).after = crate::charutil::Span::from_str("cd");
        locale.xobj_mut(c.get()).after = crate::charutil::Span::from_str("ef");
        (locale, root, r, a, c)
    }

    fn walk(locale: &mut Locale, id: CurId) -> Vec<TokenKind> {
        let mut tokens = vec![locale.kind(id)];
        while locale.next(id) {
            tokens.push(locale.kind(id));
        }
        tokens
    }

    #[test]
    fn test_next_visits_all_tokens() {
        let (mut locale, root, ..) = sample();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, 0);
        use TokenKind::*;
        assert_eq!(
            walk(&mut locale, id),
            vec![StartDoc, Start, Text, Start, Attr, End, Text, Comment, Text, End, EndDoc]
        );
    }

    #[test]
    fn test_prev_reverses_next() {
        let (mut locale, root, ..) = sample();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, 0);
        let forward = walk(&mut locale, id);
        let mut backward = vec![locale.kind(id)];
        while locale.prev(id) {
            backward.push(locale.kind(id));
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_normalize_end_of_value() {
        let (locale, _, r, a, _) = sample();
        assert_eq!(locale.normalize(r.get(), 3), (a.get(), 0));
        // the attribute's after text is empty
        let x = locale.first_child_of(a.get()).unwrap();
        assert_eq!(locale.normalize(x, END_POS), (a.get(), END_POS));
    }

    #[test]
    fn test_denormalize() {
        let (locale, _, r, a, c) = sample();
        assert_eq!(locale.denormalize(a.get(), 0), (r.get(), 3));
        assert_eq!(locale.denormalize(c.get(), 0), (a.get(), 4));
        assert_eq!(locale.denormalize(r.get(), END_POS), (c.get(), 5));
    }

    #[test]
    fn test_chars_navigation() {
        let (mut locale, _, r, ..) = sample();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, r, 1);
        assert_eq!(locale.cch_right(id), 2);
        assert_eq!(locale.next_chars(id, 1), 1);
        assert_eq!(locale.cch_left(id), 1);
        assert_eq!(locale.next_chars(id, 5), 1);
        assert_eq!(locale.kind(id), TokenKind::Start);
        assert_eq!(locale.cch_left(id), 2);
        assert_eq!(locale.prev_chars(id, 10), 2);
        assert_eq!(locale.cur_pos(id), (r, 1));
    }

    #[test]
    fn test_child_navigation_skips_attributes() {
        let (mut locale, root, r, a, c) = sample();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, 0);
        assert!(locale.to_first_child(id));
        assert_eq!(locale.cur_pos(id), (r, 0));
        assert!(locale.to_first_child(id));
        assert_eq!(locale.cur_pos(id), (a, 0));
        assert!(!locale.to_first_child(id));
        assert!(locale.to_first_attr(id));
        assert!(!locale.to_next_attr(id));
        assert!(locale.to_parent(id));
        assert!(locale.to_next_sibling(id));
        assert_eq!(locale.cur_pos(id), (c, 0));
        assert!(locale.to_prev_sibling(id));
        assert_eq!(locale.cur_pos(id), (a, 0));
        assert!(!locale.to_prev_sibling(id));
        assert!(locale.to_attr(id, &QName::new("x")));
        assert!(!locale.to_attr(id, &QName::new("y")));
    }

    #[test]
    fn test_compare_position() {
        let (mut locale, root, r, a, c) = sample();
        let first = locale.alloc_cur(CurClass::Perm);
        let second = locale.alloc_cur(CurClass::Perm);
        locale.move_to(first, a, END_POS);
        locale.move_to(second, c, 0);
        assert_eq!(locale.compare_position(first, second), Some(Ordering::Less));
        locale.move_to(first, r, 2);
        assert_eq!(locale.compare_position(first, second), Some(Ordering::Less));
        locale.move_to(first, root, END_POS);
        assert_eq!(
            locale.compare_position(first, second),
            Some(Ordering::Greater)
        );
        // text after `a` is after everything inside `a`
        let x = locale.first_child_of(a.get()).unwrap();
        locale.move_to(first, a, 3);
        locale.move_to(second, Node::new(x), 0);
        assert_eq!(
            locale.compare_position(first, second),
            Some(Ordering::Greater)
        );
    }
}
