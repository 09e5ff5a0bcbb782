use indextree::NodeId;

use super::nav::TextRun;
use super::{CurId, END_POS};
use crate::charutil::Span;
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::{validate_name, QName};
use crate::xobj::{CharNodes, Node, NodeKind, Xobj};

/// A detached deep copy of a subtree, ready to be inserted into any locale.
#[derive(Debug, Clone)]
pub struct Fragment {
    records: Vec<FragmentRecord>,
}

#[derive(Debug, Clone)]
struct FragmentRecord {
    parent: Option<usize>,
    name: Option<QName>,
    xobj: Xobj,
}

impl Fragment {
    /// Number of nodes in the fragment.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Structural edits. Every one of them bumps both versions.
impl Locale {
    /// Link a node that isn't part of any tree before the cursor.
    ///
    /// If the cursor is in text, the text is split: the part right of the
    /// cursor becomes the after text of the node, along with any cursors in
    /// it.
    pub fn insert_node(&mut self, node: Node, to: CurId) -> Result<()> {
        let x = node.get();
        debug_assert!(self.parent_of(x).is_none(), "node is already linked");
        debug_assert!(self.xobj(x).after.is_empty());
        let (tx, tp) = self.raw_pos(to);
        match tp {
            0 => {
                assert!(
                    self.parent_of(tx).is_some(),
                    "can't insert before a root"
                );
                tx.checked_insert_before(x, &mut self.arena)?;
            }
            END_POS => tx.checked_append(x, &mut self.arena)?,
            _ => self.split_into(x, tx, tp)?,
        }
        self.update_flavor(x);
        self.bump_structure_version();
        Ok(())
    }

    // link `x` at a text position of `tx`, making the text right of it the
    // after text of `x`
    fn split_into(&mut self, x: NodeId, tx: NodeId, tp: i32) -> Result<()> {
        let run = match self.text_run(tx, tp) {
            Some(run) => run,
            None => panic!("no text run at {:?}:{}", tx, tp),
        };
        let curs = self.embedded_curs(tx);
        let (right, right_nodes) = {
            let xobj = self.xobj_mut(tx);
            match run {
                TextRun::Value(off) => {
                    assert!(xobj.is_container(), "can't split the value of a leaf");
                    let value = xobj.value.clone();
                    xobj.value = value.sub(0, off);
                    (value.sub(off, value.len() - off), xobj.value_nodes.split_off(off))
                }
                TextRun::After(off) => {
                    let after = xobj.after.clone();
                    xobj.after = after.sub(0, off);
                    (after.sub(off, after.len() - off), xobj.after_nodes.split_off(off))
                }
            }
        };
        let moved = right.len() as i32;
        {
            let xobj = self.xobj_mut(x);
            xobj.after = right;
            xobj.after_nodes = right_nodes;
        }
        let x_after = self.xobj(x).pos_after();
        match run {
            TextRun::Value(_) => {
                tx.checked_prepend(x, &mut self.arena)?;
                // positions of the after text of `tx` before the split
                let old_pos_after = self.xobj(tx).pos_after() + moved;
                for c in curs {
                    let pos = self.curs.get(c).pos;
                    if pos == END_POS || pos < tp {
                        continue;
                    }
                    if pos < old_pos_after {
                        self.set_pos(c, x, x_after + (pos - tp));
                    } else {
                        self.curs.get_mut(c).pos -= moved;
                    }
                }
            }
            TextRun::After(_) => {
                tx.checked_insert_after(x, &mut self.arena)?;
                for c in curs {
                    let pos = self.curs.get(c).pos;
                    if pos != END_POS && pos >= tp {
                        self.set_pos(c, x, x_after + (pos - tp));
                    }
                }
            }
        }
        Ok(())
    }

    // hand the after text of `x` to the text run before it, with the
    // cursors in it
    fn transfer_after_text(&mut self, x: NodeId) {
        if self.xobj(x).after.is_empty() {
            return;
        }
        let (py, pq) = self.denormalize(x, 0);
        let after_pos = self.xobj(x).pos_after();
        let travelers: Vec<(CurId, i32)> = self
            .embedded_curs(x)
            .into_iter()
            .filter_map(|c| {
                let pos = self.curs.get(c).pos;
                (pos != END_POS && pos >= after_pos).then_some((c, pos - after_pos))
            })
            .collect();
        let (span, nodes) = {
            let xobj = self.xobj_mut(x);
            (
                std::mem::take(&mut xobj.after),
                std::mem::take(&mut xobj.after_nodes),
            )
        };
        self.insert_span_at(py, pq, span, nodes);
        for (c, off) in travelers {
            self.set_pos(c, py, pq + off);
        }
    }

    /// Move a node, with everything inside it, to before the cursor.
    ///
    /// The after text of the node stays behind. Cursors inside the node move
    /// with it. Moving a node to its own start does nothing.
    pub fn move_node(&mut self, node: Node, to: CurId) -> Result<()> {
        let x = node.get();
        assert!(self.parent_of(x).is_some(), "can't move a root");
        if self.raw_pos(to) == (x, 0) {
            return Ok(());
        }
        assert!(
            !self.is_in_subtree(to, x),
            "can't move a node into itself"
        );
        self.transfer_after_text(x);
        x.detach(&mut self.arena);
        self.insert_node(node, to)
    }

    /// Remove a node and everything inside it. Cursors inside it move to the
    /// position that follows it.
    pub fn remove_node(&mut self, node: Node) -> Result<()> {
        let x = node.get();
        let parent = match self.parent_of(x) {
            Some(parent) => parent,
            None => panic!("can't remove a root"),
        };
        self.transfer_after_text(x);
        let (fx, fp) = match self.next_sibling_of(x) {
            Some(next) => (next, 0),
            None => (parent, END_POS),
        };
        let subtree: Vec<NodeId> = x.descendants(&self.arena).collect();
        for n in subtree {
            for c in self.embedded_curs(n) {
                self.set_pos(c, fx, fp);
            }
        }
        x.remove_subtree(&mut self.arena);
        self.bump_structure_version();
        Ok(())
    }

    /// Remove the contents of a container: its text and its children
    /// except the attributes.
    pub fn remove_contents(&mut self, node: Node) -> Result<()> {
        let x = node.get();
        while let Some(child) = self.first_content_child_of(x) {
            self.remove_node(Node::new(child))?;
        }
        match self.last_attr_of(x) {
            Some(attr) => {
                let xobj = self.xobj(attr);
                let (pos, cch) = (xobj.pos_after(), xobj.cch_after());
                self.remove_chars_at(attr, pos, cch);
            }
            None => {
                let cch = self.xobj(x).cch_value();
                self.remove_chars_at(x, 1, cch);
            }
        }
        Ok(())
    }

    /// Deep copy a subtree out of this locale. The after text of the top
    /// node is not part of the copy.
    pub fn export_subtree(&self, node: Node) -> Fragment {
        let mut records = Vec::new();
        let mut stack = vec![(node.get(), None)];
        while let Some((n, parent)) = stack.pop() {
            let index = records.len();
            let xobj = self.xobj(n).duplicate();
            let name = xobj.name.map(|name| {
                self.names
                    .qname(name, xobj.prefix.unwrap_or(self.names.empty_prefix))
            });
            records.push(FragmentRecord { parent, name, xobj });
            let children: Vec<NodeId> = n.children(&self.arena).collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(index)));
            }
        }
        if let Some(top) = records.first_mut() {
            top.xobj.after = Span::empty();
            top.xobj.after_nodes = CharNodes::new();
        }
        Fragment { records }
    }

    /// Create the nodes of a fragment in this locale, unlinked.
    pub fn import_subtree(&mut self, fragment: Fragment) -> Result<Node> {
        let mut created: Vec<NodeId> = Vec::with_capacity(fragment.records.len());
        for record in fragment.records {
            let mut xobj = record.xobj;
            xobj.name = record.name.as_ref().map(|name| self.names.add_qname(name));
            xobj.prefix = record
                .name
                .as_ref()
                .filter(|name| !name.prefix().is_empty())
                .map(|name| self.names.add_prefix(name.prefix()));
            let id = self.arena.new_node(xobj);
            if let Some(parent) = record.parent {
                created[parent].checked_append(id, &mut self.arena)?;
            }
            created.push(id);
        }
        match created.first() {
            Some(top) => Ok(Node::new(*top)),
            None => panic!("empty fragment"),
        }
    }

    /// Copy a node of this locale to before the cursor.
    pub fn copy_node(&mut self, node: Node, to: CurId) -> Result<Node> {
        let fragment = self.export_subtree(node);
        let copy = self.import_subtree(fragment)?;
        self.insert_node(copy, to)?;
        Ok(copy)
    }

    /// Copy a node of another locale to before the cursor.
    pub fn copy_node_from(&mut self, src: &Locale, node: Node, to: CurId) -> Result<Node> {
        let copy = self.import_subtree(src.export_subtree(node))?;
        self.insert_node(copy, to)?;
        Ok(copy)
    }

    /// Rename an element or an attribute. The prefix of `name` becomes the
    /// new prefix hint.
    pub fn rename_node(&mut self, node: Node, name: &QName) -> Result<()> {
        let x = node.get();
        let is_attr = match self.xobj(x).kind {
            NodeKind::Element => false,
            NodeKind::Attr if !self.is_namespace_attr(node) => true,
            _ => {
                return Err(Error::InvalidOperation(
                    "only elements and attributes can be renamed".to_string(),
                ))
            }
        };
        validate_name(name, is_attr)?;
        let name_id = self.names.add_qname(name);
        let prefix = if name.prefix().is_empty() {
            None
        } else {
            Some(self.names.add_prefix(name.prefix()))
        };
        let xobj = self.xobj_mut(x);
        xobj.name = Some(name_id);
        xobj.prefix = prefix;
        self.update_flavor(x);
        self.bump_structure_version();
        Ok(())
    }

    // recompute the flavor of a freshly linked subtree, parents first
    pub(crate) fn update_flavor(&mut self, x: NodeId) {
        let subtree: Vec<NodeId> = x.descendants(&self.arena).collect();
        for n in subtree {
            let flavor = crate::soap::flavor_of(self, n);
            self.xobj_mut(n).flavor = flavor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cur::{CurClass, TokenKind};

    fn perm(locale: &mut Locale, node: Node, pos: i32) -> CurId {
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, node, pos);
        id
    }

    fn element(locale: &mut Locale, name: &str) -> Node {
        locale.create_element(&QName::new(name)).unwrap()
    }

    // <r>ab<x>in</x>cd<y/>ef</r>
    fn sample() -> (Locale, Node, Node, Node, Node) {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let r = element(&mut locale, "r");
        let x = element(&mut locale, "x");
        let y = element(&mut locale, "y");
        let at = perm(&mut locale, root, END_POS);
        locale.insert_node(r, at).unwrap();
        locale.move_to(at, r, END_POS);
        locale.insert_chars(at, "ab");
        locale.insert_node(x, at).unwrap();
        locale.insert_chars(at, "cd");
        locale.insert_node(y, at).unwrap();
        locale.insert_chars(at, "ef");
        locale.move_to(at, x, END_POS);
        locale.insert_chars(at, "in");
        locale.release_cur(at);
        (locale, root, r, x, y)
    }

    #[test]
    fn test_sample_structure() {
        let (locale, _, r, x, y) = sample();
        assert_eq!(locale.value_text(r), "ab");
        assert_eq!(locale.value_text(x), "in");
        assert_eq!(locale.after_text(x), "cd");
        assert_eq!(locale.after_text(y), "ef");
        assert_eq!(locale.live_cursor_count(), 0);
    }

    #[test]
    fn test_insert_splits_text() {
        let (mut locale, _, r, x, _) = sample();
        let at = perm(&mut locale, r, 2);
        let z = element(&mut locale, "z");
        locale.insert_node(z, at).unwrap();
        assert_eq!(locale.value_text(r), "a");
        assert_eq!(locale.after_text(z), "b");
        assert_eq!(locale.chars_right(at, 10), "b");
        assert_eq!(locale.next_sibling_of(z.get()), Some(x.get()));
    }

    #[test]
    fn test_insert_into_after_text() {
        let (mut locale, _, _, x, y) = sample();
        let pos = locale.xobj(x.get()).pos_after() + 1;
        let at = perm(&mut locale, x, pos);
        let z = element(&mut locale, "z");
        locale.insert_node(z, at).unwrap();
        assert_eq!(locale.after_text(x), "c");
        assert_eq!(locale.after_text(z), "d");
        assert_eq!(locale.next_sibling_of(z.get()), Some(y.get()));
    }

    #[test]
    fn test_move_node_keeps_cursors_inside() {
        let (mut locale, _, r, x, y) = sample();
        let start = perm(&mut locale, x, 0);
        let inside = perm(&mut locale, x, 2);
        let end = perm(&mut locale, x, END_POS);
        let to = perm(&mut locale, y, END_POS);
        locale.move_node(x, to).unwrap();
        assert_eq!(locale.cur_pos(start), (x, 0));
        assert_eq!(locale.cur_pos(inside), (x, 2));
        assert_eq!(locale.cur_pos(end), (x, END_POS));
        assert_eq!(locale.parent(x), Some(y));
        assert_eq!(locale.kind(inside), TokenKind::Text);
        assert_eq!(locale.chars_right(inside, 10), "n");
        // the text that followed x stays behind
        assert_eq!(locale.value_text(r), "abcd");
    }

    #[test]
    fn test_move_node_trailing_text() {
        let (mut locale, _, r, x, y) = sample();
        let pos = locale.xobj(x.get()).pos_after() + 1;
        let in_trailing = perm(&mut locale, x, pos);
        let pos = locale.xobj(y.get()).pos_after() + 1;
        let to = perm(&mut locale, y, pos);
        locale.move_node(x, to).unwrap();
        // cd moved onto the text before x; ef was split by the insertion
        assert_eq!(locale.value_text(r), "abcd");
        assert_eq!(locale.after_text(y), "e");
        assert_eq!(locale.after_text(x), "f");
        assert_eq!(locale.chars_right(in_trailing, 10), "d");
        assert_eq!(locale.chars_right(to, 10), "f");
    }

    #[test]
    fn test_move_node_bumps_versions() {
        let (mut locale, _, _, x, y) = sample();
        let to = perm(&mut locale, y, END_POS);
        let all = locale.version_all();
        let sans_text = locale.version_sans_text();
        locale.move_node(x, to).unwrap();
        assert!(locale.version_all() > all);
        assert!(locale.version_sans_text() > sans_text);
    }

    #[test]
    fn test_move_node_to_itself() {
        let (mut locale, _, r, x, _) = sample();
        let to = perm(&mut locale, x, 0);
        locale.move_node(x, to).unwrap();
        assert_eq!(locale.parent(x), Some(r));
        assert_eq!(locale.after_text(x), "cd");
    }

    #[test]
    fn test_remove_node_rehomes_cursors() {
        let (mut locale, _, r, x, y) = sample();
        let inside = perm(&mut locale, x, 1);
        let pos = locale.xobj(x.get()).pos_after();
        let trailing = perm(&mut locale, x, pos);
        locale.remove_node(x).unwrap();
        assert!(locale.is_removed(x));
        assert_eq!(locale.value_text(r), "abcd");
        assert_eq!(locale.cur_pos(inside), (y, 0));
        assert_eq!(locale.chars_right(trailing, 10), "cd");
    }

    #[test]
    fn test_remove_contents() {
        let (mut locale, _, r, x, _) = sample();
        let inside = perm(&mut locale, x, 1);
        locale.remove_contents(r).unwrap();
        assert_eq!(locale.value_text(r), "");
        assert_eq!(locale.children(r).count(), 0);
        assert_eq!(locale.cur_pos(inside), (r, END_POS));
    }

    #[test]
    fn test_copy_node_within() {
        let (mut locale, _, r, x, y) = sample();
        let to = perm(&mut locale, y, END_POS);
        let copy = locale.copy_node(x, to).unwrap();
        assert_ne!(copy, x);
        assert_eq!(locale.value_text(copy), "in");
        assert_eq!(locale.after_text(copy), "");
        assert_eq!(locale.parent(copy), Some(y));
        assert_eq!(locale.parent(x), Some(r));
    }

    #[test]
    fn test_copy_node_across_locales() {
        let (src, _, r, ..) = sample();
        let mut dst = Locale::new();
        let root = dst.create_root();
        let to = perm(&mut dst, root, END_POS);
        let copy = dst.copy_node_from(&src, r, to).unwrap();
        assert_eq!(dst.node_name(copy), Some(QName::new("r")));
        let names: Vec<_> = dst
            .children(copy)
            .map(|c| dst.node_name(c).unwrap().local_name().to_string())
            .collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(dst.value_text(copy), "ab");
    }

    #[test]
    fn test_attributes_stay_first() {
        let (mut locale, _, r, x, _) = sample();
        let to = perm(&mut locale, r, 0);
        locale.next(to);
        // before any text of r
        let attr = locale.create_attr(&QName::new("a"), "1").unwrap();
        let at = perm(&mut locale, r, 1);
        locale.remove_chars(at, 2);
        locale.insert_node(attr, to).unwrap();
        let kinds: Vec<_> = locale.children(r).map(|c| locale.node_kind(c)).collect();
        assert_eq!(kinds[0], crate::xobj::NodeKind::Attr);
        assert_eq!(locale.next_sibling_of(attr.get()), Some(x.get()));
    }
}
