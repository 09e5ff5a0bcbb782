use indextree::NodeId;

use super::nav::TextRun;
use super::{CurId, END_POS};
use crate::charutil::Span;
use crate::locale::Locale;
use crate::xobj::CharNodes;

/// Text edits. These keep every cursor on the edited node in place
/// relative to the text around it, and bump only the text version.
impl Locale {
    /// Insert text before the cursor.
    pub fn insert_chars(&mut self, id: CurId, text: &str) {
        if text.is_empty() {
            return;
        }
        let span = self.char_util.save_str(text);
        self.insert_span(id, span, CharNodes::new());
    }

    /// Insert a span before the cursor. Returns the denormal position at
    /// which the inserted text starts.
    pub(crate) fn insert_span(&mut self, id: CurId, span: Span, nodes: CharNodes) -> (NodeId, i32) {
        let (x, p) = self.raw_pos(id);
        let (y, q) = self.denormalize(x, p);
        self.insert_span_at(y, q, span, nodes);
        (y, q)
    }

    /// Insert a span at a denormal text position.
    pub(crate) fn insert_span_at(&mut self, y: NodeId, q: i32, span: Span, nodes: CharNodes) {
        let n = span.len();
        if n == 0 {
            return;
        }
        let run = match self.text_run(y, q) {
            Some(run) => run,
            None => panic!("no text run at {:?}:{}", y, q),
        };
        let curs = self.embedded_curs(y);
        match run {
            TextRun::Value(off) => {
                let value = self.xobj(y).value.clone();
                let cch = value.len();
                let value = self.char_util.insert_chars(off, &span, &value);
                let xobj = self.xobj_mut(y);
                xobj.value = value;
                xobj.value_nodes.splice(off, cch, nodes, n);
            }
            TextRun::After(off) => {
                let after = self.xobj(y).after.clone();
                let cch = after.len();
                let after = self.char_util.insert_chars(off, &span, &after);
                let xobj = self.xobj_mut(y);
                xobj.after = after;
                xobj.after_nodes.splice(off, cch, nodes, n);
            }
        }
        for c in curs {
            let cur = self.curs.get_mut(c);
            if cur.pos != END_POS && cur.pos >= q && cur.pos > 0 {
                cur.pos += n as i32;
            }
        }
        self.bump_text_version();
    }

    /// Remove up to `cch` chars right of a cursor in text. Returns the
    /// number of chars removed.
    pub fn remove_chars(&mut self, id: CurId, cch: usize) -> usize {
        let (x, p) = self.raw_pos(id);
        let n = cch.min(self.cch_right_at(x, p));
        self.remove_chars_at(x, p, n);
        n
    }

    /// Remove `n` chars at a text position. Cursors in the removed range
    /// collapse onto the removal point.
    pub(crate) fn remove_chars_at(&mut self, x: NodeId, p: i32, n: usize) {
        if n == 0 {
            return;
        }
        let run = match self.text_run(x, p) {
            Some(run) => run,
            None => panic!("no text run at {:?}:{}", x, p),
        };
        let curs = self.embedded_curs(x);
        match run {
            TextRun::Value(off) => {
                let value = self.xobj(x).value.clone();
                let value = self.char_util.remove_chars(off, n, &value);
                let xobj = self.xobj_mut(x);
                xobj.value = value;
                xobj.value_nodes.remove(off, n);
            }
            TextRun::After(off) => {
                let after = self.xobj(x).after.clone();
                let after = self.char_util.remove_chars(off, n, &after);
                let xobj = self.xobj_mut(x);
                xobj.after = after;
                xobj.after_nodes.remove(off, n);
            }
        }
        let end = p + n as i32;
        let mut collapsed = Vec::new();
        for c in curs {
            let cur = self.curs.get_mut(c);
            if cur.pos == END_POS || cur.pos < p {
                continue;
            }
            if cur.pos < end {
                cur.pos = p;
            } else {
                cur.pos -= n as i32;
            }
            if cur.pos == p {
                collapsed.push(c);
            }
        }
        // the removal point may now be the end of a run
        let (nx, np) = self.normalize(x, p);
        for c in collapsed {
            self.set_pos(c, nx, np);
        }
        self.bump_text_version();
    }

    // the span and char nodes of `n` chars at a text position
    pub(crate) fn text_at(&self, x: NodeId, p: i32, n: usize) -> (Span, CharNodes) {
        let xobj = self.xobj(x);
        match self.text_run(x, p) {
            Some(TextRun::Value(off)) => (xobj.value.sub(off, n), xobj.value_nodes.slice(off, n)),
            Some(TextRun::After(off)) => (xobj.after.sub(off, n), xobj.after_nodes.slice(off, n)),
            None => (Span::empty(), CharNodes::new()),
        }
    }

    /// The text of up to `cch` chars right of a cursor.
    pub fn chars_right(&self, id: CurId, cch: usize) -> String {
        let (x, p) = self.raw_pos(id);
        let n = cch.min(self.cch_right_at(x, p));
        self.text_at(x, p, n).0.get_string()
    }

    /// Move up to `cch` chars right of `id` to before `to`. Cursors inside
    /// the moved text travel with it; `id` stays where the text was and
    /// `to` ends up after the moved text. A destination inside the moved
    /// text leaves the document unchanged.
    pub fn move_chars(&mut self, id: CurId, cch: usize, to: CurId) -> usize {
        let (x, p) = self.raw_pos(id);
        let n = cch.min(self.cch_right_at(x, p));
        if n == 0 {
            return 0;
        }
        let end = p + n as i32;
        let (tx, tp) = self.raw_pos(to);
        let (ty, tq) = self.denormalize(tx, tp);
        if ty == x && tq >= p && tq <= end {
            let (nx, np) = self.normalize(x, end);
            self.set_pos(to, nx, np);
            return n;
        }
        let (span, nodes) = self.text_at(x, p, n);
        let travelers: Vec<(CurId, i32)> = self
            .embedded_curs(x)
            .into_iter()
            .filter(|c| *c != id)
            .filter_map(|c| {
                let pos = self.curs.get(c).pos;
                (pos != END_POS && pos >= p && pos < end).then_some((c, pos - p))
            })
            .collect();
        self.remove_chars_at(x, p, n);
        let (y, q) = self.insert_span(to, span, nodes);
        for (c, off) in travelers {
            self.set_pos(c, y, q + off);
        }
        n
    }

    /// Copy up to `cch` chars right of `id` to before `to`.
    pub fn copy_chars(&mut self, id: CurId, cch: usize, to: CurId) -> usize {
        let (x, p) = self.raw_pos(id);
        let n = cch.min(self.cch_right_at(x, p));
        if n == 0 {
            return 0;
        }
        let (span, nodes) = self.text_at(x, p, n);
        self.insert_span(to, span, nodes);
        n
    }

    /// Replace the value of a leaf node (attribute value, comment text or
    /// processing instruction data).
    pub(crate) fn set_leaf_value(&mut self, x: NodeId, text: &str) {
        debug_assert!(!self.xobj(x).is_container());
        let cch = self.xobj(x).cch_value();
        self.remove_chars_at(x, 1, cch);
        if !text.is_empty() {
            let span = self.char_util.save_str(text);
            self.insert_span_at(x, 1, span, CharNodes::new());
        }
    }
}
