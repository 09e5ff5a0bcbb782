use indextree::NodeId;

use super::{CurClass, CurId, CurState, END_POS};
use crate::locale::Locale;
use crate::xobj::Node;

// which intrusive list a cursor is on
#[derive(Debug, Clone, Copy)]
enum List {
    Unembedded,
    Embedded(NodeId),
}

/// Cursor allocation, release, lists and temp frames.
impl Locale {
    /// Allocate a cursor of the given class. It is not positioned until it
    /// is moved somewhere.
    pub fn alloc_cur(&mut self, class: CurClass) -> CurId {
        let id = self.curs.alloc(class);
        if class == CurClass::Temp {
            let frame = self.curs.frames.len() - 1;
            self.frame_link(frame, id);
        }
        id
    }

    /// Allocate a temp cursor in the innermost frame.
    pub fn temp_cur(&mut self) -> CurId {
        self.alloc_cur(CurClass::Temp)
    }

    /// Allocate a temp cursor at the position of another cursor.
    pub fn temp_cur_at(&mut self, other: CurId) -> CurId {
        let id = self.temp_cur();
        self.move_to_cur(id, other);
        id
    }

    /// Allocate a permanent cursor at the position of another cursor.
    pub fn perm_cur_at(&mut self, other: CurId) -> CurId {
        let id = self.alloc_cur(CurClass::Perm);
        self.move_to_cur(id, other);
        id
    }

    /// Release a cursor. Its id goes stale.
    pub fn release_cur(&mut self, id: CurId) {
        self.unlink_cur(id);
        let temp_frame = self.curs.get(id).temp_frame;
        if let Some(frame) = temp_frame {
            self.frame_unlink(frame, id);
        }
        self.curs.free(id);
    }

    /// Is this id still a live cursor?
    pub fn is_live(&self, id: CurId) -> bool {
        self.curs.try_get(id).is_some()
    }

    pub fn cur_class(&self, id: CurId) -> CurClass {
        self.curs.get(id).class
    }

    pub fn cur_state(&self, id: CurId) -> CurState {
        self.curs.get(id).state
    }

    pub fn is_positioned(&self, id: CurId) -> bool {
        self.curs.get(id).xobj.is_some()
    }

    /// The node and position of a cursor.
    pub fn cur_pos(&self, id: CurId) -> (Node, i32) {
        let (x, p) = self.raw_pos(id);
        (Node::new(x), p)
    }

    pub(crate) fn raw_pos(&self, id: CurId) -> (NodeId, i32) {
        let cur = self.curs.get(id);
        match cur.xobj {
            Some(x) => (x, cur.pos),
            None => panic!("cursor {:?} is not positioned", id),
        }
    }

    /// Move a cursor to a position, normalizing it.
    pub fn move_to(&mut self, id: CurId, node: Node, pos: i32) {
        let (x, p) = self.normalize(node.get(), pos);
        self.set_pos(id, x, p);
    }

    /// Move a cursor to the position of another cursor.
    pub fn move_to_cur(&mut self, id: CurId, other: CurId) {
        let (x, p) = self.raw_pos(other);
        self.set_pos(id, x, p);
    }

    /// Place a cursor without normalizing. Moving to another node takes the
    /// cursor off that node's embedded list.
    pub(crate) fn set_pos(&mut self, id: CurId, x: NodeId, p: i32) {
        debug_assert!(p == END_POS || p >= 0);
        let cur = self.curs.get(id);
        let (state, current) = (cur.state, cur.xobj);
        if current != Some(x) {
            match (state, current) {
                (CurState::Embedded, Some(old)) => {
                    self.list_remove(List::Embedded(old), id);
                    self.list_insert(List::Unembedded, id);
                    self.curs.get_mut(id).state = CurState::Unembedded;
                }
                (_, None) => self.list_insert(List::Unembedded, id),
                _ => {}
            }
        }
        let cur = self.curs.get_mut(id);
        cur.xobj = Some(x);
        cur.pos = p;
    }

    // take a cursor off whatever list it is on
    fn unlink_cur(&mut self, id: CurId) {
        let cur = self.curs.get(id);
        match (cur.state, cur.xobj) {
            (CurState::Embedded, Some(x)) => self.list_remove(List::Embedded(x), id),
            (CurState::Unembedded, Some(_)) => self.list_remove(List::Unembedded, id),
            _ => {}
        }
    }

    /// Attach every unembedded cursor to the node it refers to.
    pub(crate) fn embed_curs(&mut self) {
        while let Some(id) = self.curs.unembedded {
            let x = match self.curs.get(id).xobj {
                Some(x) => x,
                None => unreachable!("unpositioned cursor on the unembedded list"),
            };
            self.list_remove(List::Unembedded, id);
            self.list_insert(List::Embedded(x), id);
            self.curs.get_mut(id).state = CurState::Embedded;
            tracing::trace!(?id, "embedded cursor");
        }
    }

    /// The cursors on a node, after embedding all pending ones.
    pub(crate) fn embedded_curs(&mut self, x: NodeId) -> Vec<CurId> {
        self.embed_curs();
        let mut result = Vec::new();
        let mut current = self.xobj(x).embedded;
        while let Some(id) = current {
            result.push(id);
            current = self.curs.get(id).list_next;
        }
        result
    }

    fn list_head(&self, list: List) -> Option<CurId> {
        match list {
            List::Unembedded => self.curs.unembedded,
            List::Embedded(x) => self.xobj(x).embedded,
        }
    }

    fn set_list_head(&mut self, list: List, head: Option<CurId>) {
        match list {
            List::Unembedded => self.curs.unembedded = head,
            List::Embedded(x) => self.xobj_mut(x).embedded = head,
        }
    }

    fn list_insert(&mut self, list: List, id: CurId) {
        let head = self.list_head(list);
        if let Some(head) = head {
            self.curs.get_mut(head).list_prev = Some(id);
        }
        let cur = self.curs.get_mut(id);
        cur.list_prev = None;
        cur.list_next = head;
        self.set_list_head(list, Some(id));
    }

    fn list_remove(&mut self, list: List, id: CurId) {
        let cur = self.curs.get_mut(id);
        let (prev, next) = (cur.list_prev.take(), cur.list_next.take());
        match prev {
            Some(prev) => self.curs.get_mut(prev).list_next = next,
            None => self.set_list_head(list, next),
        }
        if let Some(next) = next {
            self.curs.get_mut(next).list_prev = prev;
        }
    }

    fn frame_link(&mut self, frame: usize, id: CurId) {
        let head = self.curs.frames[frame];
        if let Some(head) = head {
            self.curs.get_mut(head).temp_prev = Some(id);
        }
        let cur = self.curs.get_mut(id);
        cur.temp_frame = Some(frame);
        cur.temp_prev = None;
        cur.temp_next = head;
        self.curs.frames[frame] = Some(id);
    }

    fn frame_unlink(&mut self, frame: usize, id: CurId) {
        let cur = self.curs.get_mut(id);
        let (prev, next) = (cur.temp_prev.take(), cur.temp_next.take());
        cur.temp_frame = None;
        match prev {
            Some(prev) => self.curs.get_mut(prev).temp_next = next,
            None => self.curs.frames[frame] = next,
        }
        if let Some(next) = next {
            self.curs.get_mut(next).temp_prev = prev;
        }
    }

    /// Open a temp frame.
    pub fn enter(&mut self) {
        self.curs.frames.push(None);
    }

    /// Close the innermost temp frame, releasing every temp cursor
    /// allocated in it.
    pub fn exit(&mut self) {
        if self.curs.frames.len() <= 1 {
            tracing::debug!("exit without a matching enter");
            return;
        }
        let frame = self.curs.frames.len() - 1;
        while let Some(id) = self.curs.frames[frame] {
            self.release_cur(id);
        }
        self.curs.frames.pop();
    }

    /// Run `f` inside a temp frame.
    pub fn scope<R>(&mut self, f: impl FnOnce(&mut Locale) -> R) -> R {
        self.enter();
        let result = f(self);
        self.exit();
        result
    }

    /// Depth of temp frames, not counting the base frame.
    pub fn frame_depth(&self) -> usize {
        self.curs.frames.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_releases_temp_curs() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        locale.enter();
        let ids: Vec<_> = (0..20)
            .map(|_| {
                let id = locale.temp_cur();
                locale.move_to(id, root, 0);
                id
            })
            .collect();
        assert_eq!(locale.live_cursor_count(), 20);
        locale.exit();
        assert_eq!(locale.live_cursor_count(), 0);
        assert!(ids.iter().all(|id| !locale.is_live(*id)));
        assert_eq!(locale.pooled_cursor_count(), 16);
    }

    #[test]
    fn test_exit_keeps_outer_frame() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        locale.enter();
        let outer = locale.temp_cur();
        locale.move_to(outer, root, 0);
        locale.scope(|locale| {
            let inner = locale.temp_cur();
            locale.move_to(inner, root, 0);
            assert_eq!(locale.live_cursor_count(), 2);
        });
        assert_eq!(locale.live_cursor_count(), 1);
        assert!(locale.is_live(outer));
        locale.exit();
        assert_eq!(locale.live_cursor_count(), 0);
    }

    #[test]
    fn test_explicit_release_of_temp_cur() {
        let mut locale = Locale::new();
        locale.enter();
        let a = locale.temp_cur();
        let b = locale.temp_cur();
        locale.release_cur(a);
        assert!(!locale.is_live(a));
        assert!(locale.is_live(b));
        locale.exit();
        assert!(!locale.is_live(b));
    }

    #[test]
    fn test_perm_survives_exit() {
        let mut locale = Locale::new();
        locale.enter();
        let perm = locale.alloc_cur(CurClass::Perm);
        locale.exit();
        assert!(locale.is_live(perm));
        locale.release_cur(perm);
        assert_eq!(locale.live_cursor_count(), 0);
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut locale = Locale::new();
        let a = locale.alloc_cur(CurClass::Perm);
        locale.release_cur(a);
        let b = locale.alloc_cur(CurClass::Perm);
        assert_ne!(a, b);
        assert!(!locale.is_live(a));
        assert!(locale.is_live(b));
    }

    #[test]
    fn test_embedding_is_lazy() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let a = locale.alloc_cur(CurClass::Perm);
        locale.move_to(a, root, 0);
        assert_eq!(locale.cur_state(a), CurState::Unembedded);
        let embedded = locale.embedded_curs(root.get());
        assert_eq!(embedded, vec![a]);
        assert_eq!(locale.cur_state(a), CurState::Embedded);
    }

    #[test]
    fn test_exit_without_enter_is_ignored() {
        let mut locale = Locale::new();
        let a = locale.temp_cur();
        locale.exit();
        assert!(locale.is_live(a));
        assert_eq!(locale.frame_depth(), 0);
    }
}
