use indextree::NodeId;
use std::any::{Any, TypeId};

use super::{Bookmark, CurClass, CurId};
use crate::locale::Locale;
use crate::xobj::Node;

/// Where a node started in the loaded text. Set as a bookmark on the start
/// of elements when line numbers are requested at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineNumber {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Byte offset into the input.
    pub offset: usize,
}

/// Bookmarks: typed values attached to a position. A bookmark is held by a
/// permanent cursor, so it moves with the content around it. There is at
/// most one bookmark of each type at a position.
impl Locale {
    fn find_bookmark(&self, x: NodeId, p: i32, type_id: TypeId) -> Option<CurId> {
        let matches = |id: CurId| {
            let cur = self.curs.get(id);
            cur.xobj == Some(x)
                && cur.pos == p
                && cur
                    .bookmark
                    .as_ref()
                    .map(|b| b.type_id == type_id)
                    .unwrap_or(false)
        };
        let mut current = self.xobj(x).embedded;
        while let Some(id) = current {
            if matches(id) {
                return Some(id);
            }
            current = self.curs.get(id).list_next;
        }
        let mut current = self.curs.unembedded;
        while let Some(id) = current {
            if matches(id) {
                return Some(id);
            }
            current = self.curs.get(id).list_next;
        }
        None
    }

    /// Attach `value` at the position of a cursor, replacing any bookmark of
    /// the same type there.
    pub fn set_bookmark<T: Any + Send>(&mut self, id: CurId, value: T) {
        let (x, p) = self.raw_pos(id);
        self.set_bookmark_at(x, p, value);
    }

    pub(crate) fn set_bookmark_at<T: Any + Send>(&mut self, x: NodeId, p: i32, value: T) {
        let type_id = TypeId::of::<T>();
        let holder = match self.find_bookmark(x, p, type_id) {
            Some(holder) => holder,
            None => {
                let holder = self.alloc_cur(CurClass::Perm);
                self.set_pos(holder, x, p);
                holder
            }
        };
        self.curs.get_mut(holder).bookmark = Some(Bookmark {
            type_id,
            value: Box::new(value),
        });
    }

    /// The bookmark of type `T` at the position of a cursor.
    pub fn get_bookmark<T: Any + Send>(&self, id: CurId) -> Option<&T> {
        let (x, p) = self.raw_pos(id);
        self.bookmark_at(x, p)
    }

    pub(crate) fn bookmark_at<T: Any + Send>(&self, x: NodeId, p: i32) -> Option<&T> {
        let holder = self.find_bookmark(x, p, TypeId::of::<T>())?;
        self.curs
            .get(holder)
            .bookmark
            .as_ref()
            .and_then(|b| b.value.downcast_ref::<T>())
    }

    /// The bookmark of type `T` at the start of a node.
    pub fn node_bookmark<T: Any + Send>(&self, node: Node) -> Option<&T> {
        self.bookmark_at(node.get(), 0)
    }

    /// Remove the bookmark of type `T` at the position of a cursor and
    /// return it.
    pub fn clear_bookmark<T: Any + Send>(&mut self, id: CurId) -> Option<T> {
        let (x, p) = self.raw_pos(id);
        let holder = self.find_bookmark(x, p, TypeId::of::<T>())?;
        let bookmark = self.curs.get_mut(holder).bookmark.take();
        self.release_cur(holder);
        bookmark
            .and_then(|b| b.value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cur::END_POS;
    use crate::name::QName;

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn test_one_bookmark_per_type() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, END_POS);
        locale.set_bookmark(id, Tag("a"));
        locale.set_bookmark(id, Tag("b"));
        locale.set_bookmark(id, 42u32);
        assert_eq!(locale.get_bookmark::<Tag>(id), Some(&Tag("b")));
        assert_eq!(locale.get_bookmark::<u32>(id), Some(&42));
        // the cursor plus one holder per type
        assert_eq!(locale.live_cursor_count(), 3);
        assert_eq!(locale.clear_bookmark::<Tag>(id), Some(Tag("b")));
        assert_eq!(locale.get_bookmark::<Tag>(id), None);
        assert_eq!(locale.live_cursor_count(), 2);
    }

    #[test]
    fn test_bookmark_moves_with_node() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let a = locale.create_element(&QName::new("a")).unwrap();
        let b = locale.create_element(&QName::new("b")).unwrap();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, END_POS);
        locale.insert_node(a, id).unwrap();
        locale.insert_node(b, id).unwrap();
        locale.move_to(id, b, 0);
        locale.set_bookmark(id, Tag("on b"));
        locale.move_to(id, a, END_POS);
        locale.move_node(b, id).unwrap();
        assert_eq!(locale.node_bookmark::<Tag>(b), Some(&Tag("on b")));
        assert_eq!(locale.parent(b), Some(a));
    }
}
