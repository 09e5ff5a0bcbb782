//! The cursor engine.
//!
//! A cursor is a `(node, position)` pair stored in a slot of the locale's
//! cursor arena. Every structural or text edit made through the engine fixes
//! up all live cursors, so a cursor never refers to a freed node.
//!
//! Positions, for a node with `v` value chars and `a` after chars:
//!
//! - `0`: the start token of the node.
//! - `1..=v`: in the value text.
//! - [`END_POS`]: the end token (numerically `v + 1`).
//! - `v + 2 .. v + 2 + a`: in the after text.
//!
//! Cursors are always kept in normal form, see [`Locale::normalize`].
mod bookmark;
mod lifecycle;
mod nav;
mod structure;
mod text;

pub use bookmark::LineNumber;
pub use nav::TokenKind;
pub use structure::Fragment;

use indextree::NodeId;
use std::any::{Any, TypeId};

/// Sentinel position of a node's end token.
pub const END_POS: i32 = -1;

/// How many released cursor slots are kept for reuse.
pub(crate) const MAX_POOLED: usize = 16;

/// Identifies a cursor in a [`Locale`](crate::Locale).
///
/// Ids are generational: once a cursor is released its id goes stale and
/// is never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurId {
    index: u32,
    generation: u32,
}

/// The lifetime class of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurClass {
    /// Released when the temp frame it was allocated in exits.
    Temp,
    /// Lives until it is released explicitly.
    Perm,
    /// Owned by a facade object and released when that is dropped.
    Weak,
}

/// Lifecycle state of a cursor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurState {
    /// Released and kept for reuse.
    Pooled,
    /// Live, on the locale's list of cursors not yet attached to their node.
    Unembedded,
    /// Live, on the list of cursors of the node it refers to.
    Embedded,
    /// Released and not pooled.
    Disposed,
}

pub(crate) struct Bookmark {
    pub(crate) type_id: TypeId,
    pub(crate) value: Box<dyn Any + Send>,
}

impl std::fmt::Debug for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bookmark")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct Cur {
    pub(crate) state: CurState,
    pub(crate) class: CurClass,
    pub(crate) xobj: Option<NodeId>,
    pub(crate) pos: i32,
    // links in either the unembedded list or a node's embedded list
    pub(crate) list_prev: Option<CurId>,
    pub(crate) list_next: Option<CurId>,
    pub(crate) temp_frame: Option<usize>,
    pub(crate) temp_prev: Option<CurId>,
    pub(crate) temp_next: Option<CurId>,
    pub(crate) bookmark: Option<Bookmark>,
}

impl Cur {
    fn new(class: CurClass) -> Self {
        Cur {
            state: CurState::Unembedded,
            class,
            xobj: None,
            pos: 0,
            list_prev: None,
            list_next: None,
            temp_frame: None,
            temp_prev: None,
            temp_next: None,
            bookmark: None,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        matches!(self.state, CurState::Unembedded | CurState::Embedded)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    cur: Cur,
}

/// The cursor arena of a locale: slots, the reuse pool, the list of
/// unembedded cursors and the temp frames.
#[derive(Debug)]
pub(crate) struct CurSlots {
    slots: Vec<Slot>,
    pool: Vec<u32>,
    vacant: Vec<u32>,
    pub(crate) unembedded: Option<CurId>,
    // frame 0 is the base frame and is never exited
    pub(crate) frames: Vec<Option<CurId>>,
}

impl CurSlots {
    pub(crate) fn new() -> Self {
        CurSlots {
            slots: Vec::new(),
            pool: Vec::new(),
            vacant: Vec::new(),
            unembedded: None,
            frames: vec![None],
        }
    }

    fn alloc(&mut self, class: CurClass) -> CurId {
        let index = match self.pool.pop().or_else(|| self.vacant.pop()) {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(!slot.cur.is_live());
                slot.cur = Cur::new(class);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    cur: Cur::new(class),
                });
                (self.slots.len() - 1) as u32
            }
        };
        CurId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    // the slot must already be unlinked from every list
    fn free(&mut self, id: CurId) {
        let slot = &mut self.slots[id.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.cur.bookmark = None;
        slot.cur.xobj = None;
        if self.pool.len() < MAX_POOLED {
            slot.cur.state = CurState::Pooled;
            self.pool.push(id.index);
        } else {
            slot.cur.state = CurState::Disposed;
            self.vacant.push(id.index);
        }
    }

    pub(crate) fn try_get(&self, id: CurId) -> Option<&Cur> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.cur.is_live())
            .map(|slot| &slot.cur)
    }

    pub(crate) fn get(&self, id: CurId) -> &Cur {
        match self.try_get(id) {
            Some(cur) => cur,
            None => panic!("stale cursor id {:?}", id),
        }
    }

    pub(crate) fn get_mut(&mut self, id: CurId) -> &mut Cur {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.cur.is_live() => &mut slot.cur,
            _ => panic!("stale cursor id {:?}", id),
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.cur.is_live()).count()
    }

    pub(crate) fn pooled_count(&self) -> usize {
        self.pool.len()
    }
}
