use indextree::{Arena, NodeId};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::charutil::CharUtil;
use crate::cur::CurSlots;
use crate::name::Names;
use crate::path::{Path, PathKey, QueryEngine};
use crate::xobj::Xobj;

pub(crate) type XobjArena = Arena<Xobj>;

const PATH_CACHE_SIZE: usize = 64;

/// The state of one document.
///
/// A `Locale` owns the node arena, the interned names, the character
/// allocator, every cursor that refers into its tree and the version stamps
/// used to detect modification during multi-step traversals.
///
/// Nodes and cursors never cross locales: operations between documents copy.
pub struct Locale {
    pub(crate) arena: XobjArena,
    pub(crate) names: Names,
    pub(crate) char_util: CharUtil,
    pub(crate) curs: CurSlots,
    version_all: u64,
    version_sans_text: u64,
    pub(crate) path_cache: LruCache<PathKey, Arc<Path>>,
    pub(crate) query_engine: Option<Arc<dyn QueryEngine>>,
}

impl Locale {
    /// Create an empty locale.
    pub fn new() -> Self {
        Locale {
            arena: XobjArena::new(),
            names: Names::new(),
            char_util: CharUtil::new(),
            curs: CurSlots::new(),
            version_all: 0,
            version_sans_text: 0,
            path_cache: LruCache::new(
                NonZeroUsize::new(PATH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ),
            query_engine: None,
        }
    }

    #[inline]
    pub(crate) fn xobj(&self, node: NodeId) -> &Xobj {
        self.arena[node].get()
    }

    #[inline]
    pub(crate) fn xobj_mut(&mut self, node: NodeId) -> &mut Xobj {
        self.arena[node].get_mut()
    }

    /// Changes on any edit, text or structure.
    pub fn version_all(&self) -> u64 {
        self.version_all
    }

    /// Changes on structural edits only.
    pub fn version_sans_text(&self) -> u64 {
        self.version_sans_text
    }

    pub(crate) fn bump_text_version(&mut self) {
        self.version_all += 1;
    }

    pub(crate) fn bump_structure_version(&mut self) {
        self.version_all += 1;
        self.version_sans_text += 1;
    }

    /// Register the engine used for path expressions the built-in engine
    /// can't handle, and for queries.
    pub fn register_query_engine(&mut self, engine: Arc<dyn QueryEngine>) {
        self.query_engine = Some(engine);
        self.path_cache.clear();
    }

    /// Number of cursors that are currently live (not pooled or disposed).
    pub fn live_cursor_count(&self) -> usize {
        self.curs.live_count()
    }

    /// Number of released cursor slots held for reuse.
    pub fn pooled_cursor_count(&self) -> usize {
        self.curs.pooled_count()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locale")
            .field("nodes", &self.arena.len())
            .field("live_cursors", &self.live_cursor_count())
            .field("version_all", &self.version_all)
            .field("version_sans_text", &self.version_sans_text)
            .finish_non_exhaustive()
    }
}
