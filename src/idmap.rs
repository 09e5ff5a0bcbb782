use ahash::HashMap;
use std::hash::Hash;

pub(crate) trait IdIndex: Copy {
    fn to_id(index: usize) -> Self;
    fn from_id(self) -> usize;
}

// Two-way interning table: every distinct value gets a dense id, ids are
// never reused for the lifetime of the map.
#[derive(Debug, Clone)]
pub(crate) struct IdMap<K: IdIndex, V: Eq + Hash + Clone> {
    by_id: Vec<V>,
    by_value: HashMap<V, K>,
}

impl<K: IdIndex, V: Eq + Hash + Clone> IdMap<K, V> {
    pub(crate) fn new() -> Self {
        IdMap {
            by_id: Vec::new(),
            by_value: HashMap::default(),
        }
    }

    pub(crate) fn intern(&mut self, value: V) -> K {
        if let Some(id) = self.by_value.get(&value) {
            return *id;
        }
        let id = K::to_id(self.by_id.len());
        self.by_value.insert(value.clone(), id);
        self.by_id.push(value);
        id
    }

    pub(crate) fn lookup(&self, value: &V) -> Option<K> {
        self.by_value.get(value).copied()
    }

    #[inline]
    pub(crate) fn get(&self, id: K) -> &V {
        &self.by_id[id.from_id()]
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}
