//! String interning for the dependency graph arena.
//!
//! Task ids become dense `u32` indices so adjacency lists and visited sets can
//! be plain vectors.

use rustc_hash::FxHashMap;

/// Interned id (u32 for compact storage and fast hashing).
pub type NodeId = u32;

/// Bidirectional map between id strings and dense integer ids.
#[derive(Debug, Clone, Default)]
pub struct IdInterner {
    to_int: FxHashMap<String, NodeId>,
    from_int: Vec<String>,
}

impl IdInterner {
    /// Create a new interner with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_int: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_int: Vec::with_capacity(capacity),
        }
    }

    /// Intern every id of `ids` in sorted order so indices are deterministic.
    pub fn from_sorted<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: Vec<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        all.sort();
        all.dedup();
        let mut interner = Self::with_capacity(all.len());
        for id in &all {
            interner.intern(id);
        }
        interner
    }

    /// Intern a string, returning its integer id (existing id if present).
    pub fn intern(&mut self, s: &str) -> NodeId {
        if let Some(&id) = self.to_int.get(s) {
            return id;
        }
        let id = self.from_int.len() as NodeId;
        self.from_int.push(s.to_string());
        self.to_int.insert(s.to_string(), id);
        id
    }

    #[inline]
    pub fn get(&self, s: &str) -> Option<NodeId> {
        self.to_int.get(s).copied()
    }

    #[inline]
    pub fn resolve(&self, id: NodeId) -> Option<&str> {
        self.from_int.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.from_int.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_int.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let mut interner = IdInterner::with_capacity(4);
        let a = interner.intern("task_a");
        let b = interner.intern("task_b");
        assert_eq!(interner.intern("task_a"), a);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(b), Some("task_b"));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_from_sorted_is_deterministic() {
        let interner = IdInterner::from_sorted(["c", "a", "b", "a"]);
        assert_eq!(interner.len(), 3);
        assert_eq!(interner.get("a"), Some(0));
        assert_eq!(interner.get("b"), Some(1));
        assert_eq!(interner.get("c"), Some(2));
    }
}
