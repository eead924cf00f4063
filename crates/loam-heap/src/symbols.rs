//! Symbol interning
//!
//! A [`Sym`](crate::Sym) is an interned string: a heap holds at most one
//! Symbol block per distinct text, so symbols can be compared by identity —
//! which is exactly what [`Dict`](crate::Dict) ordering relies on.
//!
//! The index itself lives outside the heap: a hash-to-positions multimap
//! rebuilt by scanning Symbol blocks when an image is adopted, and remapped
//! from forwarding addresses after every collection. It holds positions, not
//! strong references, so symbols that become unreachable simply drop out of
//! the index at the next collection.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::heap::{Heap, HeapPos};
use crate::val::Type;

pub(crate) fn hash_str(s: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Positions of every Symbol block in a heap, keyed by string hash.
#[derive(Default)]
pub(crate) struct SymbolIndex {
    map: FxHashMap<u64, Vec<HeapPos>>,
}

impl SymbolIndex {
    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn candidates(&self, hash: u64) -> Vec<HeapPos> {
        self.map.get(&hash).cloned().unwrap_or_default()
    }

    pub(crate) fn add(&mut self, hash: u64, pos: HeapPos) {
        self.map.entry(hash).or_default().push(pos);
    }

    /// Build an index by scanning the arena for Symbol blocks.
    pub(crate) fn rebuild(heap: &Heap) -> SymbolIndex {
        let mut index = SymbolIndex::default();
        heap.visit_all(|b| {
            if b.block_type() == Type::Symbol {
                index.add(hash_str(b.payload()), heap.pos(b.addr() as *const u8));
            }
            true
        });
        index
    }

    /// Map surviving entries through the from-space forwarding addresses.
    /// Entries whose block was not evacuated are dead and dropped.
    pub(crate) fn remap_forwarded(&self, from: &Heap) -> SymbolIndex {
        let mut index = SymbolIndex::default();
        for (&hash, positions) in &self.map {
            for &pos in positions {
                let block = from.block_at(pos);
                if block.is_forwarded() {
                    index.add(hash, block.forwarding_pos());
                }
            }
        }
        index
    }
}

impl Heap {
    /// Return the interned symbol for `text`, creating it if this heap has
    /// none yet. `None` means the heap is full.
    pub fn intern(&mut self, text: &str) -> Option<crate::Sym> {
        let hash = hash_str(text.as_bytes());
        for pos in self.symbols.candidates(hash) {
            let block = self.block_at(pos);
            debug_assert_eq!(block.block_type(), Type::Symbol);
            if block.payload() == text.as_bytes() {
                return Some(crate::Sym::from_block(block));
            }
        }
        // Creating the block may run the alloc-failure handler; positions of
        // existing symbols are fixed up by the collector before we add ours.
        let sym = crate::Sym::create(text, self)?;
        let pos = self.pos(sym.block().addr() as *const u8);
        self.symbols.add(hash, pos);
        Some(sym)
    }

    /// Look up an interned symbol without creating it.
    pub fn find_symbol(&self, text: &str) -> Option<crate::Sym> {
        let hash = hash_str(text.as_bytes());
        for pos in self.symbols.candidates(hash) {
            let block = self.block_at(pos);
            if block.payload() == text.as_bytes() {
                return Some(crate::Sym::from_block(block));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedupes() {
        let mut heap = Heap::new(4_096);
        let a1 = heap.intern("alpha").unwrap();
        let b = heap.intern("beta").unwrap();
        let a2 = heap.intern("alpha").unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.as_str(), "alpha");
    }

    #[test]
    fn test_find_symbol_does_not_create() {
        let mut heap = Heap::new(4_096);
        let used = heap.used();
        assert!(heap.find_symbol("ghost").is_none());
        assert_eq!(heap.used(), used);
        let s = heap.intern("ghost").unwrap();
        assert_eq!(heap.find_symbol("ghost"), Some(s));
    }

    #[test]
    fn test_reset_clears_interned_symbols() {
        let mut heap = Heap::new(4_096);
        heap.intern("x").unwrap();
        heap.reset();
        assert!(heap.find_symbol("x").is_none());
    }
}
