//! Typed views over heap blocks
//!
//! Each type here is a `Copy` newtype over a [`BlockPtr`] interpreting the
//! payload one way: leaf types (`Str`, `Sym`, `Blob`, `BigInt`, `Float`)
//! hold raw bytes, container types (`Array`, `Vector`, `Dict`) hold `Val`
//! slots. Views are as transient as the pointers they wrap — a collection
//! invalidates them unless re-resolved through a root.
//!
//! `create` constructors return `None` when the heap is full (after the
//! alloc-failure handler, if any, has had its say).

use crate::block::BlockPtr;
use crate::heap::Heap;
use crate::val::{Type, Val, Value};

macro_rules! block_view {
    ($(#[$doc:meta])* $name:ident, $type:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(BlockPtr);

        impl $name {
            pub(crate) fn from_block(block: BlockPtr) -> $name {
                debug_assert_eq!(block.block_type(), $type);
                $name(block)
            }

            /// The underlying block.
            #[inline]
            pub fn block(&self) -> BlockPtr {
                self.0
            }
        }
    };
}

block_view!(
    /// A UTF-8 string. Immutable once created; compared by contents only if
    /// the caller does so — two equal strings are distinct objects.
    Str,
    Type::String
);

block_view!(
    /// An interned string: at most one `Sym` per distinct text exists in a
    /// heap. Create through [`Heap::intern`]; compare by identity.
    Sym,
    Type::Symbol
);

block_view!(
    /// Raw bytes.
    Blob,
    Type::Blob
);

block_view!(
    /// A boxed 64-bit integer, the overflow representation for values
    /// outside the inline `Int` range.
    BigInt,
    Type::BigInt
);

block_view!(
    /// A boxed 64-bit float.
    Float,
    Type::Float
);

block_view!(
    /// A fixed-length sequence of values.
    Array,
    Type::Array
);

block_view!(
    /// A sequence with a fill count: slot 0 holds the count inline, the
    /// remaining slots are the elements. Grows only within its capacity.
    Vector,
    Type::Vector
);

block_view!(
    /// A fixed-capacity map from symbols to values, stored sorted by key
    /// identity (descending block address); empty entries keep a null key
    /// and form the suffix.
    Dict,
    Type::Dict
);

impl Str {
    /// Copy `text` into a new string block.
    pub fn create(text: &str, heap: &mut Heap) -> Option<Str> {
        let mut block = heap.alloc_block(text.len() as u32, Type::String)?;
        block.payload_mut().copy_from_slice(text.as_bytes());
        Some(Str(block))
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.size() as usize
    }

    /// True if the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text.
    ///
    /// # Panics
    /// If the payload is not valid UTF-8, which only happens for a corrupt
    /// adopted image.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.payload()).expect("string payload is not UTF-8")
    }
}

impl Sym {
    pub(crate) fn create(text: &str, heap: &mut Heap) -> Option<Sym> {
        let mut block = heap.alloc_block(text.len() as u32, Type::Symbol)?;
        block.payload_mut().copy_from_slice(text.as_bytes());
        Some(Sym(block))
    }

    /// The symbol's text.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.payload()).expect("symbol payload is not UTF-8")
    }
}

impl Blob {
    /// Allocate a zero-filled blob of `len` bytes.
    pub fn create(len: usize, heap: &mut Heap) -> Option<Blob> {
        Some(Blob(heap.alloc_block(len as u32, Type::Blob)?))
    }

    /// Copy `data` into a new blob.
    pub fn create_from(data: &[u8], heap: &mut Heap) -> Option<Blob> {
        let mut blob = Blob::create(data.len(), heap)?;
        blob.bytes_mut().copy_from_slice(data);
        Some(blob)
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.size() as usize
    }

    /// True if the blob is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The contents.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.0.payload()
    }

    /// The contents, writable.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.0.payload_mut()
    }
}

impl BigInt {
    /// Box a 64-bit integer.
    pub fn create(value: i64, heap: &mut Heap) -> Option<BigInt> {
        let mut block = heap.alloc_block(8, Type::BigInt)?;
        block.payload_mut().copy_from_slice(&value.to_ne_bytes());
        Some(BigInt(block))
    }

    /// The boxed value.
    pub fn value(&self) -> i64 {
        i64::from_ne_bytes(self.0.payload().try_into().expect("bigint payload is 8 bytes"))
    }
}

impl Float {
    /// Box a 64-bit float. NaN payloads round-trip bit-exactly.
    pub fn create(value: f64, heap: &mut Heap) -> Option<Float> {
        let mut block = heap.alloc_block(8, Type::Float)?;
        block.payload_mut().copy_from_slice(&value.to_ne_bytes());
        Some(Float(block))
    }

    /// The boxed value.
    pub fn value(&self) -> f64 {
        f64::from_ne_bytes(self.0.payload().try_into().expect("float payload is 8 bytes"))
    }
}

/// Make an integer value: inline when it fits the 31-bit `Int` range, a
/// [`BigInt`] block otherwise.
pub fn new_int(value: i64, heap: &mut Heap) -> Option<Value> {
    if (Val::MIN_INT as i64..=Val::MAX_INT as i64).contains(&value) {
        Some(Value::Int(value as i32))
    } else {
        Some(Value::BigInt(BigInt::create(value, heap)?))
    }
}

impl Array {
    /// Allocate an array of `count` null slots.
    pub fn create(count: u32, heap: &mut Heap) -> Option<Array> {
        // A zeroed payload reads back as all-null Vals.
        Some(Array(heap.alloc_block(count * 4, Type::Array)?))
    }

    /// Allocate an array holding `values`.
    pub fn create_from(values: &[Value], heap: &mut Heap) -> Option<Array> {
        let arr = Array::create(values.len() as u32, heap)?;
        for (i, v) in values.iter().enumerate() {
            arr.set(i as u32, *v);
        }
        Some(arr)
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> u32 {
        self.0.size() / 4
    }

    /// True if the array has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value slots.
    #[inline]
    pub fn slots(&self) -> &[Val] {
        self.0.vals()
    }

    /// Borrow one slot.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    #[inline]
    pub fn slot(&self, index: u32) -> &Val {
        &self.slots()[index as usize]
    }

    /// Read one element.
    pub fn get(&self, index: u32) -> Value {
        self.slot(index).load()
    }

    /// Write one element.
    pub fn set(&self, index: u32, v: Value) {
        self.slot(index).set(v);
    }

    /// Iterate the elements as resolved values.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots().iter().map(Val::load)
    }
}

impl Vector {
    /// Allocate an empty vector able to hold `capacity` elements.
    pub fn create(capacity: u32, heap: &mut Heap) -> Option<Vector> {
        let block = heap.alloc_block((capacity + 1) * 4, Type::Vector)?;
        let vec = Vector(block);
        vec.all_slots()[0].set_int(0);
        Some(vec)
    }

    #[inline]
    fn all_slots(&self) -> &[Val] {
        self.0.vals()
    }

    /// Maximum number of elements.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.0.size() / 4 - 1
    }

    /// Current number of elements.
    #[inline]
    pub fn len(&self) -> u32 {
        self.all_slots()[0].as_int() as u32
    }

    /// True if the vector holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_len(&self, len: u32) {
        debug_assert!(len <= self.capacity());
        self.all_slots()[0].set_int(len as i32);
    }

    /// The occupied element slots.
    pub fn slots(&self) -> &[Val] {
        &self.all_slots()[1..=self.len() as usize]
    }

    /// Read element `index`, if present.
    pub fn get(&self, index: u32) -> Option<Value> {
        (index < self.len()).then(|| self.all_slots()[1 + index as usize].load())
    }

    /// Overwrite element `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn set(&self, index: u32, v: Value) {
        assert!(index < self.len(), "vector index out of bounds");
        self.all_slots()[1 + index as usize].set(v);
    }

    /// Append an element; `false` if the vector is at capacity.
    pub fn append(&mut self, v: Value) -> bool {
        let len = self.len();
        if len >= self.capacity() {
            return false;
        }
        self.all_slots()[1 + len as usize].set(v);
        self.set_len(len + 1);
        true
    }

    /// Insert an element at `index`, shifting the tail up; `false` if full.
    ///
    /// # Panics
    /// If `index` is greater than the current length.
    pub fn insert(&mut self, index: u32, v: Value) -> bool {
        let len = self.len();
        assert!(index <= len, "vector insert position out of bounds");
        if len >= self.capacity() {
            return false;
        }
        let slots = self.all_slots();
        // Shift by assignment: each Val re-derives its offset at the new slot.
        for j in (index..len).rev() {
            slots[1 + j as usize + 1].copy_from(&slots[1 + j as usize]);
        }
        slots[1 + index as usize].set(v);
        self.set_len(len + 1);
        true
    }

    /// Iterate the elements as resolved values.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots().iter().map(Val::load)
    }
}

/// One key/value pair in a [`Dict`]. A null key marks an empty entry.
#[repr(C)]
pub struct DictEntry {
    /// The key: a symbol reference, or null for an empty entry.
    pub key: Val,
    /// The value; anything, including null.
    pub value: Val,
}

fn key_order(v: &Val) -> usize {
    // Null keys order as 0 so they fall to the end of the descending run.
    v.block().map_or(0, |b| b.addr())
}

fn value_order(v: &Value) -> usize {
    v.block().map_or(0, |b| b.addr())
}

impl Dict {
    /// Allocate an empty dict with room for `capacity` entries.
    pub fn create(capacity: u32, heap: &mut Heap) -> Option<Dict> {
        // Zeroed payload: every entry starts with a null key.
        Some(Dict(heap.alloc_block(capacity * 8, Type::Dict)?))
    }

    /// Number of entry slots, occupied or not.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.0.size() / 8
    }

    /// All entry slots, the empty suffix included.
    pub fn entries_all(&self) -> &[DictEntry] {
        // SAFETY: a Dict payload is capacity() DictEntry-shaped (two Val)
        // records at 4-byte alignment; DictEntry is repr(C).
        unsafe {
            std::slice::from_raw_parts(
                self.0.payload_ptr() as *const DictEntry,
                self.capacity() as usize,
            )
        }
    }

    /// The occupied entries.
    pub fn items(&self) -> &[DictEntry] {
        let all = self.entries_all();
        &all[..self.count() as usize]
    }

    /// Number of occupied entries.
    pub fn count(&self) -> u32 {
        // Occupied entries are the prefix; find where the null keys begin.
        self.entries_all()
            .partition_point(|e| !e.key.is_null()) as u32
    }

    /// True if no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.entries_all().first().is_none_or(|e| e.key.is_null())
    }

    /// True if every entry is occupied.
    pub fn is_full(&self) -> bool {
        self.entries_all().last().is_some_and(|e| !e.key.is_null())
    }

    /// Index of the first entry whose key does not order after `key`: the
    /// match position if present, else the insertion point (possibly
    /// `capacity`, meaning the key sorts after every occupant of a full
    /// dict).
    fn lower_bound(&self, key: Sym) -> usize {
        let addr = key.block().addr();
        self.entries_all().partition_point(|e| key_order(&e.key) > addr)
    }

    fn entry_matches(entry: &DictEntry, key: Sym) -> bool {
        entry.key.block() == Some(key.block())
    }

    /// Look up `key`, returning its value.
    pub fn find(&self, key: Sym) -> Option<Value> {
        let idx = self.lower_bound(key);
        let all = self.entries_all();
        (idx < all.len() && Self::entry_matches(&all[idx], key)).then(|| all[idx].value.load())
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: Sym) -> bool {
        self.find(key).is_some()
    }

    /// Map `key` to `value`, overwriting an existing entry. Returns `false`
    /// only if the key is absent and the dict is full.
    pub fn set(&mut self, key: Sym, value: Value) -> bool {
        self.set_impl(key, value, false)
    }

    /// Map `key` to `value` only if absent. Returns `false` if the key is
    /// already present or the dict is full.
    pub fn insert(&mut self, key: Sym, value: Value) -> bool {
        self.set_impl(key, value, true)
    }

    fn set_impl(&mut self, key: Sym, value: Value, insert_only: bool) -> bool {
        let idx = self.lower_bound(key);
        let all = self.entries_all();
        if idx == all.len() {
            // Past the last slot: full, and the key would sort after all
            // existing keys.
            return false;
        }
        if Self::entry_matches(&all[idx], key) {
            if insert_only {
                return false;
            }
            all[idx].value.set(value);
            return true;
        }
        if !all.last().expect("capacity > 0").key.is_null() {
            return false; // no room
        }
        let count = self.count() as usize;
        debug_assert!(count < all.len());
        // Shift by assignment toward the tail; a bulk byte move would carry
        // stale self-relative offsets.
        for j in (idx..count).rev() {
            all[j + 1].key.copy_from(&all[j].key);
            all[j + 1].value.copy_from(&all[j].value);
        }
        all[idx].key.set(Value::Symbol(key));
        all[idx].value.set(value);
        true
    }

    /// Overwrite the value for `key` only if it is present.
    pub fn replace(&mut self, key: Sym, value: Value) -> bool {
        let idx = self.lower_bound(key);
        let all = self.entries_all();
        if idx < all.len() && Self::entry_matches(&all[idx], key) {
            all[idx].value.set(value);
            true
        } else {
            false
        }
    }

    /// Remove `key`, shifting later entries toward the head. Returns `false`
    /// (without mutating) if the key is absent.
    pub fn remove(&mut self, key: Sym) -> bool {
        let idx = self.lower_bound(key);
        let all = self.entries_all();
        if idx >= all.len() || !Self::entry_matches(&all[idx], key) {
            return false;
        }
        let count = self.count() as usize;
        for j in idx..count - 1 {
            all[j].key.copy_from(&all[j + 1].key);
            all[j].value.copy_from(&all[j + 1].value);
        }
        all[count - 1].key.set_null();
        all[count - 1].value.set_null();
        true
    }

    /// Iterate occupied entries as resolved pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Sym, Value)> + '_ {
        self.items().iter().map(|e| {
            let Value::Symbol(sym) = e.key.load() else {
                unreachable!("occupied dict entry with non-symbol key");
            };
            (sym, e.value.load())
        })
    }

    /// Re-sort the first `n` entries by key identity. The collector calls
    /// this after relocating a dict's contents, since relocation reorders
    /// block addresses.
    pub(crate) fn sort_range(&mut self, n: usize) {
        let all = self.entries_all();
        let mut resolved: Vec<(Value, Value)> = all[..n]
            .iter()
            .map(|e| (e.key.load(), e.value.load()))
            .collect();
        resolved.sort_by(|a, b| value_order(&b.0).cmp(&value_order(&a.0)));
        // Write back through assignment so each Val is re-encoded at its
        // destination slot.
        for (entry, (k, v)) in all[..n].iter().zip(resolved) {
            entry.key.set(k);
            entry.value.set(v);
        }
    }

    pub(crate) fn sort_all(&mut self) {
        self.sort_range(self.capacity() as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let mut heap = Heap::new(4_096);
        let s = Str::create("hello smol world", &mut heap).unwrap();
        assert_eq!(s.as_str(), "hello smol world");
        assert_eq!(s.len(), 16);

        let empty = Str::create("", &mut heap).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_blob_write_and_read() {
        let mut heap = Heap::new(4_096);
        let mut blob = Blob::create(64, &mut heap).unwrap();
        assert!(blob.bytes().iter().all(|&b| b == 0));
        blob.bytes_mut().fill(0xAB);
        assert!(blob.bytes().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_numeric_boxing() {
        let mut heap = Heap::new(4_096);
        assert_eq!(new_int(7, &mut heap).unwrap(), Value::Int(7));
        assert_eq!(new_int(Val::MAX_INT as i64, &mut heap).unwrap(), Value::Int(Val::MAX_INT));

        let big = new_int(Val::MAX_INT as i64 + 1, &mut heap).unwrap();
        assert_eq!(big.value_type(), Type::BigInt);
        assert_eq!(big.as_i64(), Some(Val::MAX_INT as i64 + 1));

        let f = Float::create(2.5, &mut heap).unwrap();
        assert_eq!(f.value(), 2.5);
        let nan = Float::create(f64::NAN, &mut heap).unwrap();
        assert!(nan.value().is_nan());
    }

    #[test]
    fn test_array_slots() {
        let mut heap = Heap::new(4_096);
        let arr = Array::create(3, &mut heap).unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Value::Null);

        let s = Str::create("x", &mut heap).unwrap();
        arr.set(0, Value::Int(5));
        arr.set(1, Value::String(s));
        arr.set(2, Value::Bool(true));
        assert_eq!(arr.get(0), Value::Int(5));
        assert_eq!(arr.get(1), Value::String(s));
        assert_eq!(arr.get(2), Value::Bool(true));
    }

    #[test]
    fn test_moving_a_reference_recomputes_offset() {
        let mut heap = Heap::new(4_096);
        let arr = Array::create(2, &mut heap).unwrap();
        let s = Str::create("target", &mut heap).unwrap();
        arr.set(0, Value::String(s));

        // Slot 0 and slot 1 are at different addresses, so the raw words
        // must differ while resolving to the same block.
        arr.slot(1).copy_from(arr.slot(0));
        assert_ne!(arr.slot(0).raw_bits(), arr.slot(1).raw_bits());
        assert_eq!(arr.get(1), Value::String(s));
    }

    #[test]
    fn test_vector_append_insert() {
        let mut heap = Heap::new(4_096);
        let mut vec = Vector::create(3, &mut heap).unwrap();
        assert_eq!(vec.len(), 0);
        assert_eq!(vec.capacity(), 3);

        assert!(vec.append(Value::Int(1)));
        assert!(vec.append(Value::Int(3)));
        assert!(vec.insert(1, Value::Int(2)));
        assert!(!vec.append(Value::Int(4)));

        let items: Vec<Value> = vec.iter().collect();
        assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(vec.get(3), None);
    }

    #[test]
    fn test_dict_set_find_remove() {
        let mut heap = Heap::new(8_192);
        let mut dict = Dict::create(4, &mut heap).unwrap();
        let a = heap.intern("a").unwrap();
        let b = heap.intern("b").unwrap();
        let c = heap.intern("c").unwrap();

        assert!(dict.is_empty());
        assert!(dict.set(a, Value::Int(1)));
        assert!(dict.set(b, Value::Int(2)));
        assert!(dict.set(c, Value::Int(3)));
        assert_eq!(dict.count(), 3);

        assert_eq!(dict.find(a), Some(Value::Int(1)));
        assert_eq!(dict.find(b), Some(Value::Int(2)));
        assert_eq!(dict.find(c), Some(Value::Int(3)));

        // Overwrite keeps the count.
        assert!(dict.set(b, Value::Int(20)));
        assert_eq!(dict.count(), 3);
        assert_eq!(dict.find(b), Some(Value::Int(20)));

        // insert-only refuses existing keys.
        assert!(!dict.insert(b, Value::Int(0)));
        assert_eq!(dict.find(b), Some(Value::Int(20)));

        assert!(dict.remove(b));
        assert_eq!(dict.find(b), None);
        assert_eq!(dict.count(), 2);
        assert!(!dict.remove(b));

        // Entries stay sorted descending by key address with nulls last.
        let entries = dict.entries_all();
        let mut last = usize::MAX;
        for e in entries.iter().take(dict.count() as usize) {
            let addr = e.key.block().unwrap().addr();
            assert!(addr < last);
            last = addr;
        }
        for e in &entries[dict.count() as usize..] {
            assert!(e.key.is_null());
        }
    }

    #[test]
    fn test_dict_full_behavior() {
        let mut heap = Heap::new(8_192);
        let mut dict = Dict::create(2, &mut heap).unwrap();
        let syms: Vec<Sym> = ["k0", "k1", "k2"]
            .iter()
            .map(|s| heap.intern(s).unwrap())
            .collect();

        assert!(dict.set(syms[0], Value::Int(0)));
        assert!(dict.set(syms[1], Value::Int(1)));
        assert!(dict.is_full());
        assert!(!dict.set(syms[2], Value::Int(2)));
        // Existing keys still update when full.
        assert!(dict.set(syms[0], Value::Int(100)));
        assert_eq!(dict.find(syms[0]), Some(Value::Int(100)));

        assert!(!dict.replace(syms[2], Value::Int(9)));
        assert!(dict.replace(syms[1], Value::Int(11)));
        assert_eq!(dict.find(syms[1]), Some(Value::Int(11)));
    }

    #[test]
    fn test_dict_sort_restores_order() {
        let mut heap = Heap::new(8_192);
        let mut dict = Dict::create(3, &mut heap).unwrap();
        let a = heap.intern("a").unwrap();
        let b = heap.intern("b").unwrap();
        dict.set(a, Value::Int(1));
        dict.set(b, Value::Int(2));

        // Scramble the entries into ascending order, then re-sort.
        let all = dict.entries_all();
        let (e0, e1) = (
            (all[0].key.load(), all[0].value.load()),
            (all[1].key.load(), all[1].value.load()),
        );
        all[0].key.set(e1.0);
        all[0].value.set(e1.1);
        all[1].key.set(e0.0);
        all[1].value.set(e0.1);
        dict.sort_all();

        assert_eq!(dict.find(a), Some(Value::Int(1)));
        assert_eq!(dict.find(b), Some(Value::Int(2)));
        let mut last = usize::MAX;
        for e in dict.items() {
            let addr = e.key.block().unwrap().addr();
            assert!(addr < last);
            last = addr;
        }
    }
}
