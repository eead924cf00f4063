//! Tagged 32-bit values with self-relative object pointers
//!
//! A [`Val`] is the single polymorphic value word stored inside heap memory.
//! Small scalars are inlined; everything else is a pointer to a heap block,
//! stored as a signed offset *from the address of the value slot itself*, so
//! a heap full of `Val`s can be mapped, copied, or serialized verbatim and
//! remain valid at any base address.
//!
//! ## Encoding
//!
//! ```text
//! 32 bits: OOOOOOOO OOOOOOOO OOOOOOOO OOOOOOOT
//!          T = int tag (bit 0)
//!
//! Int:      (i << 1) | 1          i in [-2^30, 2^30 - 1]
//! Null:     0
//! Nullish:  2
//! False:    4
//! True:     6
//! Object:   (offset << 1), > 6    offset = &block - &slot, recovered by
//!                                 arithmetic shift right
//! ```
//!
//! Because the offset is relative to the slot, a `Val` holding an object
//! reference is only meaningful at the address where it was written. `Val` is
//! therefore neither `Copy` nor `Clone`; the only way to move one is
//! [`Val::copy_from`], which re-resolves the target and recomputes the offset
//! at the destination slot. The by-value currency of the public API is
//! [`Value`](crate::Value), which carries a real pointer and may live
//! anywhere.

use std::cell::Cell;

use crate::block::BlockPtr;
use crate::collections::{Array, BigInt, Blob, Dict, Float, Str, Sym, Vector};

/// Runtime type of a value.
///
/// Variants below `Null` are object types and double as block-header type
/// tags; `Null`, `Bool` and `Int` are inline and never appear in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Type {
    /// 64-bit float block
    Float = 0,
    /// 64-bit integer block (overflow escape hatch for `Int`)
    BigInt = 1,
    /// UTF-8 string block
    String = 2,
    /// Interned string block, compared by identity
    Symbol = 3,
    /// Raw byte block
    Blob = 4,
    /// Fixed-length sequence of values
    Array = 5,
    /// Array with a fill count in slot 0
    Vector = 6,
    /// Sorted symbol-keyed map
    Dict = 7,
    /// Inline null / nullish
    Null = 0x10,
    /// Inline boolean
    Bool = 0x11,
    /// Inline 31-bit integer
    Int = 0x12,
}

impl Type {
    /// Decode a block-header type tag (0..=7).
    pub(crate) fn from_tag(tag: u8) -> Type {
        match tag {
            0 => Type::Float,
            1 => Type::BigInt,
            2 => Type::String,
            3 => Type::Symbol,
            4 => Type::Blob,
            5 => Type::Array,
            6 => Type::Vector,
            7 => Type::Dict,
            _ => unreachable!("corrupt block type tag {tag}"),
        }
    }

    /// True for types stored as heap blocks.
    #[inline]
    pub fn is_object(self) -> bool {
        (self as u8) < 8
    }

    /// True for `Int`, `BigInt` and `Float`.
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::BigInt | Type::Float)
    }

    /// True for types whose payload is a sequence of `Val`s.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, Type::Array | Type::Vector | Type::Dict)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Type::Float => "float",
            Type::BigInt => "bigint",
            Type::String => "string",
            Type::Symbol => "symbol",
            Type::Blob => "blob",
            Type::Array => "array",
            Type::Vector => "vector",
            Type::Dict => "dict",
            Type::Null => "null",
            Type::Bool => "bool",
            Type::Int => "int",
        };
        f.write_str(name)
    }
}

const NULL_BITS: u32 = 0;
const NULLISH_BITS: u32 = 2;
const FALSE_BITS: u32 = 4;
const TRUE_BITS: u32 = 6;
const INT_TAG: u32 = 1;
const TAG_SIZE: u32 = 1;

/// A 32-bit polymorphic value slot inside a heap.
///
/// All mutation goes through `&self` methods (the slot is a [`Cell`]), so a
/// `&Val` obtained from heap memory is both the read and the write handle for
/// that slot. The type is deliberately not `Copy`/`Clone`: an object
/// reference copied bit-for-bit to a different address would point at the
/// wrong target.
#[derive(Default)]
#[repr(transparent)]
pub struct Val {
    bits: Cell<u32>,
}

impl Val {
    /// Largest inline integer, 2^30 − 1.
    pub const MAX_INT: i32 = (1 << 30) - 1;
    /// Smallest inline integer, −2^30.
    pub const MIN_INT: i32 = -Self::MAX_INT - 1;

    /// The raw 32-bit word. Only meaningful to code that knows the slot's
    /// address.
    #[inline]
    pub fn raw_bits(&self) -> u32 {
        self.bits.get()
    }

    #[inline]
    pub(crate) fn set_raw(&self, bits: u32) {
        self.bits.set(bits);
    }

    /// True if this is the `null` constant.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.bits.get() == NULL_BITS
    }

    /// True if this is the `nullish` constant (JSON `null`).
    #[inline]
    pub fn is_nullish(&self) -> bool {
        self.bits.get() == NULLISH_BITS
    }

    /// True for `true`/`false`.
    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self.bits.get(), FALSE_BITS | TRUE_BITS)
    }

    /// True for an inline integer.
    #[inline]
    pub fn is_int(&self) -> bool {
        self.bits.get() & INT_TAG != 0
    }

    /// True if the slot holds an object reference.
    #[inline]
    pub fn is_object(&self) -> bool {
        let bits = self.bits.get();
        bits & INT_TAG == 0 && bits > TRUE_BITS
    }

    /// The boolean payload. Precondition: `is_bool()`.
    #[inline]
    pub fn as_bool(&self) -> bool {
        debug_assert!(self.is_bool());
        self.bits.get() == TRUE_BITS
    }

    /// The integer payload. Precondition: `is_int()`.
    #[inline]
    pub fn as_int(&self) -> i32 {
        debug_assert!(self.is_int());
        (self.bits.get() as i32) >> TAG_SIZE
    }

    /// Write the `null` constant.
    #[inline]
    pub fn set_null(&self) {
        self.bits.set(NULL_BITS);
    }

    /// Write the `nullish` constant.
    #[inline]
    pub fn set_nullish(&self) {
        self.bits.set(NULLISH_BITS);
    }

    /// Write an inline boolean.
    #[inline]
    pub fn set_bool(&self, b: bool) {
        self.bits.set(if b { TRUE_BITS } else { FALSE_BITS });
    }

    /// Write an inline integer.
    ///
    /// # Panics
    /// If `i` is outside `[MIN_INT, MAX_INT]`.
    #[inline]
    pub fn set_int(&self, i: i32) {
        assert!(
            (Self::MIN_INT..=Self::MAX_INT).contains(&i),
            "inline int {i} out of range"
        );
        self.bits.set(((i << TAG_SIZE) | INT_TAG as i32) as u32);
    }

    /// Write an object reference: the offset from this slot to `block` is
    /// computed here, at the slot's own address.
    pub fn set_block(&self, block: BlockPtr) {
        let off = block.addr() as isize - self as *const Val as isize;
        let off = i32::try_from(off).expect("block more than 2GB from slot");
        debug_assert!(
            (-(1 << 30)..(1 << 30)).contains(&off),
            "self-relative offset out of encodable range"
        );
        let bits = (off as u32) << TAG_SIZE;
        self.bits.set(bits);
        debug_assert!(self.is_object(), "offset collides with an inline constant");
    }

    /// Resolve an object reference to its block, or `None` for inline values.
    #[inline]
    pub fn block(&self) -> Option<BlockPtr> {
        if !self.is_object() {
            return None;
        }
        let off = (self.bits.get() as i32) >> TAG_SIZE;
        let addr = (self as *const Val as isize + off as isize) as *mut u8;
        // SAFETY: an object Val inside a live heap always resolves to a block
        // header within the same heap; that invariant is maintained by every
        // write path (set_block recomputes, the collector rewrites).
        Some(unsafe { BlockPtr::from_addr(addr) })
    }

    /// Load the slot into a position-independent [`Value`].
    pub fn load(&self) -> Value {
        match self.bits.get() {
            NULL_BITS => Value::Null,
            NULLISH_BITS => Value::Nullish,
            FALSE_BITS => Value::Bool(false),
            TRUE_BITS => Value::Bool(true),
            bits if bits & INT_TAG != 0 => Value::Int((bits as i32) >> TAG_SIZE),
            _ => {
                let block = self.block().expect("object bits resolve to a block");
                Value::from_block(block)
            }
        }
    }

    /// Store a [`Value`], recomputing any object offset at this slot.
    pub fn set(&self, v: Value) {
        match v.block() {
            Some(block) => self.set_block(block),
            None => match v {
                Value::Null => self.set_null(),
                Value::Nullish => self.set_nullish(),
                Value::Bool(b) => self.set_bool(b),
                Value::Int(i) => self.set_int(i),
                _ => unreachable!("object value without a block"),
            },
        }
    }

    /// Assign from another slot. This is the only legal way to move a `Val`
    /// between addresses: the target is re-resolved at `other` and the offset
    /// recomputed here.
    pub fn copy_from(&self, other: &Val) {
        match other.block() {
            Some(block) => self.set_block(block),
            None => self.bits.set(other.bits.get()),
        }
    }

    /// The runtime type. Dereferences the target block for object values.
    pub fn value_type(&self) -> Type {
        match self.bits.get() {
            NULL_BITS | NULLISH_BITS => Type::Null,
            FALSE_BITS | TRUE_BITS => Type::Bool,
            bits if bits & INT_TAG != 0 => Type::Int,
            _ => self.block().expect("object bits resolve to a block").block_type(),
        }
    }
}

impl std::fmt::Debug for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Val({:?})", self.load())
    }
}

/// A resolved value: the by-value counterpart of [`Val`].
///
/// Object variants carry a raw block pointer, so a `Value` is valid anywhere
/// in memory — but only as long as the blocks it points at have not been
/// moved by a collection. Hold a [`Handle`](crate::Handle) or register an
/// external root to survive one.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// The absent value; falsy.
    Null,
    /// A present-but-empty value (JSON `null`); truthy.
    Nullish,
    /// Inline boolean.
    Bool(bool),
    /// Inline 31-bit integer.
    Int(i32),
    /// Boxed 64-bit float.
    Float(Float),
    /// Boxed 64-bit integer.
    BigInt(BigInt),
    /// UTF-8 string.
    String(Str),
    /// Interned symbol.
    Symbol(Sym),
    /// Raw bytes.
    Blob(Blob),
    /// Fixed-length value sequence.
    Array(Array),
    /// Growable-within-capacity value sequence.
    Vector(Vector),
    /// Sorted symbol-keyed map.
    Dict(Dict),
}

impl Value {
    /// Wrap a block in the `Value` variant matching its header type.
    pub fn from_block(block: BlockPtr) -> Value {
        match block.block_type() {
            Type::Float => Value::Float(Float::from_block(block)),
            Type::BigInt => Value::BigInt(BigInt::from_block(block)),
            Type::String => Value::String(Str::from_block(block)),
            Type::Symbol => Value::Symbol(Sym::from_block(block)),
            Type::Blob => Value::Blob(Blob::from_block(block)),
            Type::Array => Value::Array(Array::from_block(block)),
            Type::Vector => Value::Vector(Vector::from_block(block)),
            Type::Dict => Value::Dict(Dict::from_block(block)),
            t => unreachable!("inline type {t} in a block header"),
        }
    }

    /// The runtime type.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Null | Value::Nullish => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::BigInt(_) => Type::BigInt,
            Value::String(_) => Type::String,
            Value::Symbol(_) => Type::Symbol,
            Value::Blob(_) => Type::Blob,
            Value::Array(_) => Type::Array,
            Value::Vector(_) => Type::Vector,
            Value::Dict(_) => Type::Dict,
        }
    }

    /// The underlying block for object values, `None` for inline ones.
    pub fn block(&self) -> Option<BlockPtr> {
        match self {
            Value::Null | Value::Nullish | Value::Bool(_) | Value::Int(_) => None,
            Value::Float(o) => Some(o.block()),
            Value::BigInt(o) => Some(o.block()),
            Value::String(o) => Some(o.block()),
            Value::Symbol(o) => Some(o.block()),
            Value::Blob(o) => Some(o.block()),
            Value::Array(o) => Some(o.block()),
            Value::Vector(o) => Some(o.block()),
            Value::Dict(o) => Some(o.block()),
        }
    }

    /// Truthiness: everything but `Null` is truthy (yes, `Nullish` too).
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null)
    }

    /// Numeric widening: `Bool`, `Int`, `BigInt` and `Float` as an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i as i64),
            Value::BigInt(b) => Some(b.value()),
            Value::Float(f) => Some(f.value() as i64),
            _ => None,
        }
    }

    /// Numeric widening: `Bool`, `Int`, `BigInt` and `Float` as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Int(i) => Some(*i as f64),
            Value::BigInt(b) => Some(b.value() as f64),
            Value::Float(f) => Some(f.value()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Debug shares the human rendering implemented in dump.rs.
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_constants() {
        let v = Val::default();
        assert!(v.is_null());
        assert!(!v.is_nullish());
        assert_eq!(v.load(), Value::Null);

        v.set_nullish();
        assert!(v.is_nullish());
        assert!(!v.is_null());
        assert_eq!(v.value_type(), Type::Null);

        v.set_bool(true);
        assert!(v.is_bool());
        assert!(v.as_bool());
        v.set_bool(false);
        assert!(!v.as_bool());
        assert_eq!(v.value_type(), Type::Bool);
    }

    #[test]
    fn test_int_round_trip() {
        let v = Val::default();
        for i in [0, 1, -1, 42, Val::MAX_INT, Val::MIN_INT] {
            v.set_int(i);
            assert!(v.is_int());
            assert_eq!(v.as_int(), i);
            assert!(!v.is_object());
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_int_overflow_panics() {
        let v = Val::default();
        v.set_int(Val::MAX_INT + 1);
    }

    #[test]
    fn test_copy_from_inline() {
        let a = Val::default();
        let b = Val::default();
        a.set_int(99);
        b.copy_from(&a);
        assert_eq!(b.as_int(), 99);
    }

    #[test]
    fn test_type_predicates() {
        assert!(Type::Array.is_container());
        assert!(Type::Dict.is_container());
        assert!(!Type::Blob.is_container());
        assert!(Type::Float.is_numeric());
        assert!(Type::Int.is_numeric());
        assert!(!Type::String.is_numeric());
        assert!(Type::Symbol.is_object());
        assert!(!Type::Int.is_object());
    }
}
