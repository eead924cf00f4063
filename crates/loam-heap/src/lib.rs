//! # Loam
//!
//! A compact, relocatable, garbage-collected object heap for small dynamic
//! runtimes.
//!
//! ## Design
//!
//! - **Position independence**: every reference inside a heap is a 32-bit
//!   self-relative offset, so the byte range `[base, base + used)` is also
//!   the serialized form — map it, copy it, or [`adopt`](Heap::adopt_image)
//!   it anywhere.
//! - **Bump allocation**: a single cursor, no per-object freeing, an
//!   optional alloc-failure handler that can collect and retry.
//! - **Copying collection**: a Cheney-style [`Collector`] evacuates the
//!   reachable set into a companion heap and swaps backing memory on drop.
//! - **Identity-keyed dicts**: [`Dict`] entries are sorted by symbol block
//!   address, so the collector re-sorts each dict it moves.
//!
//! ## Example
//!
//! ```
//! use loam_heap::{Collector, Heap, Str, Value};
//!
//! let mut heap = Heap::new(64 * 1024);
//! let greeting = Str::create("hello smol world", &mut heap).unwrap();
//! heap.set_root(Value::String(greeting));
//!
//! Collector::run(&mut heap);
//!
//! let Value::String(greeting) = heap.root() else { unreachable!() };
//! assert_eq!(greeting.as_str(), "hello smol world");
//! ```
//!
//! A heap is single-mutator: it may be bound to the current thread with
//! [`Heap::enter`], but nothing here locks.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod block;
pub mod collections;
pub mod dump;
pub mod error;
pub mod gc;
pub mod heap;
pub mod json;
mod symbols;
pub mod val;

pub use block::BlockPtr;
pub use collections::{
    new_int, Array, BigInt, Blob, Dict, DictEntry, Float, Str, Sym, Vector,
};
pub use dump::{dump_heap, heap_stats, HeapStats};
pub use error::HeapError;
pub use gc::{Collector, Handle};
pub use heap::{AllocFailureHandler, Heap, HeapGuard, HeapPos, HEAP_HEADER_SIZE, MAGIC, MAX_SIZE};
pub use json::{export_json, import_json};
pub use val::{Type, Val, Value};
