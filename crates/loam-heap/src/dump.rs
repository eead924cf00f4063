//! Human-readable dumps
//!
//! Display renderings for values plus a whole-arena listing for inspecting
//! heap images. None of this is load-bearing for correctness; it exists for
//! debugging and the CLI.

use std::fmt;
use std::io::{self, Write};

use crate::block::{BlockPtr, block_span};
use crate::heap::Heap;
use crate::val::Value;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Nullish => f.write_str("nullish"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(b) => write!(f, "{}", b.value()),
            Value::Float(x) => write!(f, "{}", x.value()),
            Value::String(s) => write!(f, "\u{201c}{}\u{201d}", s.as_str()),
            Value::Symbol(s) => write!(f, "\u{ab}{}\u{bb}", s.as_str()),
            Value::Blob(b) => {
                write!(f, "Blob<")?;
                for byte in b.bytes().iter().take(32) {
                    write!(f, "{byte:02x}")?;
                }
                if b.len() > 32 {
                    write!(f, " \u{2026}")?;
                }
                write!(f, ">")
            }
            Value::Array(arr) => {
                write!(f, "Array[{}", arr.len())?;
                for (n, item) in arr.iter().enumerate() {
                    write!(f, "{}{item}", if n == 0 { ": " } else { ", " })?;
                }
                write!(f, "]")
            }
            Value::Vector(vec) => {
                write!(f, "Vector[{}", vec.len())?;
                for (n, item) in vec.iter().enumerate() {
                    write!(f, "{}{item}", if n == 0 { ": " } else { ", " })?;
                }
                write!(f, "]")
            }
            Value::Dict(dict) => {
                write!(f, "Dict{{{}", dict.count())?;
                for (n, (key, val)) in dict.iter().enumerate() {
                    write!(
                        f,
                        "{}\u{ab}{}\u{bb}: {val}",
                        if n == 0 { ": " } else { ", " },
                        key.as_str()
                    )?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn preview(block: BlockPtr) -> String {
    if block.block_type().is_container() {
        format!("{} slots", block.size() / 4)
    } else {
        format!("{}", Value::from_block(block))
    }
}

/// Write a block-by-block listing of the arena: position, type, payload
/// size, span, and a short preview of the contents.
pub fn dump_heap<W: Write>(heap: &Heap, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "heap: {} bytes used of {} ({} remaining)",
        heap.used(),
        heap.capacity(),
        heap.remaining()
    )?;
    writeln!(out, "root: {}", heap.root())?;
    let mut result = Ok(());
    let mut count = 0u32;
    heap.visit_all(|b| {
        let pos = heap.pos(b.addr() as *const u8);
        let line = writeln!(
            out,
            "  {pos:08x}  {:<7} {:>8} bytes  {}",
            b.block_type().to_string(),
            b.size(),
            preview(b)
        );
        count += 1;
        if let Err(e) = line {
            result = Err(e);
            return false;
        }
        true
    });
    result?;
    writeln!(out, "{count} blocks")?;
    Ok(())
}

/// Summarize reachability: total blocks and bytes, and how many of each are
/// reachable from the roots.
pub fn heap_stats(heap: &Heap) -> HeapStats {
    let mut stats = HeapStats {
        capacity: heap.capacity(),
        used: heap.used(),
        ..HeapStats::default()
    };
    heap.visit_all(|b| {
        stats.blocks += 1;
        stats.block_bytes += block_span(b.size());
        true
    });
    heap.visit(|v| {
        stats.reachable_blocks += 1;
        if let Some(b) = v.block() {
            stats.reachable_bytes += block_span(b.size());
        }
        true
    });
    stats
}

/// Counters produced by [`heap_stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Heap capacity in bytes.
    pub capacity: usize,
    /// Bytes in use, header included.
    pub used: usize,
    /// Blocks in the arena, live or garbage.
    pub blocks: usize,
    /// Bytes occupied by blocks, spans included.
    pub block_bytes: usize,
    /// Blocks reachable from the root set.
    pub reachable_blocks: usize,
    /// Bytes occupied by reachable blocks.
    pub reachable_bytes: usize,
}
