//! JSON import and export
//!
//! Bridges heap object graphs to and from JSON documents. JSON objects
//! become [`Dict`]s with interned [`Sym`](crate::Sym) keys, arrays become
//! [`Array`]s, numbers become inline ints, [`BigInt`]s or [`Float`]s, and
//! JSON `null` becomes `nullish` (the truthy null), keeping the absent-value
//! `null` distinguishable after a round trip.
//!
//! Import roots each partially built container in a [`Handle`] so an
//! alloc-failure handler is free to collect mid-import.

use serde_json::Number;

use crate::collections::{new_int, Array, BigInt, Dict, Float, Str};
use crate::error::{HeapError, Result};
use crate::gc::Handle;
use crate::heap::Heap;
use crate::val::Value;

/// Parse `text` and build the corresponding object graph, returning its
/// root value. Fails on malformed JSON or a full heap.
pub fn import_json(heap: &mut Heap, text: &str) -> Result<Value> {
    let doc: serde_json::Value = serde_json::from_str(text)?;
    import_node(heap, &doc)
}

fn import_number(heap: &mut Heap, n: &Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        new_int(i, heap).ok_or(HeapError::OutOfMemory)
    } else if let Some(u) = n.as_u64() {
        Ok(Value::BigInt(
            BigInt::create(u as i64, heap).ok_or(HeapError::OutOfMemory)?,
        ))
    } else {
        let f = n.as_f64().unwrap_or(f64::NAN);
        Ok(Value::Float(
            Float::create(f, heap).ok_or(HeapError::OutOfMemory)?,
        ))
    }
}

fn import_node(heap: &mut Heap, node: &serde_json::Value) -> Result<Value> {
    match node {
        serde_json::Value::Null => Ok(Value::Nullish),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => import_number(heap, n),
        serde_json::Value::String(s) => Ok(Value::String(
            Str::create(s, heap).ok_or(HeapError::OutOfMemory)?,
        )),
        serde_json::Value::Array(items) => {
            let arr = Array::create(items.len() as u32, heap).ok_or(HeapError::OutOfMemory)?;
            // SAFETY: heap outlives this function's handles.
            let rooted = unsafe { Handle::new(heap, Value::Array(arr)) };
            for (i, item) in items.iter().enumerate() {
                let v = import_node(heap, item)?;
                let Value::Array(arr) = rooted.get() else {
                    unreachable!("handle type is stable");
                };
                arr.set(i as u32, v);
            }
            Ok(rooted.get())
        }
        serde_json::Value::Object(map) => {
            let dict = Dict::create(map.len() as u32, heap).ok_or(HeapError::OutOfMemory)?;
            // SAFETY: heap outlives this function's handles.
            let rooted = unsafe { Handle::new(heap, Value::Dict(dict)) };
            for (key, val) in map {
                let v = import_node(heap, val)?;
                // Protect the fresh value across the key interning, which
                // can itself allocate (and therefore collect).
                // SAFETY: as above.
                let v_rooted = unsafe { Handle::new(heap, v) };
                let sym = heap.intern(key).ok_or(HeapError::OutOfMemory)?;
                let Value::Dict(mut dict) = rooted.get() else {
                    unreachable!("handle type is stable");
                };
                if !dict.set(sym, v_rooted.get()) {
                    // Duplicate keys already occupy their slot; a full dict
                    // here means the document repeated every key.
                    return Err(HeapError::InvalidArgument("dict capacity exhausted"));
                }
            }
            Ok(rooted.get())
        }
    }
}

/// Render a heap value as a `serde_json::Value`.
///
/// `null` and `nullish` both map to JSON `null`; symbols and strings map to
/// JSON strings; blobs map to an array of byte values. Graphs with cycles
/// are rejected rather than recursed forever.
pub fn export_json(v: Value) -> Result<serde_json::Value> {
    let mut path = Vec::new();
    export_node(v, &mut path)
}

fn export_node(v: Value, path: &mut Vec<usize>) -> Result<serde_json::Value> {
    if let Some(block) = v.block() {
        if path.contains(&block.addr()) {
            return Err(HeapError::InvalidArgument("cycle in object graph"));
        }
        path.push(block.addr());
    }
    let out = match v {
        Value::Null | Value::Nullish => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Int(i) => serde_json::Value::from(i),
        Value::BigInt(b) => serde_json::Value::from(b.value()),
        Value::Float(f) => Number::from_f64(f.value())
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::from(s.as_str()),
        Value::Symbol(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(b.bytes().to_vec()),
        Value::Array(arr) => {
            let mut items = Vec::with_capacity(arr.len() as usize);
            for item in arr.iter() {
                items.push(export_node(item, path)?);
            }
            serde_json::Value::Array(items)
        }
        Value::Vector(vec) => {
            let mut items = Vec::with_capacity(vec.len() as usize);
            for item in vec.iter() {
                items.push(export_node(item, path)?);
            }
            serde_json::Value::Array(items)
        }
        Value::Dict(dict) => {
            let mut map = serde_json::Map::with_capacity(dict.count() as usize);
            for (key, val) in dict.iter() {
                map.insert(key.as_str().to_owned(), export_node(val, path)?);
            }
            serde_json::Value::Object(map)
        }
    };
    if v.block().is_some() {
        path.pop();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::val::Type;

    #[test]
    fn test_import_scalars() {
        let mut heap = Heap::new(8_192);
        assert_eq!(import_json(&mut heap, "null").unwrap(), Value::Nullish);
        assert_eq!(import_json(&mut heap, "true").unwrap(), Value::Bool(true));
        assert_eq!(import_json(&mut heap, "42").unwrap(), Value::Int(42));

        let big = import_json(&mut heap, "4000000000").unwrap();
        assert_eq!(big.value_type(), Type::BigInt);
        assert_eq!(big.as_i64(), Some(4_000_000_000));

        let f = import_json(&mut heap, "2.75").unwrap();
        assert_eq!(f.value_type(), Type::Float);
        assert_eq!(f.as_f64(), Some(2.75));
    }

    #[test]
    fn test_round_trip_document() {
        let mut heap = Heap::new(65_536);
        let text = r#"{"name":"smol","tags":["tiny","heap"],"size":1234,"nested":{"ok":true,"nil":null}}"#;
        let v = import_json(&mut heap, text).unwrap();
        heap.set_root(v);

        let out = export_json(v).unwrap();
        let expected: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_import_rejects_malformed() {
        let mut heap = Heap::new(8_192);
        assert!(matches!(
            import_json(&mut heap, "{nope"),
            Err(HeapError::Json(_))
        ));
    }

    #[test]
    fn test_export_rejects_cycles() {
        let mut heap = Heap::new(8_192);
        let arr = Array::create(1, &mut heap).unwrap();
        arr.set(0, Value::Array(arr));
        assert!(matches!(
            export_json(Value::Array(arr)),
            Err(HeapError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_object_keys_are_interned() {
        let mut heap = Heap::new(16_384);
        let v = import_json(&mut heap, r#"[{"k":1},{"k":2}]"#).unwrap();
        let Value::Array(arr) = v else { panic!() };
        let Value::Dict(d0) = arr.get(0) else { panic!() };
        let Value::Dict(d1) = arr.get(1) else { panic!() };
        let k = heap.find_symbol("k").unwrap();
        assert_eq!(d0.find(k), Some(Value::Int(1)));
        assert_eq!(d1.find(k), Some(Value::Int(2)));
    }
}
