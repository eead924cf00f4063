//! Arena-level integration tests: geometry, allocation, iteration,
//! serialization, and adoption.

use loam_heap::{
    dump_heap, Array, Blob, Heap, HeapError, Str, Type, Value, HEAP_HEADER_SIZE, MAGIC,
};

/// Arena footprint of one block: header plus padded payload.
fn span(size: usize) -> usize {
    8 + size.max(4).next_multiple_of(4)
}

#[test]
fn empty_heap() {
    let heap = Heap::new(10_000);
    assert_eq!(heap.capacity(), 10_000);
    assert_eq!(heap.used(), HEAP_HEADER_SIZE);
    assert_eq!(heap.remaining(), 10_000 - HEAP_HEADER_SIZE);
    assert_eq!(heap.root(), Value::Null);

    let mut visited = 0;
    heap.visit(|_| {
        visited += 1;
        true
    });
    assert_eq!(visited, 0);
}

#[test]
fn single_allocation() {
    let mut heap = Heap::new(10_000);
    let ptr = heap.alloc(123).expect("fits");
    assert!(heap.contains(ptr.as_ptr()));
    assert_eq!(heap.used(), HEAP_HEADER_SIZE + span(123));

    let mut blocks = Vec::new();
    heap.visit_all(|b| {
        blocks.push((b.block_type(), b.size()));
        true
    });
    assert_eq!(blocks, vec![(Type::Blob, 123)]);
}

#[test]
fn exhaustion_returns_none() {
    // Size the heap for exactly ten 16-byte blobs.
    let capacity = HEAP_HEADER_SIZE + 10 * span(16);
    let mut heap = Heap::new(capacity);
    for _ in 0..10 {
        assert!(heap.alloc(16).is_some());
    }
    assert_eq!(heap.remaining(), 0);
    assert!(heap.alloc(1).is_none());
}

#[test]
fn allocate_range_of_blobs() {
    const BASE: usize = 16;
    const COUNT: usize = 500;
    let capacity = HEAP_HEADER_SIZE + (0..COUNT).map(|i| span(BASE + i)).sum::<usize>();
    let mut heap = Heap::new(capacity);

    let mut blobs = Vec::with_capacity(COUNT);
    for i in 0..COUNT {
        let mut blob = Blob::create(BASE + i, &mut heap).expect("sized to fit");
        blob.bytes_mut().fill(i as u8);
        blobs.push(blob);
    }
    assert_eq!(heap.remaining(), 0);

    for (i, blob) in blobs.iter().enumerate() {
        assert_eq!(blob.len(), BASE + i);
        assert!(blob.bytes().iter().all(|&b| b == i as u8), "blob {i} corrupted");
    }

    // Iteration sees them in allocation order.
    let mut sizes = Vec::new();
    heap.visit_all(|b| {
        sizes.push(b.size() as usize);
        true
    });
    let expected: Vec<usize> = (0..COUNT).map(|i| BASE + i).collect();
    assert_eq!(sizes, expected);
}

#[test]
fn every_val_resolves_inside_the_heap() {
    let mut heap = Heap::new(16_384);
    let arr = Array::create(4, &mut heap).unwrap();
    let s = Str::create("in-heap", &mut heap).unwrap();
    arr.set(0, Value::String(s));
    arr.set(1, Value::Int(-5));
    heap.set_root(Value::Array(arr));

    heap.visit_all(|b| {
        for slot in b.vals() {
            if let Some(target) = slot.block() {
                assert!(heap.contains(target.addr() as *const u8));
            }
        }
        true
    });
}

#[test]
fn serialize_and_adopt_round_trip() {
    let mut heap = Heap::new(16_384);
    let a = Str::create("first", &mut heap).unwrap();
    let b = Str::create("second", &mut heap).unwrap();
    let arr = Array::create_from(&[Value::String(a), Value::String(b)], &mut heap).unwrap();
    heap.set_root(Value::Array(arr));

    let image = heap.as_bytes().to_vec();
    assert_eq!(image.len(), heap.used());

    let adopted = Heap::adopt_image(&image, image.len()).expect("valid image");
    assert_eq!(adopted.used(), heap.used());

    // Same shapes in the same order.
    let mut original = Vec::new();
    heap.visit_all(|b| {
        original.push((b.block_type(), b.size()));
        true
    });
    let mut reloaded = Vec::new();
    adopted.visit_all(|b| {
        reloaded.push((b.block_type(), b.size()));
        true
    });
    assert_eq!(original, reloaded);

    // The root resolves to equivalent content at the new base address.
    let Value::Array(arr) = adopted.root() else {
        panic!("adopted root should be an array");
    };
    let Value::String(a) = arr.get(0) else { panic!() };
    let Value::String(b) = arr.get(1) else { panic!() };
    assert_eq!(a.as_str(), "first");
    assert_eq!(b.as_str(), "second");
}

#[test]
fn adopt_rejects_bad_magic() {
    let mut heap = Heap::new(1_024);
    heap.alloc(16).unwrap();
    let mut image = heap.as_bytes().to_vec();
    image[0] ^= 0xFF;
    assert!(matches!(
        Heap::adopt_image(&image, image.len()),
        Err(HeapError::InvalidHeap(_))
    ));
}

#[test]
fn adopt_rejects_bad_root() {
    let mut image = Vec::new();
    image.extend_from_slice(&MAGIC.to_ne_bytes());
    // An object-tagged root word pointing far past the image.
    let bogus_offset: u32 = 1 << 20;
    image.extend_from_slice(&(bogus_offset << 1).to_ne_bytes());
    assert!(matches!(
        Heap::adopt_image(&image, image.len()),
        Err(HeapError::InvalidHeap(_))
    ));
}

#[test]
fn adopt_rejects_truncated_image() {
    let image = MAGIC.to_ne_bytes()[..3].to_vec();
    assert!(matches!(
        Heap::adopt_image(&image, 1_024),
        Err(HeapError::InvalidHeap(_))
    ));
}

#[test]
fn adopted_heap_keeps_interned_symbols() {
    let mut heap = Heap::new(8_192);
    let sym = heap.intern("answer").unwrap();
    heap.set_root(Value::Symbol(sym));

    let image = heap.as_bytes().to_vec();
    let mut adopted = Heap::adopt_image(&image, 8_192).unwrap();

    // Interning in the adopted heap finds the existing block instead of
    // allocating a duplicate.
    let used = adopted.used();
    let again = adopted.intern("answer").unwrap();
    assert_eq!(adopted.used(), used);
    assert_eq!(adopted.root(), Value::Symbol(again));
}

#[test]
fn wrapped_heap_uses_caller_memory() {
    let mut backing = vec![0u64; 2_048 / 8];
    let mut heap = unsafe { Heap::wrap(backing.as_mut_ptr() as *mut u8, 2_048) };
    let s = Str::create("borrowed memory", &mut heap).unwrap();
    heap.set_root(Value::String(s));

    let base = backing.as_ptr() as usize;
    assert!(heap.contains((base + HEAP_HEADER_SIZE) as *const u8));
    drop(heap);

    // The data physically lives in the caller's buffer.
    let raw: Vec<u8> = backing.iter().flat_map(|w| w.to_ne_bytes()).collect();
    assert_eq!(&raw[0..4], &MAGIC.to_ne_bytes());
}

#[test]
fn dump_renders_the_arena() {
    let mut heap = Heap::new(8_192);
    Str::create("visible", &mut heap).unwrap();
    let mut out = Vec::new();
    dump_heap(&heap, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("visible"));
    assert!(text.contains("1 blocks"));
}
