//! Copying garbage collection
//!
//! [`Collector`] is a Cheney-style copying collector: it evacuates every
//! block reachable from the heap root and the registered external roots into
//! a companion heap, leaving forwarding addresses behind in the from-space,
//! then swaps the two heaps' backing memory when it goes out of scope. The
//! original heap handle ends up observing the compacted data; the companion
//! (or the internal temporary) ends up reset and reusable.
//!
//! Evacuation is iterative. Copying a container block verbatim leaves its
//! value slots holding offsets that are only meaningful relative to their
//! *old* addresses, and a to-space slot cannot encode a pointer back into
//! from-space (the two regions may be arbitrarily far apart). So each copied
//! container is queued together with its from-space payload address, and the
//! drain loop re-bases every slot: original target = from-slot address +
//! stored offset, evacuate that, then write the to-space target through the
//! slot — which re-encodes the offset at its final address. Re-encountering
//! a forwarded block just returns its new position, which is what makes
//! cycles terminate.
//!
//! While a collector is in scope the mutator must leave the heap alone
//! (enforced by the `&mut` borrow); the only legal operations are the
//! collector's own [`scan_value`](Collector::scan_value) /
//! [`update`](Collector::update) fix-ups for references held outside the
//! heap that were not registered as external roots.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::block::BlockPtr;
use crate::collections::Dict;
use crate::heap::{Heap, HeapPos};
use crate::val::{Type, Val, Value};

enum ToSpace<'a> {
    /// Internal temporary for in-place collection; discarded after the swap.
    Temp(Box<Heap>),
    /// Caller-supplied sibling heap; reset and handed back after the swap.
    Paired(&'a mut Heap),
}

/// A copying collector, live for the duration of one collection.
pub struct Collector<'a> {
    from: &'a mut Heap,
    to: ToSpace<'a>,
    /// Evacuated containers whose slots still hold from-space offsets:
    /// (position in to-space, payload address in from-space).
    queue: VecDeque<(HeapPos, *const u8)>,
}

impl<'a> Collector<'a> {
    /// Collect `heap` in place, evacuating into an internal temporary heap
    /// of equal capacity.
    pub fn run(heap: &mut Heap) {
        drop(Collector::new(heap));
    }

    /// Collect `from` into the sibling heap `to` (which is reset first).
    pub fn run_to(from: &mut Heap, to: &mut Heap) {
        drop(Collector::paired(from, to));
    }

    /// Start an in-place collection. Roots are evacuated immediately; keep
    /// the collector around only to `scan_value`/`update` stray references.
    pub fn new(from: &'a mut Heap) -> Collector<'a> {
        let temp = Box::new(Heap::new(from.capacity()));
        let mut gc = Collector {
            from,
            to: ToSpace::Temp(temp),
            queue: VecDeque::new(),
        };
        gc.scan_roots();
        gc
    }

    /// Start a collection into a caller-supplied destination heap.
    pub fn paired(from: &'a mut Heap, to: &'a mut Heap) -> Collector<'a> {
        to.reset();
        let mut gc = Collector {
            from,
            to: ToSpace::Paired(to),
            queue: VecDeque::new(),
        };
        gc.scan_roots();
        gc
    }

    fn to_heap(&mut self) -> &mut Heap {
        match &mut self.to {
            ToSpace::Temp(h) => h,
            ToSpace::Paired(h) => h,
        }
    }

    fn scan_roots(&mut self) {
        #[cfg(debug_assertions)]
        self.from.visit_all(|b| {
            debug_assert!(!b.is_forwarded(), "collection started on a dirty heap");
            true
        });

        // The heap root.
        let root_block = self.from.root_slot().block();
        if let Some(block) = root_block {
            let pos = self.evacuate(block);
            self.drain();
            let to = self.to_heap();
            let target = to.block_at(pos);
            to.root_slot().set_block(target);
        } else {
            let bits = self.from.root_slot().raw_bits();
            self.to_heap().root_slot().set_raw(bits);
        }

        // Registered external root slots, rewritten in place.
        for run in self.from.external_root_runs() {
            for i in 0..run.len {
                // SAFETY: registration guarantees live, writable slots until
                // unregistration.
                let slot = unsafe { &*run.ptr.add(i) };
                self.update(slot);
            }
        }
    }

    /// Move one block to the to-space (or find where it already went) and
    /// return its new position. Container payloads are queued for re-basing.
    fn evacuate(&mut self, block: BlockPtr) -> HeapPos {
        if block.is_forwarded() {
            return block.forwarding_pos();
        }
        debug_assert!(self.from.contains(block.addr() as *const u8));
        let size = block.size();
        let block_type = block.block_type();
        let dst = self
            .to_heap()
            .alloc_block(size, block_type)
            .expect("to-space smaller than the live set");
        // SAFETY: both payloads span `size` bytes and cannot overlap — they
        // live in different heaps.
        unsafe {
            std::ptr::copy_nonoverlapping(block.payload_ptr(), dst.payload_ptr(), size as usize);
        }
        let pos = self.to_heap().pos(dst.addr() as *const u8);
        block.set_forwarded(pos);
        if block_type.is_container() && size > 0 {
            self.queue.push_back((pos, block.payload_ptr()));
        }
        trace!(pos, size, %block_type, "evacuated block");
        pos
    }

    /// Re-base and evacuate the slots of every queued container.
    fn drain(&mut self) {
        while let Some((to_pos, from_payload)) = self.queue.pop_front() {
            let dst = self.to_heap().block_at(to_pos);
            let slots = dst.vals();
            for (i, slot) in slots.iter().enumerate() {
                let bits = slot.raw_bits();
                if bits & 1 != 0 || bits <= 6 {
                    continue; // inline value, copied bits are already right
                }
                // The copied word still encodes "offset from my old slot".
                let off = (bits as i32) >> 1;
                let from_slot = from_payload as isize + (4 * i) as isize;
                // SAFETY: invariant 1 — every object Val in a live heap
                // resolves to a block in the same heap.
                let target = unsafe { BlockPtr::from_addr((from_slot + off as isize) as *mut u8) };
                let pos = self.evacuate(target);
                let to = self.to_heap();
                slot.set_block(to.block_at(pos));
            }
            if dst.block_type() == Type::Dict {
                // Relocation permuted the key addresses the entries were
                // sorted by.
                Dict::from_block(dst).sort_all();
            }
        }
    }

    /// The to-space image of `v`: inline values unchanged, object values
    /// evacuated (transitively) and re-pointed.
    pub fn scan_value(&mut self, v: Value) -> Value {
        match v.block() {
            Some(block) => {
                let pos = self.evacuate(block);
                self.drain();
                let to = self.to_heap();
                Value::from_block(to.block_at(pos))
            }
            None => v,
        }
    }

    /// Rewrite a `Val` slot (held anywhere outside the from-space object
    /// graph) to point at the evacuated copy of its target.
    pub fn update(&mut self, slot: &Val) {
        if let Some(block) = slot.block() {
            let pos = self.evacuate(block);
            self.drain();
            let to = self.to_heap();
            let target = to.block_at(pos);
            slot.set_block(target);
        }
    }

    /// Rewrite a resolved [`Value`] in place.
    pub fn update_value(&mut self, v: &mut Value) {
        *v = self.scan_value(*v);
    }
}

impl Drop for Collector<'_> {
    fn drop(&mut self) {
        debug_assert!(self.queue.is_empty());
        // Remap the symbol index through the forwarding addresses while the
        // from-space is still readable. Unforwarded symbols are unreachable
        // and fall out of the index here.
        let symbols = self.from.symbols.remap_forwarded(self.from);
        let before = self.from.used();

        self.from.reset();
        match &mut self.to {
            ToSpace::Temp(to) => self.from.swap_memory_with(to),
            ToSpace::Paired(to) => self.from.swap_memory_with(to),
        }
        self.from.symbols = symbols;
        debug!(before, after = self.from.used(), "collection complete");
    }
}

/// An RAII root: a boxed `Val` slot registered as an external root, so the
/// referenced object survives collections (including handler-triggered ones)
/// and the handle always resolves to its current location.
pub struct Handle {
    heap: *const Heap,
    slot: Box<Val>,
}

impl Handle {
    /// Root `v` on `heap`.
    ///
    /// # Safety
    /// `heap` must outlive the handle: the handle unregisters itself from
    /// the heap when dropped.
    pub unsafe fn new(heap: &Heap, v: Value) -> Handle {
        let slot = Box::new(Val::default());
        slot.set(v);
        // SAFETY: the boxed slot has a stable address for the handle's
        // lifetime, and Drop unregisters before freeing it.
        unsafe { heap.register_external_roots(std::slice::from_ref(&*slot)) };
        Handle { heap, slot }
    }

    /// The current (post-any-collection) value.
    pub fn get(&self) -> Value {
        self.slot.load()
    }

    /// Replace the rooted value.
    pub fn set(&self, v: Value) {
        self.slot.set(v);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: Handle::new's contract — the heap outlives the handle.
        unsafe { (*self.heap).unregister_external_roots(&*self.slot as *const Val) };
    }
}
