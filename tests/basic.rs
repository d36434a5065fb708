use rand::prelude::*;
use scree::{Finalizer, Gc, GcConfig, RootRegion};
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// An engine that only collects when asked to.
fn manual_gc() -> Gc {
    Gc::with_config(GcConfig {
        auto_collect: false,
        ..GcConfig::default()
    })
}

fn counting(counter: &Arc<AtomicUsize>) -> Finalizer {
    let counter = Arc::clone(counter);
    Box::new(move |_ptr, _size| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn simple_allocation() {
    let gc = manual_gc();

    let block = gc.alloc(128).unwrap();
    unsafe { gc.free(block.as_ptr()) };
}

#[test]
fn double_free_is_a_no_op() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let block = gc.alloc_with(64, counting(&counter)).unwrap();
    unsafe { gc.free(block.as_ptr()) };
    unsafe { gc.free(block.as_ptr()) };

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_and_interior_frees_are_no_ops() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let block = gc.alloc_with(64, counting(&counter)).unwrap();

    // Never handed out by this engine.
    unsafe { gc.free(0x1000 as *mut u8) };
    // Interior pointers are not bases.
    unsafe { gc.free(block.as_ptr().wrapping_add(8)) };
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    unsafe { gc.free(block.as_ptr()) };
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn rooted_allocation_survives_collection() {
    let gc = manual_gc();

    let mut slot: Box<usize> = Box::new(0);
    unsafe { gc.add_root(RootRegion::of(&*slot)) };

    let num = gc.alloc(size_of::<i32>()).unwrap();
    unsafe { num.as_ptr().cast::<i32>().write(12345) };
    *slot = num.as_ptr() as usize;

    gc.collect_blocked();

    assert_eq!(unsafe { num.as_ptr().cast::<i32>().read() }, 12345);
    assert_eq!(gc.metrics().live_allocations, 1);
}

#[test]
fn unreachable_cycle_is_collected() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let a = gc.alloc_with(2 * size_of::<usize>(), counting(&counter)).unwrap();
    let b = gc.alloc_with(2 * size_of::<usize>(), counting(&counter)).unwrap();

    // a.next = b; b.next = a, then both references are dropped.
    unsafe {
        a.as_ptr().cast::<usize>().write(b.as_ptr() as usize);
        b.as_ptr().cast::<usize>().write(a.as_ptr() as usize);
    }

    gc.collect_blocked();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(gc.metrics().live_allocations, 0);
}

#[test]
fn rooted_block_keeps_its_references_alive() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let mut slot: Box<usize> = Box::new(0);
    unsafe { gc.add_root(RootRegion::of(&*slot)) };

    // slot -> outer -> inner: the inner block is only reachable through
    // the contents of the rooted one.
    let inner = gc.alloc_with(size_of::<usize>(), counting(&counter)).unwrap();
    let outer = gc.alloc_with(size_of::<usize>(), counting(&counter)).unwrap();
    unsafe { outer.as_ptr().cast::<usize>().write(inner.as_ptr() as usize) };
    *slot = outer.as_ptr() as usize;

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    *slot = 0;
    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn interior_pointer_retains_the_whole_block() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    const LEN: usize = 500;
    const OFFSET: usize = 243;

    let array = gc
        .calloc_with(LEN, size_of::<i32>(), counting(&counter))
        .unwrap();
    let array = array.as_ptr().cast::<i32>();
    for i in 0..LEN {
        unsafe { array.add(i).write(i as i32) };
    }

    // Root a pointer into the middle of the array.
    let mut slot: Box<usize> = Box::new(unsafe { array.add(OFFSET) } as usize);
    unsafe { gc.add_root(RootRegion::of(&*slot)) };

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let interior = unsafe { array.add(OFFSET) };
    for i in OFFSET..LEN {
        assert_eq!(unsafe { interior.add(i - OFFSET).read() }, i as i32);
    }

    *slot = 0;
    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn calloc_zeroes_the_block() {
    let gc = manual_gc();

    let block = gc.calloc(64, 1).unwrap();
    for i in 0..64 {
        assert_eq!(unsafe { block.as_ptr().add(i).read() }, 0);
    }
}

#[test]
fn calloc_overflow_is_out_of_memory() {
    let gc = manual_gc();
    assert!(gc.calloc(usize::MAX, 2).is_err());
}

#[test]
fn failed_realloc_leaves_the_block_tracked() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let block = gc.alloc_with(16, counting(&counter)).unwrap();
    unsafe { block.as_ptr().cast::<u64>().write(777) };

    // Far past what any layout can express.
    assert!(unsafe { gc.realloc(block.as_ptr(), usize::MAX) }.is_err());

    // The old block is still tracked, intact, and not finalized.
    assert_eq!(gc.metrics().live_allocations, 1);
    assert_eq!(unsafe { block.as_ptr().cast::<u64>().read() }, 777);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    unsafe { gc.free(block.as_ptr()) };
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn realloc_preserves_the_data_prefix() {
    let gc = manual_gc();

    let mut slot: Box<usize> = Box::new(0);
    unsafe { gc.add_root(RootRegion::of(&*slot)) };

    let block = gc.alloc(4 * size_of::<i32>()).unwrap();
    for i in 0..4 {
        unsafe { block.as_ptr().cast::<i32>().add(i).write(i as i32) };
    }
    *slot = block.as_ptr() as usize;

    let block = unsafe { gc.realloc(block.as_ptr(), 8 * size_of::<i32>()) }.unwrap();
    for i in 4..8 {
        unsafe { block.as_ptr().cast::<i32>().add(i).write(i as i32) };
    }
    *slot = block.as_ptr() as usize;

    gc.collect_blocked();

    for i in 0..8 {
        assert_eq!(unsafe { block.as_ptr().cast::<i32>().add(i).read() }, i as i32);
    }
    assert_eq!(gc.metrics().live_allocations, 1);
}

#[test]
fn realloc_does_not_run_the_finalizer() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let block = gc.alloc_with(16, counting(&counter)).unwrap();
    let block = unsafe { gc.realloc_with(block.as_ptr(), 32, counting(&counter)) }.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    // The relocated block carries the new finalizer.
    unsafe { gc.free(block.as_ptr()) };
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn many_rooted_slots() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    const SLOTS: usize = 100;
    let mut slots: Box<[usize; SLOTS]> = Box::new([0; SLOTS]);
    unsafe { gc.add_root(RootRegion::new(slots.as_ptr() as usize, SLOTS * size_of::<usize>())) };

    for (i, slot) in slots.iter_mut().enumerate() {
        let block = gc.alloc_with(size_of::<i32>(), counting(&counter)).unwrap();
        unsafe { block.as_ptr().cast::<i32>().write(i as i32) };
        *slot = block.as_ptr() as usize;
    }

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    for (i, slot) in slots.iter_mut().enumerate() {
        assert_eq!(unsafe { (*slot as *const i32).read() }, i as i32);
        *slot = 0;
    }

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), SLOTS);
}

#[test]
fn free_all_finalizes_everything_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    for _ in 0..10 {
        gc.alloc_with(32, counting(&counter)).unwrap();
    }

    unsafe { gc.free_all() };
    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert_eq!(gc.metrics().live_allocations, 0);

    // Nothing left to finalize.
    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn deleted_root_no_longer_retains() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let slot: Box<usize> = Box::new(0);
    let root = RootRegion::of(&*slot);
    unsafe { gc.add_root(root) };
    gc.delete_root(root);

    let mut slot = slot;
    *slot = gc
        .alloc_with(16, counting(&counter))
        .unwrap()
        .as_ptr() as usize;

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn init_replaces_the_root_set() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let mut old_slot: Box<usize> = Box::new(0);
    unsafe { gc.add_root(RootRegion::of(&*old_slot)) };

    let mut new_slot: Box<usize> = Box::new(0);
    unsafe { gc.init(&[RootRegion::of(&*new_slot)]) };

    // Only the new slot roots anything now.
    *old_slot = gc.alloc_with(16, counting(&counter)).unwrap().as_ptr() as usize;
    *new_slot = gc.alloc_with(16, counting(&counter)).unwrap().as_ptr() as usize;

    gc.collect_blocked();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(gc.metrics().live_allocations, 1);
}

#[test]
fn repeated_collections_are_idempotent() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    let mut slot: Box<usize> = Box::new(0);
    unsafe { gc.add_root(RootRegion::of(&*slot)) };
    *slot = gc.alloc_with(64, counting(&counter)).unwrap().as_ptr() as usize;

    for _ in 0..5 {
        gc.collect_blocked();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(gc.metrics().live_allocations, 1);
    assert_eq!(gc.metrics().collections, 5);
}

#[test]
fn random_churn_balances_finalizers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let gc = manual_gc();

    const SLOTS: usize = 64;
    let mut slots: Box<[usize; SLOTS]> = Box::new([0; SLOTS]);
    unsafe { gc.add_root(RootRegion::new(slots.as_ptr() as usize, SLOTS * size_of::<usize>())) };

    let mut rng = StdRng::seed_from_u64(204);
    let mut allocated = 0;

    for round in 0..1000 {
        let slot = rng.gen_range(0..SLOTS);
        if rng.gen_bool(0.6) {
            let size = rng.gen_range(1..256);
            slots[slot] = gc
                .alloc_with(size, counting(&counter))
                .unwrap()
                .as_ptr() as usize;
            allocated += 1;
        } else {
            slots[slot] = 0;
        }

        if round % 100 == 99 {
            gc.collect_blocked();
        }
    }

    unsafe { gc.free_all() };
    assert_eq!(counter.load(Ordering::SeqCst), allocated);
}
