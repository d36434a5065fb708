use std::alloc::{self, Layout};
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::allocation::{Allocation, Finalizer, Registry};
use crate::debug::gc_debug;
use crate::error::GcError;
use crate::root::RootRegion;
use crate::world::World;

/// Size and alignment of the machine words the scanner reads.
pub(crate) const WORD_SIZE: usize = size_of::<*const u8>();
pub(crate) const WORD_ALIGN: usize = align_of::<*const u8>();

// Keeps the scheduler from being generic over the heap: the worker only
// ever needs to run a collection.
pub(crate) trait Collect {
    fn collect(&self);
}

/// The allocation registry and conservative mark-sweep engine.
///
/// Owns every block it hands out; the host holds raw addresses only. The
/// registry, root set and generation timer share one lock, which is also
/// the lock safepoints park on, so a stopped world and a locked registry
/// together give the marker a quiescent heap.
pub(crate) struct GcHeap {
    state: Mutex<HeapState>,
    pub world: World,
}

struct HeapState {
    registry: Registry,
    roots: Vec<RootRegion>,
    timer: u64,
}

impl GcHeap {
    pub fn new() -> Self {
        GcHeap {
            state: Mutex::new(HeapState {
                registry: Registry::new(),
                roots: Vec::new(),
                timer: 0,
            }),
            world: World::new(),
        }
    }

    pub fn safepoint(&self) {
        self.world.safepoint(&self.state);
    }

    pub fn malloc(&self, size: usize, finalizer: Option<Finalizer>) -> Result<NonNull<u8>, GcError> {
        self.safepoint();
        let layout = block_layout(size)?;
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })
            .ok_or(GcError::OutOfMemory { size })?;
        self.register_block(ptr, size, finalizer);
        Ok(ptr)
    }

    pub fn calloc(
        &self,
        nmemb: usize,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Result<NonNull<u8>, GcError> {
        self.safepoint();
        let total = nmemb
            .checked_mul(size)
            .ok_or(GcError::OutOfMemory { size: usize::MAX })?;
        let layout = block_layout(total)?;
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(GcError::OutOfMemory { size: total })?;
        self.register_block(ptr, total, finalizer);
        Ok(ptr)
    }

    /// Deregister `ptr` without finalizing, ask the system allocator to
    /// resize, register the relocated block. A pointer the registry does
    /// not know degrades to a fresh allocation. No failure path mutates
    /// the registry: an invalid size is rejected up front, and a refused
    /// resize reinserts the old record.
    pub fn realloc(
        &self,
        ptr: *mut u8,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Result<NonNull<u8>, GcError> {
        self.safepoint();
        // Validate the requested size before touching the registry.
        let new_layout = block_layout(size)?;
        let mut state = self.state.lock().unwrap();

        // Stay under the lock: the old record's size must not race a
        // concurrent free of the same base.
        let new_ptr = match state.registry.remove(ptr as usize) {
            Some(old) => {
                // The old layout was valid when the block was allocated.
                let old_layout = Layout::from_size_align(old.size.max(1), WORD_ALIGN).unwrap();
                match NonNull::new(unsafe { alloc::realloc(ptr, old_layout, size.max(1)) }) {
                    Some(new_ptr) => new_ptr,
                    None => {
                        // A refused resize leaves the old block intact;
                        // keep tracking it.
                        state.registry.insert(old);
                        return Err(GcError::OutOfMemory { size });
                    }
                }
            }
            None => NonNull::new(unsafe { alloc::alloc(new_layout) })
                .ok_or(GcError::OutOfMemory { size })?,
        };

        let timer = state.timer;
        state
            .registry
            .insert(Allocation::new(new_ptr.as_ptr() as usize, size, finalizer, timer));
        Ok(new_ptr)
    }

    /// Finalize and release the block whose base is `ptr`. Anything else,
    /// including interior pointers and already-freed bases, is a silent
    /// no-op.
    pub fn free(&self, ptr: *mut u8) {
        self.safepoint();
        let mut state = self.state.lock().unwrap();
        if let Some(alloc) = state.registry.remove(ptr as usize) {
            release(alloc);
        }
    }

    /// Finalize and release every allocation and clear the registry. Takes
    /// the registry lock but does not stop the world; the caller guarantees
    /// no mutator is touching collector-managed memory.
    pub fn free_all(&self) {
        let mut state = self.state.lock().unwrap();
        for alloc in state.registry.take_all() {
            release(alloc);
        }
    }

    /// Replace the root set.
    pub fn init_roots(&self, roots: &[RootRegion]) {
        self.state.lock().unwrap().roots = roots.to_vec();
    }

    pub fn add_root(&self, root: RootRegion) {
        self.state.lock().unwrap().roots.push(root);
    }

    /// Matches by address only; size is not part of root identity.
    pub fn delete_root(&self, root: RootRegion) {
        self.state.lock().unwrap().roots.retain(|r| *r != root);
    }

    /// Collections so far, live allocation count, live bytes.
    pub fn snapshot(&self) -> (u64, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.timer, state.registry.len(), state.registry.live_bytes())
    }

    fn register_block(&self, ptr: NonNull<u8>, size: usize, finalizer: Option<Finalizer>) {
        let mut state = self.state.lock().unwrap();
        let timer = state.timer;
        state
            .registry
            .insert(Allocation::new(ptr.as_ptr() as usize, size, finalizer, timer));
    }
}

impl Collect for GcHeap {
    /// One full stop-the-world collection cycle: park the mutators, refresh
    /// the registry, mark everything reachable from the roots, sweep the
    /// rest, release the world.
    fn collect(&self) {
        gc_debug("collection started");
        self.world.stop_world();
        let mut state = self.state.lock().unwrap();

        state.timer += 1;
        state.registry.sort_refresh();

        let HeapState {
            registry,
            roots,
            timer,
        } = &mut *state;
        let worklist = mark_roots(registry, roots.as_slice(), *timer);
        mark_heap_allocs(registry, &worklist, *timer);
        let freed = sweep(registry, *timer);

        drop(state);
        self.world.resume_world();
        gc_debug(&format!("collection finished, {} blocks freed", freed));
    }
}

impl Drop for GcHeap {
    fn drop(&mut self) {
        self.free_all();
    }
}

/// Round an address up to the next word boundary.
fn aligned(addr: usize) -> usize {
    addr + (WORD_ALIGN - addr % WORD_ALIGN) % WORD_ALIGN
}

fn block_layout(size: usize) -> Result<Layout, GcError> {
    // Zero-sized requests still get a real, registerable block.
    Layout::from_size_align(size.max(1), WORD_ALIGN).map_err(|_| GcError::OutOfMemory { size })
}

/// Read one machine word of host memory. The conservative scan treats the
/// result as a candidate pointer.
///
/// # Safety
/// `addr .. addr + WORD_SIZE` must be readable: root regions are declared
/// readable by the host, heap blocks are live registry entries.
unsafe fn read_word(addr: usize) -> usize {
    (addr as *const usize).read_unaligned()
}

/// Scan every root region word by word and stamp each allocation a word
/// points into. Returns the allocations whose own contents are worth
/// scanning.
fn mark_roots(registry: &mut Registry, roots: &[RootRegion], timer: u64) -> Vec<usize> {
    let mut worklist = Vec::new();
    for root in roots {
        let end = root.addr.saturating_add(root.size);
        // Roots are scanned from their raw, possibly unaligned start; only
        // heap blocks get an aligned one.
        let mut at = root.addr;
        while at + WORD_SIZE <= end {
            let word = unsafe { read_word(at) };
            if let Some(idx) = registry.find_containing(word) {
                let alloc = registry.get_mut(idx);
                alloc.last_valid_time = timer;
                if alloc.size >= WORD_SIZE {
                    worklist.push(idx);
                }
            }
            at += WORD_SIZE;
        }
    }
    worklist
}

/// Scan the contents of every root-reachable allocation. Marks found here
/// are not re-enqueued: marking covers the frontier directly reachable
/// from the roots.
fn mark_heap_allocs(registry: &mut Registry, worklist: &[usize], timer: u64) {
    for &idx in worklist {
        let (base, size) = {
            let alloc = registry.get(idx);
            (alloc.base, alloc.size)
        };

        let end = base + size;
        let mut at = aligned(base);
        while at + WORD_SIZE <= end {
            let word = unsafe { read_word(at) };
            if let Some(found) = registry.find_containing(word) {
                registry.get_mut(found).last_valid_time = timer;
            }
            at += WORD_SIZE;
        }
    }
}

/// Partition the registry into survivors and dead; finalize and release
/// the dead. Survivors keep their base order, so the whole remainder is
/// the new sorted prefix.
fn sweep(registry: &mut Registry, timer: u64) -> usize {
    let mut survivors = Vec::new();
    let mut freed = 0;

    for alloc in registry.take_all() {
        if alloc.last_valid_time >= timer {
            survivors.push(alloc);
        } else {
            freed += 1;
            release(alloc);
        }
    }

    registry.replace_sorted(survivors);
    freed
}

/// Finalize, then hand the block back to the system allocator.
fn release(record: Allocation) {
    record.finalize();
    // The layout was valid when the block was allocated.
    let layout = Layout::from_size_align(record.size.max(1), WORD_ALIGN).unwrap();
    unsafe { alloc::dealloc(record.base as *mut u8, layout) };
}
