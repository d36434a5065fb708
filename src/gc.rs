use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use crate::allocation::Finalizer;
use crate::config::GcConfig;
use crate::error::GcError;
use crate::heap::GcHeap;
use crate::metrics::GcMetrics;
use crate::root::RootRegion;
use crate::scheduler::Scheduler;

/// A conservative, stop-the-world mark and sweep garbage collector.
///
/// See the [module-level documentation](./index.html) for an overview.
///
/// An engine owns an allocation heap and a background scheduler worker.
/// Dropping it shuts the worker down, then finalizes and releases every
/// allocation it still tracks. Drop it from a thread that is not
/// registered as a mutator: a collection in flight waits for registered
/// threads to reach a safepoint, and a thread blocked in the drop never
/// will.
///
/// # Examples
///
/// ```
/// use scree::{Gc, GcConfig, RootRegion};
///
/// let gc = Gc::with_config(GcConfig {
///     auto_collect: false,
///     ..GcConfig::default()
/// });
///
/// // A rooted slot the scanner will read.
/// let mut slot: Box<usize> = Box::new(0);
/// unsafe { gc.add_root(RootRegion::of(&*slot)) };
///
/// let block = gc.alloc(64).unwrap();
/// *slot = block.as_ptr() as usize;
///
/// gc.collect_blocked(); // the rooted block survives
/// assert_eq!(gc.metrics().live_allocations, 1);
///
/// *slot = 0;
/// gc.collect_blocked(); // now it is unreachable and freed
/// assert_eq!(gc.metrics().live_allocations, 0);
/// ```
pub struct Gc {
    heap: Arc<GcHeap>,
    scheduler: Arc<Scheduler<GcHeap>>,
}

impl Gc {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create an engine with the given configuration. The scheduler worker
    /// is spawned either way; with `auto_collect` off it only serves
    /// explicit collection requests.
    pub fn with_config(config: GcConfig) -> Self {
        let heap = Arc::new(GcHeap::new());
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&heap), &config));

        Arc::clone(&scheduler).start();
        if !config.auto_collect {
            scheduler.stop();
        }

        Gc { heap, scheduler }
    }

    /// Replace the root set.
    ///
    /// # Safety
    /// Every region must stay readable at its registered address until it
    /// is removed from the root set; the scanner reads it during every
    /// collection.
    pub unsafe fn init(&self, roots: &[RootRegion]) {
        self.heap.init_roots(roots);
    }

    /// Register a region for the scanner to treat as a source of live
    /// references.
    ///
    /// # Safety
    /// As for [`Gc::init`]: the region must stay readable while registered.
    pub unsafe fn add_root(&self, root: RootRegion) {
        self.heap.add_root(root);
    }

    /// Remove a root region. Matches by address only; the region's size is
    /// not part of its identity.
    pub fn delete_root(&self, root: RootRegion) {
        self.heap.delete_root(root);
    }

    /// Allocate `size` bytes with no finalizer.
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>, GcError> {
        self.allocate(size, None)
    }

    /// Allocate `size` bytes; `finalizer` runs with the block's base and
    /// size immediately before the collector releases it.
    pub fn alloc_with(&self, size: usize, finalizer: Finalizer) -> Result<NonNull<u8>, GcError> {
        self.allocate(size, Some(finalizer))
    }

    /// Allocate a zeroed block of `nmemb * size` bytes with no finalizer.
    pub fn calloc(&self, nmemb: usize, size: usize) -> Result<NonNull<u8>, GcError> {
        self.callocate(nmemb, size, None)
    }

    /// Zeroed allocation with a finalizer.
    pub fn calloc_with(
        &self,
        nmemb: usize,
        size: usize,
        finalizer: Finalizer,
    ) -> Result<NonNull<u8>, GcError> {
        self.callocate(nmemb, size, Some(finalizer))
    }

    /// Resize the block based at `ptr`, registering the relocated block
    /// with no finalizer. The old record's finalizer does not run.
    ///
    /// # Safety
    /// `ptr` must be the base of a live allocation of this engine (or a
    /// pointer the host owns no references into, in which case this
    /// behaves like a fresh allocation). On success the old base is
    /// invalid and must not be used.
    pub unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> Result<NonNull<u8>, GcError> {
        self.reallocate(ptr, size, None)
    }

    /// As [`Gc::realloc`], attaching a finalizer to the relocated block.
    ///
    /// # Safety
    /// As for [`Gc::realloc`].
    pub unsafe fn realloc_with(
        &self,
        ptr: *mut u8,
        size: usize,
        finalizer: Finalizer,
    ) -> Result<NonNull<u8>, GcError> {
        self.reallocate(ptr, size, Some(finalizer))
    }

    /// Finalize and release the block whose base is `ptr`. Anything else,
    /// including interior pointers and already-freed bases, is a silent
    /// no-op, so double frees are harmless.
    ///
    /// # Safety
    /// When `ptr` is a live base, no reference into the block may be used
    /// afterwards, rooted or not.
    pub unsafe fn free(&self, ptr: *mut u8) {
        self.heap.free(ptr);
    }

    /// Finalize and release every tracked allocation.
    ///
    /// Takes the registry lock but does not stop the world: the caller
    /// guarantees no mutator is concurrently touching collector-managed
    /// memory.
    ///
    /// # Safety
    /// No reference into any tracked block may be used afterwards.
    pub unsafe fn free_all(&self) {
        self.heap.free_all();
    }

    /// Request a collection and return without waiting for it. A
    /// [`Gc::wait_collect`] issued after this call returns only once a
    /// collection that started after the request has completed; a cycle
    /// already in flight when the request lands does not count.
    pub fn collect(&self) {
        self.scheduler.trigger_collect();
    }

    /// Block until the next collection completes.
    ///
    /// Must not be called from a registered mutator thread: the collector
    /// would wait for that thread to reach a safepoint while it sits here.
    pub fn wait_collect(&self) {
        self.scheduler.wait_collect();
    }

    /// Request a collection and block until a collection that started
    /// after the request completes, so the sweep has observed every
    /// allocation whose bookkeeping finished before this call. Works
    /// whether or not automatic collection is enabled.
    pub fn collect_blocked(&self) {
        self.collect();
        self.wait_collect();
    }

    /// Start the background scheduler. Idempotent.
    pub fn enable_auto(&self) {
        Arc::clone(&self.scheduler).start();
    }

    /// Pause automatic collections. Explicit [`Gc::collect`] and
    /// [`Gc::collect_blocked`] keep working; registered threads stay
    /// registered.
    pub fn disable_auto(&self) {
        self.scheduler.stop();
    }

    /// Record the calling thread as a mutator the collector must park
    /// before scanning. Registered threads promise to pass through
    /// [`Gc::safepoint`] regularly; the allocation entry points do so on
    /// entry.
    pub fn register_thread(&self) {
        self.heap.world.register_thread();
    }

    pub fn deregister_thread(&self) {
        self.heap.world.deregister_thread();
    }

    /// Cooperative checkpoint: parks the calling thread while a collection
    /// is pending, returns immediately otherwise. Long compute loops that
    /// allocate nothing should call this themselves.
    pub fn safepoint(&self) {
        self.heap.safepoint();
    }

    pub fn bytes_threshold(&self) -> usize {
        self.scheduler.bytes_threshold()
    }

    pub fn set_bytes_threshold(&self, bytes: usize) {
        self.scheduler.set_bytes_threshold(bytes);
    }

    pub fn calls_threshold(&self) -> usize {
        self.scheduler.calls_threshold()
    }

    pub fn set_calls_threshold(&self, calls: usize) {
        self.scheduler.set_calls_threshold(calls);
    }

    pub fn collect_interval(&self) -> Duration {
        self.scheduler.collect_interval()
    }

    pub fn set_collect_interval(&self, interval: Duration) {
        self.scheduler.set_collect_interval(interval);
    }

    /// Zero the pacer's volume counters and rate estimates.
    pub fn reset_stats(&self) {
        self.scheduler.reset_stats();
    }

    /// A snapshot of the collector's current counters.
    pub fn metrics(&self) -> GcMetrics {
        let (collections, live_allocations, live_bytes) = self.heap.snapshot();
        let (bytes_since_reset, calls_since_reset) = self.scheduler.allocation_totals();

        GcMetrics {
            collections,
            live_allocations,
            live_bytes,
            bytes_since_reset,
            calls_since_reset,
            registered_threads: self.heap.world.registered_threads(),
            bytes_threshold: self.scheduler.bytes_threshold(),
            calls_threshold: self.scheduler.calls_threshold(),
            collect_interval: self.scheduler.collect_interval(),
        }
    }

    fn allocate(&self, size: usize, finalizer: Option<Finalizer>) -> Result<NonNull<u8>, GcError> {
        let ptr = self.heap.malloc(size, finalizer)?;
        self.scheduler.update_allocation_stats(size);
        Ok(ptr)
    }

    fn callocate(
        &self,
        nmemb: usize,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Result<NonNull<u8>, GcError> {
        let ptr = self.heap.calloc(nmemb, size, finalizer)?;
        self.scheduler.update_allocation_stats(nmemb * size);
        Ok(ptr)
    }

    fn reallocate(
        &self,
        ptr: *mut u8,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Result<NonNull<u8>, GcError> {
        let new_ptr = self.heap.realloc(ptr, size, finalizer)?;
        self.scheduler.update_allocation_stats(size);
        Ok(new_ptr)
    }
}

impl Default for Gc {
    fn default() -> Self {
        Gc::new()
    }
}

impl Drop for Gc {
    fn drop(&mut self) {
        // Join the worker before releasing what it might still be sweeping.
        self.scheduler.shutdown();
        self.heap.free_all();
    }
}
