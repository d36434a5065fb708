//! The process-wide engine.
//!
//! Hosts that want one collector for the whole program, in the style of a
//! drop-in allocator, use these free functions instead of carrying a
//! [`Gc`] handle around. The engine is created thread-safely on first use
//! and lives for the rest of the process: it is never dropped, so the
//! join-the-worker-then-release teardown that [`Gc`]'s `Drop` performs
//! does not run for it. Memory still tracked at process exit is reclaimed
//! by the operating system.
//!
//! All functions mirror the methods on [`Gc`], including their safety
//! contracts.

use std::ptr::NonNull;
use std::sync::OnceLock;
use std::time::Duration;

use crate::allocation::Finalizer;
use crate::error::GcError;
use crate::gc::Gc;
use crate::metrics::GcMetrics;
use crate::root::RootRegion;

static ENGINE: OnceLock<Gc> = OnceLock::new();

fn engine() -> &'static Gc {
    ENGINE.get_or_init(Gc::new)
}

/// Replace the root set. See [`Gc::init`].
///
/// # Safety
/// Every region must stay readable while registered.
pub unsafe fn init(roots: &[RootRegion]) {
    engine().init(roots)
}

/// Register a root region. See [`Gc::add_root`].
///
/// # Safety
/// The region must stay readable while registered.
pub unsafe fn add_root(root: RootRegion) {
    engine().add_root(root)
}

/// Remove a root region, matching by address only.
pub fn delete_root(root: RootRegion) {
    engine().delete_root(root)
}

/// Allocate `size` bytes with no finalizer.
pub fn alloc(size: usize) -> Result<NonNull<u8>, GcError> {
    engine().alloc(size)
}

/// Allocate `size` bytes with a finalizer.
pub fn alloc_with(size: usize, finalizer: Finalizer) -> Result<NonNull<u8>, GcError> {
    engine().alloc_with(size, finalizer)
}

/// Allocate a zeroed block of `nmemb * size` bytes.
pub fn calloc(nmemb: usize, size: usize) -> Result<NonNull<u8>, GcError> {
    engine().calloc(nmemb, size)
}

/// Zeroed allocation with a finalizer.
pub fn calloc_with(nmemb: usize, size: usize, finalizer: Finalizer) -> Result<NonNull<u8>, GcError> {
    engine().calloc_with(nmemb, size, finalizer)
}

/// Resize a block. See [`Gc::realloc`].
///
/// # Safety
/// As for [`Gc::realloc`].
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> Result<NonNull<u8>, GcError> {
    engine().realloc(ptr, size)
}

/// Resize a block, attaching a finalizer. See [`Gc::realloc_with`].
///
/// # Safety
/// As for [`Gc::realloc`].
pub unsafe fn realloc_with(
    ptr: *mut u8,
    size: usize,
    finalizer: Finalizer,
) -> Result<NonNull<u8>, GcError> {
    engine().realloc_with(ptr, size, finalizer)
}

/// Finalize and release the block based at `ptr`; unknown pointers are a
/// silent no-op.
///
/// # Safety
/// As for [`Gc::free`].
pub unsafe fn free(ptr: *mut u8) {
    engine().free(ptr)
}

/// Finalize and release every tracked allocation.
///
/// # Safety
/// As for [`Gc::free_all`].
pub unsafe fn free_all() {
    engine().free_all()
}

/// Request a collection without blocking.
pub fn collect() {
    engine().collect()
}

/// Block until the next collection completes.
pub fn wait_collect() {
    engine().wait_collect()
}

/// Request a collection and block until it completes.
pub fn collect_blocked() {
    engine().collect_blocked()
}

/// Start the background scheduler. Idempotent.
pub fn enable_auto() {
    engine().enable_auto()
}

/// Pause automatic collections; explicit collection requests still work.
pub fn disable_auto() {
    engine().disable_auto()
}

/// Register the calling thread as a mutator. See [`Gc::register_thread`].
pub fn register_thread() {
    engine().register_thread()
}

pub fn deregister_thread() {
    engine().deregister_thread()
}

/// Cooperative checkpoint. See [`Gc::safepoint`].
pub fn safepoint() {
    engine().safepoint()
}

pub fn bytes_threshold() -> usize {
    engine().bytes_threshold()
}

pub fn set_bytes_threshold(bytes: usize) {
    engine().set_bytes_threshold(bytes)
}

pub fn calls_threshold() -> usize {
    engine().calls_threshold()
}

pub fn set_calls_threshold(calls: usize) {
    engine().set_calls_threshold(calls)
}

pub fn collect_interval() -> Duration {
    engine().collect_interval()
}

pub fn set_collect_interval(interval: Duration) {
    engine().set_collect_interval(interval)
}

/// Zero the pacer's volume counters and rate estimates.
pub fn reset_stats() {
    engine().reset_stats()
}

/// A snapshot of the collector's current counters.
pub fn metrics() -> GcMetrics {
    engine().metrics()
}
