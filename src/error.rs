use thiserror::Error;

/// Errors surfaced by the allocation entry points.
///
/// Everything else is handled locally: freeing an unknown pointer is a
/// silent no-op, and a registered thread that never reaches a safepoint is
/// a host programming error, not a recoverable condition.
#[derive(Debug, Error)]
pub enum GcError {
    /// The system allocator refused the request, or the requested size
    /// cannot be expressed as a valid block layout.
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },
}
