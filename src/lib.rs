//! A conservative, stop-the-world, mark and sweep garbage collector,
//! exposed as an allocator for untyped memory blocks.
//!
//! ## Creating An Engine
//!
//! All collection happens through an engine. An engine hands out raw
//! blocks, remembers every block it handed out, and owns a background
//! worker that decides when to collect.
//!
//! ```rust
//! use scree::{Gc, GcConfig};
//!
//! // An engine with automatic collection paused; nothing is swept until
//! // we explicitly ask.
//! let gc = Gc::with_config(GcConfig {
//!     auto_collect: false,
//!     ..GcConfig::default()
//! });
//!
//! let block = gc.alloc(128).unwrap();
//! unsafe { gc.free(block.as_ptr()) };
//! ```
//!
//! There is no `Trace` trait and no smart pointer type here: the collector
//! never learns the layout of what it allocates. Instead it scans memory
//! as machine words and treats every word that lands inside a block it
//! handed out as a live reference to that block. That is what
//! "conservative" means: an integer that happens to look like an address
//! will keep a block alive, but no genuinely referenced block is ever
//! freed.
//!
//! ## Roots
//!
//! The scanner starts from *root regions*: spans of host memory, declared
//! with [`Gc::add_root`] or [`Gc::init`], that hold the program's
//! long-lived references. Anything a root word points into survives a
//! collection, as does anything directly reachable from such a block's
//! contents; everything else is finalized and released.
//!
//! ```rust
//! use scree::{Gc, GcConfig, RootRegion};
//!
//! # let gc = Gc::with_config(GcConfig { auto_collect: false, ..GcConfig::default() });
//! // A heap slot that will hold a block address.
//! let mut slot: Box<usize> = Box::new(0);
//! unsafe { gc.add_root(RootRegion::of(&*slot)) };
//!
//! *slot = gc.alloc(64).unwrap().as_ptr() as usize;
//! gc.collect_blocked();
//! assert_eq!(gc.metrics().live_allocations, 1); // rooted, survived
//!
//! *slot = 0;
//! gc.collect_blocked();
//! assert_eq!(gc.metrics().live_allocations, 0); // unreachable, swept
//! ```
//!
//! Cycles need no special handling: two blocks pointing at each other are
//! swept together the moment no root reaches either of them.
//!
//! ## Automatic Collection
//!
//! With `auto_collect` on (the default), a background worker collects when
//! the volume of allocation since the last collection crosses a byte or
//! call threshold, when the allocation rate spikes past its smoothed
//! average, or when the collection interval elapses with no other trigger.
//! All three knobs can be tuned on a live engine; see
//! [`Gc::set_bytes_threshold`], [`Gc::set_calls_threshold`] and
//! [`Gc::set_collect_interval`].
//!
//! ## Threads And Safepoints
//!
//! A collection stops the world: every thread that registered itself with
//! [`Gc::register_thread`] is parked at its next [`Gc::safepoint`] before
//! the scan starts, and released when the sweep ends. The allocation entry
//! points all pass through a safepoint, so a thread that allocates
//! regularly needs nothing more than registration.
//!
//! ***WARNING:*** a registered thread that stops allocating and never
//! calls `safepoint` blocks every future collection. Long compute loops
//! must call [`Gc::safepoint`] themselves, and threads that are done with
//! the collector must deregister.
//!
//! ## One Engine Per Process
//!
//! Hosts that want a single collector for the whole program can use the
//! free functions in [`global`], which lazily create one engine on first
//! use and share it process-wide.

mod allocation;
mod config;
mod debug;
mod error;
mod gc;
mod heap;
mod metrics;
mod pacer;
mod root;
mod scheduler;
mod world;

pub mod global;

pub use allocation::Finalizer;
pub use config::GcConfig;
pub use error::GcError;
pub use gc::Gc;
pub use metrics::GcMetrics;
pub use root::RootRegion;
