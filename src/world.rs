use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

/// The stop-the-world handshake between the collector and registered
/// mutator threads.
///
/// A thread that registers promises to pass through [`World::safepoint`]
/// regularly; the allocation entry points do so on entry. Stopping the
/// world raises a flag and spins until every registered thread has parked
/// on the resume condvar; resuming clears the flag and releases them. The
/// collector thread itself is never part of the roster.
///
/// A registered thread that never reaches a safepoint wedges the collector
/// in `stop_world`. That is a host programming error, not a recoverable
/// condition.
pub(crate) struct World {
    should_stop: AtomicBool,
    stopped: AtomicUsize,
    // Roster lock is separate from the registry lock so registration never
    // waits on an in-progress collection.
    threads: Mutex<HashSet<ThreadId>>,
    threads_count: AtomicUsize,
    resume: Condvar,
}

impl World {
    pub fn new() -> Self {
        World {
            should_stop: AtomicBool::new(false),
            stopped: AtomicUsize::new(0),
            threads: Mutex::new(HashSet::new()),
            threads_count: AtomicUsize::new(0),
            resume: Condvar::new(),
        }
    }

    pub fn register_thread(&self) {
        let mut threads = self.threads.lock().unwrap();
        threads.insert(thread::current().id());
        self.threads_count.store(threads.len(), Ordering::SeqCst);
    }

    pub fn deregister_thread(&self) {
        let mut threads = self.threads.lock().unwrap();
        threads.remove(&thread::current().id());
        self.threads_count.store(threads.len(), Ordering::SeqCst);
    }

    pub fn registered_threads(&self) -> usize {
        self.threads_count.load(Ordering::SeqCst)
    }

    /// Cooperative checkpoint. The fast path is a single atomic load; when
    /// a stop is pending the caller parks on the resume condvar over the
    /// registry mutex until the collector finishes.
    pub fn safepoint<T>(&self, registry: &Mutex<T>) {
        if !self.should_stop.load(Ordering::SeqCst) {
            return;
        }

        let mut guard = registry.lock().unwrap();
        self.stopped.fetch_add(1, Ordering::SeqCst);
        while self.should_stop.load(Ordering::SeqCst) {
            guard = self.resume.wait(guard).unwrap();
        }
        self.stopped.fetch_sub(1, Ordering::SeqCst);
    }

    /// Request a stop and wait until every registered thread has parked.
    pub fn stop_world(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        while self.stopped.load(Ordering::SeqCst) < self.threads_count.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }

    pub fn resume_world(&self) {
        self.should_stop.store(false, Ordering::SeqCst);
        self.resume.notify_all();
    }
}
