use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::GcConfig;
use crate::debug::gc_debug;
use crate::heap::Collect;
use crate::pacer::Pacer;

/// Drives automatic collections from a background worker thread.
///
/// The worker sleeps on a wake channel with the collection interval as its
/// timeout. A wake arrives when the pacer reports pressure, on an explicit
/// trigger, when a tuning parameter changes, and on stop or shutdown; the
/// flags decide what the wake means, the channel only delivers it. A wake
/// that finds no trigger standing causes no collection.
///
/// Stopping pauses automatic collections but keeps the worker parked and
/// serving explicit triggers; only shutdown terminates and joins it.
pub(crate) struct Scheduler<T: Collect + Send + Sync + 'static> {
    collector: Arc<T>,
    pacer: Pacer,

    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,

    running: AtomicBool,
    stop_flag: AtomicBool,
    shutdown_flag: AtomicBool,
    trigger_flag: AtomicBool,
    collect_interval_ms: AtomicU64,

    collect_sync: Mutex<CollectSync>,
    collect_cv: Condvar,

    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

// Collection bookkeeping for wait_collect. `started`/`completed` number
// the cycles; an explicit trigger records the next cycle to start as
// `target`, so a cycle already in flight when the trigger lands cannot
// satisfy a wait that followed it. `done` is the one-shot completion flag
// a waiter consumes.
struct CollectSync {
    started: u64,
    completed: u64,
    target: u64,
    done: bool,
}

impl<T: Collect + Send + Sync + 'static> Scheduler<T> {
    pub fn new(collector: Arc<T>, config: &GcConfig) -> Self {
        // A full channel means a wake is already pending, which is all a
        // second sender would be saying anyway.
        let (wake_tx, wake_rx) = bounded(1);

        Scheduler {
            collector,
            pacer: Pacer::new(config),
            wake_tx,
            wake_rx,
            running: AtomicBool::new(false),
            stop_flag: AtomicBool::new(false),
            shutdown_flag: AtomicBool::new(false),
            trigger_flag: AtomicBool::new(false),
            collect_interval_ms: AtomicU64::new(config.collect_interval.as_millis() as u64),
            collect_sync: Mutex::new(CollectSync {
                started: 0,
                completed: 0,
                target: 0,
                done: false,
            }),
            collect_cv: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// Clear the stop flag and spawn the worker if it is not already
    /// running. Idempotent.
    pub fn start(self: Arc<Self>) {
        self.stop_flag.store(false, Ordering::SeqCst);
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let scheduler = Arc::clone(&self);
        let handle = thread::spawn(move || scheduler.worker_loop());
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Pause automatic collections without losing the worker.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wake();
    }

    /// Terminate and join the worker. Called from engine teardown.
    pub fn shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.wake();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Request a collection without blocking. Records the next cycle to
    /// start as the wait target: a wait_collect issued after this call
    /// returns only once a collection that started after it completes,
    /// never on the completion of a cycle that was already in flight.
    pub fn trigger_collect(&self) {
        {
            let mut sync = self.collect_sync.lock().unwrap();
            sync.target = sync.started + 1;
        }
        self.trigger_flag.store(true, Ordering::SeqCst);
        self.wake();
    }

    /// Block until the next collection completes and the completed cycle
    /// has reached the trigger target, consuming the one-shot.
    pub fn wait_collect(&self) {
        let mut sync = self.collect_sync.lock().unwrap();
        while !sync.done || sync.completed < sync.target {
            sync = self.collect_cv.wait(sync).unwrap();
        }
        sync.done = false;
    }

    pub fn update_allocation_stats(&self, size: usize) {
        self.pacer.update(size, 1);
        if self.pacer.should_trigger() {
            self.wake();
        }
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms.load(Ordering::SeqCst))
    }

    /// Takes effect at the worker's next wait.
    pub fn set_collect_interval(&self, interval: Duration) {
        self.collect_interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
        self.wake();
    }

    pub fn bytes_threshold(&self) -> usize {
        self.pacer.bytes_threshold()
    }

    pub fn set_bytes_threshold(&self, bytes: usize) {
        self.pacer.set_bytes_threshold(bytes);
    }

    pub fn calls_threshold(&self) -> usize {
        self.pacer.calls_threshold()
    }

    pub fn set_calls_threshold(&self, calls: usize) {
        self.pacer.set_calls_threshold(calls);
    }

    pub fn reset_stats(&self) {
        self.pacer.reset();
    }

    /// Pacer volume since the last reset, as `(bytes, calls)`.
    pub fn allocation_totals(&self) -> (usize, usize) {
        self.pacer.totals()
    }

    fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn worker_loop(&self) {
        gc_debug("scheduler worker started");
        loop {
            // Let waiters re-check the one-shot between cycles.
            self.collect_cv.notify_all();

            let timed_out = match self.wake_rx.recv_timeout(self.collect_interval()) {
                Ok(()) => false,
                Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if self.shutdown_flag.load(Ordering::SeqCst) {
                break;
            }

            let stopped = self.stop_flag.load(Ordering::SeqCst);
            // Consume the trigger before collecting, so the cycle that
            // honors it is one that started after the request.
            let triggered = self.trigger_flag.swap(false, Ordering::SeqCst);

            // Timer and pacer pressure respect the stop flag; an explicit
            // trigger overrides it.
            if (!stopped && (self.pacer.should_trigger() || timed_out)) || triggered {
                let cycle = {
                    let mut sync = self.collect_sync.lock().unwrap();
                    sync.started += 1;
                    sync.started
                };

                self.collector.collect();

                {
                    let mut sync = self.collect_sync.lock().unwrap();
                    sync.completed = cycle;
                    sync.done = true;
                }
                self.collect_cv.notify_all();

                self.pacer.reset();
            }
        }
        self.running.store(false, Ordering::SeqCst);
        gc_debug("scheduler worker stopped");
    }
}
