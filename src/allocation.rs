/// Host callback invoked with the base address and size of a block
/// immediately before it is released.
///
/// Finalizers run while the registry lock is held and, during a sweep,
/// while the world is stopped. They must not allocate, free, or otherwise
/// re-enter the collector.
pub type Finalizer = Box<dyn Fn(*mut u8, usize) + Send>;

/// Bookkeeping for one live block handed out by the collector.
pub(crate) struct Allocation {
    pub base: usize,
    pub size: usize,
    pub finalizer: Option<Finalizer>,
    // Generation stamp. A collection marks reachable allocations with the
    // current timer value; anything older is swept.
    pub last_valid_time: u64,
}

impl Allocation {
    pub fn new(base: usize, size: usize, finalizer: Option<Finalizer>, timer: u64) -> Self {
        Allocation {
            base,
            size,
            finalizer,
            last_valid_time: timer,
        }
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Run the host finalizer, if any.
    pub fn finalize(&self) {
        if let Some(finalizer) = &self.finalizer {
            finalizer(self.base as *mut u8, self.size);
        }
    }
}

/// All live allocations, ordered by base address.
///
/// Inserts append to an unsorted tail so the allocation hot path never
/// sorts; `sort_refresh` sorts the tail and merges it with the already
/// sorted head before a scan. Lookups during a scan go through a cached
/// cursor: consecutive probes tend to land near each other, so biasing the
/// search window by the last hit beats bisecting the whole registry every
/// word.
pub(crate) struct Registry {
    allocs: Vec<Allocation>,
    // Length of the sorted prefix; everything past it is in insertion order.
    sorted_len: usize,
    // Index of the most recent find. Only meaningful while fully sorted.
    cursor: Option<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            allocs: Vec::new(),
            sorted_len: 0,
            cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.allocs.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.allocs.iter().map(|a| a.size).sum()
    }

    pub fn insert(&mut self, alloc: Allocation) {
        self.allocs.push(alloc);
    }

    pub fn get(&self, idx: usize) -> &Allocation {
        &self.allocs[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Allocation {
        &mut self.allocs[idx]
    }

    /// Remove and return the record whose base is exactly `base`.
    pub fn remove(&mut self, base: usize) -> Option<Allocation> {
        let idx = match self.allocs[..self.sorted_len].binary_search_by_key(&base, |a| a.base) {
            Ok(idx) => idx,
            Err(_) => {
                self.sorted_len
                    + self.allocs[self.sorted_len..]
                        .iter()
                        .position(|a| a.base == base)?
            }
        };

        if idx < self.sorted_len {
            self.sorted_len -= 1;
        }
        self.cursor = None;
        Some(self.allocs.remove(idx))
    }

    /// Sort the tail appended since the last refresh and merge it with the
    /// sorted head. Invalidates the find cursor.
    pub fn sort_refresh(&mut self) {
        if self.sorted_len < self.allocs.len() {
            let mut tail = self.allocs.split_off(self.sorted_len);
            tail.sort_unstable_by_key(|a| a.base);

            let head = std::mem::take(&mut self.allocs);
            self.allocs = merge_by_base(head, tail);
        }
        self.sorted_len = self.allocs.len();
        self.cursor = None;
    }

    /// Locate the allocation whose `[base, base + size)` range contains
    /// `addr`: upper bound on the base, then step back one. The search
    /// window is biased by the cached cursor. Callers must have refreshed
    /// the registry first.
    pub fn find_containing(&mut self, addr: usize) -> Option<usize> {
        debug_assert_eq!(self.sorted_len, self.allocs.len());

        let (lo, hi) = match self.cursor {
            Some(at) if self.allocs[at].base <= addr => (at, self.allocs.len()),
            Some(at) => (0, at),
            None => (0, self.allocs.len()),
        };

        let upper = lo + self.allocs[lo..hi].partition_point(|a| a.base <= addr);
        if upper == 0 {
            return None;
        }

        let idx = upper - 1;
        self.cursor = Some(idx);
        self.allocs[idx].contains(addr).then_some(idx)
    }

    /// Take every record out, leaving the registry empty.
    pub fn take_all(&mut self) -> Vec<Allocation> {
        self.sorted_len = 0;
        self.cursor = None;
        std::mem::take(&mut self.allocs)
    }

    /// Install an already base-ordered set of records, e.g. the survivors
    /// of a sweep. The whole sequence becomes the new sorted prefix.
    pub fn replace_sorted(&mut self, allocs: Vec<Allocation>) {
        self.sorted_len = allocs.len();
        self.cursor = None;
        self.allocs = allocs;
    }
}

fn merge_by_base(head: Vec<Allocation>, tail: Vec<Allocation>) -> Vec<Allocation> {
    let mut merged = Vec::with_capacity(head.len() + tail.len());
    let mut head = head.into_iter().peekable();
    let mut tail = tail.into_iter().peekable();

    while let (Some(h), Some(t)) = (head.peek(), tail.peek()) {
        if h.base <= t.base {
            merged.push(head.next().unwrap());
        } else {
            merged.push(tail.next().unwrap());
        }
    }
    merged.extend(head);
    merged.extend(tail);
    merged
}
