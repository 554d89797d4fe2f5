//! The reader/writer spin-lock guarding directory and bucket mutation.
//!
//! A single `AtomicU64` packing a reader count into the low 62 bits and a
//! latch/lock flag pair into the top two, with `Reader`/`Writer` RAII
//! guards that release on drop, plus `Stats`-style counters. Two
//! extensions beyond a plain spinlock:
//!
//! * a bounded spin count (`spin_before_park`, from
//!   [`crate::options::IndexOptions`]) before a conflicted acquirer yields
//!   to the scheduler, rather than spinning unconditionally forever;
//! * recursive write-lock re-entry for the thread that already holds the
//!   write latch, tracked through a thread-local holds table keyed by
//!   lock identity, so the operation engine can call back into a
//!   write-locked path (e.g. the merge procedure re-resolving the
//!   directory mid-operation) without deadlocking itself.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt, result,
    sync::atomic::{
        AtomicU64,
        Ordering::{Acquire, SeqCst},
    },
    thread,
};

thread_local! {
    /// Per-thread write re-entrancy counts, keyed by lock identity
    /// (the lock's own address — stable for its lifetime since callers
    /// only ever hold a `&RwSpinLock` borrowed from a longer-lived owner).
    static WRITE_HOLDS: RefCell<HashMap<usize, u32>> = RefCell::new(HashMap::new());
}

/// Reader/writer spin-lock with bounded spin and recursive write
/// re-entry.
pub struct RwSpinLock {
    value: AtomicU64,
    read_locks: AtomicU64,
    write_locks: AtomicU64,
    conflicts: AtomicU64,
}

impl RwSpinLock {
    const LATCH_FLAG: u64 = 0x4000_0000_0000_0000;
    const LOCK_FLAG: u64 = 0x8000_0000_0000_0000;
    const LATCH_LOCK_FLAG: u64 = 0xC000_0000_0000_0000;
    const READERS_FLAG: u64 = 0x3FFF_FFFF_FFFF_FFFF;

    pub fn new() -> RwSpinLock {
        RwSpinLock {
            value: AtomicU64::new(0),
            read_locks: AtomicU64::new(0),
            write_locks: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    fn identity(&self) -> usize {
        self as *const RwSpinLock as usize
    }

    fn backoff(&self, spins: &mut u32, spin_before_park: u32) {
        self.conflicts.fetch_add(1, SeqCst);
        *spins += 1;
        if *spins >= spin_before_park.max(1) {
            thread::yield_now();
            *spins = 0;
        }
    }

    /// Acquire read permission, spinning up to `spin_before_park` times
    /// between yields.
    pub fn acquire_read(&self, spin_before_park: u32) -> Reader<'_> {
        let mut spins = 0;
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::LATCH_LOCK_FLAG) == 0 {
                let n = c + 1;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    self.read_locks.fetch_add(1, SeqCst);
                    return Reader { door: self };
                }
            }
            self.backoff(&mut spins, spin_before_park);
        }
    }

    /// Acquire write permission. If this thread already holds the write
    /// latch (directly or through a re-entrant call), the hold count is
    /// bumped and no new latch acquisition is attempted — released once
    /// the matching number of `Writer` guards have dropped.
    pub fn acquire_write(&self, spin_before_park: u32) -> Writer<'_> {
        let identity = self.identity();
        let reentrant = WRITE_HOLDS.with(|holds| {
            let mut holds = holds.borrow_mut();
            match holds.get_mut(&identity) {
                Some(count) => {
                    *count += 1;
                    true
                }
                None => false,
            }
        });
        if reentrant {
            return Writer { door: self, reentrant: true };
        }

        let mut spins = 0;
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::LATCH_FLAG) == 0 {
                let n = c | Self::LATCH_FLAG;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    break;
                }
            }
            self.backoff(&mut spins, spin_before_park);
        }
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::READERS_FLAG) == 0 {
                let n = c | Self::LOCK_FLAG;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    self.write_locks.fetch_add(1, SeqCst);
                    break;
                }
            }
            self.backoff(&mut spins, spin_before_park);
        }

        WRITE_HOLDS.with(|holds| holds.borrow_mut().insert(identity, 1));
        Writer { door: self, reentrant: false }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            value: self.value.load(SeqCst),
            read_locks: self.read_locks.load(SeqCst),
            write_locks: self.write_locks.load(SeqCst),
            conflicts: self.conflicts.load(SeqCst),
        }
    }
}

impl Default for RwSpinLock {
    fn default() -> Self {
        RwSpinLock::new()
    }
}

/// RAII read-latch guard; releases on drop.
pub struct Reader<'a> {
    door: &'a RwSpinLock,
}

impl<'a> Drop for Reader<'a> {
    fn drop(&mut self) {
        self.door.value.fetch_sub(1, SeqCst);
    }
}

/// RAII write-latch guard; releases on drop, decrementing the thread's
/// re-entrancy count and only unlatching once it reaches zero.
pub struct Writer<'a> {
    door: &'a RwSpinLock,
    reentrant: bool,
}

impl<'a> Drop for Writer<'a> {
    fn drop(&mut self) {
        let identity = self.door.identity();
        let last = WRITE_HOLDS.with(|holds| {
            let mut holds = holds.borrow_mut();
            let count = holds.get_mut(&identity).expect("writer dropped without a recorded hold");
            *count -= 1;
            let last = *count == 0;
            if last {
                holds.remove(&identity);
            }
            last
        });
        if self.reentrant || !last {
            return;
        }
        let c = self.door.value.load(SeqCst);
        if (c & RwSpinLock::READERS_FLAG) > 0 {
            panic!("write lock released with active readers present");
        }
        if self.door.value.compare_exchange(c, 0, SeqCst, Acquire) != Ok(c) {
            panic!("write lock state mutated while holding the latch");
        }
    }
}

/// Point-in-time counters for a [`RwSpinLock`], exposed for
/// [`crate::metrics`] and diagnostics.
#[derive(Default, Clone, Copy)]
pub struct Stats {
    pub value: u64,
    pub read_locks: u64,
    pub write_locks: u64,
    pub conflicts: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "{{ value = {:x}, read_locks = {}, write_locks = {}, conflicts = {} }}",
            self.value, self.read_locks, self.write_locks, self.conflicts,
        )
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;
