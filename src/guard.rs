//! A `T` guarded by a [`crate::lock::RwSpinLock`] rather than a raw
//! pointer under an external latch — a spinlock guarding a hand-managed
//! pointer works when the caller owns the memory layout directly, but
//! this crate's data is ordinary owned Rust values, so the lock needs a
//! small safe wrapper around them instead. `RwGuarded<T>` is that wrapper:
//! the only unsafe
//! code in the crate, confined to the same pattern `std::sync::RwLock`
//! and `parking_lot::RwLock` use internally (a cell plus a lock whose
//! acquire/release pairing is the single source of truth for exclusive
//! access).

use std::{cell::UnsafeCell, ops::{Deref, DerefMut}};

use crate::lock::{Reader, RwSpinLock, Writer};

pub struct RwGuarded<T> {
    lock: RwSpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `read`/`write`,
// which route through `RwSpinLock`'s own acquire/release discipline;
// that discipline is what `RwSpinLock`'s tests exercise.
unsafe impl<T: Send> Send for RwGuarded<T> {}
unsafe impl<T: Send> Sync for RwGuarded<T> {}

impl<T> RwGuarded<T> {
    pub fn new(value: T) -> RwGuarded<T> {
        RwGuarded {
            lock: RwSpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn read(&self, spin_before_park: u32) -> ReadGuard<'_, T> {
        let reader = self.lock.acquire_read(spin_before_park);
        ReadGuard { reader, data: &self.data }
    }

    pub fn write(&self, spin_before_park: u32) -> WriteGuard<'_, T> {
        let writer = self.lock.acquire_write(spin_before_park);
        WriteGuard { writer, data: &self.data }
    }

    pub fn lock_stats(&self) -> crate::lock::Stats {
        self.lock.stats()
    }
}

pub struct ReadGuard<'a, T> {
    reader: Reader<'a>,
    data: &'a UnsafeCell<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        let _ = &self.reader;
        // SAFETY: holding `reader` guarantees no `Writer` exists.
        unsafe { &*self.data.get() }
    }
}

pub struct WriteGuard<'a, T> {
    writer: Writer<'a>,
    data: &'a UnsafeCell<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        let _ = &self.writer;
        // SAFETY: holding `writer` guarantees exclusive access.
        unsafe { &*self.data.get() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        let _ = &self.writer;
        // SAFETY: holding `writer` guarantees exclusive access.
        unsafe { &mut *self.data.get() }
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;
