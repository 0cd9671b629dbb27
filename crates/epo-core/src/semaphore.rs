//! Counting semaphore bounding concurrent downloads and parse workers.
//!
//! `Mutex` + `Condvar` from std, with an RAII permit so every exit path
//! (success, error, panic unwind) releases what it acquired.

use std::sync::{Condvar, Mutex};

/// A counting semaphore limiting concurrent access to a shared resource.
pub struct Semaphore {
    capacity: usize,
    available: Mutex<usize>,
    cond: Condvar,
}

/// Permit held while the guarded work runs; released on drop.
pub struct Permit<'a>(&'a Semaphore);

impl Semaphore {
    /// Create a semaphore with `capacity` permits.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock().unwrap();
        while *available == 0 {
            available = self.cond.wait(available).unwrap();
        }
        *available -= 1;
        Permit(self)
    }

    /// Number of permits currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - *self.available.lock().unwrap()
    }

    /// Total number of permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut available = self.0.available.lock().unwrap();
        *available += 1;
        self.0.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn acquire_and_release() {
        let sem = Semaphore::new(2);
        let p1 = sem.acquire();
        let _p2 = sem.acquire();
        assert_eq!(sem.in_use(), 2);
        drop(p1);
        assert_eq!(sem.in_use(), 1);
    }

    #[test]
    fn blocking_acquire() {
        let sem = Arc::new(Semaphore::new(1));
        let permit = sem.acquire();

        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            let _p = sem2.acquire();
            42
        });

        // Give the thread time to block on the permit
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(permit);

        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn bound_is_never_exceeded() {
        let sem = Arc::new(Semaphore::new(3));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sem = sem.clone();
                let peak = peak.clone();
                std::thread::spawn(move || {
                    let _p = sem.acquire();
                    peak.fetch_max(sem.in_use(), Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.in_use(), 0);
    }
}
