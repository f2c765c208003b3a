//! Blocking primitives the driver needs from the scheduler: a counting
//! semaphore and a recursive lock that remembers its holder.

use std::sync::{Condvar, Mutex as StdMutex};
use std::thread::{self, ThreadId};

pub struct Semaphore {
    value: StdMutex<usize>,
    waiters: Condvar,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        Self {
            value: StdMutex::new(value),
            waiters: Condvar::new(),
        }
    }

    /// P: block until the value is positive, then take one
    pub fn down(&self) {
        let mut value = self.value.lock().unwrap();
        while *value == 0 {
            value = self.waiters.wait(value).unwrap();
        }
        *value -= 1;
    }

    /// V: give one back and wake a waiter
    pub fn up(&self) {
        let mut value = self.value.lock().unwrap();
        *value += 1;
        self.waiters.notify_one();
    }

    pub fn value(&self) -> usize {
        *self.value.lock().unwrap()
    }
}

struct Holder {
    thread: Option<ThreadId>,
    repeat: usize,
}

/// Recursive mutual exclusion lock. The holder may lock again, the lock is
/// released when every acquisition has been dropped.
pub struct Mutex {
    holder: StdMutex<Holder>,
    released: Condvar,
}

pub struct MutexGuard<'a> {
    lock: &'a Mutex,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            holder: StdMutex::new(Holder {
                thread: None,
                repeat: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_> {
        let me = thread::current().id();
        let mut holder = self.holder.lock().unwrap();
        if holder.thread == Some(me) {
            holder.repeat += 1;
        } else {
            while holder.thread.is_some() {
                holder = self.released.wait(holder).unwrap();
            }
            holder.thread = Some(me);
            holder.repeat = 1;
        }
        MutexGuard { lock: self }
    }

    pub fn is_locked(&self) -> bool {
        self.holder.lock().unwrap().thread.is_some()
    }

    fn unlock(&self) {
        let mut holder = self.holder.lock().unwrap();
        if holder.repeat > 1 {
            holder.repeat -= 1;
        } else {
            assert!(holder.repeat == 1);
            holder.thread = None;
            holder.repeat = 0;
            self.released.notify_one();
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn semaphore_wakes_waiter() {
        let sema = Arc::new(Semaphore::new(0));
        let waiter = {
            let sema = sema.clone();
            thread::spawn(move || sema.down())
        };
        sema.up();
        waiter.join().unwrap();
        assert_eq!(sema.value(), 0);
    }

    #[test]
    fn mutex_is_recursive() {
        let lock = Mutex::new();
        let outer = lock.lock();
        {
            let _inner = lock.lock();
            assert!(lock.is_locked());
        }
        assert!(lock.is_locked());
        drop(outer);
        assert!(!lock.is_locked());
    }

    #[test]
    fn mutex_excludes_other_threads() {
        let lock = Arc::new(Mutex::new());
        let counter = Arc::new(StdMutex::new(Vec::new()));
        let guard = lock.lock();
        let other = {
            let lock = lock.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                let _g = lock.lock();
                counter.lock().unwrap().push(2);
            })
        };
        counter.lock().unwrap().push(1);
        drop(guard);
        other.join().unwrap();
        assert_eq!(*counter.lock().unwrap(), vec![1, 2]);
    }
}
