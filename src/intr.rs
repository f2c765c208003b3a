//! Interrupt vector registration and the "interrupts off" critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type Handler = Arc<dyn Fn(u8) + Send + Sync>;

pub struct Interrupts {
    handlers: Mutex<HashMap<u8, Handler>>,
    masked: Mutex<()>,
}

/// Interrupts stay "disabled" for as long as this guard lives.
pub struct IntrGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            masked: Mutex::new(()),
        }
    }

    pub fn register_handler(&self, vector: u8, handler: Handler) {
        log::debug!("register interrupt handler for vector {:#x}", vector);
        self.handlers.lock().unwrap().insert(vector, handler);
    }

    /// Deliver `vector`. A vector nobody registered for is dropped.
    pub fn raise(&self, vector: u8) {
        let handler = self.handlers.lock().unwrap().get(&vector).cloned();
        match handler {
            Some(handler) => handler(vector),
            None => log::debug!("spurious interrupt {:#x}", vector),
        }
    }

    /// Enter a critical section: check-then-act sequences on shared kernel
    /// state run under this guard.
    pub fn disable(&self) -> IntrGuard<'_> {
        IntrGuard {
            _guard: self.masked.lock().unwrap(),
        }
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn raise_reaches_registered_handler_only() {
        let intr = Interrupts::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        intr.register_handler(
            0x2e,
            Arc::new(move |vec| {
                assert_eq!(vec, 0x2e);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        intr.raise(0x2e);
        intr.raise(0x2f);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
