//! Event-group synchronization
//!
//! A small bit-flag event group: one thread waits for any of a set of bits
//! with a bounded timeout while other threads set or clear bits. The MAC
//! change worker waits here for the STA connected/disconnected bits posted
//! by the radio event dispatcher.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Bit-flag event group with bounded waits
pub struct EventGroup {
    bits: Mutex<u32>,
    cond: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Set bits and wake all waiters
    pub fn set(&self, bits: u32) {
        let mut cur = self.bits.lock().unwrap();
        *cur |= bits;
        self.cond.notify_all();
    }

    /// Clear bits without waking anyone
    pub fn clear(&self, bits: u32) {
        let mut cur = self.bits.lock().unwrap();
        *cur &= !bits;
    }

    /// Current bit snapshot
    pub fn get(&self) -> u32 {
        *self.bits.lock().unwrap()
    }

    /// Wait until any bit in `mask` is set or the timeout expires.
    ///
    /// Returns the bits observed at exit (the caller tests the mask; on
    /// timeout none of the masked bits are set). When `clear_on_exit` is
    /// true the matched bits are cleared before returning.
    pub fn wait(&self, mask: u32, clear_on_exit: bool, timeout: Duration) -> u32 {
        let deadline = Instant::now() + timeout;
        let mut cur = self.bits.lock().unwrap();
        loop {
            if *cur & mask != 0 {
                let observed = *cur;
                if clear_on_exit {
                    *cur &= !mask;
                }
                return observed;
            }
            let now = Instant::now();
            if now >= deadline {
                return *cur;
            }
            let (guard, _timed_out) = self
                .cond
                .wait_timeout(cur, deadline - now)
                .unwrap();
            cur = guard;
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}
