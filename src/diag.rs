//! # Diagnostic Sink
//!
//! A bounded, fire-and-forget queue of short status and fault lines.
//! Producers (self-test tasks) never block and never learn whether their
//! message was delivered; a consumer (the supervisor task) drains the queue
//! and forwards the lines to the log.
//!
//! When the queue is full the newest message is dropped and counted, so a
//! flood of identical faults cannot push out the first report.

use core::cell::RefCell;

use heapless::Deque;

use crate::config::DIAGNOSTIC_QUEUE_DEPTH;
use crate::sync::{self, Mutex};

/// Bounded message queue shared by every producer.
pub struct DiagnosticSink {
    queue: Mutex<RefCell<Deque<&'static str, DIAGNOSTIC_QUEUE_DEPTH>>>,
    dropped: Mutex<RefCell<u32>>,
}

impl DiagnosticSink {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(RefCell::new(0)),
        }
    }

    /// Queue `msg` without blocking. Drops it if the queue is full.
    pub fn post(&self, msg: &'static str) {
        sync::critical_section(|cs| {
            if self.queue.borrow_ref_mut(cs).push_back(msg).is_err() {
                let mut dropped = self.dropped.borrow_ref_mut(cs);
                *dropped = dropped.wrapping_add(1);
            }
        });
    }

    /// Take the oldest queued message.
    pub fn pop(&self) -> Option<&'static str> {
        sync::critical_section(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        sync::critical_section(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages dropped because the queue was full, since start.
    pub fn dropped(&self) -> u32 {
        sync::critical_section(|cs| *self.dropped.borrow_ref(cs))
    }
}

/// System-wide sink used by the firmware's self-test tasks.
pub static DIAGNOSTICS: DiagnosticSink = DiagnosticSink::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let sink = DiagnosticSink::new();
        sink.post("first");
        sink.post("second");
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.pop(), Some("first"));
        assert_eq!(sink.pop(), Some("second"));
        assert_eq!(sink.pop(), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let sink = DiagnosticSink::new();
        for _ in 0..DIAGNOSTIC_QUEUE_DEPTH {
            sink.post("kept");
        }
        sink.post("lost");
        sink.post("lost");

        assert_eq!(sink.len(), DIAGNOSTIC_QUEUE_DEPTH);
        assert_eq!(sink.dropped(), 2);
        while let Some(msg) = sink.pop() {
            assert_eq!(msg, "kept");
        }

        // Space frees up once the consumer drains
        sink.post("late");
        assert_eq!(sink.pop(), Some("late"));
    }
}
