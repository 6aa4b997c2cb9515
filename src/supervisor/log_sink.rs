// Ring-buffered console capture with live fan-out.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const LIVE_CAPACITY: usize = 1024;

struct Ring {
    lines: VecDeque<String>,
    evicted: u64,
}

/// Console output of one server. Survives process restarts; lines of the next run are appended.
pub struct LogSink {
    ring: Mutex<Ring>,
    capacity: usize,
    tx: broadcast::Sender<String>,
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            ring: Mutex::new(Ring {
                lines: VecDeque::with_capacity(capacity.min(4096)),
                evicted: 0,
            }),
            capacity: capacity.max(1),
            tx,
        }
    }

    fn ring(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let mut ring = self.ring();
        while ring.lines.len() >= self.capacity {
            ring.lines.pop_front();
            ring.evicted += 1;
        }
        ring.lines.push_back(line.clone());
        // Sent under the ring lock so snapshot + subscribe never misses or repeats a line.
        let _ = self.tx.send(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.ring().lines.iter().cloned().collect()
    }

    /// Buffered lines plus a receiver for every line pushed afterwards.
    pub fn subscribe_with_snapshot(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let ring = self.ring();
        let rx = self.tx.subscribe();
        (ring.lines.iter().cloned().collect(), rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Lines dropped from the front of the buffer since creation.
    pub fn evicted(&self) -> u64 {
        self.ring().evicted
    }

    pub fn len(&self) -> usize {
        self.ring().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first_and_counts() {
        let sink = LogSink::new(3);
        for i in 0..5 {
            sink.push(format!("line {}", i));
        }
        assert_eq!(sink.snapshot(), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(sink.evicted(), 2);
    }

    #[tokio::test]
    async fn subscriber_sees_lines_after_snapshot() {
        let sink = LogSink::new(10);
        sink.push("before");
        let (snapshot, mut rx) = sink.subscribe_with_snapshot();
        sink.push("after");
        assert_eq!(snapshot, vec!["before"]);
        assert_eq!(rx.recv().await.unwrap(), "after");
    }
}
