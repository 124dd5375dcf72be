//! Bounded event queue from capture callbacks to the JSON consumer.
//!
//! Producers run on provider threads and must never block, so `try_send`
//! pushes into a fixed-capacity deque under a critical section and drops the
//! event when full. The single consumer awaits `recv`, parked on an
//! `AtomicWaker` that producers wake without taking a lock.

use core::cell::RefCell;
use std::future::poll_fn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Poll;

use futures_util::task::AtomicWaker;
use heapless::Deque;
use thiserror::Error;

use rid_core::tracker::{DetectionRecord, MAX_TRACKS};

/// Queue capacity. One slot per trackable aircraft.
pub const PIPELINE_CAPACITY: usize = MAX_TRACKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event queue full")]
pub struct QueueFull;

pub struct EventPipeline {
    queue: critical_section::Mutex<RefCell<Deque<DetectionRecord, PIPELINE_CAPACITY>>>,
    waker: AtomicWaker,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl EventPipeline {
    pub fn new() -> Self {
        EventPipeline {
            queue: critical_section::Mutex::new(RefCell::new(Deque::new())),
            waker: AtomicWaker::new(),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking. A full queue drops the event.
    pub fn try_send(&self, record: DetectionRecord) -> Result<(), QueueFull> {
        let pushed = critical_section::with(|cs| {
            self.queue.borrow_ref_mut(cs).push_back(record).is_ok()
        });
        if !pushed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(QueueFull);
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.waker.wake();
        Ok(())
    }

    pub fn try_recv(&self) -> Option<DetectionRecord> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    /// Wait for the next event. Single consumer only.
    pub async fn recv(&self) -> DetectionRecord {
        poll_fn(|cx| {
            if let Some(record) = self.try_recv() {
                return Poll::Ready(record);
            }
            self.waker.register(cx.waker());
            // A send between the first check and register would otherwise be missed
            match self.try_recv() {
                Some(record) => Poll::Ready(record),
                None => Poll::Pending,
            }
        })
        .await
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventPipeline {
    fn default() -> Self {
        EventPipeline::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(n: u8) -> DetectionRecord {
        DetectionRecord {
            mac: [0x02, 0, 0, 0, 0, n],
            ..DetectionRecord::EMPTY
        }
    }

    #[test]
    fn test_overflow_drops_one_and_keeps_order() {
        let pipeline = EventPipeline::new();
        let mut results = Vec::new();
        for n in 1..=(PIPELINE_CAPACITY as u8 + 1) {
            results.push(pipeline.try_send(record(n)));
        }
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(results.last(), Some(&Err(QueueFull)));
        assert_eq!(pipeline.dropped(), 1);
        assert_eq!(pipeline.sent(), PIPELINE_CAPACITY as u64);

        let order: Vec<u8> = std::iter::from_fn(|| pipeline.try_recv())
            .map(|r| r.mac[5])
            .collect();
        assert_eq!(order, (1..=PIPELINE_CAPACITY as u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_space_frees_after_recv() {
        let pipeline = EventPipeline::new();
        for n in 0..PIPELINE_CAPACITY as u8 {
            pipeline.try_send(record(n)).unwrap();
        }
        assert!(pipeline.try_send(record(99)).is_err());
        pipeline.try_recv().unwrap();
        assert!(pipeline.try_send(record(99)).is_ok());
        assert_eq!(pipeline.len(), PIPELINE_CAPACITY);
    }

    #[tokio::test]
    async fn test_recv_waits_for_producer_thread() {
        let pipeline = Arc::new(EventPipeline::new());
        let producer = pipeline.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.try_send(record(7)).unwrap();
        });

        let got = tokio::time::timeout(Duration::from_secs(5), pipeline.recv())
            .await
            .unwrap();
        assert_eq!(got.mac[5], 7);
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn test_recv_wakes_for_each_send() {
        let pipeline = Arc::new(EventPipeline::new());
        let producer = pipeline.clone();
        std::thread::spawn(move || {
            for n in 1..=3 {
                std::thread::sleep(Duration::from_millis(10));
                producer.try_send(record(n)).unwrap();
            }
        });

        for n in 1..=3 {
            let got = tokio::time::timeout(Duration::from_secs(5), pipeline.recv())
                .await
                .unwrap();
            assert_eq!(got.mac[5], n);
        }
    }

    #[tokio::test]
    async fn test_recv_returns_queued_items_in_order() {
        let pipeline = EventPipeline::new();
        pipeline.try_send(record(1)).unwrap();
        pipeline.try_send(record(2)).unwrap();
        assert_eq!(pipeline.recv().await.mac[5], 1);
        assert_eq!(pipeline.recv().await.mac[5], 2);
    }
}
