//! Priority queues and the pause gate.
//!
//! Every stage hand-off goes through a [`PriorityQueue`]. Items pop
//! highest-priority first (deeper recursion before new top-level work),
//! FIFO among equals, and the poison sentinel sorts after every item so a
//! stage never sees it before its remaining work.
//!
//! Bounded queues provide back-pressure: `put` waits for space, so a fast
//! generator cannot outrun the HTTP stage. Back-edges use [`force_put`]
//! instead: a routing stage that blocked on a full upstream queue could
//! deadlock the cycle it closes.
//!
//! [`force_put`]: PriorityQueue::force_put

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, Semaphore};

/// What a consumer receives from a queue.
#[derive(Debug)]
pub enum Message<T> {
    /// A regular work item.
    Item(T),
    /// End-of-stream sentinel.
    Poison,
}

/// Items that know their own queue priority.
pub trait Prioritized {
    fn priority(&self) -> u64;
}

impl Prioritized for crate::result::FuzzResult {
    fn priority(&self) -> u64 {
        crate::result::FuzzResult::priority(self)
    }
}

struct Entry<T> {
    /// `None` marks the poison sentinel, which sorts below every item.
    prio: Option<u64>,
    seq: u64,
    item: Option<T>,
    /// Whether this entry consumed a capacity permit.
    counted: bool,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.prio == other.prio && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority wins; earlier insertion wins ties.
        self.prio
            .cmp(&other.prio)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An async multi-producer, single-consumer priority queue with a poison
/// sentinel and optional capacity.
pub struct PriorityQueue<T> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    items: Semaphore,
    space: Option<Semaphore>,
    seq: AtomicU64,
}

impl<T: Prioritized> PriorityQueue<T> {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            items: Semaphore::new(0),
            space: None,
            seq: AtomicU64::new(0),
        }
    }

    /// A queue that back-pressures producers beyond `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            space: Some(Semaphore::new(capacity.max(1))),
            ..Self::new()
        }
    }

    fn push(&self, item: Option<T>, counted: bool) {
        let entry = Entry {
            prio: item.as_ref().map(|i| i.priority()),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            item,
            counted,
        };
        self.heap.lock().unwrap().push(entry);
        self.items.add_permits(1);
    }

    /// Enqueue an item at its own priority, waiting for space when the
    /// queue is bounded and full.
    pub async fn put(&self, item: T) {
        let counted = match &self.space {
            Some(space) => {
                space
                    .acquire()
                    .await
                    .expect("queue semaphore never closes")
                    .forget();
                true
            }
            None => false,
        };
        self.push(Some(item), counted);
    }

    /// Enqueue without consuming capacity. For back-edges, where blocking
    /// would deadlock the loop the edge closes.
    pub fn force_put(&self, item: T) {
        self.push(Some(item), false);
    }

    /// Enqueue the end-of-stream sentinel; it drains after every item and
    /// never consumes capacity.
    pub fn put_poison(&self) {
        self.push(None, false);
    }

    /// Dequeue the next message, waiting while the queue is empty.
    pub async fn get(&self) -> Message<T> {
        let permit = self
            .items
            .acquire()
            .await
            .expect("queue semaphore never closes");
        permit.forget();
        let entry = self
            .heap
            .lock()
            .unwrap()
            .pop()
            .expect("a permit always matches an entry");
        if entry.counted {
            if let Some(space) = &self.space {
                space.add_permits(1);
            }
        }
        match entry.item {
            Some(item) => Message::Item(item),
            None => Message::Poison,
        }
    }

    /// Remove every queued work item, keeping any queued poison and
    /// releasing blocked producers. Returns the number discarded.
    pub fn drain(&self) -> usize {
        let mut removed = 0;
        loop {
            match self.items.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
            let mut heap = self.heap.lock().unwrap();
            match heap.pop() {
                Some(entry) if entry.item.is_some() => {
                    if entry.counted {
                        if let Some(space) = &self.space {
                            space.add_permits(1);
                        }
                    }
                    removed += 1;
                }
                Some(poison) => {
                    heap.push(poison);
                    self.items.add_permits(1);
                    break;
                }
                None => break,
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Prioritized> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A manual-reset gate for the HTTP stage: while paused, new dispatches
/// wait; in-flight requests are unaffected.
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    /// Close the gate; new dispatches wait until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Open the gate, releasing every waiter.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait until the gate is open.
    pub async fn wait_open(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Job(u64, &'static str);

    impl Prioritized for Job {
        fn priority(&self) -> u64 {
            self.0
        }
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        let queue = PriorityQueue::new();
        queue.put(Job(1, "low-a")).await;
        queue.put(Job(5, "high")).await;
        queue.put(Job(1, "low-b")).await;

        let mut order = Vec::new();
        for _ in 0..3 {
            match queue.get().await {
                Message::Item(job) => order.push(job.1),
                Message::Poison => panic!("unexpected poison"),
            }
        }
        assert_eq!(order, vec!["high", "low-a", "low-b"]);
    }

    #[tokio::test]
    async fn test_poison_drains_last() {
        let queue = PriorityQueue::new();
        queue.put_poison();
        queue.put(Job(0, "late but first")).await;

        assert!(matches!(queue.get().await, Message::Item(_)));
        assert!(matches!(queue.get().await, Message::Poison));
    }

    #[tokio::test]
    async fn test_get_waits_for_put() {
        let queue = Arc::new(PriorityQueue::new());
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.put(Job(1, "delayed")).await;
        });
        match queue.get().await {
            Message::Item(job) => assert_eq!(job.1, "delayed"),
            Message::Poison => panic!("unexpected poison"),
        }
    }

    #[tokio::test]
    async fn test_bounded_put_waits_for_space() {
        let queue = Arc::new(PriorityQueue::bounded(1));
        queue.put(Job(1, "first")).await;

        let producer = Arc::clone(&queue);
        let blocked = tokio::spawn(async move {
            producer.put(Job(1, "second")).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!blocked.is_finished());

        assert!(matches!(queue.get().await, Message::Item(_)));
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("space freed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_force_put_ignores_capacity() {
        let queue = PriorityQueue::bounded(1);
        queue.put(Job(1, "counted")).await;
        queue.force_put(Job(9, "forced"));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_keeps_poison_and_frees_space() {
        let queue = PriorityQueue::bounded(2);
        queue.put(Job(1, "a")).await;
        queue.put(Job(2, "b")).await;
        queue.put_poison();

        assert_eq!(queue.drain(), 2);
        assert!(matches!(queue.get().await, Message::Poison));

        // Capacity is back; these must not block.
        queue.put(Job(1, "c")).await;
        queue.put(Job(1, "d")).await;
    }

    #[tokio::test]
    async fn test_pause_gate_blocks_until_resume() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();
        assert!(gate.is_paused());

        let waiter = Arc::clone(&gate);
        let handle = tokio::spawn(async move {
            waiter.wait_open().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_gate_does_not_block() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(100), gate.wait_open())
            .await
            .expect("open gate returns immediately");
    }
}
