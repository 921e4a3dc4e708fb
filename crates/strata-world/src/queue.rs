//! Bounded nearest-first queue of chunk materialization tasks.
//!
//! Tasks live in a min-heap keyed by squared distance to the requester. Each
//! push also sends one wake token over a channel; a worker blocks on the
//! token channel and pops the nearest task when woken. Closing the queue
//! discards everything still queued and drops the token sender so idle
//! workers observe disconnection and exit.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use strata_voxel::ChunkCoord;

/// Why a push was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PushError {
    /// The queue holds `capacity` tasks already.
    Full,
    /// The queue was closed by shutdown.
    Closed,
}

/// Heap entry: `(priority, sequence, coord)`. The sequence keeps equal
/// priorities in submission order.
type Entry = Reverse<(u64, u64, ChunkCoord)>;

pub(crate) struct TaskQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    capacity: usize,
    seq: AtomicU64,
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskQueue {
    /// Creates an open queue that holds at most `capacity` tasks.
    pub(crate) fn new(capacity: usize) -> Self {
        let (wake_tx, wake_rx) = unbounded();
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity.min(4096))),
            capacity,
            seq: AtomicU64::new(0),
            wake_tx: Mutex::new(Some(wake_tx)),
            wake_rx,
        }
    }

    /// Enqueues `coord` with `priority` (lower runs first).
    pub(crate) fn push(&self, coord: ChunkCoord, priority: u64) -> Result<(), PushError> {
        // Holding the sender lock orders pushes against `close`.
        let sender = lock(&self.wake_tx);
        let Some(tx) = sender.as_ref() else {
            return Err(PushError::Closed);
        };
        {
            let mut heap = lock(&self.heap);
            if heap.len() >= self.capacity {
                return Err(PushError::Full);
            }
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            heap.push(Reverse((priority, seq, coord)));
        }
        // The receiver lives in `self`, so this cannot disconnect.
        let _ = tx.send(());
        Ok(())
    }

    /// Removes the nearest task.
    pub(crate) fn pop(&self) -> Option<(u64, ChunkCoord)> {
        lock(&self.heap)
            .pop()
            .map(|Reverse((priority, _, coord))| (priority, coord))
    }

    /// A receiver that yields one token per push and disconnects on close.
    pub(crate) fn waker(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    /// Number of queued, not yet started tasks.
    pub(crate) fn len(&self) -> usize {
        lock(&self.heap).len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.wake_tx).is_none()
    }

    /// Stops accepting work and discards queued tasks, returning their
    /// coordinates. Idempotent.
    pub(crate) fn close(&self) -> Vec<ChunkCoord> {
        let mut sender = lock(&self.wake_tx);
        sender.take();
        let discarded = lock(&self.heap)
            .drain()
            .map(|Reverse((_, _, coord))| coord)
            .collect();
        // Drain stale tokens so blocked workers see the disconnect at once.
        while self.wake_rx.try_recv().is_ok() {}
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_nearest_first() {
        let queue = TaskQueue::new(16);
        queue.push(ChunkCoord::new(9, 0, 0), 81).unwrap();
        queue.push(ChunkCoord::new(1, 0, 0), 1).unwrap();
        queue.push(ChunkCoord::new(3, 0, 0), 9).unwrap();

        assert_eq!(queue.pop(), Some((1, ChunkCoord::new(1, 0, 0))));
        assert_eq!(queue.pop(), Some((9, ChunkCoord::new(3, 0, 0))));
        assert_eq!(queue.pop(), Some((81, ChunkCoord::new(9, 0, 0))));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let queue = TaskQueue::new(16);
        // Larger coordinates first so ordering cannot come from the coord.
        queue.push(ChunkCoord::new(5, 5, 5), 4).unwrap();
        queue.push(ChunkCoord::new(0, 0, 0), 4).unwrap();
        assert_eq!(queue.pop().map(|(_, c)| c), Some(ChunkCoord::new(5, 5, 5)));
        assert_eq!(queue.pop().map(|(_, c)| c), Some(ChunkCoord::new(0, 0, 0)));
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = TaskQueue::new(2);
        queue.push(ChunkCoord::new(0, 0, 0), 0).unwrap();
        queue.push(ChunkCoord::new(1, 0, 0), 1).unwrap();
        assert_eq!(
            queue.push(ChunkCoord::new(2, 0, 0), 2),
            Err(PushError::Full)
        );
        assert_eq!(queue.len(), 2);

        queue.pop();
        assert!(queue.push(ChunkCoord::new(2, 0, 0), 2).is_ok());
    }

    #[test]
    fn test_one_token_per_push() {
        let queue = TaskQueue::new(8);
        let waker = queue.waker();
        queue.push(ChunkCoord::new(0, 0, 0), 0).unwrap();
        queue.push(ChunkCoord::new(0, 1, 0), 1).unwrap();
        assert_eq!(waker.len(), 2);
    }

    #[test]
    fn test_close_discards_and_disconnects() {
        let queue = TaskQueue::new(8);
        let waker = queue.waker();
        queue.push(ChunkCoord::new(0, 0, 0), 0).unwrap();
        queue.push(ChunkCoord::new(1, 0, 0), 1).unwrap();

        let discarded = queue.close();
        assert_eq!(discarded.len(), 2);
        assert!(queue.is_closed());
        assert_eq!(queue.len(), 0);
        assert!(waker.recv().is_err(), "workers must observe disconnection");
        assert_eq!(
            queue.push(ChunkCoord::new(2, 0, 0), 0),
            Err(PushError::Closed)
        );
        assert!(queue.close().is_empty(), "second close is a no-op");
    }
}
