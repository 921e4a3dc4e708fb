//! Deferred release of resources that must be freed on one owning thread.
//!
//! Mesh workers replace cached meshes from background threads, but the GPU
//! buffers behind a mesh can only be released by the render thread. Workers
//! hand the old value to a [`DisposeQueue`]; the owning thread drains it once
//! per frame and releases each item.

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Multi-producer queue of values awaiting disposal.
///
/// Cloning yields another handle to the same queue.
pub struct DisposeQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for DisposeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for DisposeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DisposeQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Queues `item` for disposal. Never blocks; callable from any thread.
    pub fn defer(&self, item: T) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(item);
    }

    /// Disposes every queued item with `dispose` and returns how many ran.
    ///
    /// Items deferred while draining are picked up in the same call.
    pub fn drain(&self, mut dispose: impl FnMut(T)) -> usize {
        let mut count = 0;
        while let Ok(item) = self.rx.try_recv() {
            dispose(item);
            count += 1;
        }
        count
    }

    /// Number of items waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
