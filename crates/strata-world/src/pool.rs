//! Fixed-size worker pool draining a [`TaskQueue`].
//!
//! Workers block on the queue's wake channel, pop the nearest task and run
//! the job for it. Shutdown closes the queue, waits a bounded time for
//! running jobs, and detaches any thread that is still busy after that.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use strata_voxel::ChunkCoord;

use crate::queue::TaskQueue;

/// Outcome of [`WorkerPool::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued tasks that never started.
    pub discarded: usize,
    /// Workers that exited within the grace period.
    pub joined: usize,
    /// Workers still running a task when the grace period expired.
    pub detached: usize,
}

pub(crate) struct WorkerPool {
    queue: Arc<TaskQueue>,
    handles: Vec<JoinHandle<()>>,
    /// Index of each worker as it leaves its loop.
    done_rx: Receiver<usize>,
}

/// Resolves a configured thread count; 0 means one per logical core.
pub(crate) fn resolve_thread_count(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get().max(1)
    } else {
        configured
    }
}

impl WorkerPool {
    /// Spawns `threads` workers named `{name}-{i}` that run `job` for each
    /// popped coordinate.
    pub(crate) fn spawn<F>(
        name: &str,
        threads: usize,
        queue: Arc<TaskQueue>,
        job: F,
    ) -> io::Result<Self>
    where
        F: Fn(ChunkCoord) + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let (done_tx, done_rx) = unbounded();
        let mut handles = Vec::with_capacity(threads);

        for i in 0..threads {
            let waker = queue.waker();
            let worker_queue = Arc::clone(&queue);
            let job = Arc::clone(&job);
            let done = done_tx.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    while waker.recv().is_ok() {
                        let Some((_, coord)) = worker_queue.pop() else {
                            continue;
                        };
                        job(coord);
                    }
                    let _ = done.send(i);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Let already-started workers exit before reporting.
                    queue.close();
                    return Err(err);
                }
            }
        }

        Ok(Self {
            queue,
            handles,
            done_rx,
        })
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Closes the queue and waits up to `grace` for workers to exit.
    pub(crate) fn shutdown(self, grace: Duration) -> ShutdownReport {
        let discarded = self.queue.close().len();
        let deadline = Instant::now() + grace;

        let mut exited = vec![false; self.handles.len()];
        let mut remaining_workers = self.handles.len();
        while remaining_workers > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(i) => {
                    exited[i] = true;
                    remaining_workers -= 1;
                }
                Err(_) => break,
            }
        }

        let mut report = ShutdownReport {
            discarded,
            ..ShutdownReport::default()
        };
        for (handle, exited) in self.handles.into_iter().zip(exited) {
            // A worker that reported done has left its loop and is returning.
            if exited || handle.is_finished() {
                let _ = handle.join();
                report.joined += 1;
            } else {
                // Dropping the handle detaches the thread.
                report.detached += 1;
            }
        }
        report
    }
}
