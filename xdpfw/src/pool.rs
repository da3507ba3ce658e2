//! Receive workers.
//!
//! Each worker is an OS thread with its own bounded queue, its own
//! [`Classifier`] and its own counter writer. Frames are spread over the
//! queues round-robin, the way a NIC spreads flows over receive queues, so
//! there is no ordering between frames handled by different workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::blacklist::Blacklists;
use crate::counters::CounterBank;
use crate::error::PoolError;
use crate::pipeline::{Classifier, UnknownProtocolPolicy};
use crate::verdict::Verdict;

/// One frame handed to a worker, with an optional reply slot for its verdict.
#[derive(Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub reply: Option<oneshot::Sender<Verdict>>,
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable entry point into the pool. Workers stop once every handle has
/// been dropped and their queues are drained.
#[derive(Clone, Debug)]
pub struct PoolHandle {
    queues: Arc<[mpsc::Sender<Frame>]>,
    next: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        queue_depth: usize,
        lists: Arc<Blacklists>,
        bank: &CounterBank,
        policy: UnknownProtocolPolicy,
    ) -> Result<(WorkerPool, PoolHandle), PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let mut handles = Vec::with_capacity(workers);
        let mut queues = Vec::with_capacity(workers);
        for index in 0..workers {
            let writer = bank.writer(index).ok_or(PoolError::ShardUnavailable(index))?;
            let (tx, mut rx) = mpsc::channel::<Frame>(queue_depth.max(1));
            let classifier = Classifier::new(lists.clone(), writer).with_unknown_protocol(policy);

            let handle = std::thread::Builder::new()
                .name(format!("xdpfw-worker-{index}"))
                .spawn(move || {
                    tracing::debug!("worker {} started", index);
                    let mut handled: u64 = 0;
                    while let Some(frame) = rx.blocking_recv() {
                        let verdict = classifier.classify(&frame.data);
                        handled += 1;
                        if let Some(reply) = frame.reply {
                            let _ = reply.send(verdict);
                        }
                    }
                    tracing::debug!("worker {} stopped after {} frames", index, handled);
                })?;

            handles.push(handle);
            queues.push(tx);
        }

        tracing::info!(
            "Started {} classification workers ({:?} counters)",
            workers,
            bank.mode()
        );
        Ok((
            WorkerPool { workers: handles },
            PoolHandle {
                queues: queues.into(),
                next: Arc::new(AtomicUsize::new(0)),
            },
        ))
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. Blocks until all `PoolHandle`s are gone.
    pub fn shutdown(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                tracing::error!("classification worker panicked");
            }
        }
    }
}

impl PoolHandle {
    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    fn queue(&self) -> &mpsc::Sender<Frame> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        &self.queues[index]
    }

    /// Classify one frame on the next worker and wait for the verdict.
    pub async fn submit(&self, data: Vec<u8>) -> Result<Verdict, PoolError> {
        let (reply, verdict) = oneshot::channel();
        self.queue()
            .send(Frame {
                data,
                reply: Some(reply),
            })
            .await
            .map_err(|_| PoolError::Closed)?;
        verdict.await.map_err(|_| PoolError::Closed)
    }

    /// Queue one frame without waiting for its verdict. Returns `false` if the
    /// chosen worker's queue is full or closed; the frame is then discarded
    /// without being counted.
    pub fn dispatch(&self, data: Vec<u8>) -> bool {
        self.queue().try_send(Frame { data, reply: None }).is_ok()
    }
}
