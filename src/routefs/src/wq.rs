//! Deferred work queue.
//!
//! A single consumer thread drains jobs in FIFO order.  Producers never
//! block: enqueueing is a channel send.  Stopping the queue drains whatever
//! is still pending before the worker exits, so a shutdown observes every
//! deferred garbage collection.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::debug::fs_error;
use crate::error::{Error, Result};

/// A unit of deferred work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkQueue {
    tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Start the consumer thread.
    pub(crate) fn start() -> WorkQueue {
        let (tx, rx) = unbounded::<Job>();

        let worker = std::thread::Builder::new()
            .name("routefs-deferred".to_string())
            .spawn(move || {
                // iter() yields until the channel is empty and all senders
                // are gone, so pending jobs drain on stop
                for job in rx.iter() {
                    job();
                }
            })
            .expect("failed to spawn deferred work queue thread");

        WorkQueue {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Append a job.  Non-blocking.  Fails with `again` once the queue has
    /// been stopped.
    pub(crate) fn enqueue(&self, job: Job) -> Result<()> {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| Error::Again),
            None => Err(Error::Again),
        }
    }

    /// Stop the queue, draining pending jobs synchronously.
    pub(crate) fn stop(&self) {
        // dropping the sender lets the worker drain and exit
        self.tx.lock().take();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                fs_error!("BUG: deferred work queue thread panicked");
            }
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_drain_on_stop() {
        let wq = WorkQueue::start();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let count = count.clone();
            wq.enqueue(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        wq.stop();
        assert_eq!(count.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_enqueue_after_stop_fails() {
        let wq = WorkQueue::start();
        wq.stop();
        assert_eq!(wq.enqueue(Box::new(|| {})), Err(Error::Again));
    }
}
