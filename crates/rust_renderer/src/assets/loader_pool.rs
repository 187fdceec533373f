//! Fixed-size worker pool for background asset loads

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Thread pool running geometry parses and texture decodes
///
/// Dropping the pool closes the queue and joins every worker after the
/// already queued jobs have run.
pub struct LoaderPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
}

impl LoaderPool {
    /// Pool with `size` workers (at least one)
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size.max(1))
            .map(|id| Worker::new(id, receiver.clone()))
            .collect();

        Self {
            workers,
            sender: Some(sender),
        }
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job; returns false if the pool is shutting down
    pub fn execute<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .is_some_and(|sender| sender.send(Box::new(f)).is_ok())
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if let Some(thread) = worker.thread {
                if thread.join().is_err() {
                    log::error!("Loader worker {} panicked", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Job>) -> Self {
        let thread = thread::Builder::new()
            .name(format!("asset-loader-{id}"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                log::trace!("Loader worker {} exiting", id);
            })
            .map_err(|e| log::error!("Failed to spawn loader worker {}: {}", id, e))
            .ok();

        Self { id, thread }
    }
}
