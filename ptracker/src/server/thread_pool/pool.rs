use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when a task is handed to a pool whose queue is already
/// gone.
#[derive(Debug)]
pub struct PoolClosed;

/// A fixed crew of worker threads draining one shared job queue.
///
/// There is no stop message: dropping the pool closes the sending half of
/// the queue, each worker finishes its current job, drains whatever is
/// still buffered, observes the disconnect and exits. The drop then joins
/// them all, so queued tracker sessions are never abandoned mid-reply.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool of `size` workers. Panics if `size` is zero.
    pub fn new(size: usize) -> ThreadPool {
        assert!(size > 0);

        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|_| Self::spawn_worker(receiver.clone()))
            .collect();

        ThreadPool {
            sender: Some(sender),
            workers,
        }
    }

    /// Queues a task for the next idle worker.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(task)).map_err(|_| PoolClosed),
            None => Err(PoolClosed),
        }
    }

    fn spawn_worker(receiver: Arc<Mutex<Receiver<Job>>>) -> JoinHandle<()> {
        thread::spawn(move || loop {
            // The queue lock must drop before the job runs, or one long job
            // would starve every other worker.
            let next = receiver
                .lock()
                .unwrap() // Unwrap is safe: no holder of the lock can panic.
                .recv();
            match next {
                Ok(job) => job(),
                // Queue closed: the pool is going away.
                Err(_) => break,
            }
        })
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("A tracker worker panicked.");
            }
        }
    }
}
