//! Worker pool for large-object destruction.
//!
//! A fixed bank of threads consumes [`Task`]s from an unbounded FIFO
//! channel; workers block while the queue is empty. Submission never
//! blocks. Shutdown closes the queue, lets the workers drain whatever is
//! still enqueued, and joins them.
//!
//! Tasks are self-contained: ownership of the payload moves into the task
//! at submission, so workers share no state with the event loop beyond the
//! channel itself.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};

use crate::keyspace::Entry;

/// Work the pool knows how to do.
pub enum Task {
    /// Drop an entry that has already been detached from every index.
    /// Used for entries whose sorted set is large enough that freeing it
    /// inline would stall the event loop.
    DestroyEntry(Entry),
}

impl Task {
    fn run(self) {
        match self {
            Task::DestroyEntry(entry) => drop(entry),
        }
    }
}

/// Handle to the worker bank. Dropping it shuts the pool down.
pub struct ThreadPool {
    queue: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start `nb_threads` workers. `nb_threads` must be at least 1.
    pub fn new(nb_threads: usize) -> Self {
        assert!(nb_threads >= 1, "worker pool needs at least one thread");
        let (tx, rx) = unbounded::<Task>();
        let workers = (0..nb_threads)
            .map(|_| {
                let rx = rx.clone();
                std::thread::spawn(move || {
                    // recv fails only once the queue is both empty and
                    // closed, so pending tasks always drain before exit.
                    while let Ok(task) = rx.recv() {
                        task.run();
                    }
                })
            })
            .collect();
        ThreadPool {
            queue: Some(tx),
            workers,
        }
    }

    /// Enqueue a task and wake one worker. Never blocks.
    pub fn submit(&self, task: Task) {
        if let Some(queue) = &self.queue {
            // Send fails only if every worker died; nothing to do then but
            // run the task inline.
            if let Err(returned) = queue.send(task) {
                returned.into_inner().run();
            }
        }
    }

    /// Close the queue, drain it, and join all workers.
    pub fn shutdown(&mut self) {
        self.queue = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
