//! Background workers applying change notifications.
//!
//! Each entity kind (flags, segments) gets one [`UpdateQueue`] and one [`Worker`] thread. The
//! worker drops notifications that do not carry a newer change number than what the store already
//! holds, and refreshes the entity otherwise.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, TryRecvError},
        Arc,
    },
    thread::JoinHandle,
};

use crate::{Error, Result};

/// A change notification consumed by a [`Worker`].
pub trait Update: Send + 'static {
    /// Entity the update refers to. Queued updates of the same entity are coalesced.
    fn entity(&self) -> &str;

    /// Change number the control plane claims the entity reached.
    fn change_number(&self) -> i64;
}

/// All flags share one change number, so flag updates refer to a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUpdate {
    /// Change number announced by the control plane.
    pub change_number: i64,
}

impl Update for FlagUpdate {
    fn entity(&self) -> &str {
        ""
    }

    fn change_number(&self) -> i64 {
        self.change_number
    }
}

/// Membership of one segment changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUpdate {
    /// Segment to refresh.
    pub segment_name: String,
    /// Change number announced by the control plane.
    pub change_number: i64,
}

impl Update for SegmentUpdate {
    fn entity(&self) -> &str {
        &self.segment_name
    }

    fn change_number(&self) -> i64 {
        self.change_number
    }
}

/// What a worker does for its entity kind.
pub struct WorkerConfig<U> {
    /// Used in the thread name and in logs.
    pub name: &'static str,
    /// Change number currently stored for the entity of an update.
    pub current_change_number: Box<dyn Fn(&U) -> i64 + Send>,
    /// Fetch and store the entity of an update.
    pub refresh: Box<dyn Fn(&U) -> Result<()> + Send>,
}

enum Message<U> {
    Update(U),
    Stop,
}

/// Producer side of a worker. Cheap to clone and safe to share between threads.
pub struct UpdateQueue<U> {
    sender: mpsc::Sender<Message<U>>,
}

impl<U> Clone for UpdateQueue<U> {
    fn clone(&self) -> Self {
        UpdateQueue {
            sender: self.sender.clone(),
        }
    }
}

impl<U: Update> UpdateQueue<U> {
    /// Enqueue an update without blocking. Returns `false` if the worker is gone.
    pub fn enqueue(&self, update: U) -> bool {
        self.sender.send(Message::Update(update)).is_ok()
    }
}

/// A worker thread draining an [`UpdateQueue`].
pub struct Worker<U> {
    join_handle: JoinHandle<()>,
    queue: UpdateQueue<U>,
    stopped: Arc<AtomicBool>,
}

impl<U: Update> Worker<U> {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(config: WorkerConfig<U>) -> std::io::Result<Worker<U>> {
        let (sender, receiver) = mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let join_handle = {
            let stopped = stopped.clone();
            std::thread::Builder::new()
                .name(format!("splitio-{}-worker", config.name))
                .spawn(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        run(&config, &receiver, &stopped);
                    }));
                    if result.is_err() {
                        log::error!(target: "splitio", worker = config.name; "worker thread panicked");
                    }
                })?
        };

        Ok(Worker {
            join_handle,
            queue: UpdateQueue { sender },
            stopped,
        })
    }

    /// A producer handle for this worker.
    pub fn queue(&self) -> UpdateQueue<U> {
        self.queue.clone()
    }

    /// Ask the worker to stop. Pending updates are discarded.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // Error means that the receiver was dropped (thread exited). Nothing to do then.
        let _ = self.queue.sender.send(Message::Stop);
    }

    /// Stop the worker and block until it exits. A refresh in flight is allowed to finish.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::ThreadPanicked)?;
        Ok(())
    }
}

fn run<U: Update>(config: &WorkerConfig<U>, receiver: &Receiver<Message<U>>, stopped: &AtomicBool) {
    loop {
        let first = match receiver.recv() {
            Ok(Message::Update(update)) => update,
            Ok(Message::Stop) | Err(_) => break,
        };

        let mut pending = vec![first];
        loop {
            match receiver.try_recv() {
                Ok(Message::Update(update)) => coalesce(&mut pending, update),
                Ok(Message::Stop) => return,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        for update in pending {
            if stopped.load(Ordering::Acquire) {
                return;
            }
            process(config, &update);
        }
    }
    log::debug!(target: "splitio", worker = config.name; "worker stopped");
}

/// Keep only the highest change number per entity, in order of first arrival.
fn coalesce<U: Update>(pending: &mut Vec<U>, update: U) {
    match pending.iter_mut().find(|p| p.entity() == update.entity()) {
        Some(existing) => {
            if update.change_number() > existing.change_number() {
                *existing = update;
            }
        }
        None => pending.push(update),
    }
}

fn process<U: Update>(config: &WorkerConfig<U>, update: &U) {
    let current = (config.current_change_number)(update);
    if update.change_number() <= current {
        log::trace!(target: "splitio",
                    worker = config.name,
                    entity = update.entity(),
                    change_number = update.change_number(),
                    current_change_number = current;
                    "dropping stale update");
        return;
    }

    log::debug!(target: "splitio",
                worker = config.name,
                entity = update.entity(),
                change_number = update.change_number();
                "refreshing");
    if let Err(err) = (config.refresh)(update) {
        log::warn!(target: "splitio",
                   worker = config.name,
                   entity = update.entity(),
                   change_number = update.change_number(),
                   error:display = err;
                   "refresh failed, waiting for the next notification or poll");
    }
}
