//! Admission control for playback tasks
//!
//! The gate tracks every admitted task until it completes and refuses new
//! ones once `max_queue_size` are outstanding. Completion is signalled by
//! dropping the task's [`CompletionToken`], which posts the task id on a
//! channel. Completed ids are pruned lazily, on the next offer, never on a
//! timer.
//!
//! The registry is only mutated under its lock by `offer`; workers never
//! touch it, so the bound is exact: at most `max_queue_size` tasks are
//! ever tracked.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Identity of an admitted task, unique per gate
pub type TaskId = u64;

/// Outcome of offering a task to the gate
#[derive(Debug)]
pub enum Admission {
    Accepted(CompletionToken),
    Dropped,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Held by an admitted task; dropping it marks the task done.
///
/// Dropping happens on normal completion, on failure, and during unwinding,
/// so a panicking task still frees its slot.
#[derive(Debug)]
pub struct CompletionToken {
    id: TaskId,
    completions: Sender<TaskId>,
}

impl CompletionToken {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        let _ = self.completions.send(self.id);
    }
}

struct Registry {
    outstanding: HashSet<TaskId>,
    next_id: TaskId,
}

/// Bounded registry of in-flight playback tasks
pub struct AdmissionGate {
    max_queue_size: usize,
    registry: Mutex<Registry>,
    completions_tx: Sender<TaskId>,
    completions_rx: Receiver<TaskId>,
}

impl AdmissionGate {
    pub fn new(max_queue_size: usize) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            max_queue_size,
            registry: Mutex::new(Registry {
                outstanding: HashSet::with_capacity(max_queue_size),
                next_id: 0,
            }),
            completions_tx,
            completions_rx,
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Prune completed tasks, then admit if there is room
    pub fn offer(&self) -> Admission {
        let mut registry = self.registry.lock();
        for id in self.completions_rx.try_iter() {
            registry.outstanding.remove(&id);
        }

        if registry.outstanding.len() >= self.max_queue_size {
            return Admission::Dropped;
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.outstanding.insert(id);
        Admission::Accepted(CompletionToken {
            id,
            completions: self.completions_tx.clone(),
        })
    }

    /// Tasks tracked as of the last offer.
    ///
    /// Completions since then are not reflected until the next offer prunes
    /// them.
    pub fn tracked(&self) -> usize {
        self.registry.lock().outstanding.len()
    }

    /// Tracked tasks minus completions already signalled
    pub fn outstanding(&self) -> usize {
        let registry = self.registry.lock();
        registry
            .outstanding
            .len()
            .saturating_sub(self.completions_rx.len())
    }
}
