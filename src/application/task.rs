use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

/// Holds the single live background task of one kind (a poll loop or a
/// countdown). Installing a new task aborts the previous one.
pub struct TaskSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs `handle`, aborting whatever was running before.
    pub fn replace(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.lock().replace(handle) {
            abort_unless_current(self.name, previous);
        }
    }

    /// Stops the task. Safe to call repeatedly; returns whether a live task
    /// was stopped.
    ///
    /// Called from inside the task itself, the handle is released without
    /// aborting so the running body can finish.
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(handle) if !handle.is_finished() => {
                abort_unless_current(self.name, handle);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

fn abort_unless_current(name: &'static str, handle: JoinHandle<()>) {
    if tokio::task::try_id() == Some(handle.id()) {
        debug!(task = name, "released from within its own task");
        return;
    }
    debug!(task = name, "aborted");
    handle.abort();
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}
