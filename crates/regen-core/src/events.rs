//! The "about to regenerate" notification.
//!
//! Right before a task fires, the scheduler builds a [`RegenerationEvent`] and
//! passes it mutably to every registered [`RegenerationListener`] in order.
//! Listeners may redirect the block to another material or cancel the
//! regeneration outright. A cancelled task is discarded: the block keeps its
//! placeholder and is not reverted.

use crate::material::MaterialId;
use crate::task::RegenerationTask;

/// Emitted immediately before a task regenerates its block.
#[derive(Debug)]
pub struct RegenerationEvent<'a> {
    task: &'a RegenerationTask,
    /// Material the block will be set to. Starts as the task's replacement.
    pub regenerate_into: MaterialId,
    cancelled: bool,
}

impl<'a> RegenerationEvent<'a> {
    /// Creates an uncancelled event targeting the task's replacement.
    pub fn new(task: &'a RegenerationTask) -> Self {
        Self {
            task,
            regenerate_into: task.replacement().clone(),
            cancelled: false,
        }
    }

    /// The task about to fire.
    pub fn task(&self) -> &RegenerationTask {
        self.task
    }

    /// Whether a listener cancelled the regeneration.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancels or un-cancels the regeneration.
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Receives [`RegenerationEvent`]s.
pub trait RegenerationListener {
    /// Called once per firing task, in listener registration order.
    fn on_regenerate(&mut self, event: &mut RegenerationEvent<'_>);
}

impl<F> RegenerationListener for F
where
    F: FnMut(&mut RegenerationEvent<'_>),
{
    fn on_regenerate(&mut self, event: &mut RegenerationEvent<'_>) {
        self(event);
    }
}
