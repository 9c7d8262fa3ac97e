//! A single pending regeneration.

use std::time::Duration;

use crate::location::BlockLocation;
use crate::material::MaterialId;
use crate::persistence::TaskRecord;

/// Live state of a task. Fired and reverted tasks are no longer stored anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Counting down (`remaining_ms >= 0`).
    Armed,
    /// Countdown passed zero; fires on the next sweep or lookup.
    Overdue,
}

/// One pending regeneration of one block.
///
/// The countdown is kept in `remaining_ms` and decremented by scheduler ticks.
/// The wall-clock deadline (`armed_at + armed_delay`) is kept alongside so
/// time that passed without a tick can be folded in with
/// [`sync_with_clock`](Self::sync_with_clock).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegenerationTask {
    location: BlockLocation,
    preset: String,
    original: MaterialId,
    replacement: MaterialId,
    remaining_ms: i64,
    region: Option<String>,
    armed_at_epoch_ms: i64,
    armed_delay_ms: i64,
}

impl RegenerationTask {
    /// Creates a task armed at `now_ms` with `delay` on the clock.
    pub fn new(
        location: BlockLocation,
        preset: impl Into<String>,
        original: MaterialId,
        replacement: MaterialId,
        delay: Duration,
        region: Option<String>,
        now_ms: i64,
    ) -> Self {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Self {
            location,
            preset: preset.into(),
            original,
            replacement,
            remaining_ms: delay_ms,
            region,
            armed_at_epoch_ms: now_ms,
            armed_delay_ms: delay_ms,
        }
    }

    /// Rebuilds a task from its persisted record, re-armed at `now_ms` with
    /// the stored remaining delay.
    pub fn from_record(record: &TaskRecord, now_ms: i64) -> Self {
        Self {
            location: record.location(),
            preset: record.preset.clone(),
            original: record.original.clone(),
            replacement: record.replacement.clone(),
            remaining_ms: record.remaining_ms,
            region: record.region.clone(),
            armed_at_epoch_ms: now_ms,
            armed_delay_ms: record.remaining_ms,
        }
    }

    /// The persisted form. `deadline_epoch_ms` is computed from `now_ms`.
    pub fn to_record(&self, now_ms: i64) -> TaskRecord {
        TaskRecord {
            world: self.location.world.clone(),
            x: self.location.x,
            y: self.location.y,
            z: self.location.z,
            preset: self.preset.clone(),
            original: self.original.clone(),
            replacement: self.replacement.clone(),
            remaining_ms: self.remaining_ms,
            deadline_epoch_ms: now_ms.saturating_add(self.remaining_ms),
            region: self.region.clone(),
        }
    }

    /// The block being regenerated.
    pub fn location(&self) -> &BlockLocation {
        &self.location
    }

    /// Name of the preset that created this task.
    pub fn preset(&self) -> &str {
        &self.preset
    }

    /// Material the block had before it was broken.
    pub fn original(&self) -> &MaterialId {
        &self.original
    }

    /// Material the block regenerates into.
    pub fn replacement(&self) -> &MaterialId {
        &self.replacement
    }

    /// Countdown in milliseconds; negative once overdue.
    pub fn remaining_ms(&self) -> i64 {
        self.remaining_ms
    }

    /// Region the block was broken in. Lookup only; the region may be gone.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// When the task was (re-)armed.
    pub fn armed_at_epoch_ms(&self) -> i64 {
        self.armed_at_epoch_ms
    }

    /// Wall-clock time the countdown reaches zero.
    pub fn deadline_epoch_ms(&self) -> i64 {
        self.armed_at_epoch_ms.saturating_add(self.armed_delay_ms)
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        if self.remaining_ms < 0 {
            TaskState::Overdue
        } else {
            TaskState::Armed
        }
    }

    /// Returns `true` once the countdown has passed zero.
    pub fn is_overdue(&self) -> bool {
        self.state() == TaskState::Overdue
    }

    /// Decrements the countdown by `elapsed_ms`. Returns `true` if this call
    /// moved the task from armed to overdue.
    pub(crate) fn advance(&mut self, elapsed_ms: i64) -> bool {
        let was_armed = !self.is_overdue();
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
        was_armed && self.is_overdue()
    }

    /// Caps the countdown at the time left until the wall-clock deadline.
    /// Never extends it.
    pub(crate) fn sync_with_clock(&mut self, now_ms: i64) {
        let by_clock = self.deadline_epoch_ms().saturating_sub(now_ms);
        self.remaining_ms = self.remaining_ms.min(by_clock);
    }

    #[cfg(test)]
    pub(crate) fn force_remaining(&mut self, remaining_ms: i64) {
        self.remaining_ms = remaining_ms;
    }
}
