//! Ring buffer of recent server output.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use llamactl_core::OutputEvent;

/// Keeps the last `capacity` output lines of the current run.
#[derive(Debug)]
pub struct OutputLog {
    capacity: usize,
    lines: Mutex<VecDeque<OutputEvent>>,
}

impl OutputLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Add a line, removing the oldest if at capacity
    pub fn push(&self, event: OutputEvent) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(event);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<OutputEvent> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
