//! Size-bounded accumulation of events into batches.
//!
//! The accumulator has no synchronization of its own. It lives inside the
//! dispatcher task and is only reachable through `&mut self`.

use crate::event::LogEvent;
use crate::pipeline::PipelineError;

/// Ordered buffer that hands back a full batch as soon as it reaches capacity.
#[derive(Debug)]
pub struct BatchAccumulator {
    pending: Vec<LogEvent>,
    capacity: usize,
}

impl BatchAccumulator {
    /// Create an accumulator that flushes every `capacity` events.
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }
        Ok(Self {
            pending: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Append an event.
    ///
    /// Returns the completed batch when this push fills the accumulator; the
    /// accumulator is empty again afterwards.
    pub fn push(&mut self, event: LogEvent) -> Option<Vec<LogEvent>> {
        self.pending.push(event);
        if self.pending.len() >= self.capacity {
            Some(self.drain())
        } else {
            None
        }
    }

    /// Take everything pending, possibly nothing.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
