use std::collections::VecDeque;

use crate::net::{InputState, Tick};

/// 16 seconds of input at 64 Hz.
pub const DEFAULT_PENDING_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{capacity} inputs are still awaiting acknowledgement")]
pub struct BufferFull {
    pub capacity: usize,
}

/// Inputs sent to the server and not yet covered by a snapshot, oldest first.
/// Only [`PendingInputBuffer::acknowledge`] removes entries.
#[derive(Debug, Clone)]
pub struct PendingInputBuffer {
    inputs: VecDeque<InputState>,
    capacity: usize,
}

impl Default for PendingInputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

impl PendingInputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inputs: VecDeque::with_capacity(capacity.min(DEFAULT_PENDING_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, input: InputState) -> Result<(), BufferFull> {
        if self.is_full() {
            return Err(BufferFull {
                capacity: self.capacity,
            });
        }
        self.inputs.push_back(input);
        Ok(())
    }

    /// Drops every input with a tick at or below `tick`.
    pub fn acknowledge(&mut self, tick: Tick) -> usize {
        let before = self.inputs.len();
        while self.inputs.front().is_some_and(|input| input.tick <= tick) {
            self.inputs.pop_front();
        }
        before - self.inputs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputState> {
        self.inputs.iter()
    }

    pub fn ticks(&self) -> Vec<Tick> {
        self.inputs.iter().map(|input| input.tick).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inputs.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(ticks: std::ops::RangeInclusive<Tick>) -> PendingInputBuffer {
        let mut buffer = PendingInputBuffer::default();
        for tick in ticks {
            buffer.push(InputState::new(tick)).unwrap();
        }
        buffer
    }

    #[test]
    fn acknowledge_drops_covered_ticks() {
        let mut buffer = filled(1..=5);
        assert_eq!(buffer.acknowledge(3), 3);
        assert_eq!(buffer.ticks(), vec![4, 5]);
    }

    #[test]
    fn acknowledge_old_tick_is_noop() {
        let mut buffer = filled(4..=6);
        assert_eq!(buffer.acknowledge(2), 0);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn full_buffer_keeps_unacknowledged_inputs() {
        let mut buffer = PendingInputBuffer::new(2);
        buffer.push(InputState::new(1)).unwrap();
        buffer.push(InputState::new(2)).unwrap();

        assert!(buffer.is_full());
        assert_eq!(
            buffer.push(InputState::new(3)),
            Err(BufferFull { capacity: 2 })
        );
        assert_eq!(buffer.ticks(), vec![1, 2]);

        buffer.acknowledge(1);
        assert!(buffer.push(InputState::new(3)).is_ok());
        assert_eq!(buffer.ticks(), vec![2, 3]);
    }
}
