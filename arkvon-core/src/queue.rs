//! Ordered buffer for commands issued before initialization completes

use std::collections::VecDeque;

use crate::command::{CommandData, QueuedCommand};

/// FIFO buffer of [`QueuedCommand`]s.
///
/// Arrival order is the only order; each entry is handed out exactly once.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<QueuedCommand>,
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command; never blocks and never delivers
    pub fn push(&mut self, command: impl Into<String>, data: CommandData) {
        self.commands.push_back(QueuedCommand::new(command, data));
    }

    /// Take the oldest command
    pub fn pop(&mut self) -> Option<QueuedCommand> {
        self.commands.pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in arrival order, without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &QueuedCommand> {
        self.commands.iter()
    }
}
