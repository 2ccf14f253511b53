// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Bounded FIFO of pending commands.
//!
//! Producers never block: a full queue rejects the command with
//! [`Error::InsufficientResources`]. The single consumer (the component
//! worker) blocks in [`CommandQueue::take`] until a command arrives.

use crate::{command::Command, Error};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

/// Default number of commands that may be pending at once.
pub const DEFAULT_CAPACITY: usize = 40;

#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
    capacity: usize,
}

impl CommandQueue {
    /// Creates a queue holding at most `capacity` commands. A zero capacity
    /// is rejected since it would turn every submission into a rendezvous.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::BadParameter);
        }
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Ok(CommandQueue { tx, rx, capacity })
    }

    /// Appends `command` and wakes the consumer.
    pub fn submit(&self, command: Command) -> Result<(), Error> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::InsufficientResources),
            Err(TrySendError::Disconnected(_)) => Err(Error::Undefined),
        }
    }

    /// Blocks until a command is available and removes it.
    pub fn take(&self) -> Result<Command, Error> {
        self.rx.recv().map_err(|_| Error::Undefined)
    }

    /// Removes a command if one is pending.
    pub fn try_take(&self) -> Option<Command> {
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Removes every pending command without dispatching it.
    pub fn drain(&self) -> Vec<Command> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(command) = self.try_take() {
            drained.push(command);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::PortIndex, state::State};
    use std::{thread, time::Duration};

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::with_capacity(4).unwrap();
        queue.submit(Command::SetState(State::Idle)).unwrap();
        queue.submit(Command::Flush(PortIndex::All)).unwrap();
        queue.submit(Command::Deinit).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.take(), Ok(Command::SetState(State::Idle)));
        assert_eq!(queue.take(), Ok(Command::Flush(PortIndex::All)));
        assert_eq!(queue.take(), Ok(Command::Deinit));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = CommandQueue::with_capacity(1).unwrap();
        queue.submit(Command::Deinit).unwrap();
        assert_eq!(
            queue.submit(Command::Deinit),
            Err(Error::InsufficientResources)
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            CommandQueue::with_capacity(0).unwrap_err(),
            Error::BadParameter
        );
    }

    #[test]
    fn test_take_blocks_until_submit() {
        let queue = CommandQueue::with_capacity(2).unwrap();
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.take())
        };
        thread::sleep(Duration::from_millis(20));
        queue.submit(Command::PortEnable(PortIndex::Port(1))).unwrap();
        assert_eq!(
            consumer.join().unwrap(),
            Ok(Command::PortEnable(PortIndex::Port(1)))
        );
    }

    #[test]
    fn test_drain() {
        let queue = CommandQueue::with_capacity(8).unwrap();
        for _ in 0..5 {
            queue.submit(Command::Flush(PortIndex::Port(0))).unwrap();
        }
        assert_eq!(queue.drain().len(), 5);
        assert!(queue.try_take().is_none());
    }
}
