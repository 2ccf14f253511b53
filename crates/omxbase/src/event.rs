// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    command::{CommandKind, PortIndex},
    port::BufferHeader,
    state::State,
    Error,
};
use crossbeam_channel::Sender;

/// A command that completed successfully, with the parameter it was sent
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completed {
    SetState(State),
    Flush(PortIndex),
    PortDisable(PortIndex),
    PortEnable(PortIndex),
    MarkBuffer(u32),
}

impl Completed {
    pub fn kind(&self) -> CommandKind {
        match self {
            Completed::SetState(_) => CommandKind::SetState,
            Completed::Flush(_) => CommandKind::Flush,
            Completed::PortDisable(_) => CommandKind::PortDisable,
            Completed::PortEnable(_) => CommandKind::PortEnable,
            Completed::MarkBuffer(_) => CommandKind::MarkBuffer,
        }
    }
}

/// Notification delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A queued command finished.
    CommandComplete(Completed),
    /// A queued command failed, or the component hit an asynchronous error.
    Error(Error),
    /// A buffer is handed back to the caller (flush, or processing done).
    BufferDone { port: u32, buffer: BufferHeader },
}

/// Receiver of component events.
///
/// Called from the component's worker thread (and, for buffers, from the
/// codec driver's processing threads). Implementations must not wait for
/// the component they are attached to: the worker cannot make progress
/// until `on_event` returns.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

impl<F> EventHandler for F
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        self(event)
    }
}

impl EventHandler for Sender<Event> {
    fn on_event(&self, event: Event) {
        if self.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }
}
