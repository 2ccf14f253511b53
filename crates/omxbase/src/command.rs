// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{state::State, Error, ALL_PORT_INDEX};
use std::fmt;

/// Port addressing for port-scoped commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortIndex {
    /// Every port of the component.
    All,
    /// A single port.
    Port(u32),
}

impl PortIndex {
    /// Returns the indices addressed by `self`, failing with
    /// [`Error::BadPortIndex`] for an explicit index beyond `num_ports`.
    pub fn resolve(self, num_ports: usize) -> Result<Vec<usize>, Error> {
        match self {
            PortIndex::All => Ok((0..num_ports).collect()),
            PortIndex::Port(index) => {
                let index = index as usize;
                if index < num_ports {
                    Ok(vec![index])
                } else {
                    Err(Error::BadPortIndex)
                }
            }
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            PortIndex::All => ALL_PORT_INDEX,
            PortIndex::Port(index) => index,
        }
    }
}

impl From<u32> for PortIndex {
    fn from(raw: u32) -> Self {
        if raw == ALL_PORT_INDEX {
            PortIndex::All
        } else {
            PortIndex::Port(raw)
        }
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortIndex::All => write!(f, "all"),
            PortIndex::Port(index) => write!(f, "{}", index),
        }
    }
}

/// Buffer mark attached to the next buffer queued on a port.
///
/// `target` names the component that should report the mark when it
/// processes the buffer; `data` is an opaque caller value carried along.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mark {
    pub target: Option<String>,
    pub data: u64,
}

impl Mark {
    pub fn new(target: Option<&str>, data: u64) -> Self {
        Mark {
            target: target.map(str::to_owned),
            data,
        }
    }
}

/// A command accepted by [`crate::component::Component::send_command`].
///
/// Each kind carries its own payload; ownership passes to the command queue
/// on submission and to the worker on dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetState(State),
    Flush(PortIndex),
    PortDisable(PortIndex),
    PortEnable(PortIndex),
    MarkBuffer(u32, Mark),
    /// Stops the worker. Only the component itself issues it, on drop.
    Deinit,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetState(_) => CommandKind::SetState,
            Command::Flush(_) => CommandKind::Flush,
            Command::PortDisable(_) => CommandKind::PortDisable,
            Command::PortEnable(_) => CommandKind::PortEnable,
            Command::MarkBuffer(..) => CommandKind::MarkBuffer,
            Command::Deinit => CommandKind::Deinit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SetState,
    Flush,
    PortDisable,
    PortEnable,
    MarkBuffer,
    Deinit,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandKind::SetState => write!(f, "StateSet"),
            CommandKind::Flush => write!(f, "Flush"),
            CommandKind::PortDisable => write!(f, "PortDisable"),
            CommandKind::PortEnable => write!(f, "PortEnable"),
            CommandKind::MarkBuffer => write!(f, "MarkBuffer"),
            CommandKind::Deinit => write!(f, "ComponentDeInit"),
        }
    }
}
