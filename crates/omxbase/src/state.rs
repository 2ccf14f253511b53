// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::Error;
use std::fmt;

/// Component state.
///
/// A component is created in [`State::Loaded`]. [`State::Invalid`] is
/// terminal: once entered, every further request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitForResources,
    Invalid,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Loaded,
        State::Idle,
        State::Executing,
        State::Pause,
        State::WaitForResources,
        State::Invalid,
    ];

    /// Returns true when `self -> dest` is a legal edge of the state machine.
    ///
    /// Edges not listed here are illegal, including the ones the OpenMAX IL
    /// specification leaves to the implementation (WaitForResources ->
    /// Loaded among them).
    pub fn can_transition_to(self, dest: State) -> bool {
        use State::*;
        matches!(
            (self, dest),
            (Loaded, Idle)
                | (Idle, Loaded)
                | (Idle, Executing)
                | (Executing, Idle)
                | (Idle, Pause)
                | (Pause, Idle)
                | (Executing, Pause)
                | (Pause, Executing)
                | (Loaded, WaitForResources)
                | (WaitForResources, Idle)
        ) || (dest == Invalid && self != Invalid)
    }

    /// Validates a state request against `self` as the current state.
    pub fn check_transition(self, dest: State) -> Result<(), Error> {
        if self == dest {
            return Err(Error::SameState);
        }
        if self == State::Invalid {
            return Err(Error::InvalidState);
        }
        if !self.can_transition_to(dest) {
            return Err(Error::IncorrectStateTransition);
        }
        Ok(())
    }

    /// States in which buffers are allocated and may circulate.
    pub fn has_resources(self) -> bool {
        matches!(self, State::Idle | State::Executing | State::Pause)
    }

    /// States in which port configuration may change freely.
    pub fn is_configurable(self) -> bool {
        matches!(self, State::Loaded | State::WaitForResources)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::Loaded => write!(f, "Loaded"),
            State::Idle => write!(f, "Idle"),
            State::Executing => write!(f, "Executing"),
            State::Pause => write!(f, "Pause"),
            State::WaitForResources => write!(f, "WaitForResources"),
            State::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Marker for the state edge currently in flight. Only abnormal termination
/// reads it, to decide which blocked resource waits to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientState {
    LoadedToIdle,
    IdleToLoaded,
    IdleToExecuting,
    ExecutingToIdle,
}

impl TransientState {
    pub(crate) fn for_edge(from: State, to: State) -> Option<TransientState> {
        match (from, to) {
            (State::Loaded, State::Idle) => Some(TransientState::LoadedToIdle),
            (State::Idle, State::Loaded) => Some(TransientState::IdleToLoaded),
            (State::Idle, State::Executing) => Some(TransientState::IdleToExecuting),
            (State::Executing, State::Idle) => Some(TransientState::ExecutingToIdle),
            _ => None,
        }
    }
}
