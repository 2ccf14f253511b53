// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Component base for hardware media codecs
//!
//! This crate implements the lifecycle and command-processing core shared by
//! hardware-accelerated codec components: an asynchronous command interface,
//! a dedicated worker thread per component that serializes every state and
//! port transition, and the per-port buffer bookkeeping that lets a caller
//! populate and release buffers while the worker waits for them.
//!
//! The codec itself is supplied through the [`driver::CodecDriver`] trait and
//! events are delivered to the caller through [`event::EventHandler`].
//!
//! # Quick Start
//!
//! ```no_run
//! use omxbase::component::Component;
//! use omxbase::config::{ComponentConfig, PortConfig};
//! use omxbase::driver::{CodecDriver, ProcessingContext};
//! use omxbase::event::Event;
//! use omxbase::state::State;
//!
//! struct Passthrough;
//!
//! impl CodecDriver for Passthrough {
//!     fn init(&mut self) -> Result<(), omxbase::Error> { Ok(()) }
//!     fn terminate(&mut self) -> Result<(), omxbase::Error> { Ok(()) }
//!     fn buffer_process_create(&mut self, _ctx: ProcessingContext) -> Result<(), omxbase::Error> { Ok(()) }
//!     fn buffer_process_terminate(&mut self) -> Result<(), omxbase::Error> { Ok(()) }
//! }
//!
//! let config = ComponentConfig::default()
//!     .with_port(PortConfig::input(2, 4096))
//!     .with_port(PortConfig::output(2, 4096));
//! let (tx, rx) = crossbeam_channel::unbounded::<Event>();
//! let component = Component::new("OMX.Example.Decoder", config, Box::new(Passthrough), tx)?;
//!
//! component.request_state(State::Idle)?;
//! for port in 0..2 {
//!     for _ in 0..2 {
//!         component.use_buffer(port, 4096)?;
//!     }
//! }
//! println!("{:?}", rx.recv());
//! # Ok::<(), omxbase::Error>(())
//! ```
//!
//! # Threads
//!
//! Every [`component::Component`] owns exactly one worker thread. Commands
//! may be sent from any number of threads; they complete in the order they
//! were accepted and each one produces exactly one
//! [`event::Event::CommandComplete`] or [`event::Event::Error`].

use std::{error, fmt};

/// Error type for component operations.
///
/// The variants mirror the error classes of the OpenMAX IL component
/// interface; [`Error::code`] yields the corresponding 32-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// A required argument was missing, out of range or malformed
    BadParameter,

    /// A port index does not name a port of the component
    BadPortIndex,

    /// The component is in the Invalid state
    InvalidState,

    /// The requested state is the current state
    SameState,

    /// The requested state cannot be reached from the current state
    IncorrectStateTransition,

    /// The operation is not allowed in the current state or port state
    IncorrectStateOperation,

    /// A parameter block carries an incompatible version
    VersionMismatch,

    /// A resource (queue slot, thread, codec resource) could not be obtained
    InsufficientResources,

    /// An internal invariant was violated; callers should treat it as fatal
    Undefined,

    /// The operation is not implemented by this component
    NotImplemented,

    /// The parameter index is not supported
    UnsupportedIndex,

    /// No component is registered under the requested name
    ComponentNotFound,

    /// A bounded wait expired
    Timeout,
}

impl Error {
    /// Returns the OpenMAX IL error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::InsufficientResources => 0x8000_1000,
            Error::Undefined => 0x8000_1001,
            Error::ComponentNotFound => 0x8000_1003,
            Error::BadParameter => 0x8000_1005,
            Error::NotImplemented => 0x8000_1006,
            Error::InvalidState => 0x8000_100A,
            Error::VersionMismatch => 0x8000_100F,
            Error::Timeout => 0x8000_1011,
            Error::SameState => 0x8000_1012,
            Error::IncorrectStateTransition => 0x8000_1017,
            Error::IncorrectStateOperation => 0x8000_1018,
            Error::UnsupportedIndex => 0x8000_101A,
            Error::BadPortIndex => 0x8000_101B,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadParameter => write!(f, "bad parameter"),
            Error::BadPortIndex => write!(f, "bad port index"),
            Error::InvalidState => write!(f, "component is in the invalid state"),
            Error::SameState => write!(f, "component is already in the requested state"),
            Error::IncorrectStateTransition => write!(f, "incorrect state transition"),
            Error::IncorrectStateOperation => {
                write!(f, "operation not allowed in the current state")
            }
            Error::VersionMismatch => write!(f, "parameter version mismatch"),
            Error::InsufficientResources => write!(f, "insufficient resources"),
            Error::Undefined => write!(f, "undefined internal error"),
            Error::NotImplemented => write!(f, "not implemented"),
            Error::UnsupportedIndex => write!(f, "unsupported parameter index"),
            Error::ComponentNotFound => write!(f, "component not found"),
            Error::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl error::Error for Error {}

/// Port index sentinel addressing every port of a component.
pub const ALL_PORT_INDEX: u32 = 0xFFFF_FFFF;

/// Major version of the parameter structures understood by this crate.
pub const VERSION_MAJOR: u8 = 1;

/// Highest minor version of the parameter structures understood by this crate.
pub const VERSION_MINOR: u8 = 1;

/// The sync module provides the counting semaphore and event primitives.
pub mod sync;

/// The state module provides component states and the transition table.
pub mod state;

/// The command module provides the typed command records.
pub mod command;

/// The queue module provides the bounded command FIFO.
pub mod queue;

/// The port module provides port definitions, buffers and per-port state.
pub mod port;

/// The param module provides versioned parameter blocks.
pub mod param;

/// The driver module provides the codec driver interface.
pub mod driver;

/// The event module provides the caller notification interface.
pub mod event;

/// The supplier module provides buffer-supplier negotiation for tunnels.
pub mod supplier;

/// The config module provides component construction settings.
pub mod config;

/// The component module provides the public component handle.
pub mod component;

/// The registry module maps component names to codec driver factories.
pub mod registry;

mod transition;
mod worker;
