// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use omxbase::{
    event::{Completed, Event},
    port::BufferHeader,
    state::State,
};
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Install signal handler for graceful shutdown on Ctrl+C
///
/// Returns an Arc<AtomicBool> that will be set to true when SIGINT is received.
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}

/// Collects component events, setting returned buffers aside while waiting
/// for command outcomes.
pub struct EventLog {
    rx: Receiver<Event>,
    timeout: Duration,
    returned: Vec<BufferHeader>,
    errors: Vec<omxbase::Error>,
}

impl EventLog {
    pub fn new(rx: Receiver<Event>, timeout: Duration) -> Self {
        EventLog {
            rx,
            timeout,
            returned: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Waits for the completion of a state request.
    pub fn wait_state(&mut self, state: State) -> Result<(), CliError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.next(deadline)? {
                Event::CommandComplete(Completed::SetState(reached)) if reached == state => {
                    log::info!("reached {}", state);
                    return Ok(());
                }
                Event::CommandComplete(other) => {
                    log::debug!("completed {:?} while waiting for {}", other, state);
                }
                Event::Error(err) => {
                    self.errors.push(err);
                    return Err(err.into());
                }
                Event::BufferDone { buffer, .. } => self.returned.push(buffer),
            }
        }
    }

    /// Waits for the next returned buffer.
    pub fn wait_buffer(&mut self) -> Result<BufferHeader, CliError> {
        let deadline = Instant::now() + self.timeout;
        while self.returned.is_empty() {
            match self.next(deadline)? {
                Event::Error(err) => {
                    self.errors.push(err);
                    return Err(err.into());
                }
                event => log::debug!("ignoring {:?}", event),
            }
        }
        Ok(self.returned.remove(0))
    }

    /// Buffers returned so far and not yet handed out.
    pub fn take_returned(&mut self) -> Vec<BufferHeader> {
        std::mem::take(&mut self.returned)
    }

    /// Consumes whatever is already queued without waiting.
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.record(event);
        }
    }

    /// Consumes events until none arrives for `quiet`.
    pub fn drain_quiet(&mut self, quiet: Duration) {
        while let Ok(event) = self.rx.recv_timeout(quiet) {
            self.record(event);
        }
    }

    pub fn errors(&self) -> &[omxbase::Error] {
        &self.errors
    }

    fn next(&mut self, deadline: Instant) -> Result<Event, CliError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.rx.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CliError::Timeout(format!(
                        "no component event within {:.1}s",
                        self.timeout.as_secs_f64()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CliError::General("component event channel closed".into()))
                }
            };
            match event {
                Event::BufferDone { buffer, .. } => self.returned.push(buffer),
                event => return Ok(event),
            }
        }
    }

    fn record(&mut self, event: Event) {
        match event {
            Event::BufferDone { buffer, .. } => self.returned.push(buffer),
            Event::Error(err) => self.errors.push(err),
            Event::CommandComplete(completed) => log::debug!("completed {:?}", completed),
        }
    }
}
