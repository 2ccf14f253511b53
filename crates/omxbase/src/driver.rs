// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Codec driver interface.
//!
//! A concrete codec plugs into the component base by implementing
//! [`CodecDriver`]. The component's worker thread owns the driver and calls
//! it on Idle entry and exit, on flush and on port enable/disable. Buffer
//! processing itself runs wherever the driver decides (usually its own
//! threads), fed through the [`ProcessingContext`] handed to
//! [`CodecDriver::buffer_process_create`].

use crate::{
    event::{Event, EventHandler},
    port::{BufferHeader, BufferQueue, Port},
    sync::{Event as Gate, Semaphore},
    Error,
};
use std::{sync::Arc, time::Duration};

/// Hooks implemented by a concrete codec.
///
/// Every method is called from the component's worker thread. An error from
/// `init` or `buffer_process_create` leaves the component in
/// [`crate::state::State::Invalid`] and is reported as
/// [`Error::InsufficientResources`].
pub trait CodecDriver: Send {
    /// Acquires codec resources on entry to Idle.
    fn init(&mut self) -> Result<(), Error>;

    /// Releases codec resources on exit from Idle.
    fn terminate(&mut self) -> Result<(), Error>;

    /// Starts buffer processing. The context stays valid until
    /// [`CodecDriver::buffer_process_terminate`] returns; after that every
    /// channel operation on it fails with [`Error::InvalidState`].
    fn buffer_process_create(&mut self, ctx: ProcessingContext) -> Result<(), Error>;

    /// Stops buffer processing. Threads started by `buffer_process_create`
    /// must be joined before this returns.
    fn buffer_process_terminate(&mut self) -> Result<(), Error>;

    /// Discards codec-internal state for `port` after its queue was flushed.
    fn flush(&mut self, _port: u32) -> Result<(), Error> {
        Ok(())
    }

    fn port_enabled(&mut self, _port: u32) -> Result<(), Error> {
        Ok(())
    }

    fn port_disabled(&mut self, _port: u32) -> Result<(), Error> {
        Ok(())
    }
}

/// Driver-side view of one port's buffer queue.
///
/// The semaphore counts buffers queued by the caller; taking a buffer waits
/// on it and then pops the queue head.
#[derive(Clone)]
pub struct PortChannel {
    index: u32,
    queue: BufferQueue,
    sem: Arc<Semaphore>,
}

impl PortChannel {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Waits up to `timeout` for a queued buffer. Returns `Ok(None)` on
    /// timeout, or when a flush emptied the queue after the wait succeeded.
    pub fn take(&self, timeout: Duration) -> Result<Option<BufferHeader>, Error> {
        if !self.sem.wait_timeout(timeout)? {
            return Ok(None);
        }
        Ok(self.queue.lock().pop_front())
    }

    pub fn try_take(&self) -> Result<Option<BufferHeader>, Error> {
        if !self.sem.try_wait()? {
            return Ok(None);
        }
        Ok(self.queue.lock().pop_front())
    }

    /// Number of buffers waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Everything buffer processing needs from the component: the per-port
/// channels, the pause gate and a way to hand buffers back to the caller.
#[derive(Clone)]
pub struct ProcessingContext {
    gate: Arc<Gate>,
    ports: Vec<PortChannel>,
    handler: Arc<dyn EventHandler>,
}

impl ProcessingContext {
    pub fn ports(&self) -> &[PortChannel] {
        &self.ports
    }

    pub fn port(&self, index: u32) -> Option<&PortChannel> {
        self.ports.get(index as usize)
    }

    /// True while the component is Executing.
    pub fn is_running(&self) -> bool {
        self.gate.is_set()
    }

    /// Waits until the component is Executing. Returns `Ok(false)` on
    /// timeout and [`Error::InvalidState`] once the component left Idle.
    pub fn wait_running(&self, timeout: Duration) -> Result<bool, Error> {
        self.gate.wait_timeout(timeout)
    }

    /// Returns a processed buffer to the caller.
    pub fn return_buffer(&self, buffer: BufferHeader) {
        self.handler.on_event(Event::BufferDone {
            port: buffer.port,
            buffer,
        });
    }

    /// Reports an asynchronous processing error to the caller.
    pub fn report_error(&self, error: Error) {
        self.handler.on_event(Event::Error(error));
    }
}

/// Per-port buffer semaphores and the pause gate. They exist only while the
/// component is in Idle, Executing or Pause; dropping them closes every
/// primitive so late users get an error instead of blocking forever.
pub(crate) struct IdleResources {
    pub(crate) gate: Arc<Gate>,
    pub(crate) sems: Vec<Arc<Semaphore>>,
}

impl IdleResources {
    pub(crate) fn new(ports: &[Port]) -> Self {
        IdleResources {
            gate: Arc::new(Gate::new()),
            sems: ports.iter().map(|_| Arc::new(Semaphore::new(0))).collect(),
        }
    }

    pub(crate) fn context(
        &self,
        ports: &[Port],
        handler: Arc<dyn EventHandler>,
    ) -> ProcessingContext {
        ProcessingContext {
            gate: Arc::clone(&self.gate),
            ports: ports
                .iter()
                .zip(&self.sems)
                .map(|(port, sem)| PortChannel {
                    index: port.index,
                    queue: Arc::clone(&port.queue),
                    sem: Arc::clone(sem),
                })
                .collect(),
            handler,
        }
    }

    pub(crate) fn sem(&self, port: usize) -> Option<&Arc<Semaphore>> {
        self.sems.get(port)
    }
}

impl Drop for IdleResources {
    fn drop(&mut self) {
        for sem in &self.sems {
            sem.close();
        }
        self.gate.close();
    }
}
