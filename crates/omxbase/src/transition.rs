// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Worker-side execution of state edges and port commands.
//!
//! Lock order: state cell, then idle resources, then port record, then port
//! queue. The state cell is never held across a driver call, a resource
//! wait or an event callback.

use crate::{
    command::{Mark, PortIndex},
    component::StateCell,
    driver::IdleResources,
    event::Event,
    port::{BufferHeader, Port, PortState},
    state::{State, TransientState},
    sync::{Event as Gate, Semaphore},
    worker::Worker,
    Error,
};
use std::sync::Arc;

/// Synchronous part of a state edge from `cell.current` to `dest`: marks
/// port sub-states and records the transient state. The caller runs it when
/// no other state command is pending; the worker runs it again on dispatch
/// with `from_caller` false, which skips the steps that are not idempotent.
pub(crate) fn prepare(cell: &mut StateCell, ports: &[Port], dest: State, from_caller: bool) {
    let from = cell.current;
    match (from, dest) {
        (State::Loaded | State::WaitForResources, State::Idle) => {
            for port in ports {
                port.set_state(PortState::Enabling);
            }
        }
        (State::Idle, State::Loaded) => {
            for port in ports {
                port.set_state(PortState::Disabling);
            }
        }
        (State::Executing, State::Idle) if from_caller => {
            // a port enable still waiting for buffers cannot complete once
            // the component stops executing
            for port in ports {
                let mut record = port.record.lock();
                if record.state == PortState::Enabling
                    && record.target_enabled
                    && !record.definition.enabled
                {
                    record.enable_aborted = true;
                    drop(record);
                    if let Err(err) = port.loaded_resource.post() {
                        log::debug!("port {} abort post failed: {}", port.index, err);
                    }
                }
            }
        }
        (_, State::Invalid) => {
            for port in ports {
                port.set_state(PortState::Invalid);
            }
        }
        _ => {}
    }
    cell.transient = TransientState::for_edge(from, dest);
}

impl Worker {
    /// Runs the state edge to `dest`. Any error other than a failed
    /// validation leaves the component Invalid.
    pub(crate) fn apply_transition(&mut self, dest: State) -> Result<(), Error> {
        let from = {
            let mut cell = self.shared.state.lock();
            if let Err(err) = cell.current.check_transition(dest) {
                cell.transient = None;
                return Err(err);
            }
            prepare(&mut cell, &self.shared.ports, dest, false);
            cell.current
        };
        log::info!("[{}] {} -> {}", self.shared.name, from, dest);

        match (from, dest) {
            (_, State::Invalid) => {
                self.enter_invalid();
                return Ok(());
            }
            (State::Loaded | State::WaitForResources, State::Idle) => self.load_to_idle()?,
            (State::Idle, State::Loaded) => self.idle_to_loaded()?,
            (State::Idle, State::Executing) => self.start()?,
            (State::Executing | State::Pause, State::Idle) => self.stop()?,
            (State::Idle | State::Executing, State::Pause) => self.pause()?,
            (State::Pause, State::Executing) => self.resume()?,
            (State::Loaded, State::WaitForResources) => {}
            _ => return Err(Error::IncorrectStateTransition),
        }

        let mut cell = self.shared.state.lock();
        let loading =
            matches!(from, State::Loaded | State::WaitForResources) && dest == State::Idle;
        if loading && self.shared.cancelled() {
            // abnormal termination saw the edge in flight and is waiting for
            // this worker to confirm
            drop(cell);
            return self.cancel();
        }
        cell.current = dest;
        cell.transient = None;
        Ok(())
    }

    /// Moves the component to Invalid, releasing everything it holds.
    pub(crate) fn enter_invalid(&mut self) {
        {
            let mut cell = self.shared.state.lock();
            cell.current = State::Invalid;
            cell.transient = None;
        }
        self.release_idle_resources();
        self.terminate_driver();
        for port in &self.shared.ports {
            if port.record.lock().is_tunnel_supplier() {
                port.free_tunnel_buffers();
            }
            port.set_state(PortState::Invalid);
        }
        self.shared.signal_abend_done();
    }

    pub(crate) fn release_idle_resources(&mut self) {
        let resources = self.shared.resources.lock().take();
        if let Some(resources) = resources {
            if let Err(err) = self.driver.buffer_process_terminate() {
                log::error!("[{}] buffer_process_terminate: {}", self.shared.name, err);
            }
            drop(resources);
            log::debug!("[{}] idle resources released", self.shared.name);
        }
    }

    /// Blocks on a port resource semaphore. Abnormal termination and
    /// destruction both post the semaphore; the component then goes Invalid
    /// and the wait reports [`Error::InvalidState`].
    fn wait_resource(&mut self, port: usize, sem: Resource) -> Result<(), Error> {
        if !self.shared.cancelled() {
            let port = &self.shared.ports[port];
            let sem = match sem {
                Resource::Loaded => &port.loaded_resource,
                Resource::Unloaded => &port.unloaded_resource,
            };
            sem.wait()?;
        }
        if self.shared.cancelled() {
            log::warn!(
                "[{}] port {} wait cancelled",
                self.shared.name,
                self.shared.ports[port].index
            );
            return self.cancel();
        }
        Ok(())
    }

    /// Abandons the edge in progress after abnormal termination or
    /// destruction began.
    fn cancel(&mut self) -> Result<(), Error> {
        log::warn!("[{}] transition cancelled", self.shared.name);
        self.enter_invalid();
        Err(Error::InvalidState)
    }

    /// Flush and mark need Executing or Pause; a state command queued ahead
    /// of them may have moved the component on.
    fn require_running(&self) -> Result<(), Error> {
        match self.shared.current_state() {
            State::Executing | State::Pause => Ok(()),
            _ => Err(Error::IncorrectStateOperation),
        }
    }

    fn idle_handles(&self) -> Result<(Arc<Gate>, Vec<Arc<Semaphore>>), Error> {
        let resources = self.shared.resources.lock();
        let resources = resources.as_ref().ok_or(Error::Undefined)?;
        Ok((Arc::clone(&resources.gate), resources.sems.clone()))
    }

    fn load_to_idle(&mut self) -> Result<(), Error> {
        let mut waited = Vec::new();
        for i in 0..self.shared.ports.len() {
            let port = &self.shared.ports[i];
            let (enabled, supplier, count) = {
                let record = port.record.lock();
                (
                    record.definition.enabled,
                    record.is_tunnel_supplier(),
                    record.definition.buffer_count_actual,
                )
            };
            if !enabled {
                continue;
            }
            if supplier {
                let allocated = port.allocate_tunnel_buffers();
                log::debug!(
                    "[{}] port {} allocated {} tunnel buffers",
                    self.shared.name,
                    port.index,
                    allocated
                );
                continue;
            }
            if count > 0 {
                log::debug!("[{}] port {} waiting for buffers", self.shared.name, i);
                self.wait_resource(i, Resource::Loaded)?;
                waited.push(i);
            }
        }

        if self.shared.cancelled() {
            return self.cancel();
        }

        if let Err(err) = self.driver.init() {
            log::error!("[{}] driver init: {}", self.shared.name, err);
            self.enter_invalid();
            return Err(Error::InsufficientResources);
        }
        self.driver_ready = true;

        let resources = IdleResources::new(&self.shared.ports);
        let handler = Arc::clone(&self.shared.handler.lock());
        let ctx = resources.context(&self.shared.ports, handler);
        if let Err(err) = self.driver.buffer_process_create(ctx) {
            log::error!("[{}] buffer_process_create: {}", self.shared.name, err);
            drop(resources);
            self.enter_invalid();
            return Err(Error::InsufficientResources);
        }
        *self.shared.resources.lock() = Some(resources);

        for &i in &waited {
            let port = &self.shared.ports[i];
            port.loaded_resource.set_count(0);
            port.unloaded_resource.set_count(0);
        }
        for port in &self.shared.ports {
            let mut record = port.record.lock();
            record.state = if record.definition.enabled {
                PortState::Idle
            } else if record.state == PortState::Enabling && record.target_enabled {
                PortState::Enabling
            } else {
                PortState::Loaded
            };
        }
        Ok(())
    }

    fn idle_to_loaded(&mut self) -> Result<(), Error> {
        self.release_idle_resources();
        self.terminate_driver();

        for i in 0..self.shared.ports.len() {
            let port = &self.shared.ports[i];
            let (enabled, supplier, assigned) = {
                let record = port.record.lock();
                (
                    record.definition.enabled,
                    record.is_tunnel_supplier(),
                    record.assigned.len(),
                )
            };
            if supplier {
                port.free_tunnel_buffers();
            } else if enabled && assigned > 0 {
                log::debug!("[{}] port {} waiting for buffers back", self.shared.name, i);
                self.wait_resource(i, Resource::Unloaded)?;
            }
            let port = &self.shared.ports[i];
            port.drain_queue();
            port.unloaded_resource.set_count(0);
            port.set_state(PortState::Loaded);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), Error> {
        let (gate, sems) = self.idle_handles()?;
        for (port, sem) in self.shared.ports.iter().zip(&sems) {
            let tunnel_buffers = {
                let record = port.record.lock();
                if record.definition.enabled && record.is_tunnel_supplier() {
                    record.tunnel_buffers
                } else {
                    0
                }
            };
            for _ in 0..tunnel_buffers {
                sem.post()?;
            }
        }
        gate.set();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        let (gate, sems) = self.idle_handles()?;
        gate.reset();
        for i in 0..self.shared.ports.len() {
            if self.shared.ports[i].is_enabled() {
                self.flush_port(i)?;
            }
        }
        for sem in &sems {
            sem.set_count(0);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Error> {
        let (gate, _) = self.idle_handles()?;
        gate.reset();
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Error> {
        let (gate, sems) = self.idle_handles()?;
        for (port, sem) in self.shared.ports.iter().zip(&sems) {
            let supplying = {
                let record = port.record.lock();
                record.definition.enabled && record.is_tunnel_supplier()
            };
            if supplying {
                top_up(sem, port.queued() as u32)?;
            }
        }
        gate.set();
        Ok(())
    }

    pub(crate) fn flush_ports(&mut self, index: PortIndex) -> Result<(), Error> {
        self.require_running()?;
        for i in index.resolve(self.shared.ports.len())? {
            self.flush_port(i)?;
            let port = &self.shared.ports[i];
            let mut record = port.record.lock();
            if record.state == PortState::Flushing {
                record.state = PortState::Idle;
            }
        }
        Ok(())
    }

    /// Returns every caller buffer queued on port `i`. Buffers of a tunnel
    /// this port supplies stay queued.
    fn flush_port(&mut self, i: usize) -> Result<(), Error> {
        let port = &self.shared.ports[i];
        let (returned, kept) = {
            let _record = port.record.lock();
            let mut queue = port.queue.lock();
            let (kept, returned): (Vec<BufferHeader>, Vec<BufferHeader>) =
                queue.drain(..).partition(|buffer| buffer.tunnel);
            let count = kept.len();
            queue.extend(kept);
            (returned, count)
        };

        let sem = self
            .shared
            .resources
            .lock()
            .as_ref()
            .and_then(|resources| resources.sem(i).cloned());
        if let Some(sem) = sem {
            sem.set_count(kept as u32);
        }

        log::debug!(
            "[{}] port {} flushed {} buffers",
            self.shared.name,
            i,
            returned.len()
        );
        for buffer in returned {
            self.shared.emit(Event::BufferDone {
                port: i as u32,
                buffer,
            });
        }
        self.driver.flush(i as u32)
    }

    pub(crate) fn enable_ports(&mut self, index: PortIndex) -> Result<(), Error> {
        let configurable = self.shared.current_state().is_configurable();
        for i in index.resolve(self.shared.ports.len())? {
            let port = &self.shared.ports[i];
            if configurable {
                let mut record = port.record.lock();
                record.definition.enabled = true;
                record.target_enabled = true;
            } else {
                let supplier = {
                    let mut record = port.record.lock();
                    record.state = PortState::Enabling;
                    record.is_tunnel_supplier()
                };
                if supplier {
                    port.allocate_tunnel_buffers();
                } else {
                    self.wait_resource(i, Resource::Loaded)?;
                }

                let port = &self.shared.ports[i];
                let mut record = port.record.lock();
                if record.enable_aborted {
                    record.enable_aborted = false;
                    record.target_enabled = false;
                    record.state = PortState::Loaded;
                    log::warn!("[{}] port {} enable aborted", self.shared.name, i);
                    return Err(Error::IncorrectStateOperation);
                }
                record.definition.enabled = true;
                record.state = PortState::Idle;
                drop(record);

                if supplier && self.shared.current_state() == State::Executing {
                    if let Ok((_, sems)) = self.idle_handles() {
                        sems[i].set_count(port.queued() as u32);
                    }
                }
            }
            self.driver.port_enabled(i as u32)?;
            log::debug!("[{}] port {} enabled", self.shared.name, i);
        }
        Ok(())
    }

    pub(crate) fn disable_ports(&mut self, index: PortIndex) -> Result<(), Error> {
        let configurable = self.shared.current_state().is_configurable();
        for i in index.resolve(self.shared.ports.len())? {
            if configurable {
                let mut record = self.shared.ports[i].record.lock();
                record.definition.enabled = false;
                record.target_enabled = false;
            } else {
                self.shared.ports[i].set_state(PortState::FlushingForDisable);
                self.flush_port(i)?;

                let port = &self.shared.ports[i];
                let (supplier, assigned) = {
                    let record = port.record.lock();
                    (record.is_tunnel_supplier(), record.assigned.len())
                };
                if supplier {
                    port.free_tunnel_buffers();
                } else if assigned > 0 {
                    self.wait_resource(i, Resource::Unloaded)?;
                }

                let port = &self.shared.ports[i];
                port.unloaded_resource.set_count(0);
                let mut record = port.record.lock();
                record.definition.enabled = false;
                record.state = PortState::Loaded;
            }
            self.driver.port_disabled(i as u32)?;
            log::debug!("[{}] port {} disabled", self.shared.name, i);
        }
        Ok(())
    }

    pub(crate) fn store_mark(&mut self, port: u32, mark: Mark) -> Result<(), Error> {
        self.require_running()?;
        let port = self
            .shared
            .ports
            .get(port as usize)
            .ok_or(Error::BadPortIndex)?;
        port.record.lock().pending_mark = Some(mark);
        Ok(())
    }
}

/// Posts `sem` until its count covers `queued` buffers. A count already at
/// or above `queued` is left alone.
fn top_up(sem: &Semaphore, queued: u32) -> Result<(), Error> {
    for _ in sem.count()..queued {
        sem.post()?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Resource {
    Loaded,
    Unloaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_up_posts_difference() {
        let sem = Semaphore::new(2);
        top_up(&sem, 5).unwrap();
        assert_eq!(sem.count(), 5);
    }

    #[test]
    fn test_top_up_keeps_higher_count() {
        let sem = Semaphore::new(4);
        top_up(&sem, 1).unwrap();
        assert_eq!(sem.count(), 4);
        top_up(&sem, 4).unwrap();
        assert_eq!(sem.count(), 4);
    }

    #[test]
    fn test_top_up_closed() {
        let sem = Semaphore::new(0);
        sem.close();
        assert_eq!(top_up(&sem, 1), Err(Error::InvalidState));
        top_up(&sem, 0).unwrap();
    }
}
