// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! The public component handle.
//!
//! A [`Component`] validates every command synchronously against its current
//! state, performs the cheap part of the transition on the caller's thread
//! and hands the rest to its worker thread. The worker reports the outcome of
//! each command through the component's [`EventHandler`].

use crate::{
    command::{Command, Mark, PortIndex},
    config::ComponentConfig,
    driver::{CodecDriver, IdleResources},
    event::{Event, EventHandler},
    param::{Param, PriorityParam, Version},
    port::{BufferHeader, Port, PortDefinition, PortDirection, PortState, Tunnel},
    queue::CommandQueue,
    state::{State, TransientState},
    supplier::{self, SupplierRole, TunnelPeer},
    transition, worker, Error,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Weak,
    },
    thread::JoinHandle,
    time::Duration,
};

/// Version of this component base implementation.
pub const COMPONENT_VERSION: Version = Version::new(1, 0, 0, 0);

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

/// State bookkeeping shared between callers and the worker.
#[derive(Debug)]
pub(crate) struct StateCell {
    /// authoritative state, written only by the worker
    pub(crate) current: State,
    /// edge being executed, if any
    pub(crate) transient: Option<TransientState>,
    /// state commands accepted and not yet finished by the worker
    pub(crate) pending_transitions: usize,
}

pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) ports: Vec<Port>,
    pub(crate) state: Mutex<StateCell>,
    pub(crate) queue: CommandQueue,
    pub(crate) handler: Mutex<Arc<dyn EventHandler>>,
    pub(crate) resources: Mutex<Option<IdleResources>>,
    pub(crate) priority: Mutex<PriorityParam>,
    pub(crate) abend: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    abend_tx: Sender<()>,
    abend_rx: Receiver<()>,
    abend_timeout: Duration,
}

impl Shared {
    /// True once abnormal termination or destruction has begun.
    pub(crate) fn cancelled(&self) -> bool {
        self.abend.load(Ordering::SeqCst) || self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn current_state(&self) -> State {
        self.state.lock().current
    }

    /// Delivers `event` without holding any component lock.
    pub(crate) fn emit(&self, event: Event) {
        let handler = Arc::clone(&self.handler.lock());
        handler.on_event(event);
    }

    /// Accounts for a state command the worker finished or that was dropped.
    pub(crate) fn finish_transition(&self) {
        let mut cell = self.state.lock();
        cell.pending_transitions = cell.pending_transitions.saturating_sub(1);
    }

    pub(crate) fn signal_abend_done(&self) {
        if self.abend_tx.try_send(()).is_err() {
            log::trace!("[{}] abend rendezvous already signalled", self.name);
        }
    }

    fn port(&self, index: u32) -> Result<&Port, Error> {
        self.ports.get(index as usize).ok_or(Error::BadPortIndex)
    }
}

/// Identification returned by [`Component::component_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    pub name: String,
    pub component: Version,
    pub spec: Version,
    /// Unique per instance: instance address, process id and a sequence
    /// number.
    pub uuid: [u8; 16],
}

/// A codec component with its own worker thread.
///
/// Dropping the last handle stops the worker: any blocked resource wait is
/// released, the codec driver is torn down and the thread is joined.
pub struct Component {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    uuid: [u8; 16],
}

impl Component {
    /// Builds a component in [`State::Loaded`] and starts its worker.
    pub fn new(
        name: &str,
        config: ComponentConfig,
        driver: Box<dyn CodecDriver>,
        handler: impl EventHandler + 'static,
    ) -> Result<Arc<Component>, Error> {
        if name.is_empty() {
            return Err(Error::BadParameter);
        }
        config.validate()?;

        let ports = config
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| Port::new(index as u32, port))
            .collect::<Vec<_>>();
        let (abend_tx, abend_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared {
            name: name.to_owned(),
            ports,
            state: Mutex::new(StateCell {
                current: State::Loaded,
                transient: None,
                pending_transitions: 0,
            }),
            queue: CommandQueue::with_capacity(config.queue_capacity())?,
            handler: Mutex::new(Arc::new(handler)),
            resources: Mutex::new(None),
            priority: Mutex::new(PriorityParam::default()),
            abend: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            abend_tx,
            abend_rx,
            abend_timeout: config.abend_timeout(),
        });

        let worker = worker::spawn(Arc::clone(&shared), driver)?;
        let uuid = instance_uuid(Arc::as_ptr(&shared) as usize);
        log::info!(
            "[{}] created with {} ports",
            shared.name,
            shared.ports.len()
        );

        Ok(Arc::new(Component {
            shared,
            worker: Some(worker),
            uuid,
        }))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn num_ports(&self) -> usize {
        self.shared.ports.len()
    }

    /// Number of commands accepted but not yet taken by the worker.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }

    /// Validates `command`, performs its synchronous part and queues it.
    ///
    /// On error nothing is queued and no callback will follow. On success
    /// exactly one [`Event::CommandComplete`] or [`Event::Error`] is
    /// delivered once the worker has processed the command.
    pub fn send_command(&self, command: Command) -> Result<(), Error> {
        let shared = &self.shared;
        let mut cell = shared.state.lock();
        if shared.queue.len() >= shared.queue.capacity() {
            log::warn!("[{}] command queue full", shared.name);
            return Err(Error::InsufficientResources);
        }

        match &command {
            Command::SetState(dest) => {
                cell.current.check_transition(*dest)?;
                shared.queue.submit(command.clone())?;
                // with another edge still in flight the worker prepares this
                // one when it gets to it
                if cell.pending_transitions == 0 {
                    transition::prepare(&mut cell, &shared.ports, *dest, true);
                }
                cell.pending_transitions += 1;
            }
            Command::Flush(index) => {
                check_not_invalid(&cell)?;
                if !matches!(cell.current, State::Executing | State::Pause) {
                    return Err(Error::IncorrectStateOperation);
                }
                let targets = index.resolve(shared.ports.len())?;
                for &i in &targets {
                    if !shared.ports[i].record.lock().target_enabled {
                        return Err(Error::IncorrectStateOperation);
                    }
                }
                for &i in &targets {
                    let mut record = shared.ports[i].record.lock();
                    if record.state != PortState::FlushingForDisable {
                        record.state = PortState::Flushing;
                    }
                }
                shared.queue.submit(command.clone())?;
            }
            Command::PortEnable(index) | Command::PortDisable(index) => {
                check_not_invalid(&cell)?;
                let enable = matches!(command, Command::PortEnable(_));
                let targets = index.resolve(shared.ports.len())?;
                for &i in &targets {
                    if shared.ports[i].record.lock().target_enabled == enable {
                        return Err(Error::IncorrectStateOperation);
                    }
                }
                let configurable = cell.current.is_configurable();
                for &i in &targets {
                    let mut record = shared.ports[i].record.lock();
                    record.target_enabled = enable;
                    if !configurable {
                        record.state = if enable {
                            PortState::Enabling
                        } else {
                            PortState::Disabling
                        };
                    }
                }
                shared.queue.submit(command.clone())?;
            }
            Command::MarkBuffer(port, _) => {
                check_not_invalid(&cell)?;
                shared.port(*port)?;
                if !matches!(cell.current, State::Executing | State::Pause) {
                    return Err(Error::IncorrectStateOperation);
                }
                shared.queue.submit(command.clone())?;
            }
            Command::Deinit => return Err(Error::BadParameter),
        }

        log::info!("[{}] accepted {:?}", shared.name, command);
        Ok(())
    }

    pub fn request_state(&self, state: State) -> Result<(), Error> {
        self.send_command(Command::SetState(state))
    }

    pub fn flush(&self, port: impl Into<PortIndex>) -> Result<(), Error> {
        self.send_command(Command::Flush(port.into()))
    }

    pub fn enable_port(&self, port: impl Into<PortIndex>) -> Result<(), Error> {
        self.send_command(Command::PortEnable(port.into()))
    }

    pub fn disable_port(&self, port: impl Into<PortIndex>) -> Result<(), Error> {
        self.send_command(Command::PortDisable(port.into()))
    }

    pub fn mark_buffer(&self, port: u32, mark: Mark) -> Result<(), Error> {
        self.send_command(Command::MarkBuffer(port, mark))
    }

    pub fn current_state(&self) -> State {
        self.shared.current_state()
    }

    pub fn transient_state(&self) -> Option<TransientState> {
        self.shared.state.lock().transient
    }

    pub fn port_definition(&self, port: u32) -> Result<PortDefinition, Error> {
        Ok(self.shared.port(port)?.definition())
    }

    /// Sub-state of `port`.
    pub fn port_state(&self, port: u32) -> Result<PortState, Error> {
        Ok(self.shared.port(port)?.state())
    }

    /// Supplier role of a port. Only answered while the component is Loaded
    /// or WaitForResources.
    pub fn supplier_role(&self, port: u32) -> Result<SupplierRole, Error> {
        let current = self.current_state();
        if current == State::Invalid {
            return Err(Error::InvalidState);
        }
        if !current.is_configurable() {
            return Err(Error::IncorrectStateOperation);
        }
        let port = self.shared.port(port)?;
        let record = port.record.lock();
        Ok(supplier::role_of(&record))
    }

    pub fn get_parameter(&self, param: &mut Param) -> Result<(), Error> {
        if self.current_state() == State::Invalid {
            return Err(Error::InvalidState);
        }
        param.check_header()?;

        match param {
            Param::PortInit(init) => {
                init.ports = self.shared.ports.len() as u32;
                init.start_port = 0;
            }
            Param::PortDefinition(definition) => {
                let header = definition.header;
                *definition = self.shared.port(definition.index)?.definition();
                definition.header = header;
            }
            Param::Priority(priority) => {
                let header = priority.header;
                *priority = *self.shared.priority.lock();
                priority.header = header;
            }
            Param::BufferSupplier(request) => {
                request.supplier = self.supplier_role(request.port)?;
            }
        }
        Ok(())
    }

    pub fn set_parameter(&self, param: &Param) -> Result<(), Error> {
        let current = self.current_state();
        if current == State::Invalid {
            return Err(Error::InvalidState);
        }
        param.check_header()?;

        match param {
            Param::PortInit(_) => Err(Error::UnsupportedIndex),
            Param::PortDefinition(definition) => {
                let port = self.shared.port(definition.index)?;
                let mut record = port.record.lock();
                if !current.is_configurable() && record.definition.enabled {
                    return Err(Error::IncorrectStateOperation);
                }
                if definition.buffer_count_actual < record.definition.buffer_count_min {
                    return Err(Error::BadParameter);
                }
                record.definition.buffer_count_actual = definition.buffer_count_actual;
                record.definition.buffer_size = definition.buffer_size;
                record.definition.domain = definition.domain;
                log::debug!(
                    "[{}] port {} now {} x {} bytes",
                    self.shared.name,
                    definition.index,
                    definition.buffer_count_actual,
                    definition.buffer_size
                );
                Ok(())
            }
            Param::Priority(priority) => {
                if !current.is_configurable() {
                    return Err(Error::IncorrectStateOperation);
                }
                let mut stored = self.shared.priority.lock();
                stored.group_id = priority.group_id;
                stored.group_priority = priority.group_priority;
                Ok(())
            }
            Param::BufferSupplier(request) => {
                let port = self.shared.port(request.port)?;
                if !current.is_configurable() && port.is_enabled() {
                    return Err(Error::IncorrectStateOperation);
                }
                if let Some(forward) = supplier::apply(port, request.supplier)? {
                    forward.peer.set_buffer_supplier(&forward.param)?;
                }
                Ok(())
            }
        }
    }

    /// Replaces the event handler. Loaded only.
    pub fn set_callbacks(&self, handler: impl EventHandler + 'static) -> Result<(), Error> {
        match self.current_state() {
            State::Loaded => {
                *self.shared.handler.lock() = Arc::new(handler);
                Ok(())
            }
            State::Invalid => Err(Error::InvalidState),
            _ => Err(Error::IncorrectStateOperation),
        }
    }

    pub fn component_version(&self) -> ComponentVersion {
        ComponentVersion {
            name: self.shared.name.clone(),
            component: COMPONENT_VERSION,
            spec: Version::CURRENT,
            uuid: self.uuid,
        }
    }

    /// Assigns a caller-allocated buffer of `size` bytes to `port`.
    ///
    /// Allowed while the port is being populated: during Loaded -> Idle or
    /// while a port enable is pending.
    pub fn use_buffer(&self, port: u32, size: u32) -> Result<BufferHeader, Error> {
        if self.current_state() == State::Invalid {
            return Err(Error::InvalidState);
        }
        let buffer = self.shared.port(port)?.assign_buffer(size)?;
        log::debug!(
            "[{}] port {} assigned buffer {}",
            self.shared.name,
            port,
            buffer.id
        );
        Ok(buffer)
    }

    /// Releases a buffer obtained from [`Component::use_buffer`].
    pub fn free_buffer(&self, port: u32, id: u64) -> Result<(), Error> {
        self.shared.port(port)?.release_buffer(id)?;
        log::debug!("[{}] port {} freed buffer {}", self.shared.name, port, id);
        Ok(())
    }

    /// Hands a buffer to the codec driver through `port`'s queue.
    pub fn queue_buffer(&self, port: u32, mut buffer: BufferHeader) -> Result<(), Error> {
        match self.current_state() {
            State::Invalid => return Err(Error::InvalidState),
            state if !state.has_resources() => return Err(Error::IncorrectStateOperation),
            _ => {}
        }
        let index = port;
        let port = self.shared.port(index)?;
        if buffer.port != index {
            return Err(Error::BadParameter);
        }
        let sem = self
            .shared
            .resources
            .lock()
            .as_ref()
            .and_then(|resources| resources.sem(index as usize).cloned())
            .ok_or(Error::IncorrectStateOperation)?;

        {
            let mut record = port.record.lock();
            if !record.definition.enabled {
                return Err(Error::IncorrectStateOperation);
            }
            if !buffer.tunnel && !record.assigned.contains(&buffer.id) {
                return Err(Error::BadParameter);
            }
            if let Some(mark) = record.pending_mark.take() {
                buffer.mark = Some(mark);
            }
            port.queue.lock().push_back(buffer);
        }
        sem.post()
    }

    /// Connects `port` to `peer_port` of `peer`. Loaded (or disabled port)
    /// only. The output side of a tunnel starts as the buffer supplier.
    pub fn setup_tunnel(
        &self,
        port: u32,
        peer: &Arc<Component>,
        peer_port: u32,
    ) -> Result<(), Error> {
        let target = self.tunnel_port(port)?;
        if peer_port as usize >= peer.num_ports() {
            return Err(Error::BadPortIndex);
        }
        let weak: Weak<Component> = Arc::downgrade(peer);
        let weak: Weak<dyn TunnelPeer> = weak;
        let mut record = target.record.lock();
        record.tunnel = Some(Tunnel {
            peer: weak,
            peer_port,
        });
        record.supplier = record.definition.direction == PortDirection::Output;
        log::info!(
            "[{}] port {} tunneled to {}:{}",
            self.shared.name,
            port,
            peer.name(),
            peer_port
        );
        Ok(())
    }

    pub fn teardown_tunnel(&self, port: u32) -> Result<(), Error> {
        let target = self.tunnel_port(port)?;
        let mut record = target.record.lock();
        record.tunnel = None;
        record.supplier = false;
        Ok(())
    }

    fn tunnel_port(&self, port: u32) -> Result<&Port, Error> {
        let current = self.current_state();
        if current == State::Invalid {
            return Err(Error::InvalidState);
        }
        let target = self.shared.port(port)?;
        if !current.is_configurable() && target.is_enabled() {
            return Err(Error::IncorrectStateOperation);
        }
        Ok(target)
    }

    /// Forces the component into [`State::Invalid`] on behalf of a caller
    /// that is giving up on it, releasing any blocked resource wait.
    ///
    /// Returns [`Error::Timeout`] when the worker did not confirm within the
    /// configured abend timeout.
    pub fn abnormal_termination(&self) -> Result<(), Error> {
        let shared = &self.shared;
        log::warn!("[{}] abnormal termination", shared.name);

        let mut drained_state_request = false;
        for command in shared.queue.drain() {
            if command != Command::Deinit {
                log::debug!("[{}] dropping {:?}", shared.name, command);
                if matches!(command, Command::SetState(_)) {
                    drained_state_request = true;
                    shared.finish_transition();
                }
                shared.emit(Event::Error(Error::InvalidState));
            }
        }
        // the worker commits Loaded -> Idle under the state lock after
        // checking this flag, so the transient read below cannot go stale
        shared.abend.store(true, Ordering::SeqCst);

        let (current, transient) = {
            let cell = shared.state.lock();
            (cell.current, cell.transient)
        };
        for port in &shared.ports {
            let state = port.state();
            if transient == Some(TransientState::LoadedToIdle)
                || matches!(state, PortState::Invalid | PortState::Enabling)
            {
                post_quietly(&shared.name, port, &port.loaded_resource);
            }
            if transient == Some(TransientState::IdleToLoaded)
                || matches!(
                    state,
                    PortState::Invalid | PortState::Disabling | PortState::FlushingForDisable
                )
            {
                post_quietly(&shared.name, port, &port.unloaded_resource);
            }
        }

        if current == State::Invalid {
            while shared.abend_rx.try_recv().is_ok() {}
            return Ok(());
        }

        // a worker blocked in Loaded -> Idle confirms on its own; the Idle
        // request may also have been drained before the worker took it
        if transient != Some(TransientState::LoadedToIdle) || drained_state_request {
            let mut cell = shared.state.lock();
            shared.queue.submit(Command::SetState(State::Invalid))?;
            cell.pending_transitions += 1;
        }

        let result = match shared.abend_rx.recv_timeout(shared.abend_timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[{}] abend not confirmed within {:?}",
                    shared.name,
                    shared.abend_timeout
                );
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Undefined),
        };
        while shared.abend_rx.try_recv().is_ok() {}
        result
    }

    pub fn use_egl_image(&self) -> Result<BufferHeader, Error> {
        Err(Error::NotImplemented)
    }
}

impl TunnelPeer for Component {
    fn set_buffer_supplier(&self, param: &crate::param::BufferSupplierParam) -> Result<(), Error> {
        self.set_parameter(&Param::BufferSupplier(*param))
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        let shared = &self.shared;
        log::info!("[{}] destroying", shared.name);

        if shared.queue.submit(Command::Deinit).is_err() {
            for command in shared.queue.drain() {
                log::debug!("[{}] dropping {:?}", shared.name, command);
                shared.emit(Event::Error(Error::InvalidState));
            }
            if let Err(err) = shared.queue.submit(Command::Deinit) {
                log::error!("[{}] cannot stop worker: {}", shared.name, err);
            }
        }

        shared.shutdown.store(true, Ordering::SeqCst);
        for port in &shared.ports {
            post_quietly(&shared.name, port, &port.loaded_resource);
            post_quietly(&shared.name, port, &port.unloaded_resource);
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("[{}] worker panicked", shared.name);
            }
        }
    }
}

/// Connects an output port of `output` to an input port of `input` in both
/// directions.
pub fn connect(
    output: &Arc<Component>,
    output_port: u32,
    input: &Arc<Component>,
    input_port: u32,
) -> Result<(), Error> {
    if output.port_definition(output_port)?.direction != PortDirection::Output
        || input.port_definition(input_port)?.direction != PortDirection::Input
    {
        return Err(Error::BadParameter);
    }
    output.setup_tunnel(output_port, input, input_port)?;
    if let Err(err) = input.setup_tunnel(input_port, output, output_port) {
        output.teardown_tunnel(output_port)?;
        return Err(err);
    }
    Ok(())
}

fn check_not_invalid(cell: &StateCell) -> Result<(), Error> {
    if cell.current == State::Invalid {
        return Err(Error::InvalidState);
    }
    Ok(())
}

fn post_quietly(name: &str, port: &Port, sem: &crate::sync::Semaphore) {
    if let Err(err) = sem.post() {
        log::debug!("[{}] port {} post failed: {}", name, port.index, err);
    }
}

fn instance_uuid(address: usize) -> [u8; 16] {
    let mut uuid = [0u8; 16];
    uuid[..8].copy_from_slice(&(address as u64).to_le_bytes());
    uuid[8..12].copy_from_slice(&std::process::id().to_le_bytes());
    let sequence = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    uuid[12..].copy_from_slice(&sequence.to_le_bytes());
    uuid
}
