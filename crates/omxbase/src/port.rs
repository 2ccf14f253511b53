// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Ports, port definitions and buffer headers.
//!
//! A port's record lives behind its own mutex; its buffer queue behind a
//! second one shared with the codec driver's processing context. When both
//! are needed the record is locked first. No code path locks two ports at
//! once.

use crate::{
    command::Mark,
    config::PortConfig,
    param::ParamHeader,
    supplier::TunnelPeer,
    sync::Semaphore,
    Error,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

/// Direction of data flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortDomain {
    #[default]
    Audio,
    Video,
    Image,
    Other,
}

/// Port sub-state, tracking enable/disable/flush progress independently of
/// the component state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    Loaded,
    Idle,
    Enabling,
    Disabling,
    Flushing,
    FlushingForDisable,
    Invalid,
}

/// Read-only snapshot of a port's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    pub header: ParamHeader,
    pub index: u32,
    pub direction: PortDirection,
    pub domain: PortDomain,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: u32,
    pub enabled: bool,
    pub populated: bool,
}

impl PortDefinition {
    pub(crate) fn from_config(index: u32, config: &PortConfig) -> Self {
        PortDefinition {
            header: ParamHeader::of::<PortDefinition>(),
            index,
            direction: config.direction,
            domain: config.domain,
            buffer_count_actual: config.buffer_count_actual.max(config.buffer_count_min),
            buffer_count_min: config.buffer_count_min,
            buffer_size: config.buffer_size,
            enabled: config.enabled,
            populated: false,
        }
    }
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A buffer exchanged between the caller, the component and the codec
/// driver. The payload memory itself is owned elsewhere; the header only
/// carries bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHeader {
    pub id: u64,
    pub port: u32,
    pub alloc_len: u32,
    pub filled_len: u32,
    pub offset: u32,
    pub flags: u32,
    pub timestamp: i64,
    pub mark: Option<Mark>,
    /// Allocated by the component for a tunnel it supplies.
    pub tunnel: bool,
}

impl BufferHeader {
    pub(crate) fn new(port: u32, alloc_len: u32, tunnel: bool) -> Self {
        BufferHeader {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            port,
            alloc_len,
            filled_len: 0,
            offset: 0,
            flags: 0,
            timestamp: 0,
            mark: None,
            tunnel,
        }
    }
}

/// Tunnel link to a peer component's port.
pub(crate) struct Tunnel {
    pub(crate) peer: Weak<dyn TunnelPeer>,
    pub(crate) peer_port: u32,
}

pub(crate) struct PortRecord {
    pub(crate) definition: PortDefinition,
    pub(crate) state: PortState,
    pub(crate) tunnel: Option<Tunnel>,
    pub(crate) supplier: bool,
    pub(crate) assigned: Vec<u64>,
    pub(crate) tunnel_buffers: u32,
    pub(crate) pending_mark: Option<Mark>,
    /// Enablement once every accepted enable/disable command has run.
    pub(crate) target_enabled: bool,
    /// Set when a pending enable is cancelled by Executing -> Idle.
    pub(crate) enable_aborted: bool,
}

impl PortRecord {
    pub(crate) fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    pub(crate) fn is_tunnel_supplier(&self) -> bool {
        self.tunnel.is_some() && self.supplier
    }
}

pub(crate) type BufferQueue = Arc<Mutex<VecDeque<BufferHeader>>>;

pub(crate) struct Port {
    pub(crate) index: u32,
    pub(crate) record: Mutex<PortRecord>,
    pub(crate) queue: BufferQueue,
    /// Posted when the caller finishes assigning the port's buffers.
    pub(crate) loaded_resource: Semaphore,
    /// Posted when the caller has returned the last assigned buffer.
    pub(crate) unloaded_resource: Semaphore,
}

impl Port {
    pub(crate) fn new(index: u32, config: &PortConfig) -> Self {
        Port {
            index,
            record: Mutex::new(PortRecord {
                definition: PortDefinition::from_config(index, config),
                state: PortState::Loaded,
                tunnel: None,
                supplier: false,
                assigned: Vec::new(),
                tunnel_buffers: 0,
                pending_mark: None,
                target_enabled: config.enabled,
                enable_aborted: false,
            }),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            loaded_resource: Semaphore::new(0),
            unloaded_resource: Semaphore::new(0),
        }
    }

    pub(crate) fn definition(&self) -> PortDefinition {
        self.record.lock().definition
    }

    pub(crate) fn state(&self) -> PortState {
        self.record.lock().state
    }

    pub(crate) fn set_state(&self, state: PortState) {
        self.record.lock().state = state;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.record.lock().definition.enabled
    }

    /// Caller-side allocator: records a new buffer for this port and posts
    /// `loaded_resource` once the port holds its full complement.
    pub(crate) fn assign_buffer(&self, size: u32) -> Result<BufferHeader, Error> {
        let mut record = self.record.lock();
        if record.state != PortState::Enabling || !record.target_enabled {
            return Err(Error::IncorrectStateOperation);
        }
        if size < record.definition.buffer_size {
            return Err(Error::BadParameter);
        }
        if record.assigned.len() as u32 >= record.definition.buffer_count_actual {
            return Err(Error::BadParameter);
        }

        let buffer = BufferHeader::new(self.index, size, false);
        record.assigned.push(buffer.id);
        if record.assigned.len() as u32 == record.definition.buffer_count_actual {
            record.definition.populated = true;
            log::debug!("port {} populated", self.index);
            self.loaded_resource.post()?;
        }
        Ok(buffer)
    }

    /// Releases a buffer previously returned by [`Port::assign_buffer`];
    /// posts `unloaded_resource` when it was the last one.
    pub(crate) fn release_buffer(&self, id: u64) -> Result<(), Error> {
        let mut record = self.record.lock();
        let position = record
            .assigned
            .iter()
            .position(|assigned| *assigned == id)
            .ok_or(Error::BadParameter)?;
        record.assigned.swap_remove(position);
        record.definition.populated = false;
        self.queue.lock().retain(|buffer| buffer.id != id);
        if record.assigned.is_empty() {
            log::debug!("port {} unpopulated", self.index);
            self.unloaded_resource.post()?;
        }
        Ok(())
    }

    pub(crate) fn owns_buffer(&self, id: u64) -> bool {
        let record = self.record.lock();
        record.assigned.contains(&id)
    }

    /// Allocates the buffers of a tunnel this port supplies and places them
    /// on the queue, returning how many were created.
    pub(crate) fn allocate_tunnel_buffers(&self) -> u32 {
        let mut record = self.record.lock();
        let count = record.definition.buffer_count_actual;
        let size = record.definition.buffer_size;
        let mut queue = self.queue.lock();
        for _ in 0..count {
            queue.push_back(BufferHeader::new(self.index, size, true));
        }
        record.tunnel_buffers = count;
        record.definition.populated = true;
        count
    }

    pub(crate) fn free_tunnel_buffers(&self) {
        let mut record = self.record.lock();
        self.queue.lock().retain(|buffer| !buffer.tunnel);
        record.tunnel_buffers = 0;
        record.definition.populated = false;
    }

    /// Removes every queued buffer.
    pub(crate) fn drain_queue(&self) -> Vec<BufferHeader> {
        self.queue.lock().drain(..).collect()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}
