// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Buffer-supplier negotiation for tunneled ports.
//!
//! On a tunnel exactly one side allocates the buffers. The role is named by
//! the side of the connection that supplies (input or output), not by the
//! port asking, so a tunneled input port that does not supply reports
//! [`SupplierRole::Output`].

use crate::{
    param::BufferSupplierParam,
    port::{Port, PortDirection, PortRecord},
    Error,
};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupplierRole {
    #[default]
    Unspecified,
    Input,
    Output,
}

impl SupplierRole {
    fn side(direction: PortDirection) -> SupplierRole {
        match direction {
            PortDirection::Input => SupplierRole::Input,
            PortDirection::Output => SupplierRole::Output,
        }
    }
}

impl fmt::Display for SupplierRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SupplierRole::Unspecified => write!(f, "unspecified"),
            SupplierRole::Input => write!(f, "input"),
            SupplierRole::Output => write!(f, "output"),
        }
    }
}

/// The far end of a tunnel, receiving supplier requests forwarded by this
/// component.
pub trait TunnelPeer: Send + Sync {
    fn set_buffer_supplier(&self, param: &BufferSupplierParam) -> Result<(), Error>;
}

/// Current supplier role as seen from `record`'s port.
pub(crate) fn role_of(record: &PortRecord) -> SupplierRole {
    let own = SupplierRole::side(record.definition.direction);
    if record.is_tunnel_supplier() {
        own
    } else if record.is_tunneled() {
        match own {
            SupplierRole::Input => SupplierRole::Output,
            _ => SupplierRole::Input,
        }
    } else {
        SupplierRole::Unspecified
    }
}

/// A supplier request that must be repeated to the tunnel peer.
pub(crate) struct Forward {
    pub(crate) peer: Arc<dyn TunnelPeer>,
    pub(crate) param: BufferSupplierParam,
}

/// Applies `requested` to `port`. Returns the request to forward to the peer
/// when the local role changed; the caller forwards it after every lock of
/// this component has been released, since the peer answers by calling
/// back into this component.
pub(crate) fn apply(port: &Port, requested: SupplierRole) -> Result<Option<Forward>, Error> {
    if requested == SupplierRole::Unspecified {
        return Ok(None);
    }

    let mut record = port.record.lock();
    let Some(tunnel) = record.tunnel.as_ref() else {
        return Ok(None);
    };

    let wants_supplier = requested == SupplierRole::side(record.definition.direction);
    if wants_supplier == record.supplier {
        return Ok(None);
    }

    let peer = tunnel.peer.upgrade();
    let peer_port = tunnel.peer_port;
    record.supplier = wants_supplier;
    log::debug!(
        "port {} supplier role now {} (supplier: {})",
        port.index,
        requested,
        wants_supplier
    );

    match peer {
        Some(peer) => Ok(Some(Forward {
            peer,
            param: BufferSupplierParam::new(peer_port, requested),
        })),
        None => {
            log::warn!("port {} tunnel peer is gone", port.index);
            Ok(None)
        }
    }
}
