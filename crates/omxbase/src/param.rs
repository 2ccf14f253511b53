// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Versioned parameter blocks for [`crate::component::Component::get_parameter`]
//! and [`crate::component::Component::set_parameter`].
//!
//! Every block starts with a [`ParamHeader`]. The header's size must match
//! the size of the block type and its version must be compatible with
//! [`VERSION_MAJOR`]/[`VERSION_MINOR`]; anything else is rejected before the
//! block is looked at.

use crate::{port::PortDefinition, supplier::SupplierRole, Error, VERSION_MAJOR, VERSION_MINOR};
use std::mem::size_of;

/// Two-part structure version. The revision and step bytes are carried for
/// completeness but never checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub step: u8,
}

impl Version {
    pub const CURRENT: Version = Version {
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
        revision: 2,
        step: 0,
    };

    pub const fn new(major: u8, minor: u8, revision: u8, step: u8) -> Self {
        Version {
            major,
            minor,
            revision,
            step,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::CURRENT
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.step
        )
    }
}

/// Size and version prefix of every parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHeader {
    pub size: u32,
    pub version: Version,
}

impl ParamHeader {
    /// Header describing a block of type `T` at the current version.
    pub fn of<T>() -> Self {
        ParamHeader {
            size: size_of::<T>() as u32,
            version: Version::CURRENT,
        }
    }

    /// Checks the header against the block type `T`.
    pub fn check<T>(&self) -> Result<(), Error> {
        check_size_version(self, size_of::<T>())
    }
}

/// Gatekeeper for externally supplied parameter blocks: the size must match
/// exactly, the major version must match and the minor version must not be
/// newer than this implementation.
pub fn check_size_version(header: &ParamHeader, size: usize) -> Result<(), Error> {
    if header.size as usize != size {
        return Err(Error::BadParameter);
    }
    log::trace!(
        "check_size_version: major {} minor {}",
        header.version.major,
        header.version.minor
    );
    if header.version.major != VERSION_MAJOR || header.version.minor > VERSION_MINOR {
        return Err(Error::VersionMismatch);
    }
    Ok(())
}

/// Number of ports and first port index of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInitParam {
    pub header: ParamHeader,
    pub ports: u32,
    pub start_port: u32,
}

impl Default for PortInitParam {
    fn default() -> Self {
        PortInitParam {
            header: ParamHeader::of::<PortInitParam>(),
            ports: 0,
            start_port: 0,
        }
    }
}

/// Resource-manager priority of the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityParam {
    pub header: ParamHeader,
    pub group_id: u32,
    pub group_priority: u32,
}

impl PriorityParam {
    pub fn new(group_id: u32, group_priority: u32) -> Self {
        PriorityParam {
            header: ParamHeader::of::<PriorityParam>(),
            group_id,
            group_priority,
        }
    }
}

impl Default for PriorityParam {
    fn default() -> Self {
        PriorityParam::new(0, 0)
    }
}

/// Buffer supplier preference of a tunneled port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSupplierParam {
    pub header: ParamHeader,
    pub port: u32,
    pub supplier: SupplierRole,
}

impl BufferSupplierParam {
    pub fn new(port: u32, supplier: SupplierRole) -> Self {
        BufferSupplierParam {
            header: ParamHeader::of::<BufferSupplierParam>(),
            port,
            supplier,
        }
    }
}

/// Parameter blocks understood by the component base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    PortInit(PortInitParam),
    PortDefinition(PortDefinition),
    Priority(PriorityParam),
    BufferSupplier(BufferSupplierParam),
}

impl Param {
    /// Validates the block's header against its own type.
    pub fn check_header(&self) -> Result<(), Error> {
        match self {
            Param::PortInit(p) => p.header.check::<PortInitParam>(),
            Param::PortDefinition(p) => p.header.check::<PortDefinition>(),
            Param::Priority(p) => p.header.check::<PriorityParam>(),
            Param::BufferSupplier(p) => p.header.check::<BufferSupplierParam>(),
        }
    }
}
