// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    port::{PortDirection, PortDomain},
    queue::DEFAULT_CAPACITY,
    Error,
};
use std::time::Duration;

/// Environment variable overriding [`ComponentConfig::queue_capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "OMXBASE_QUEUE_CAPACITY";

/// Environment variable overriding [`ComponentConfig::abend_timeout`], in
/// milliseconds.
pub const ENV_ABEND_TIMEOUT_MS: &str = "OMXBASE_ABEND_TIMEOUT_MS";

/// Default bound on the abnormal-termination wait.
pub const DEFAULT_ABEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Initial configuration of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub direction: PortDirection,
    pub domain: PortDomain,
    pub buffer_count_min: u32,
    pub buffer_count_actual: u32,
    pub buffer_size: u32,
    pub enabled: bool,
}

impl PortConfig {
    pub fn input(buffer_count: u32, buffer_size: u32) -> Self {
        PortConfig {
            direction: PortDirection::Input,
            domain: PortDomain::default(),
            buffer_count_min: buffer_count,
            buffer_count_actual: buffer_count,
            buffer_size,
            enabled: true,
        }
    }

    pub fn output(buffer_count: u32, buffer_size: u32) -> Self {
        PortConfig {
            direction: PortDirection::Output,
            ..PortConfig::input(buffer_count, buffer_size)
        }
    }

    pub fn with_domain(self, domain: PortDomain) -> PortConfig {
        PortConfig { domain, ..self }
    }

    pub fn with_enabled(self, enabled: bool) -> PortConfig {
        PortConfig { enabled, ..self }
    }

    pub fn with_buffer_count_actual(self, buffer_count_actual: u32) -> PortConfig {
        PortConfig {
            buffer_count_actual,
            ..self
        }
    }
}

/// Settings used when constructing a [`crate::component::Component`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentConfig {
    /// ports, in index order
    ports: Vec<PortConfig>,

    /// maximum number of pending commands
    queue_capacity: usize,

    /// bound on the abnormal-termination wait
    abend_timeout: Duration,
}

impl ComponentConfig {
    /// Defaults overridden by `OMXBASE_QUEUE_CAPACITY` and
    /// `OMXBASE_ABEND_TIMEOUT_MS` when they are set and parse.
    pub fn from_env() -> ComponentConfig {
        let mut config = ComponentConfig::default();
        if let Ok(value) = std::env::var(ENV_QUEUE_CAPACITY) {
            match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.queue_capacity = capacity,
                _ => log::warn!("ignoring {}={:?}", ENV_QUEUE_CAPACITY, value),
            }
        }
        if let Ok(value) = std::env::var(ENV_ABEND_TIMEOUT_MS) {
            match value.parse::<u64>() {
                Ok(ms) => config.abend_timeout = Duration::from_millis(ms),
                Err(_) => log::warn!("ignoring {}={:?}", ENV_ABEND_TIMEOUT_MS, value),
            }
        }
        config
    }

    pub fn with_port(self, port: PortConfig) -> ComponentConfig {
        let mut ports = self.ports;
        ports.push(port);
        ComponentConfig { ports, ..self }
    }

    pub fn with_ports(self, ports: Vec<PortConfig>) -> ComponentConfig {
        ComponentConfig { ports, ..self }
    }

    pub fn with_queue_capacity(self, queue_capacity: usize) -> ComponentConfig {
        ComponentConfig {
            queue_capacity,
            ..self
        }
    }

    pub fn with_abend_timeout(self, abend_timeout: Duration) -> ComponentConfig {
        ComponentConfig {
            abend_timeout,
            ..self
        }
    }

    pub fn ports(&self) -> &[PortConfig] {
        &self.ports
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn abend_timeout(&self) -> Duration {
        self.abend_timeout
    }

    /// Rejects configurations a component cannot be built from.
    pub fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 {
            return Err(Error::BadParameter);
        }
        for port in &self.ports {
            if port.buffer_count_actual < port.buffer_count_min {
                return Err(Error::BadParameter);
            }
        }
        Ok(())
    }
}

impl Default for ComponentConfig {
    fn default() -> ComponentConfig {
        ComponentConfig {
            ports: Vec::new(),
            queue_capacity: DEFAULT_CAPACITY,
            abend_timeout: DEFAULT_ABEND_TIMEOUT,
        }
    }
}
