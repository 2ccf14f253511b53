// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Component registry.
//!
//! Maps component names to the roles they implement, their default port
//! layout and a factory for their codec driver. A registry is built once at
//! process start and passed to whatever creates components.

use crate::{
    component::Component,
    config::{ComponentConfig, PortConfig},
    driver::CodecDriver,
    event::EventHandler,
    Error,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Longest accepted component or role name, in bytes, including room for a
/// terminator on the wire.
pub const MAX_NAME_LEN: usize = 128;

type DriverFactory = Box<dyn Fn() -> Box<dyn CodecDriver> + Send + Sync>;

struct Entry {
    roles: Vec<String>,
    ports: Vec<PortConfig>,
    factory: DriverFactory,
}

#[derive(Default)]
pub struct ComponentRegistry {
    entries: BTreeMap<String, Entry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        ComponentRegistry::default()
    }

    /// Registers a component. Names must be unique, non-empty and shorter
    /// than [`MAX_NAME_LEN`].
    pub fn register<F>(
        &mut self,
        name: &str,
        roles: &[&str],
        ports: Vec<PortConfig>,
        factory: F,
    ) -> Result<(), Error>
    where
        F: Fn() -> Box<dyn CodecDriver> + Send + Sync + 'static,
    {
        if !valid_name(name) || !roles.iter().all(|role| valid_name(role)) {
            return Err(Error::BadParameter);
        }
        if self.entries.contains_key(name) {
            return Err(Error::BadParameter);
        }
        log::debug!("registered {} ({} roles)", name, roles.len());
        self.entries.insert(
            name.to_owned(),
            Entry {
                roles: roles.iter().map(|role| (*role).to_owned()).collect(),
                ports,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn roles(&self, name: &str) -> Result<&[String], Error> {
        self.entries
            .get(name)
            .map(|entry| entry.roles.as_slice())
            .ok_or(Error::ComponentNotFound)
    }

    /// Default port layout of a registered component.
    pub fn ports(&self, name: &str) -> Result<&[PortConfig], Error> {
        self.entries
            .get(name)
            .map(|entry| entry.ports.as_slice())
            .ok_or(Error::ComponentNotFound)
    }

    pub fn components_for_role(&self, role: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.roles.iter().any(|r| r == role))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Instantiates `name`. When `config` carries no ports the registered
    /// default layout is used.
    pub fn create(
        &self,
        name: &str,
        config: ComponentConfig,
        handler: impl EventHandler + 'static,
    ) -> Result<Arc<Component>, Error> {
        let entry = self.entries.get(name).ok_or_else(|| {
            log::warn!("no component named {}", name);
            Error::ComponentNotFound
        })?;
        let config = if config.ports().is_empty() {
            config.with_ports(entry.ports.clone())
        } else {
            config
        };
        Component::new(name, config, (entry.factory)(), handler)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, entry)| (name, &entry.roles)),
            )
            .finish()
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() < MAX_NAME_LEN
}
