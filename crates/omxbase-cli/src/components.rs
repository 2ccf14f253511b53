// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::driver::LoopbackDriver;
use crate::error::CliError;
use clap::Args as ClapArgs;
use omxbase::{
    config::PortConfig,
    port::PortDomain,
    registry::ComponentRegistry,
};
use serde::Serialize;

pub const AVC_WFD_ENCODER: &str = "OMX.Exynos.AVC.WFD.Encoder";
pub const AVC_WFD_ENCODER_SECURE: &str = "OMX.Exynos.AVC.WFD.Encoder.secure";
pub const AVC_WFD_ENCODER_ROLE: &str = "video_encoder.avc-wfd";

/// Raw NV12 1920x1080 frame.
const FRAME_SIZE: u32 = 1920 * 1080 * 3 / 2;
/// Worst-case encoded access unit.
const STREAM_SIZE: u32 = 1024 * 1024;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Only list components implementing this role
    #[arg(short, long)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct ComponentInfo {
    name: String,
    roles: Vec<String>,
    ports: Vec<PortInfo>,
}

#[derive(Debug, Serialize)]
struct PortInfo {
    index: usize,
    direction: String,
    domain: String,
    buffers: u32,
    buffer_size: u32,
}

/// The components this tool can instantiate. Every one runs on the loopback
/// codec.
pub fn registry() -> Result<ComponentRegistry, CliError> {
    let mut registry = ComponentRegistry::new();
    let layout = || {
        vec![
            PortConfig::input(4, FRAME_SIZE).with_domain(PortDomain::Video),
            PortConfig::output(4, STREAM_SIZE).with_domain(PortDomain::Video),
        ]
    };
    registry.register(AVC_WFD_ENCODER, &[AVC_WFD_ENCODER_ROLE], layout(), || {
        Box::new(LoopbackDriver::new(0, 1))
    })?;
    registry.register(
        AVC_WFD_ENCODER_SECURE,
        &[AVC_WFD_ENCODER_ROLE],
        layout(),
        || Box::new(LoopbackDriver::new(0, 1)),
    )?;
    Ok(registry)
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let registry = registry()?;
    log::debug!("registry: {:?}", registry);

    let names = match &args.role {
        Some(role) => registry.components_for_role(role),
        None => registry.names(),
    };
    if names.is_empty() {
        if let Some(role) = &args.role {
            log::warn!("no component implements {}", role);
        }
    }

    let mut components = Vec::with_capacity(names.len());
    for name in names {
        let ports = registry
            .ports(name)?
            .iter()
            .enumerate()
            .map(|(index, port)| PortInfo {
                index,
                direction: port.direction.to_string(),
                domain: format!("{:?}", port.domain).to_lowercase(),
                buffers: port.buffer_count_actual,
                buffer_size: port.buffer_size,
            })
            .collect();
        components.push(ComponentInfo {
            name: name.to_owned(),
            roles: registry.roles(name)?.to_vec(),
            ports,
        });
    }

    if json {
        let output = serde_json::to_string_pretty(&components)
            .map_err(|e| CliError::General(format!("JSON serialization failed: {}", e)))?;
        println!("{}", output);
        return Ok(());
    }

    for component in &components {
        println!("{}", component.name);
        println!("  roles: {}", component.roles.join(", "));
        for port in &component.ports {
            println!(
                "  port {}: {} {} {} x {} bytes",
                port.index, port.direction, port.domain, port.buffers, port.buffer_size
            );
        }
    }
    Ok(())
}
