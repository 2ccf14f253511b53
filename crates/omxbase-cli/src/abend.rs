// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::components::{self, AVC_WFD_ENCODER};
use crate::error::CliError;
use crate::utils::EventLog;
use clap::Args as ClapArgs;
use omxbase::{config::ComponentConfig, event::Event, state::State};
use serde::Serialize;
use std::{
    thread,
    time::{Duration, Instant},
};

/// Quiet period after which no further component events are expected.
const SETTLE_PERIOD: Duration = Duration::from_millis(50);

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Registered component name
    #[arg(short, long, default_value = AVC_WFD_ENCODER)]
    component: String,

    /// Milliseconds to leave the component blocked before terminating it
    #[arg(short, long, default_value = "200")]
    delay: u64,

    /// Milliseconds the component may take to confirm termination
    #[arg(long)]
    abend_timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Summary {
    component: String,
    blocked_state: String,
    final_state: String,
    errors_reported: usize,
    confirm_ms: u128,
}

/// Requests Idle without supplying any buffers, so the worker blocks waiting
/// for them, then terminates the component abnormally.
pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Abend parameters: {:?}", args);

    let registry = components::registry()?;
    let mut config = ComponentConfig::from_env();
    if let Some(ms) = args.abend_timeout {
        config = config.with_abend_timeout(Duration::from_millis(ms));
    }
    let (tx, rx) = crossbeam_channel::unbounded::<Event>();
    let component = registry.create(&args.component, config, tx)?;

    component.request_state(State::Idle)?;
    thread::sleep(Duration::from_millis(args.delay));
    let blocked_state = component.current_state();
    log::info!(
        "{} still {} after {} ms ({:?})",
        args.component,
        blocked_state,
        args.delay,
        component.transient_state()
    );

    let start = Instant::now();
    component.abnormal_termination()?;
    let confirm_ms = start.elapsed().as_millis();

    let mut events = EventLog::new(rx, Duration::from_millis(args.delay.max(100)));
    events.drain_quiet(SETTLE_PERIOD);

    let final_state = component.current_state();
    if final_state != State::Invalid {
        return Err(CliError::General(format!(
            "{} ended in {} instead of Invalid",
            args.component, final_state
        )));
    }

    let summary = Summary {
        component: args.component,
        blocked_state: blocked_state.to_string(),
        final_state: final_state.to_string(),
        errors_reported: events.errors().len(),
        confirm_ms,
    };

    if json {
        let output = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::General(format!("JSON serialization failed: {}", e)))?;
        println!("{}", output);
        return Ok(());
    }

    println!("Component:  {}", summary.component);
    println!(
        "States:     {} -> {}",
        summary.blocked_state, summary.final_state
    );
    println!("Errors:     {}", summary.errors_reported);
    println!("Confirmed:  {} ms", summary.confirm_ms);
    Ok(())
}
