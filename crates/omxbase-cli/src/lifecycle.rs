// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::components::{self, AVC_WFD_ENCODER};
use crate::error::CliError;
use crate::utils::{self, EventLog};
use clap::Args as ClapArgs;
use omxbase::{
    command::{Mark, PortIndex},
    component::Component,
    config::ComponentConfig,
    port::{BufferHeader, PortDirection},
    state::State,
};
use serde::Serialize;
use std::{
    collections::VecDeque,
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Registered component name
    #[arg(short, long, default_value = AVC_WFD_ENCODER)]
    component: String,

    /// Number of frames to push through the component
    #[arg(short, long, default_value = "16")]
    frames: u32,

    /// Payload bytes per frame
    #[arg(long, default_value = "4096")]
    frame_size: u32,

    /// Seconds to wait for each command to complete
    #[arg(short, long, default_value = "5.0")]
    timeout: f64,

    /// Pause and resume once half the frames are through
    #[arg(long)]
    pause: bool,

    /// Stay in Executing until Ctrl+C, then terminate abnormally
    #[arg(long)]
    hold: bool,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    component: String,
    states: Vec<String>,
    frames_sent: u32,
    frames_returned: u32,
    encoded_bytes: u64,
    marks_seen: u32,
    aborted: bool,
    elapsed_ms: u128,
}

impl Summary {
    fn reached(&mut self, state: State) {
        self.states.push(state.to_string());
    }
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    if args.timeout <= 0.0 || !args.timeout.is_finite() {
        return Err(CliError::InvalidArgs(format!(
            "timeout must be positive: {}",
            args.timeout
        )));
    }
    log::debug!("Lifecycle parameters: {:?}", args);

    let term = utils::install_signal_handler()?;
    let registry = components::registry()?;
    let (tx, rx) = crossbeam_channel::unbounded();
    let component = registry.create(&args.component, ComponentConfig::from_env(), tx)?;
    let mut events = EventLog::new(rx, Duration::from_secs_f64(args.timeout));

    let start = Instant::now();
    let mut summary = Summary {
        component: args.component.clone(),
        ..Summary::default()
    };
    summary.reached(component.current_state());

    let (input, output) = find_ports(&component)?;

    // Loaded -> Idle completes once every enabled port holds its buffers
    component.request_state(State::Idle)?;
    let mut assigned = Vec::new();
    for port in 0..component.num_ports() as u32 {
        let definition = component.port_definition(port)?;
        if !definition.enabled {
            continue;
        }
        for _ in 0..definition.buffer_count_actual {
            assigned.push(component.use_buffer(port, definition.buffer_size)?);
        }
    }
    events.wait_state(State::Idle)?;
    summary.reached(State::Idle);

    component.request_state(State::Executing)?;
    events.wait_state(State::Executing)?;
    summary.reached(State::Executing);

    let mut frames: VecDeque<BufferHeader> = VecDeque::new();
    for buffer in &assigned {
        if buffer.port == output {
            component.queue_buffer(output, buffer.clone())?;
        } else if buffer.port == input {
            frames.push_back(buffer.clone());
        }
    }

    let mut in_flight = 0u32;
    let mut paused = !args.pause;
    while summary.frames_sent < args.frames && !term.load(Ordering::Relaxed) {
        if !paused && summary.frames_sent >= args.frames / 2 {
            while in_flight > 0 {
                let returned = events.wait_buffer()?;
                in_flight -= settle(&component, &mut summary, &mut frames, returned, input)?;
            }
            paused = true;
            component.request_state(State::Pause)?;
            events.wait_state(State::Pause)?;
            summary.reached(State::Pause);
            component.request_state(State::Executing)?;
            events.wait_state(State::Executing)?;
            summary.reached(State::Executing);
        }

        let Some(mut frame) = frames.pop_front() else {
            let returned = events.wait_buffer()?;
            in_flight -= settle(&component, &mut summary, &mut frames, returned, input)?;
            continue;
        };
        if summary.frames_sent == 0 {
            component.mark_buffer(input, Mark::new(Some(&args.component), 1))?;
        }
        frame.filled_len = args.frame_size.min(frame.alloc_len);
        frame.timestamp = i64::from(summary.frames_sent) * 33_333;
        component.queue_buffer(input, frame)?;
        summary.frames_sent += 1;
        in_flight += 1;
    }

    while in_flight > 0 && !term.load(Ordering::Relaxed) {
        let returned = events.wait_buffer()?;
        in_flight -= settle(&component, &mut summary, &mut frames, returned, input)?;
    }

    if args.hold {
        log::info!("Holding in Executing (Ctrl+C to terminate)...");
        while !term.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
        }
    }

    if term.load(Ordering::Relaxed) {
        log::warn!("Interrupted, terminating {} abnormally", args.component);
        component.abnormal_termination()?;
        events.drain();
        summary.aborted = true;
        summary.reached(component.current_state());
    } else {
        component.flush(PortIndex::All)?;
        component.request_state(State::Idle)?;
        events.wait_state(State::Idle)?;
        summary.reached(State::Idle);

        component.request_state(State::Loaded)?;
        for buffer in &assigned {
            component.free_buffer(buffer.port, buffer.id)?;
        }
        events.wait_state(State::Loaded)?;
        summary.reached(State::Loaded);
    }

    events.drain();
    for buffer in events.take_returned() {
        log::trace!("late buffer {} on port {}", buffer.id, buffer.port);
    }
    if !events.errors().is_empty() {
        log::warn!("component reported {} errors", events.errors().len());
    }
    summary.elapsed_ms = start.elapsed().as_millis();
    report(&summary, json)
}

/// Accounts for a returned buffer and recycles it: input buffers go back to
/// the free list, output buffers are queued again. Returns 1 when the buffer
/// completes a frame.
fn settle(
    component: &Component,
    summary: &mut Summary,
    frames: &mut VecDeque<BufferHeader>,
    mut buffer: BufferHeader,
    input: u32,
) -> Result<u32, CliError> {
    if buffer.mark.take().is_some() {
        summary.marks_seen += 1;
    }
    if buffer.port == input {
        frames.push_back(buffer);
        summary.frames_returned += 1;
        return Ok(1);
    }
    summary.encoded_bytes += u64::from(buffer.filled_len);
    buffer.filled_len = 0;
    let port = buffer.port;
    component.queue_buffer(port, buffer)?;
    Ok(0)
}

fn find_ports(component: &Component) -> Result<(u32, u32), CliError> {
    let mut input = None;
    let mut output = None;
    for port in 0..component.num_ports() as u32 {
        match component.port_definition(port)?.direction {
            PortDirection::Input if input.is_none() => input = Some(port),
            PortDirection::Output if output.is_none() => output = Some(port),
            _ => {}
        }
    }
    match (input, output) {
        (Some(input), Some(output)) => Ok((input, output)),
        _ => Err(CliError::InvalidArgs(format!(
            "{} needs an input and an output port",
            component.name()
        ))),
    }
}

fn report(summary: &Summary, json: bool) -> Result<(), CliError> {
    if json {
        let output = serde_json::to_string_pretty(summary)
            .map_err(|e| CliError::General(format!("JSON serialization failed: {}", e)))?;
        println!("{}", output);
        return Ok(());
    }

    println!("Component:  {}", summary.component);
    println!("States:     {}", summary.states.join(" -> "));
    println!(
        "Frames:     {} sent, {} returned",
        summary.frames_sent, summary.frames_returned
    );
    println!("Encoded:    {} bytes", summary.encoded_bytes);
    println!("Marks:      {}", summary.marks_seen);
    if summary.aborted {
        println!("Aborted:    yes");
    }
    println!("Elapsed:    {} ms", summary.elapsed_ms);
    Ok(())
}
