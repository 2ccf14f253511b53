// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Shared fixtures for the component integration tests: a codec driver that
// records every call and a harness collecting component events.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use omxbase::{
    component::Component,
    config::{ComponentConfig, PortConfig},
    driver::{CodecDriver, ProcessingContext},
    event::{Completed, Event},
    port::BufferHeader,
    state::State,
    Error,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Calls {
    pub init: usize,
    pub terminate: usize,
    pub process_create: usize,
    pub process_terminate: usize,
    pub flushed: Vec<u32>,
    pub enabled: Vec<u32>,
    pub disabled: Vec<u32>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub init: bool,
    pub process_create: bool,
    /// Time `init` takes before returning.
    pub init_delay: Option<Duration>,
}

/// Driver that does no processing; buffers stay queued until taken through
/// the recorded context.
pub struct MockDriver {
    calls: Arc<Mutex<Calls>>,
    context: Arc<Mutex<Option<ProcessingContext>>>,
    failures: Failures,
}

impl CodecDriver for MockDriver {
    fn init(&mut self) -> Result<(), Error> {
        self.calls.lock().unwrap().init += 1;
        if let Some(delay) = self.failures.init_delay {
            std::thread::sleep(delay);
        }
        if self.failures.init {
            return Err(Error::Undefined);
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), Error> {
        self.calls.lock().unwrap().terminate += 1;
        Ok(())
    }

    fn buffer_process_create(&mut self, ctx: ProcessingContext) -> Result<(), Error> {
        self.calls.lock().unwrap().process_create += 1;
        if self.failures.process_create {
            return Err(Error::InsufficientResources);
        }
        *self.context.lock().unwrap() = Some(ctx);
        Ok(())
    }

    fn buffer_process_terminate(&mut self) -> Result<(), Error> {
        self.calls.lock().unwrap().process_terminate += 1;
        Ok(())
    }

    fn flush(&mut self, port: u32) -> Result<(), Error> {
        self.calls.lock().unwrap().flushed.push(port);
        Ok(())
    }

    fn port_enabled(&mut self, port: u32) -> Result<(), Error> {
        self.calls.lock().unwrap().enabled.push(port);
        Ok(())
    }

    fn port_disabled(&mut self, port: u32) -> Result<(), Error> {
        self.calls.lock().unwrap().disabled.push(port);
        Ok(())
    }
}

pub struct Harness {
    pub component: Arc<Component>,
    pub events: Receiver<Event>,
    pub calls: Arc<Mutex<Calls>>,
    pub context: Arc<Mutex<Option<ProcessingContext>>>,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn harness(ports: Vec<PortConfig>) -> Harness {
    harness_with(
        "OMX.Test.Mock",
        ComponentConfig::default().with_ports(ports),
        Failures::default(),
    )
}

pub fn harness_with(name: &str, config: ComponentConfig, failures: Failures) -> Harness {
    init_logging();
    let calls = Arc::new(Mutex::new(Calls::default()));
    let context = Arc::new(Mutex::new(None));
    let driver = MockDriver {
        calls: Arc::clone(&calls),
        context: Arc::clone(&context),
        failures,
    };
    let (tx, events) = crossbeam_channel::unbounded();
    let component = Component::new(name, config, Box::new(driver), tx).unwrap();
    Harness {
        component,
        events,
        calls,
        context,
    }
}

impl Harness {
    pub fn next(&self) -> Event {
        self.events
            .recv_timeout(EVENT_TIMEOUT)
            .expect("timed out waiting for an event")
    }

    /// Next event that is not a returned buffer.
    pub fn next_command_event(&self) -> Event {
        loop {
            match self.next() {
                Event::BufferDone { .. } => continue,
                event => return event,
            }
        }
    }

    pub fn expect(&self, expected: Event) {
        assert_eq!(self.next_command_event(), expected);
    }

    pub fn expect_state(&self, state: State) {
        self.expect(Event::CommandComplete(Completed::SetState(state)));
        assert_eq!(self.component.current_state(), state);
    }

    pub fn assert_quiet(&self) {
        if let Ok(event) = self.events.recv_timeout(QUIET_PERIOD) {
            panic!("unexpected event {:?}", event);
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn context(&self) -> ProcessingContext {
        self.context
            .lock()
            .unwrap()
            .clone()
            .expect("buffer processing was never created")
    }

    /// Assigns the full complement of buffers to every enabled port.
    pub fn populate(&self) -> Vec<Vec<BufferHeader>> {
        (0..self.component.num_ports() as u32)
            .map(|port| {
                let definition = self.component.port_definition(port).unwrap();
                if !definition.enabled {
                    return Vec::new();
                }
                (0..definition.buffer_count_actual)
                    .map(|_| {
                        self.component
                            .use_buffer(port, definition.buffer_size)
                            .unwrap()
                    })
                    .collect()
            })
            .collect()
    }

    /// Returns every buffer in `buffers` to its port.
    pub fn release(&self, buffers: &[Vec<BufferHeader>]) {
        for buffer in buffers.iter().flatten() {
            self.component.free_buffer(buffer.port, buffer.id).unwrap();
        }
    }

    pub fn to_idle(&self) -> Vec<Vec<BufferHeader>> {
        self.component.request_state(State::Idle).unwrap();
        let buffers = self.populate();
        self.expect_state(State::Idle);
        buffers
    }

    pub fn to_executing(&self) -> Vec<Vec<BufferHeader>> {
        let buffers = self.to_idle();
        self.component.request_state(State::Executing).unwrap();
        self.expect_state(State::Executing);
        buffers
    }
}

pub fn two_port_layout() -> Vec<PortConfig> {
    vec![PortConfig::input(2, 1024), PortConfig::output(2, 1024)]
}
