// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Component lifecycle tests
//
// Drive components with a mock codec driver through every legal state edge,
// check that illegal requests fail synchronously, and exercise abnormal
// termination and destruction while the worker is blocked on resources.
//
// RUN:
//   cargo test -p omxbase --test lifecycle

mod common;

use common::{harness, harness_with, two_port_layout, Failures};
use omxbase::{
    command::PortIndex,
    config::{ComponentConfig, PortConfig},
    event::{Completed, Event},
    port::PortState,
    state::{State, TransientState},
    Error,
};
use rand::Rng;
use serial_test::serial;
use std::{
    thread,
    time::{Duration, Instant},
};

#[test]
fn test_populate_two_ports_reaches_idle() {
    let h = harness(vec![PortConfig::input(2, 4096), PortConfig::output(2, 4096)]);
    h.component.request_state(State::Idle).unwrap();
    assert_eq!(h.component.transient_state(), Some(TransientState::LoadedToIdle));
    assert_eq!(h.component.port_state(0), Ok(PortState::Enabling));

    for port in 0..2 {
        for _ in 0..2 {
            h.component.use_buffer(port, 4096).unwrap();
        }
    }
    h.expect_state(State::Idle);
    assert_eq!(h.component.transient_state(), None);
    assert_eq!(h.component.port_state(0), Ok(PortState::Idle));
    assert!(h.component.port_definition(1).unwrap().populated);

    let calls = h.calls();
    assert_eq!(calls.init, 1);
    assert_eq!(calls.process_create, 1);
    h.assert_quiet();
}

#[test]
fn test_every_legal_edge() {
    let h = harness(two_port_layout());

    h.component.request_state(State::WaitForResources).unwrap();
    h.expect_state(State::WaitForResources);

    let buffers = h.to_idle();

    for (dest, expected) in [
        (State::Executing, State::Executing),
        (State::Pause, State::Pause),
        (State::Executing, State::Executing),
        (State::Idle, State::Idle),
        (State::Pause, State::Pause),
        (State::Idle, State::Idle),
    ] {
        h.component.request_state(dest).unwrap();
        h.expect_state(expected);
    }

    h.component.request_state(State::Loaded).unwrap();
    assert_eq!(h.component.port_state(0), Ok(PortState::Disabling));
    h.release(&buffers);
    h.expect_state(State::Loaded);
    for port in 0..2 {
        assert_eq!(h.component.port_state(port), Ok(PortState::Loaded));
    }

    let calls = h.calls();
    assert_eq!(calls.init, 1);
    assert_eq!(calls.terminate, 1);
    assert_eq!(calls.process_terminate, 1);
    h.assert_quiet();
}

#[test]
fn test_every_state_reaches_invalid() {
    for state in [
        State::Loaded,
        State::WaitForResources,
        State::Idle,
        State::Executing,
        State::Pause,
    ] {
        let h = harness(two_port_layout());
        match state {
            State::Loaded => {}
            State::WaitForResources => {
                h.component.request_state(State::WaitForResources).unwrap();
                h.expect_state(State::WaitForResources);
            }
            State::Idle => {
                h.to_idle();
            }
            State::Executing => {
                h.to_executing();
            }
            State::Pause => {
                h.to_executing();
                h.component.request_state(State::Pause).unwrap();
                h.expect_state(State::Pause);
            }
            State::Invalid => unreachable!(),
        }

        h.component.request_state(State::Invalid).unwrap();
        h.expect_state(State::Invalid);
        for port in 0..2 {
            assert_eq!(h.component.port_state(port), Ok(PortState::Invalid));
        }

        let calls = h.calls();
        let had_resources = state.has_resources();
        assert_eq!(calls.terminate, had_resources as usize, "from {}", state);
        assert_eq!(calls.process_terminate, had_resources as usize, "from {}", state);
    }
}

#[test]
fn test_illegal_edges_fail_synchronously() {
    let h = harness(two_port_layout());
    for dest in [State::Executing, State::Pause] {
        assert_eq!(
            h.component.request_state(dest),
            Err(Error::IncorrectStateTransition)
        );
    }

    h.component.request_state(State::WaitForResources).unwrap();
    h.expect_state(State::WaitForResources);
    assert_eq!(
        h.component.request_state(State::Loaded),
        Err(Error::IncorrectStateTransition)
    );
    assert_eq!(
        h.component.request_state(State::Executing),
        Err(Error::IncorrectStateTransition)
    );

    let buffers = h.to_idle();
    assert_eq!(
        h.component.request_state(State::WaitForResources),
        Err(Error::IncorrectStateTransition)
    );
    h.component.request_state(State::Executing).unwrap();
    h.expect_state(State::Executing);
    assert_eq!(
        h.component.request_state(State::Loaded),
        Err(Error::IncorrectStateTransition)
    );

    h.component.request_state(State::Invalid).unwrap();
    h.expect_state(State::Invalid);
    for dest in [State::Loaded, State::Idle, State::Executing] {
        assert_eq!(h.component.request_state(dest), Err(Error::InvalidState));
    }
    assert_eq!(
        h.component.request_state(State::Invalid),
        Err(Error::SameState)
    );
    h.release(&buffers);
    h.assert_quiet();
}

#[test]
fn test_same_state_rejected() {
    let h = harness(two_port_layout());
    assert_eq!(
        h.component.request_state(State::Loaded),
        Err(Error::SameState)
    );
    h.to_idle();
    assert_eq!(h.component.request_state(State::Idle), Err(Error::SameState));
    h.assert_quiet();
}

#[test]
fn test_validation_uses_current_state() {
    let h = harness(two_port_layout());
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));
    // still Loaded while the worker waits for buffers
    assert_eq!(h.component.current_state(), State::Loaded);
    assert_eq!(
        h.component.request_state(State::Loaded),
        Err(Error::SameState)
    );
    assert_eq!(
        h.component.request_state(State::Executing),
        Err(Error::IncorrectStateTransition)
    );
    assert_eq!(
        h.component.request_state(State::Pause),
        Err(Error::IncorrectStateTransition)
    );
    assert_eq!(h.component.pending_commands(), 0);
    assert_eq!(h.component.transient_state(), Some(TransientState::LoadedToIdle));

    h.populate();
    h.expect_state(State::Idle);
    h.component.request_state(State::Executing).unwrap();
    h.expect_state(State::Executing);
    h.assert_quiet();
}

#[test]
fn test_queued_edge_revalidated_by_worker() {
    let h = harness(two_port_layout());
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));
    // legal from Loaded, illegal once Idle is reached
    h.component.request_state(State::WaitForResources).unwrap();
    h.populate();
    h.expect_state(State::Idle);
    h.expect(Event::Error(Error::IncorrectStateTransition));
    assert_eq!(h.component.current_state(), State::Idle);
    assert_eq!(h.component.transient_state(), None);
    h.assert_quiet();
}

#[test]
fn test_flush_outside_running_states() {
    let mut rng = rand::rng();
    for _ in 0..8 {
        let ports = (0..rng.random_range(1..5))
            .map(|i| {
                let count = rng.random_range(1..4);
                if i % 2 == 0 {
                    PortConfig::input(count, 512)
                } else {
                    PortConfig::output(count, 512)
                }
            })
            .collect::<Vec<_>>();
        let h = harness(ports);

        assert_eq!(
            h.component.flush(PortIndex::All),
            Err(Error::IncorrectStateOperation)
        );
        h.to_idle();
        assert_eq!(
            h.component.flush(PortIndex::All),
            Err(Error::IncorrectStateOperation)
        );
        assert_eq!(
            h.component.mark_buffer(0, omxbase::command::Mark::new(None, 1)),
            Err(Error::IncorrectStateOperation)
        );
        h.assert_quiet();
    }
}

#[test]
fn test_flush_checks_state_before_index() {
    let h = harness(two_port_layout());
    assert_eq!(h.component.flush(7u32), Err(Error::IncorrectStateOperation));
    h.to_idle();
    assert_eq!(h.component.flush(7u32), Err(Error::IncorrectStateOperation));
    h.assert_quiet();
}

#[test]
fn test_flush_bad_port_index() {
    let h = harness(two_port_layout());
    h.to_executing();
    assert_eq!(h.component.flush(7u32), Err(Error::BadPortIndex));
    h.component.flush(PortIndex::All).unwrap();
    h.expect(Event::CommandComplete(Completed::Flush(PortIndex::All)));
    assert_eq!(h.calls().flushed, vec![0, 1]);
}

#[test]
fn test_idle_resources_released_on_loaded() {
    let h = harness(two_port_layout());
    let buffers = h.to_idle();
    let ctx = h.context();
    for channel in ctx.ports() {
        assert_eq!(channel.pending(), 0);
    }
    assert!(!ctx.is_running());

    h.component.request_state(State::Loaded).unwrap();
    h.release(&buffers);
    h.expect_state(State::Loaded);

    assert_eq!(ctx.port(0).unwrap().try_take(), Err(Error::InvalidState));
    assert_eq!(
        ctx.port(1).unwrap().take(Duration::from_millis(5)),
        Err(Error::InvalidState)
    );
    assert_eq!(
        ctx.wait_running(Duration::from_millis(5)),
        Err(Error::InvalidState)
    );
    assert_eq!(
        h.component.queue_buffer(0, buffers[0][0].clone()),
        Err(Error::IncorrectStateOperation)
    );
}

#[test]
fn test_gate_follows_execution() {
    let h = harness(two_port_layout());
    h.to_executing();
    let ctx = h.context();
    assert!(ctx.is_running());

    h.component.request_state(State::Pause).unwrap();
    h.expect_state(State::Pause);
    assert!(!ctx.is_running());

    h.component.request_state(State::Executing).unwrap();
    h.expect_state(State::Executing);
    assert_eq!(ctx.wait_running(Duration::from_millis(5)), Ok(true));
}

#[test]
fn test_concurrent_producers() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: usize = 20;

    let ports = (0..PRODUCERS)
        .map(|_| PortConfig::input(1, 256))
        .collect::<Vec<_>>();
    let config = ComponentConfig::default()
        .with_ports(ports)
        .with_queue_capacity(PRODUCERS as usize * PER_PRODUCER);
    let h = harness_with("OMX.Test.Concurrent", config, Failures::default());
    h.to_executing();

    thread::scope(|scope| {
        for port in 0..PRODUCERS {
            let component = &h.component;
            scope.spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mark = omxbase::command::Mark::new(Some("sink"), seq as u64);
                    component.mark_buffer(port, mark).unwrap();
                }
            });
        }
    });

    let mut per_port = vec![0usize; PRODUCERS as usize];
    for _ in 0..PRODUCERS as usize * PER_PRODUCER {
        match h.next() {
            Event::CommandComplete(Completed::MarkBuffer(port)) => per_port[port as usize] += 1,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(per_port.iter().all(|count| *count == PER_PRODUCER));
    h.assert_quiet();
}

#[test]
fn test_mark_travels_with_next_buffer() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();
    let mark = omxbase::command::Mark::new(Some("OMX.Test.Sink"), 42);
    h.component.mark_buffer(0, mark.clone()).unwrap();
    h.expect(Event::CommandComplete(Completed::MarkBuffer(0)));

    h.component.queue_buffer(0, buffers[0][0].clone()).unwrap();
    h.component.queue_buffer(0, buffers[0][1].clone()).unwrap();
    let ctx = h.context();
    let first = ctx.port(0).unwrap().try_take().unwrap().unwrap();
    let second = ctx.port(0).unwrap().try_take().unwrap().unwrap();
    assert_eq!(first.mark, Some(mark));
    assert_eq!(second.mark, None);
}

#[test]
fn test_flush_returns_queued_buffers() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();
    for buffer in &buffers[1] {
        h.component.queue_buffer(1, buffer.clone()).unwrap();
    }
    h.component.flush(1u32).unwrap();

    let mut returned = Vec::new();
    loop {
        match h.next() {
            Event::BufferDone { port, buffer } => {
                assert_eq!(port, 1);
                returned.push(buffer.id);
            }
            event => {
                assert_eq!(
                    event,
                    Event::CommandComplete(Completed::Flush(PortIndex::Port(1)))
                );
                break;
            }
        }
    }
    let expected = buffers[1].iter().map(|b| b.id).collect::<Vec<_>>();
    assert_eq!(returned, expected);
    assert_eq!(h.context().port(1).unwrap().pending(), 0);
    assert_eq!(h.component.port_state(1), Ok(PortState::Idle));
}

#[test]
fn test_queue_buffer_rejects_foreign() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();
    assert_eq!(
        h.component.queue_buffer(0, buffers[1][0].clone()),
        Err(Error::BadParameter)
    );
    assert_eq!(
        h.component.queue_buffer(9, buffers[0][0].clone()),
        Err(Error::BadPortIndex)
    );
}

#[test]
fn test_disable_and_enable_port_while_executing() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();

    assert_eq!(h.component.enable_port(0u32), Err(Error::IncorrectStateOperation));
    h.component.disable_port(0u32).unwrap();
    assert_eq!(h.component.disable_port(0u32), Err(Error::IncorrectStateOperation));
    assert_eq!(
        h.component.flush(PortIndex::All),
        Err(Error::IncorrectStateOperation)
    );
    for buffer in &buffers[0] {
        h.component.free_buffer(0, buffer.id).unwrap();
    }
    h.expect(Event::CommandComplete(Completed::PortDisable(PortIndex::Port(0))));
    assert!(!h.component.port_definition(0).unwrap().enabled);

    h.component.enable_port(0u32).unwrap();
    assert_eq!(h.component.port_state(0), Ok(PortState::Enabling));
    h.component.use_buffer(0, 1024).unwrap();
    h.component.use_buffer(0, 1024).unwrap();
    h.expect(Event::CommandComplete(Completed::PortEnable(PortIndex::Port(0))));
    assert!(h.component.port_definition(0).unwrap().enabled);
    assert_eq!(h.component.port_state(0), Ok(PortState::Idle));

    let calls = h.calls();
    assert_eq!(calls.disabled, vec![0]);
    assert_eq!(calls.enabled, vec![0]);
}

#[test]
fn test_stop_aborts_pending_enable() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();
    h.component.disable_port(1u32).unwrap();
    for buffer in &buffers[1] {
        h.component.free_buffer(1, buffer.id).unwrap();
    }
    h.expect(Event::CommandComplete(Completed::PortDisable(PortIndex::Port(1))));

    h.component.enable_port(1u32).unwrap();
    h.component.request_state(State::Idle).unwrap();
    h.expect(Event::Error(Error::IncorrectStateOperation));
    h.expect_state(State::Idle);

    let definition = h.component.port_definition(1).unwrap();
    assert!(!definition.enabled);
    assert_eq!(h.component.port_state(1), Ok(PortState::Loaded));
    assert!(h.calls().enabled.is_empty());
}

#[test]
fn test_enable_in_loaded_flips_immediately() {
    let ports = vec![
        PortConfig::input(2, 1024),
        PortConfig::output(2, 1024).with_enabled(false),
    ];
    let h = harness(ports);
    assert_eq!(h.component.disable_port(1u32), Err(Error::IncorrectStateOperation));
    h.component.enable_port(1u32).unwrap();
    h.expect(Event::CommandComplete(Completed::PortEnable(PortIndex::Port(1))));
    assert!(h.component.port_definition(1).unwrap().enabled);
    assert_eq!(h.component.port_state(1), Ok(PortState::Loaded));
}

#[test]
fn test_disabled_port_not_waited_on() {
    let ports = vec![
        PortConfig::input(2, 1024),
        PortConfig::output(2, 1024).with_enabled(false),
    ];
    let h = harness(ports);
    h.component.request_state(State::Idle).unwrap();
    assert_eq!(
        h.component.use_buffer(1, 1024).unwrap_err(),
        Error::IncorrectStateOperation
    );
    h.component.use_buffer(0, 1024).unwrap();
    h.component.use_buffer(0, 1024).unwrap();
    h.expect_state(State::Idle);
    assert_eq!(h.component.port_state(1), Ok(PortState::Loaded));
}

#[test]
fn test_driver_init_failure_invalidates() {
    let h = harness_with(
        "OMX.Test.InitFails",
        ComponentConfig::default().with_ports(two_port_layout()),
        Failures {
            init: true,
            ..Failures::default()
        },
    );
    h.component.request_state(State::Idle).unwrap();
    h.populate();
    h.expect(Event::Error(Error::InsufficientResources));
    assert_eq!(h.component.current_state(), State::Invalid);
    let calls = h.calls();
    assert_eq!(calls.process_create, 0);
    assert_eq!(calls.terminate, 0);
}

#[test]
fn test_process_create_failure_invalidates() {
    let h = harness_with(
        "OMX.Test.CreateFails",
        ComponentConfig::default().with_ports(two_port_layout()),
        Failures {
            process_create: true,
            ..Failures::default()
        },
    );
    h.component.request_state(State::Idle).unwrap();
    h.populate();
    h.expect(Event::Error(Error::InsufficientResources));
    assert_eq!(h.component.current_state(), State::Invalid);
    let calls = h.calls();
    assert_eq!(calls.init, 1);
    assert_eq!(calls.terminate, 1);
    assert_eq!(calls.process_terminate, 0);
}

#[test]
fn test_set_callbacks_only_in_loaded() {
    let h = harness(two_port_layout());
    let (tx, rx) = crossbeam_channel::unbounded();
    h.component.set_callbacks(tx).unwrap();

    h.component.request_state(State::Idle).unwrap();
    h.populate();
    assert_eq!(
        rx.recv_timeout(common::EVENT_TIMEOUT),
        Ok(Event::CommandComplete(Completed::SetState(State::Idle)))
    );
    h.assert_quiet();
    assert_eq!(
        h.component.set_callbacks(|_: Event| {}),
        Err(Error::IncorrectStateOperation)
    );
}

#[test]
#[serial]
fn test_abend_releases_blocked_load() {
    let h = harness_with(
        "OMX.Test.Abend",
        ComponentConfig::default()
            .with_ports(two_port_layout())
            .with_abend_timeout(Duration::from_millis(500)),
        Failures::default(),
    );
    h.component.request_state(State::Idle).unwrap();
    h.component.use_buffer(0, 1024).unwrap();
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    assert_eq!(h.component.abnormal_termination(), Ok(()));
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(h.component.current_state(), State::Invalid);
    h.expect(Event::Error(Error::InvalidState));
    assert_eq!(h.calls().init, 0);
    assert_eq!(h.component.request_state(State::Loaded), Err(Error::InvalidState));
}

#[test]
#[serial]
fn test_abend_while_executing() {
    let h = harness(two_port_layout());
    let buffers = h.to_executing();
    h.component.queue_buffer(0, buffers[0][0].clone()).unwrap();

    assert_eq!(h.component.abnormal_termination(), Ok(()));
    h.expect(Event::Error(Error::InvalidState));
    assert_eq!(h.component.current_state(), State::Invalid);
    let calls = h.calls();
    assert_eq!(calls.process_terminate, 1);
    assert_eq!(calls.terminate, 1);

    assert_eq!(h.component.abnormal_termination(), Ok(()));
    h.assert_quiet();
}

#[test]
#[serial]
fn test_abend_reports_drained_commands() {
    let h = harness(two_port_layout());
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));
    // both legal against Loaded, queued behind the blocked edge
    h.component.request_state(State::WaitForResources).unwrap();
    h.component.request_state(State::WaitForResources).unwrap();
    assert_eq!(h.component.pending_commands(), 2);

    assert_eq!(h.component.abnormal_termination(), Ok(()));
    let mut errors = 0;
    while let Ok(event) = h.events.recv_timeout(Duration::from_millis(100)) {
        assert_eq!(event, Event::Error(Error::InvalidState));
        errors += 1;
    }
    // two drained requests plus the interrupted Loaded -> Idle
    assert_eq!(errors, 3);
    assert_eq!(h.component.current_state(), State::Invalid);
}

#[test]
#[serial]
fn test_abend_releases_blocked_unload() {
    let h = harness(two_port_layout());
    // buffers stay assigned so the unload blocks
    let _buffers = h.to_idle();
    h.component.request_state(State::Loaded).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.component.transient_state(), Some(TransientState::IdleToLoaded));

    let start = Instant::now();
    assert_eq!(h.component.abnormal_termination(), Ok(()));
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(h.component.current_state(), State::Invalid);
    h.expect(Event::Error(Error::InvalidState));
    for port in 0..2 {
        assert_eq!(h.component.port_state(port), Ok(PortState::Invalid));
    }
    let calls = h.calls();
    assert_eq!(calls.process_terminate, 1);
    assert_eq!(calls.terminate, 1);
}

#[test]
#[serial]
fn test_abend_releases_blocked_wait_for_resources_load() {
    let h = harness(two_port_layout());
    h.component.request_state(State::WaitForResources).unwrap();
    h.expect_state(State::WaitForResources);
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.component.current_state(), State::WaitForResources);

    let start = Instant::now();
    assert_eq!(h.component.abnormal_termination(), Ok(()));
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(h.component.current_state(), State::Invalid);
    h.expect(Event::Error(Error::InvalidState));
    assert_eq!(h.calls().init, 0);
}

#[test]
#[serial]
fn test_drop_while_blocked_does_not_hang() {
    let h = harness(two_port_layout());
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    let common::Harness {
        component, events, ..
    } = h;
    drop(component);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(
        events.recv_timeout(Duration::from_millis(100)),
        Ok(Event::Error(Error::InvalidState))
    );
}

#[test]
fn test_full_queue_rejects_commands() {
    let config = ComponentConfig::default()
        .with_ports(vec![PortConfig::input(1, 64)])
        .with_queue_capacity(1);
    let h = harness_with("OMX.Test.SmallQueue", config, Failures::default());
    h.component.request_state(State::Idle).unwrap();
    thread::sleep(Duration::from_millis(20));
    h.component.request_state(State::WaitForResources).unwrap();
    assert_eq!(
        h.component.request_state(State::WaitForResources),
        Err(Error::InsufficientResources)
    );
    assert_eq!(h.component.pending_commands(), 1);
    h.populate();
    h.expect_state(State::Idle);
    h.expect(Event::Error(Error::IncorrectStateTransition));
}
