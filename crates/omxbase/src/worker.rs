// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    command::Command,
    component::Shared,
    driver::CodecDriver,
    event::{Completed, Event},
    state::State,
    Error,
};
use std::{
    sync::{atomic::Ordering, Arc},
    thread::{self, JoinHandle},
};

/// Owner of the codec driver; runs every queued command in order.
pub(crate) struct Worker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) driver: Box<dyn CodecDriver>,
    /// `init` succeeded and `terminate` has not been called since
    pub(crate) driver_ready: bool,
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    driver: Box<dyn CodecDriver>,
) -> Result<JoinHandle<()>, Error> {
    let name = format!("omx-{}", shared.name);
    let worker = Worker {
        shared,
        driver,
        driver_ready: false,
    };
    thread::Builder::new()
        .name(name)
        .spawn(move || worker.run())
        .map_err(|err| {
            log::error!("failed to spawn component worker: {}", err);
            Error::InsufficientResources
        })
}

impl Worker {
    fn run(mut self) {
        log::debug!("[{}] worker started", self.shared.name);
        loop {
            let command = match self.shared.queue.take() {
                Ok(command) => command,
                Err(err) => {
                    log::error!("[{}] command queue failed: {}", self.shared.name, err);
                    break;
                }
            };
            if command == Command::Deinit {
                break;
            }
            if self.shared.shutdown.load(Ordering::SeqCst) {
                log::debug!("[{}] discarding {:?}", self.shared.name, command);
                self.shared.emit(Event::Error(Error::InvalidState));
                continue;
            }
            self.dispatch(command);
        }
        self.release();
        log::debug!("[{}] worker stopped", self.shared.name);
    }

    fn dispatch(&mut self, command: Command) {
        let kind = command.kind();
        let result = match command {
            Command::SetState(dest) => return self.handle_set_state(dest),
            Command::Deinit => return,
            _ if self.shared.current_state() == State::Invalid => Err(Error::InvalidState),
            Command::Flush(index) => self.flush_ports(index).map(|()| Completed::Flush(index)),
            Command::PortEnable(index) => self
                .enable_ports(index)
                .map(|()| Completed::PortEnable(index)),
            Command::PortDisable(index) => self
                .disable_ports(index)
                .map(|()| Completed::PortDisable(index)),
            Command::MarkBuffer(port, mark) => self
                .store_mark(port, mark)
                .map(|()| Completed::MarkBuffer(port)),
        };

        match result {
            Ok(done) => self.shared.emit(Event::CommandComplete(done)),
            Err(err) => {
                log::error!("[{}] {} failed: {}", self.shared.name, kind, err);
                self.shared.emit(Event::Error(err));
            }
        }
    }

    fn handle_set_state(&mut self, dest: State) {
        self.set_state(dest);
        self.shared.finish_transition();
    }

    fn set_state(&mut self, dest: State) {
        if dest == State::Invalid && self.shared.abend.load(Ordering::SeqCst) {
            if self.shared.current_state() != State::Invalid {
                self.enter_invalid();
                self.shared.emit(Event::Error(Error::InvalidState));
            }
            self.shared.signal_abend_done();
            return;
        }

        match self.apply_transition(dest) {
            Ok(()) => {
                log::info!("[{}] now {}", self.shared.name, dest);
                self.shared
                    .emit(Event::CommandComplete(Completed::SetState(dest)));
            }
            Err(err) => {
                log::error!(
                    "[{}] transition to {} failed: {}",
                    self.shared.name,
                    dest,
                    err
                );
                self.shared.emit(Event::Error(err));
            }
        }
    }

    /// Tears down whatever the component still holds when the worker exits.
    fn release(&mut self) {
        self.release_idle_resources();
        self.terminate_driver();
    }

    pub(crate) fn terminate_driver(&mut self) {
        if self.driver_ready {
            self.driver_ready = false;
            if let Err(err) = self.driver.terminate() {
                log::error!("[{}] driver terminate: {}", self.shared.name, err);
            }
        }
    }
}
