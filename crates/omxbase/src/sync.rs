// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Counting semaphore and manual-reset event.
//!
//! Both primitives can be closed. Closing wakes every waiter and makes every
//! later operation fail with [`Error::InvalidState`] rather than block, which
//! is how released per-port resources reject late users.

use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Counter {
    count: u32,
    closed: bool,
}

/// Counting semaphore built on a mutex and condition variable.
#[derive(Debug, Default)]
pub struct Semaphore {
    state: Mutex<Counter>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Semaphore {
            state: Mutex::new(Counter {
                count: initial,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Increments the count and wakes one waiter.
    pub fn post(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::InvalidState);
        }
        state.count = state.count.saturating_add(1);
        self.cond.notify_one();
        Ok(())
    }

    /// Blocks until the count is positive, then decrements it.
    pub fn wait(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::InvalidState);
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            self.cond.wait(&mut state);
        }
    }

    /// Like [`Semaphore::wait`] but gives up after `timeout`, returning
    /// `Ok(false)` when the count never became positive.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, Error> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::InvalidState);
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(true);
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return Ok(false);
            }
        }
    }

    /// Decrements the count if it is positive without blocking.
    pub fn try_wait(&self) -> Result<bool, Error> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::InvalidState);
        }
        if state.count > 0 {
            state.count -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn count(&self) -> u32 {
        self.state.lock().count
    }

    /// Overwrites the count. Waiters are woken when the new count is positive.
    pub fn set_count(&self, count: u32) {
        let mut state = self.state.lock();
        state.count = count;
        if count > 0 {
            self.cond.notify_all();
        }
    }

    /// Closes the semaphore, waking every waiter with an error.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.count = 0;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[derive(Debug, Default)]
struct Flag {
    set: bool,
    closed: bool,
}

/// Manual-reset event. Used as the pause gate between the worker and the
/// codec driver's buffer processing.
#[derive(Debug, Default)]
pub struct Event {
    state: Mutex<Flag>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Event::default()
    }

    /// Sets the event, releasing every current and future waiter until reset.
    pub fn set(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.set = true;
            self.cond.notify_all();
        }
    }

    pub fn reset(&self) {
        self.state.lock().set = false;
    }

    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Blocks until the event is set.
    pub fn wait(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::InvalidState);
            }
            if state.set {
                return Ok(());
            }
            self.cond.wait(&mut state);
        }
    }

    /// Blocks until the event is set or `timeout` expires; returns whether the
    /// event was set.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, Error> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::InvalidState);
            }
            if state.set {
                return Ok(true);
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return Ok(false);
            }
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.set = false;
        self.cond.notify_all();
    }
}
