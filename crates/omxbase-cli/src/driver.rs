// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use omxbase::{
    driver::{CodecDriver, ProcessingContext},
    Error,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// How long the processing thread blocks before re-checking its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Software stand-in for a hardware codec: every input buffer is paired
/// with an output buffer, its payload length copied across, and both are
/// handed back to the caller.
pub struct LoopbackDriver {
    input: u32,
    output: u32,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LoopbackDriver {
    pub fn new(input: u32, output: u32) -> Self {
        LoopbackDriver {
            input,
            output,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl CodecDriver for LoopbackDriver {
    fn init(&mut self) -> Result<(), Error> {
        log::debug!("loopback codec opened");
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), Error> {
        log::debug!("loopback codec closed");
        Ok(())
    }

    fn buffer_process_create(&mut self, ctx: ProcessingContext) -> Result<(), Error> {
        if ctx.port(self.input).is_none() || ctx.port(self.output).is_none() {
            return Err(Error::BadPortIndex);
        }
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let (input, output) = (self.input, self.output);
        let handle = thread::Builder::new()
            .name("omx-loopback".to_owned())
            .spawn(move || process(ctx, input, output, stop))
            .map_err(|e| {
                log::error!("cannot spawn processing thread: {}", e);
                Error::InsufficientResources
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    fn buffer_process_terminate(&mut self) -> Result<(), Error> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("processing thread panicked");
                return Err(Error::Undefined);
            }
        }
        Ok(())
    }

    fn flush(&mut self, port: u32) -> Result<(), Error> {
        log::debug!("loopback flushed port {}", port);
        Ok(())
    }
}

impl Drop for LoopbackDriver {
    fn drop(&mut self) {
        if let Err(err) = self.buffer_process_terminate() {
            log::warn!("loopback teardown: {}", err);
        }
    }
}

fn process(ctx: ProcessingContext, input: u32, output: u32, stop: Arc<AtomicBool>) {
    let (Some(source), Some(sink)) = (ctx.port(input), ctx.port(output)) else {
        return;
    };

    while !stop.load(Ordering::SeqCst) {
        match ctx.wait_running(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => break,
        }

        let mut frame = match source.take(POLL_INTERVAL) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => continue,
            Err(_) => break,
        };

        // wait for somewhere to put the result; a stopped component gets its
        // input back unprocessed
        let mut result = None;
        while result.is_none() && ctx.is_running() && !stop.load(Ordering::SeqCst) {
            match sink.take(POLL_INTERVAL) {
                Ok(buffer) => result = buffer,
                Err(_) => break,
            }
        }

        if let Some(mut encoded) = result {
            encoded.filled_len = frame.filled_len.min(encoded.alloc_len);
            encoded.timestamp = frame.timestamp;
            encoded.flags = frame.flags;
            encoded.mark = frame.mark.take();
            log::trace!("loopback frame ts={}", frame.timestamp);
            ctx.return_buffer(encoded);
        }
        frame.filled_len = 0;
        ctx.return_buffer(frame);
    }
    log::debug!("loopback processing stopped");
}
