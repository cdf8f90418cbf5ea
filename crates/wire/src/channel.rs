//! Serial-matched request/response multiplexing over a byte stream pair.
//!
//! # Design
//!
//! Writers share one mutex-guarded output stream; each request line is
//! written atomically. A single reader thread parses incoming lines and
//! routes every response to the caller waiting on its serial through a
//! one-shot channel. Callers on different threads never wait on each other
//! beyond the duration of one line write.
//!
//! When the input stream ends or fails, every waiting caller receives the
//! same [`Fault`] and the channel stays failed.

use crate::error::Fault;
use crate::frame::{Request, Response};
use crate::transport::Transport;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

type Reply = Result<Value, Fault>;

/// Callers waiting for an answer, plus the terminal failure once known.
#[derive(Default)]
struct Pending {
    waiting: HashMap<u64, Sender<Reply>>,
    failure: Option<Fault>,
}

impl Pending {
    /// Record the terminal failure and wake everyone still waiting.
    fn fail_all(&mut self, fault: Fault) {
        if self.failure.is_none() {
            self.failure = Some(fault.clone());
        }
        for (_, waiter) in self.waiting.drain() {
            let _ = waiter.send(Err(fault.clone()));
        }
    }
}

/// A line-delimited JSON channel supporting concurrent callers.
pub struct LineChannel {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    pending: Arc<Mutex<Pending>>,
    next_serial: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl LineChannel {
    /// Wrap an input/output stream pair and start the reader thread.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let routes = Arc::clone(&pending);
        let reader = thread::Builder::new()
            .name("umi-wire-reader".into())
            .spawn(move || read_loop(BufReader::new(input), routes))
            .ok();
        if reader.is_none() {
            pending
                .lock()
                .fail_all(Fault::Io("could not start reader thread".into()));
        }
        Self {
            writer: Mutex::new(Some(Box::new(output))),
            pending,
            next_serial: AtomicU64::new(0),
            reader: Mutex::new(reader),
        }
    }

    /// Number of callers currently waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().waiting.len()
    }

    /// Wait for the reader thread to exit. Only returns once the input
    /// stream has ended, so close the peer first.
    pub fn join_reader(&self) {
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer closed"))?;
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

impl Transport for LineChannel {
    fn call(&self, command: &str, args: Vec<Value>) -> Reply {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let line = Request::new(serial, command, args)
            .to_line()
            .map_err(|e| Fault::Io(format!("cannot encode request: {e}")))?;

        let (tx, rx) = channel::bounded(1);
        {
            let mut pending = self.pending.lock();
            if let Some(fault) = &pending.failure {
                return Err(fault.clone());
            }
            pending.waiting.insert(serial, tx);
        }

        trace!(serial, command, ">> request");
        if let Err(e) = self.write_line(&line) {
            let fault = Fault::Io(e.to_string());
            let mut pending = self.pending.lock();
            pending.waiting.remove(&serial);
            pending.fail_all(fault.clone());
            return Err(fault);
        }

        rx.recv()
            .unwrap_or_else(|_| Err(Fault::Closed("reply route dropped".into())))
    }

    fn close(&self) {
        self.pending
            .lock()
            .fail_all(Fault::Closed("closed locally".into()));
        // dropping the writer closes the peer's input
        self.writer.lock().take();
    }
}

fn read_loop<R: BufRead>(input: R, pending: Arc<Mutex<Pending>>) {
    let mut lines = input.lines();
    let fault = loop {
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => break Fault::Io(e.to_string()),
            None => break Fault::Closed("end of stream".into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response: Response = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "skipping malformed frame");
                continue;
            }
        };
        let Some(serial) = response.reply_to else {
            debug!(frame = %line, "ignoring peer-initiated frame");
            continue;
        };
        trace!(serial, "<< response");
        let waiter = pending.lock().waiting.remove(&serial);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response.into_outcome());
            }
            None => warn!(serial, "response for unknown serial"),
        }
    };
    debug!(reason = %fault, "reader stopped");
    pending.lock().fail_all(fault);
}
