//! Child-process transport.
//!
//! Starts the engine as a private child process and speaks the line
//! protocol over its stdin/stdout. Nothing else can connect to it. The
//! child's stderr is forwarded to the log.

use crate::channel::LineChannel;
use crate::error::{Fault, WireError};
use crate::transport::Transport;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// Transport bound to the lifetime of a spawned engine process.
pub struct ProcessTransport {
    program: String,
    child: Mutex<Option<Child>>,
    channel: LineChannel,
}

impl ProcessTransport {
    /// Spawn `program args...` and connect to its stdio.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self, WireError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WireError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(WireError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(WireError::MissingPipe("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            let name = program.to_string();
            let _ = thread::Builder::new()
                .name("umi-wire-stderr".into())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        warn!(engine = %name, "{line}");
                    }
                });
        }

        info!(program, pid = child.id(), "engine process started");
        Ok(Self {
            program: program.to_string(),
            child: Mutex::new(Some(child)),
            channel: LineChannel::new(stdout, stdin),
        })
    }

    /// Process id of the running engine, if it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.lock().as_ref().map(Child::id)
    }
}

impl Transport for ProcessTransport {
    fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, Fault> {
        self.channel.call(command, args)
    }

    fn close(&self) {
        self.channel.close();
        if let Some(mut child) = self.child.lock().take() {
            // closing stdin asks the engine to exit; make sure it does
            match child.try_wait() {
                Ok(Some(status)) => debug!(program = %self.program, %status, "engine exited"),
                _ => {
                    let _ = child.kill();
                    match child.wait() {
                        Ok(status) => debug!(program = %self.program, %status, "engine stopped"),
                        Err(e) => warn!(program = %self.program, error = %e, "engine wait failed"),
                    }
                }
            }
        }
        self.channel.join_reader();
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if self.child.lock().is_some() {
            self.close();
        }
    }
}
