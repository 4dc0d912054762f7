//! Purpose: Drive an interpreter child process over its stdin/stdout protocol.
//! Exports: `ScriptWorker`.
//! Role: Host-side client; sends `EVENT` + `CMD` pairs and reads back one response line.
//! Invariants: Payloads and handler names containing whitespace are rejected before any write.
//! Invariants: Exactly one response line is consumed per `run` call.
//! Invariants: `ERR` lines surface as `Handler` errors carrying the wire message.
//! Invariants: Lines outside the response vocabulary are `Protocol` errors.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use serde_json::Value;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::protocol::{Outcome, Response};

pub struct ScriptWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ScriptWorker {
    /// Spawns `program` with `args`; stderr is inherited so interpreter logs stay visible.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| {
                Error::from_io(err)
                    .with_message("failed to start interpreter")
                    .with_path(program)
            })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(Error::new(ErrorKind::Internal).with_message("interpreter pipes unavailable"));
        };
        debug!(pid = child.id(), "interpreter started");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Sets `event` as the current event and runs `handler` against it.
    pub fn run(&mut self, handler: &str, event: &Value) -> Result<Outcome, Error> {
        if handler.is_empty() || handler.contains(|c: char| c.is_ascii_whitespace()) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("handler name must be non-empty and free of whitespace")
                .with_handler(handler));
        }
        let payload = serde_json::to_string(event).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode event")
                .with_source(err)
        })?;
        if payload.contains(|c: char| c.is_ascii_whitespace()) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("event payload cannot be sent: encoded JSON contains whitespace")
                .with_hint("The line protocol splits on whitespace; strip spaces from string values."));
        }

        write!(self.stdin, "EVENT {payload}\nCMD {handler}\n")
            .and_then(|()| self.stdin.flush())
            .map_err(|err| {
                Error::from_io(err)
                    .with_message("failed to send command to interpreter")
                    .with_handler(handler)
            })?;

        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).map_err(|err| {
            Error::from_io(err)
                .with_message("failed to read interpreter response")
                .with_handler(handler)
        })?;
        if read == 0 {
            return Err(Error::new(ErrorKind::Io)
                .with_message("interpreter closed its output")
                .with_handler(handler));
        }
        match Response::parse_line(&line) {
            Ok(Response::Result(outcome)) => Ok(outcome),
            Ok(Response::Error(err)) => Err(Error::new(ErrorKind::Handler)
                .with_message(err.message())
                .with_handler(handler)),
            Err(err) => Err(err.with_handler(handler)),
        }
    }

    /// Closes the interpreter's input and waits for it to exit.
    pub fn finish(self) -> Result<ExitStatus, Error> {
        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        child.wait().map_err(|err| {
            Error::from_io(err).with_message("failed to wait for interpreter")
        })
    }
}
