//! Purpose: Hold the current event and apply one protocol line to it.
//! Exports: `Session`.
//! Role: State machine behind the command loop (Idle until the first valid `EVENT`).
//! Invariants: Only a successful `EVENT` replaces the stored value; every failure leaves it intact.
//! Invariants: Handlers get a shared borrow of the event for one call and cannot mutate it.
//! Invariants: Lookup and execution failures both answer `ERR No such method`.

use serde_json::Value;
use tracing::debug;

use crate::json::parse;
use crate::protocol::{Command, Response, ResponseError, parse_command};
use crate::registry::HandlerRegistry;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    event: Option<Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&self) -> Option<&Value> {
        self.event.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.event.is_some()
    }

    /// Applies one input line. `None` means the line is answered by silence
    /// (a successful `EVENT`).
    pub fn handle_line(&mut self, line: &str, registry: &HandlerRegistry) -> Option<Response> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(err) => return Some(err.into()),
        };
        match command {
            Command::Event { payload } => self.set_event(payload).err().map(Response::from),
            Command::Invoke { handler } => Some(self.invoke(handler, registry)),
        }
    }

    fn set_event(&mut self, payload: &str) -> Result<(), ResponseError> {
        match parse::from_str::<Value>(payload) {
            Ok(value) => {
                self.event = Some(value);
                Ok(())
            }
            Err(err) => {
                debug!(
                    category = parse::categorize_error(&err).label(),
                    "rejected event payload"
                );
                Err(ResponseError::InvalidPayload)
            }
        }
    }

    fn invoke(&self, handler: Option<&str>, registry: &HandlerRegistry) -> Response {
        let Some(event) = &self.event else {
            return ResponseError::NoEventSet.into();
        };
        let Some(name) = handler else {
            return ResponseError::NoSuchMethod.into();
        };
        match registry.invoke(name, event) {
            Ok(outcome) => Response::Result(outcome),
            Err(err) => {
                debug!(handler = name, error = %err, "handler call failed");
                ResponseError::NoSuchMethod.into()
            }
        }
    }
}
