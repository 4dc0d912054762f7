//! Purpose: Define the line protocol spoken on the interpreter's stdin/stdout.
//! Exports: `Command`, `Verb`, `Outcome`, `Response`, `ResponseError`, `parse_command`.
//! Role: Pure parsing/rendering layer shared by the session loop and the worker client.
//! Invariants: Tokens are split on ASCII whitespace; payload tokens cannot contain whitespace.
//! Invariants: Verbs match case-insensitively by substring, `EVENT` before `CMD`.
//! Invariants: Response wording is fixed; drivers match on it verbatim.

use std::fmt;

use crate::core::error::{Error, ErrorKind};

const EVENT_VERB: &str = "EVENT";
const CMD_VERB: &str = "CMD";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    Event,
    Cmd,
}

impl Verb {
    /// Classifies a verb token. `xEVENTx` counts as `EVENT`; a token holding
    /// both words resolves to `EVENT`.
    pub fn classify(token: &str) -> Option<Self> {
        let upper = token.to_ascii_uppercase();
        if upper.contains(EVENT_VERB) {
            Some(Self::Event)
        } else if upper.contains(CMD_VERB) {
            Some(Self::Cmd)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    /// Replace the current event with the decoded payload.
    Event { payload: &'a str },
    /// Invoke a handler. A missing name is kept so the session can still
    /// apply its idle check before rejecting it.
    Invoke { handler: Option<&'a str> },
}

pub fn parse_command(line: &str) -> Result<Command<'_>, ResponseError> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let Some(verb) = tokens.first().and_then(|token| Verb::classify(token)) else {
        return Err(ResponseError::NotUnderstood);
    };
    match verb {
        Verb::Event => match tokens.as_slice() {
            [_, payload] => Ok(Command::Event { payload: *payload }),
            _ => Err(ResponseError::InvalidFormat),
        },
        Verb::Cmd => Ok(Command::Invoke {
            handler: tokens.get(1).copied(),
        }),
    }
}

/// Result of one handler invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    True,
    False,
    /// The handler ran but produced no value.
    None,
}

impl Outcome {
    pub fn from_truthy(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::True => "True",
            Self::False => "False",
            Self::None => "None",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseError {
    InvalidFormat,
    InvalidPayload,
    NoEventSet,
    NoSuchMethod,
    NotUnderstood,
}

impl ResponseError {
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid command format",
            Self::InvalidPayload => "invalid event payload",
            Self::NoEventSet => "No event set",
            Self::NoSuchMethod => "No such method",
            Self::NotUnderstood => "Command not understood",
        }
    }

    pub fn from_message(message: &str) -> Option<Self> {
        [
            Self::InvalidFormat,
            Self::InvalidPayload,
            Self::NoEventSet,
            Self::NoSuchMethod,
            Self::NotUnderstood,
        ]
        .into_iter()
        .find(|err| err.message() == message)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Result(Outcome),
    Error(ResponseError),
}

impl Response {
    /// Parses one response line as written by the interpreter.
    ///
    /// Lines outside the fixed vocabulary are `Protocol` errors.
    pub fn parse_line(line: &str) -> Result<Self, Error> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        match head {
            "RESP" => Outcome::parse(rest.trim()).map(Self::Result).ok_or_else(|| {
                Error::new(ErrorKind::Protocol)
                    .with_message(format!("unknown response value `{}`", rest.trim()))
            }),
            "ERR" => ResponseError::from_message(rest).map(Self::Error).ok_or_else(|| {
                Error::new(ErrorKind::Protocol)
                    .with_message(format!("unknown error response `{rest}`"))
            }),
            _ => Err(Error::new(ErrorKind::Protocol)
                .with_message(format!("unexpected response line `{line}`"))),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result(outcome) => write!(f, "RESP {outcome}"),
            Self::Error(err) => write!(f, "ERR {}", err.message()),
        }
    }
}

impl From<ResponseError> for Response {
    fn from(err: ResponseError) -> Self {
        Self::Error(err)
    }
}
