//! Purpose: Run the read → dispatch → respond loop over line-oriented streams.
//! Exports: `run`, `RunStats`.
//! Role: Transport half of the interpreter; `Session` owns the protocol semantics.
//! Invariants: Each response is written and flushed before the next line is read.
//! Invariants: EOF ends the loop cleanly with no trailing output.
//! Invariants: Only stream I/O failures escape; per-line problems become `ERR` lines.

use std::io::{BufRead, Write};

use tracing::{debug, trace};

use crate::core::error::Error;
use crate::protocol::Response;
use crate::registry::HandlerRegistry;
use crate::session::Session;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub lines: u64,
    pub responses: u64,
    pub errors: u64,
}

pub fn run<R, W>(mut reader: R, mut writer: W, registry: &HandlerRegistry) -> Result<RunStats, Error>
where
    R: BufRead,
    W: Write,
{
    let mut session = Session::new();
    let mut stats = RunStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|err| {
            Error::from_io(err).with_message("failed to read command line")
        })?;
        if read == 0 {
            writer
                .flush()
                .map_err(|err| Error::from_io(err).with_message("failed to flush responses"))?;
            debug!(
                lines = stats.lines,
                responses = stats.responses,
                errors = stats.errors,
                "input exhausted"
            );
            return Ok(stats);
        }
        stats.lines += 1;

        // Undecodable bytes stay in the line as U+FFFD and fail the normal checks.
        let line = String::from_utf8_lossy(&buf);
        let command = line.trim_end_matches(['\n', '\r']);
        trace!(line = command, "command received");
        let Some(response) = session.handle_line(command, registry) else {
            continue;
        };
        if matches!(response, Response::Error(_)) {
            stats.errors += 1;
        }
        stats.responses += 1;
        write_response(&mut writer, &response)?;
    }
}

fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<(), Error> {
    writeln!(writer, "{response}")
        .map_err(|err| Error::from_io(err).with_message("failed to write response"))?;
    writer
        .flush()
        .map_err(|err| Error::from_io(err).with_message("failed to flush response"))
}

#[cfg(test)]
mod tests {
    use super::{RunStats, run};
    use crate::protocol::Outcome;
    use crate::registry::HandlerRegistry;
    use serde_json::Value;
    use std::io::Cursor;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("isClick", "test", |event: &Value| {
            Ok(Outcome::from_truthy(event["type"] == "click"))
        });
        registry
    }

    fn transcript(input: &str) -> (String, RunStats) {
        transcript_bytes(input.as_bytes())
    }

    fn transcript_bytes(input: &[u8]) -> (String, RunStats) {
        let mut output = Vec::new();
        let stats = run(Cursor::new(input), &mut output, &registry()).expect("run");
        (String::from_utf8(output).expect("utf8"), stats)
    }

    #[test]
    fn click_scenario() {
        let (output, stats) = transcript("EVENT {\"type\":\"click\",\"x\":1}\nCMD isClick\n");
        assert_eq!(output, "RESP True\n");
        assert_eq!(
            stats,
            RunStats {
                lines: 2,
                responses: 1,
                errors: 0
            }
        );
    }

    #[test]
    fn one_response_per_non_event_line() {
        let input = concat!(
            "CMD anything\n",
            "EVENT\n",
            "EVENT bad-json\n",
            "EVENT {\"type\":\"key\"}\n",
            "CMD isClick\n",
            "CMD missing\n",
            "QUIT\n",
        );
        let (output, stats) = transcript(input);
        assert_eq!(
            output,
            concat!(
                "ERR No event set\n",
                "ERR invalid command format\n",
                "ERR invalid event payload\n",
                "RESP False\n",
                "ERR No such method\n",
                "ERR Command not understood\n",
            )
        );
        assert_eq!(stats.lines, 7);
        assert_eq!(stats.responses, 6);
        assert_eq!(stats.errors, 5);
    }

    #[test]
    fn last_line_without_newline_is_processed() {
        let (output, _) = transcript("EVENT {\"type\":\"click\"}\r\nCMD isClick");
        assert_eq!(output, "RESP True\n");
    }

    #[test]
    fn invalid_utf8_line_does_not_end_the_loop() {
        let input = b"EVENT {\"type\":\"click\"}\nCMD \xff\xfe\n\xff\nCMD isClick\n";
        let (output, stats) = transcript_bytes(input);
        assert_eq!(
            output,
            concat!(
                "ERR No such method\n",
                "ERR Command not understood\n",
                "RESP True\n",
            )
        );
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.errors, 2);
    }

    #[test]
    fn empty_input_produces_nothing() {
        let (output, stats) = transcript("");
        assert!(output.is_empty());
        assert_eq!(stats, RunStats::default());
    }
}
