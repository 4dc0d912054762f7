//! Purpose: `evcmd` CLI entry point.
//! Role: Binary crate root; parses args, loads plugins, runs the command loop on stdio.
//! Invariants: Stdout carries protocol lines only (or the `--list-handlers` listing).
//! Invariants: Fatal errors are emitted on stderr (text on a TTY, JSON otherwise).
//! Invariants: Process exit code is derived from `to_exit_code`.
//! Invariants: Plugins are fully loaded before the first stdin line is read.
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use evcmd::core::error::{Error, ErrorKind, to_exit_code};
use evcmd::interp;
use evcmd::plugin::{DEFAULT_EXTENSION, PluginLoader};
use evcmd::registry::HandlerRegistry;

#[derive(Parser)]
#[command(
    name = "evcmd",
    version,
    about = "Line-oriented event command interpreter",
    long_about = None,
    after_help = r#"PROTOCOL (stdin, one command per line)
  EVENT <json>          set the current event (JSON must not contain spaces)
  CMD <handler>         run a handler against the current event

RESPONSES (stdout)
  RESP True | RESP False | RESP None
  ERR invalid command format | ERR invalid event payload
  ERR No event set | ERR No such method | ERR Command not understood

EXAMPLES
  $ printf 'EVENT {"type":"click"}\nCMD isClick\n' | evcmd ./plugins
  RESP True

Logging goes to stderr; set RUST_LOG (e.g. RUST_LOG=debug) to see plugin loading."#
)]
struct Cli {
    #[arg(help = "Directory of plugin units", value_hint = ValueHint::DirPath)]
    plugin_dir: PathBuf,
    #[arg(
        long,
        default_value = DEFAULT_EXTENSION,
        help = "File extension of plugin units"
    )]
    extension: String,
    #[arg(long, help = "Print registered handler names and exit")]
    list_handlers: bool,
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
                _ => 2,
            };
            err.print().map_err(|io_err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write help")
                    .with_source(io_err)
            })?;
            return Ok(code);
        }
    };

    init_tracing();

    let loader = PluginLoader::new().with_extension(cli.extension);
    let mut registry = HandlerRegistry::new();
    let report = loader
        .load_all(&cli.plugin_dir, &mut registry)
        .map_err(add_load_hint)?;
    info!(
        units = report.units.len(),
        handlers = registry.len(),
        dir = %cli.plugin_dir.display(),
        "plugins loaded"
    );

    if cli.list_handlers {
        list_handlers(&registry)?;
        return Ok(0);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    interp::run(stdin.lock(), stdout.lock(), &registry)?;
    Ok(0)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn list_handlers(registry: &HandlerRegistry) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    for name in registry.names() {
        writeln!(stdout, "{name}").map_err(|err| {
            Error::from_io(err).with_message("failed to write handler list")
        })?;
    }
    stdout
        .flush()
        .map_err(|err| Error::from_io(err).with_message("failed to write handler list"))
}

fn add_load_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => {
            err.with_hint("Plugin directory not found. Pass an existing directory of plugin units.")
        }
        ErrorKind::Permission => {
            err.with_hint("Permission denied. Check read permissions on the plugin directory.")
        }
        ErrorKind::Io => err.with_hint("I/O error while loading plugins. Check the path and filesystem."),
        _ => err,
    }
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Plugin => "invalid plugin".to_string(),
        ErrorKind::Protocol => "protocol error".to_string(),
        ErrorKind::Handler => "handler failed".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(handler) = err.handler() {
        inner.insert("handler".to_string(), json!(handler));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(handler) = err.handler() {
        lines.push(format!("handler: {handler}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
