//! Purpose: Parse one plugin unit file into compiled script handlers.
//! Exports: `PluginManifest`, `ScriptPlugin`.
//! Role: File-backed implementation of the `Plugin` registration entry point.
//! Invariants: Unknown manifest fields are rejected so typos fail at startup.
//! Invariants: Every expression compiles before any handler of the unit is registered.
//! Invariants: Handlers of one unit register in name order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};
use crate::json::parse::{self, ParseFailureCategory};
use crate::registry::{Handler, HandlerRegistry, Plugin};
use crate::script::ScriptHandler;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// jq definitions shared by every handler in the unit.
    #[serde(default)]
    pub prelude: Option<String>,
    pub handlers: BTreeMap<String, String>,
}

impl PluginManifest {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        parse::from_str(text).map_err(|err| {
            let message = match parse::categorize_error(&err) {
                ParseFailureCategory::Shape => "plugin manifest has unexpected shape",
                _ => "plugin manifest is not valid JSON",
            };
            Error::new(ErrorKind::Plugin)
                .with_message(message)
                .with_hint(parse::hint_for_error(&err, "plugin manifest"))
                .with_source(err)
        })
    }
}

#[derive(Clone, Debug)]
pub struct ScriptPlugin {
    name: String,
    path: Option<PathBuf>,
    handlers: Vec<(String, ScriptHandler)>,
}

impl ScriptPlugin {
    pub fn from_manifest(name: impl Into<String>, manifest: &PluginManifest) -> Result<Self, Error> {
        let prelude = manifest.prelude.as_deref();
        let handlers = manifest
            .handlers
            .iter()
            .map(|(handler, expr)| {
                if handler.is_empty() || handler.contains(|c: char| c.is_ascii_whitespace()) {
                    return Err(Error::new(ErrorKind::Plugin)
                        .with_message("handler names must be non-empty and free of whitespace")
                        .with_handler(handler.as_str()));
                }
                ScriptHandler::compile(prelude, expr)
                    .map(|compiled| (handler.clone(), compiled))
                    .map_err(|err| err.with_handler(handler.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            path: None,
            handlers,
        })
    }

    /// Reads and compiles a unit file; the plugin is named after the file stem.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::from_io(err)
                .with_message("failed to read plugin unit")
                .with_path(path)
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let manifest = PluginManifest::from_json(&text).map_err(|err| err.with_path(path))?;
        let mut plugin =
            Self::from_manifest(name, &manifest).map_err(|err| err.with_path(path))?;
        plugin.path = Some(path.to_path_buf());
        Ok(plugin)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }
}

impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, registry: &mut HandlerRegistry) -> Result<(), Error> {
        for (name, script) in &self.handlers {
            let script = script.clone();
            registry.register(
                name.as_str(),
                Handler::new(self.name.as_str(), move |event| script.evaluate(event)),
            );
        }
        Ok(())
    }
}
