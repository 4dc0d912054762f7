//! Purpose: Populate the handler registry from a plugin directory before the loop starts.
//! Exports: `PluginLoader`, `LoadReport`, `LoadedUnit`, `PluginManifest`, `ScriptPlugin`.
//! Role: Startup-only component; everything the command loop can call comes through here.
//! Invariants: The directory scan is non-recursive and ordered by file name.
//! Invariants: A missing/unreadable directory or a broken unit fails the whole load.
//! Invariants: Hidden files and files with other extensions are skipped.

mod manifest;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::registry::{HandlerRegistry, Plugin};

pub use manifest::{PluginManifest, ScriptPlugin};

pub const DEFAULT_EXTENSION: &str = "json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedUnit {
    pub name: String,
    pub path: Option<PathBuf>,
    pub handlers: Vec<String>,
}

/// What a load pass registered, in load order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub units: Vec<LoadedUnit>,
}

impl LoadReport {
    pub fn handler_count(&self) -> usize {
        self.units.iter().map(|unit| unit.handlers.len()).sum()
    }
}

#[derive(Clone, Debug)]
pub struct PluginLoader {
    extension: String,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lists unit files directly inside `dir`, sorted by file name.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        let entries = std::fs::read_dir(dir).map_err(|err| {
            Error::from_io(err)
                .with_message("failed to read plugin directory")
                .with_path(dir)
        })?;

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::from_io(err)
                    .with_message("failed to read plugin directory entry")
                    .with_path(dir)
            })?;
            let path = entry.path();
            if self.is_unit(&path) {
                units.push(path);
            } else {
                debug!(path = %path.display(), "skipping non-plugin entry");
            }
        }
        units.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(units)
    }

    /// Loads every unit in `dir` into `registry`.
    pub fn load_all(&self, dir: &Path, registry: &mut HandlerRegistry) -> Result<LoadReport, Error> {
        if !dir.is_dir() && dir.exists() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("plugin path is not a directory")
                .with_path(dir));
        }

        let mut report = LoadReport::default();
        for path in self.discover(dir)? {
            let plugin = ScriptPlugin::load(&path)?;
            let handlers: Vec<String> = plugin.handler_names().map(str::to_string).collect();
            plugin
                .register(registry)
                .map_err(|err| err.with_path(&path))?;
            info!(
                plugin = %plugin.name(),
                path = %path.display(),
                handlers = handlers.len(),
                "loaded plugin unit"
            );
            report.units.push(LoadedUnit {
                name: plugin.name().to_string(),
                path: Some(path),
                handlers,
            });
        }
        Ok(report)
    }

    /// Registers a native plugin. The registry sees it at the point of the call,
    /// so calling this after `load_all` lets it override script handlers.
    pub fn register_plugin(
        &self,
        plugin: &dyn Plugin,
        registry: &mut HandlerRegistry,
    ) -> Result<LoadedUnit, Error> {
        let mark = registry.registration_count();
        plugin.register(registry)?;
        let handlers = registry
            .registered_since(mark)
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        info!(plugin = %plugin.name(), "registered native plugin");
        Ok(LoadedUnit {
            name: plugin.name().to_string(),
            path: None,
            handlers,
        })
    }

    fn is_unit(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(|name| name.starts_with('.'));
        !hidden
            && path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}
