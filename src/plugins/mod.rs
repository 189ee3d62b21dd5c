//! Purpose: Plugin descriptors, discovery, registry, and maintenance.
//! Exports: `Plugin`, `PluginLoader`, `Registry`, `update`, manifest types.
//! Role: Turns plugin directories into the command surface the CLI exposes.
//! Invariants: Load failures exclude a plugin; init failures keep it registered.
//! Invariants: Built-in plugins load before third-party ones; later names win.
//! Invariants: Hooks run only when the descriptor declares the capability.

mod loader;
mod manifest;
mod registry;
mod update;

use std::fmt;

use crate::api::Method;
use crate::core::context::Context;
use crate::core::error::Error;

pub use loader::{LoadReport, ManifestImporter, PluginImporter, PluginLoader, load_all};
pub use manifest::{ManifestPlugin, plugin_process};
pub use registry::{RESERVED_COMMANDS, RegisteredPlugin, Registry};
pub use update::{GitMaintainer, Maintainer, UpdateReport, UpdateStep, update};

/// File that marks a directory as a plugin.
pub const INDEX_FILE: &str = "index.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_init: bool,
    pub has_update: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginSource {
    Builtin,
    ThirdParty,
}

impl PluginSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginSource::Builtin => "builtin",
            PluginSource::ThirdParty => "third_party",
        }
    }
}

/// A command a plugin contributes to the CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub about: Option<String>,
    pub requires_app: bool,
    pub action: CommandAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandAction {
    /// Run a program from the plugin directory with the trailing arguments.
    Exec(Vec<String>),
    /// Call the API through the shared client; `{app}` in `path` is filled from `--app`.
    Request { method: Method, path: String },
}

/// Descriptor for one loaded plugin.
///
/// Hooks default to no-ops; the loader and update loop only call a hook when
/// `capabilities()` declares it.
pub trait Plugin {
    fn group(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn commands(&self) -> &[CommandSpec] {
        &[]
    }

    fn init(&self, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    fn update(&self, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Load,
    Init,
    Inspect,
    Pull,
    Update,
    Install,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Scan => "scan",
            Phase::Load => "load",
            Phase::Init => "init",
            Phase::Inspect => "inspect",
            Phase::Pull => "pull",
            Phase::Update => "update",
            Phase::Install => "install",
        }
    }

    /// Verb used in one-line diagnostics ("error loading plugin ...").
    pub fn describe(self) -> &'static str {
        match self {
            Phase::Scan => "scanning",
            Phase::Load => "loading",
            Phase::Init => "initializing",
            Phase::Inspect => "inspecting",
            Phase::Pull => "pulling",
            Phase::Update => "updating",
            Phase::Install => "installing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `PluginError` is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    Plugin,
    /// The client's own checkout, refreshed at the end of `update`.
    Client,
}

/// An isolated failure attributed to one plugin (or plugin directory for `Scan`).
#[derive(Debug)]
pub struct PluginError {
    pub plugin: String,
    pub phase: Phase,
    pub subject: Subject,
    pub error: Error,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, phase: Phase, error: Error) -> Self {
        Self {
            plugin: plugin.into(),
            phase,
            subject: Subject::Plugin,
            error,
        }
    }

    /// A failure while refreshing the client named `name`.
    pub fn client(name: impl Into<String>, phase: Phase, error: Error) -> Self {
        Self {
            subject: Subject::Client,
            ..Self::new(name, phase, error)
        }
    }

    /// One-line diagnostic: subject, phase, and error text.
    pub fn summary(&self) -> String {
        let detail = self
            .error
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| self.error.to_string());
        match self.subject {
            Subject::Plugin => format!(
                "error {} plugin \"{}\": {detail}",
                self.phase.describe(),
                self.plugin
            ),
            Subject::Client => format!("error updating {}: {detail}", self.plugin),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
