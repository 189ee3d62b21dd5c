use std::path::{Path, PathBuf};

use tracing::warn;

use super::{Capabilities, CommandSpec, Plugin, PluginSource};

/// Command names plugins may not claim.
pub const RESERVED_COMMANDS: &[&str] = &["update", "version", "completion", "help"];

pub struct RegisteredPlugin {
    pub name: String,
    pub source: PluginSource,
    pub dir: PathBuf,
    plugin: Box<dyn Plugin>,
}

impl RegisteredPlugin {
    pub fn new(
        name: impl Into<String>,
        source: PluginSource,
        dir: impl Into<PathBuf>,
        plugin: Box<dyn Plugin>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            dir: dir.into(),
            plugin,
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn group(&self) -> &str {
        self.plugin.group()
    }

    pub fn version(&self) -> Option<&str> {
        self.plugin.version()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.plugin.capabilities()
    }

    pub fn commands(&self) -> &[CommandSpec] {
        self.plugin.commands()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("dir", &self.dir)
            .field("group", &self.group())
            .finish()
    }
}

/// Insertion-ordered plugin table keyed by plugin name.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegisteredPlugin>,
}

impl Registry {
    /// Registers `entry`. A plugin with the same name is replaced in its
    /// existing slot and returned.
    pub fn insert(&mut self, entry: RegisteredPlugin) -> Option<RegisteredPlugin> {
        match self.entries.iter().position(|e| e.name == entry.name) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx], entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = RegisteredPlugin>) {
        for entry in entries {
            if let Some(previous) = self.insert(entry) {
                tracing::debug!(
                    plugin = %previous.name,
                    source = previous.source.as_str(),
                    "plugin overridden by later registration"
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Effective plugin commands in registry order.
    ///
    /// Reserved names are dropped; when two plugins declare the same command
    /// the later registration wins.
    pub fn commands(&self) -> Vec<(&RegisteredPlugin, &CommandSpec)> {
        let mut resolved: Vec<(&RegisteredPlugin, &CommandSpec)> = Vec::new();
        for entry in &self.entries {
            for spec in entry.commands() {
                if RESERVED_COMMANDS.contains(&spec.name.as_str()) {
                    warn!(
                        plugin = %entry.name,
                        command = %spec.name,
                        "ignoring plugin command that shadows a built-in"
                    );
                    continue;
                }
                match resolved.iter().position(|(_, s)| s.name == spec.name) {
                    Some(idx) => {
                        warn!(
                            command = %spec.name,
                            previous = %resolved[idx].0.name,
                            plugin = %entry.name,
                            "command declared by more than one plugin"
                        );
                        resolved[idx] = (entry, spec);
                    }
                    None => resolved.push((entry, spec)),
                }
            }
        }
        resolved
    }

    pub fn find_command(&self, name: &str) -> Option<(&RegisteredPlugin, &CommandSpec)> {
        if RESERVED_COMMANDS.contains(&name) {
            return None;
        }
        self.entries.iter().rev().find_map(|entry| {
            entry
                .commands()
                .iter()
                .find(|spec| spec.name == name)
                .map(|spec| (entry, spec))
        })
    }
}
