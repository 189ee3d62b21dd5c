//! Purpose: On-disk plugin descriptor (`index.json`) and its process-backed hooks.
//! Exports: `ManifestPlugin`, `plugin_process`.
//! Role: Default `Plugin` implementation produced by `ManifestImporter`.
//! Invariants: A manifest either validates completely or fails to load.
//! Invariants: Hook programs run from the plugin directory with inherited stdio.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use super::{Capabilities, CommandAction, CommandSpec, INDEX_FILE, Plugin};
use crate::api::Method;
use crate::core::config::{API_HOST_VAR, AUTH_HOST_VAR};
use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind};

#[derive(Deserialize)]
struct RawManifest {
    group: String,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    hooks: RawHooks,
    #[serde(default)]
    commands: Vec<RawCommand>,
}

#[derive(Deserialize, Default)]
struct RawHooks {
    init: Option<Vec<String>>,
    update: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawCommand {
    name: String,
    about: Option<String>,
    #[serde(default)]
    requires_app: bool,
    exec: Option<Vec<String>>,
    request: Option<RawRequest>,
}

#[derive(Deserialize)]
struct RawRequest {
    method: String,
    path: String,
}

#[derive(Clone, Debug)]
pub struct ManifestPlugin {
    name: String,
    dir: PathBuf,
    group: String,
    version: Option<String>,
    description: Option<String>,
    init_hook: Option<Vec<String>>,
    update_hook: Option<Vec<String>>,
    commands: Vec<CommandSpec>,
}

impl ManifestPlugin {
    pub fn from_dir(name: &str, dir: &Path) -> Result<Self, Error> {
        let path = dir.join(INDEX_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|err| Error::from_io(err, "failed to read plugin index").with_path(&path))?;
        Self::parse(name, dir, &text).map_err(|err| err.with_path(path))
    }

    pub fn parse(name: &str, dir: &Path, text: &str) -> Result<Self, Error> {
        let raw: RawManifest = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Plugin)
                .with_message(format!("invalid plugin index: {err}"))
                .with_plugin(name)
                .with_source(err)
        })?;

        let invalid = |message: String| {
            Error::new(ErrorKind::Plugin)
                .with_message(message)
                .with_plugin(name)
        };

        if raw.group.trim().is_empty() {
            return Err(invalid("plugin index has an empty `group`".to_string()));
        }
        for (hook, argv) in [("init", &raw.hooks.init), ("update", &raw.hooks.update)] {
            if argv.as_ref().is_some_and(|argv| argv.is_empty()) {
                return Err(invalid(format!("`hooks.{hook}` must name a program")));
            }
        }

        let mut commands = Vec::with_capacity(raw.commands.len());
        for command in raw.commands {
            let valid_name = !command.name.is_empty()
                && !command.name.starts_with('-')
                && !command.name.chars().any(char::is_whitespace);
            if !valid_name {
                return Err(invalid(format!("invalid command name `{}`", command.name)));
            }
            let action = match (command.exec, command.request) {
                (Some(argv), None) if !argv.is_empty() => CommandAction::Exec(argv),
                (Some(_), None) => {
                    return Err(invalid(format!(
                        "command `{}` has an empty `exec`",
                        command.name
                    )));
                }
                (None, Some(request)) => {
                    let method = request.method.parse::<Method>().map_err(|err| {
                        invalid(format!(
                            "command `{}`: {}",
                            command.name,
                            err.message().unwrap_or("bad method")
                        ))
                    })?;
                    if request.path.trim().is_empty() {
                        return Err(invalid(format!(
                            "command `{}` has an empty request path",
                            command.name
                        )));
                    }
                    CommandAction::Request {
                        method,
                        path: request.path,
                    }
                }
                _ => {
                    return Err(invalid(format!(
                        "command `{}` needs exactly one of `exec` or `request`",
                        command.name
                    )));
                }
            };
            commands.push(CommandSpec {
                name: command.name,
                about: command.about,
                requires_app: command.requires_app,
                action,
            });
        }

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            group: raw.group,
            version: raw.version.filter(|v| !v.is_empty()),
            description: raw.description,
            init_hook: raw.hooks.init,
            update_hook: raw.hooks.update,
            commands,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn run_hook(&self, hook: &str, argv: &[String], ctx: &Context) -> Result<(), Error> {
        let mut command = plugin_process(&self.dir, argv)?;
        command
            .env(API_HOST_VAR, &ctx.config.api_host)
            .env(AUTH_HOST_VAR, &ctx.config.auth_host)
            .env("AKA_PLUGIN_NAME", &self.name)
            .env("AKA_HOOK", hook);
        debug!(plugin = %self.name, hook, program = %argv[0], "running plugin hook");
        let status = command.status().map_err(|err| {
            Error::new(ErrorKind::Plugin)
                .with_message(format!("failed to start {hook} hook `{}`: {err}", argv[0]))
                .with_plugin(&self.name)
                .with_source(err)
        })?;
        if !status.success() {
            return Err(Error::new(ErrorKind::Plugin)
                .with_message(format!("{hook} hook exited with {status}"))
                .with_plugin(&self.name));
        }
        Ok(())
    }
}

impl Plugin for ManifestPlugin {
    fn group(&self) -> &str {
        &self.group
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_init: self.init_hook.is_some(),
            has_update: self.update_hook.is_some(),
        }
    }

    fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    fn init(&self, ctx: &Context) -> Result<(), Error> {
        match &self.init_hook {
            Some(argv) => self.run_hook("init", argv, ctx),
            None => Ok(()),
        }
    }

    fn update(&self, ctx: &Context) -> Result<(), Error> {
        match &self.update_hook {
            Some(argv) => self.run_hook("update", argv, ctx),
            None => Ok(()),
        }
    }
}

/// Builds a process for `argv` rooted in a plugin directory.
///
/// Programs written as `./x` or `../x` resolve against `dir`; bare names go
/// through `PATH`.
pub fn plugin_process(dir: &Path, argv: &[String]) -> Result<Command, Error> {
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::new(ErrorKind::Plugin).with_message("plugin program is empty"));
    };
    let program = if program.starts_with("./") || program.starts_with("../") {
        dir.join(program)
    } else {
        PathBuf::from(program)
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(dir)
        .env("AKA_PLUGIN_DIR", dir);
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::{ManifestPlugin, plugin_process};
    use crate::api::Method;
    use crate::core::error::ErrorKind;
    use crate::plugins::{CommandAction, Plugin};
    use std::path::Path;

    const FULL: &str = r#"{
        "group": "Apps",
        "version": "1.2.0",
        "description": "manage apps",
        "hooks": { "init": ["./hooks/init"] },
        "commands": [
            { "name": "apps", "about": "list apps", "request": { "method": "get", "path": "/apps" } },
            { "name": "apps:info", "requires_app": true, "request": { "method": "GET", "path": "/apps/{app}" } },
            { "name": "logs", "exec": ["./bin/logs", "--follow"] }
        ]
    }"#;

    #[test]
    fn full_manifest_parses() {
        let plugin = ManifestPlugin::parse("apps", Path::new("/p/apps"), FULL).expect("parse");
        assert_eq!(plugin.group(), "Apps");
        assert_eq!(plugin.version(), Some("1.2.0"));
        assert_eq!(plugin.description(), Some("manage apps"));
        let caps = plugin.capabilities();
        assert!(caps.has_init);
        assert!(!caps.has_update);

        let commands = plugin.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[1].action,
            CommandAction::Request {
                method: Method::Get,
                path: "/apps/{app}".to_string()
            }
        );
        assert!(commands[1].requires_app);
        assert_eq!(
            commands[2].action,
            CommandAction::Exec(vec!["./bin/logs".to_string(), "--follow".to_string()])
        );
    }

    #[test]
    fn group_is_required() {
        let err = ManifestPlugin::parse("x", Path::new("/p/x"), r#"{ "version": "1" }"#)
            .expect_err("missing group");
        assert_eq!(err.kind(), ErrorKind::Plugin);
        assert_eq!(err.plugin(), Some("x"));
    }

    #[test]
    fn command_needs_exactly_one_action() {
        let both = r#"{ "group": "G", "commands": [
            { "name": "c", "exec": ["x"], "request": { "method": "get", "path": "/" } }
        ] }"#;
        assert!(ManifestPlugin::parse("g", Path::new("/p/g"), both).is_err());

        let neither = r#"{ "group": "G", "commands": [ { "name": "c" } ] }"#;
        assert!(ManifestPlugin::parse("g", Path::new("/p/g"), neither).is_err());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let text = r#"{ "group": "G", "commands": [
            { "name": "c", "request": { "method": "trace", "path": "/" } }
        ] }"#;
        let err = ManifestPlugin::parse("g", Path::new("/p/g"), text).expect_err("method");
        assert!(err.message().expect("message").contains("trace"));
    }

    #[test]
    fn empty_hook_is_rejected() {
        let text = r#"{ "group": "G", "hooks": { "update": [] } }"#;
        assert!(ManifestPlugin::parse("g", Path::new("/p/g"), text).is_err());
    }

    #[test]
    fn relative_programs_resolve_against_plugin_dir() {
        let dir = Path::new("/p/logs");
        let command = plugin_process(dir, &["./bin/logs".to_string()]).expect("command");
        assert_eq!(Path::new(command.get_program()), dir.join("./bin/logs"));
        assert_eq!(command.get_current_dir(), Some(dir));

        let bare = plugin_process(dir, &["git".to_string(), "status".to_string()]).expect("bare");
        assert_eq!(bare.get_program(), "git");
        assert!(plugin_process(dir, &[]).is_err());
    }
}
