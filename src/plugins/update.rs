//! Purpose: Refresh third-party plugins and the client itself.
//! Exports: `update`, `Maintainer`, `GitMaintainer`, `UpdateReport`, `UpdateStep`.
//! Role: Backs the built-in `update` command.
//! Invariants: One plugin's failure never stops the loop or the self-update.
//! Invariants: Directories that are not git checkouts are skipped without error.
//! Invariants: The client refreshes only from `Config::source_dir`; without one it is skipped.

use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use super::loader::{PluginImporter, PluginLoader};
use super::{Phase, PluginError, PluginSource};
use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind};

/// Version-control and install operations used by the update loop.
pub trait Maintainer {
    fn pull(&self, dir: &Path) -> Result<(), Error>;
    fn reinstall(&self, dir: &Path) -> Result<(), Error>;
}

/// Shells out to `git` and `cargo` with the console attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct GitMaintainer;

impl Maintainer for GitMaintainer {
    fn pull(&self, dir: &Path) -> Result<(), Error> {
        run(Command::new("git").args(["pull", "--quiet"]).current_dir(dir))
    }

    fn reinstall(&self, dir: &Path) -> Result<(), Error> {
        run(Command::new("cargo")
            .args(["install", "--path", ".", "--locked", "--force", "--quiet"])
            .current_dir(dir))
    }
}

fn run(command: &mut Command) -> Result<(), Error> {
    let program = command.get_program().to_string_lossy().to_string();
    let status = command.status().map_err(|err| {
        Error::from_io(err, format!("failed to run `{program}`"))
    })?;
    if !status.success() {
        return Err(Error::new(ErrorKind::Io).with_message(format!("`{program}` exited with {status}")));
    }
    Ok(())
}

/// Progress notifications, emitted before each step starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStep<'a> {
    Plugin(&'a str),
    Client,
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<PluginError>,
}

pub fn update<I, M, F>(
    ctx: &Context,
    loader: &PluginLoader<I>,
    maintainer: &M,
    mut on_step: F,
) -> UpdateReport
where
    I: PluginImporter,
    M: Maintainer,
    F: FnMut(UpdateStep<'_>),
{
    let mut report = UpdateReport::default();
    let dir = &ctx.config.third_party_plugins_dir;

    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut plugins: Vec<(String, std::path::PathBuf)> = entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| {
                    let name = entry.file_name().to_str()?.to_string();
                    Some((name, entry.path()))
                })
                .collect();
            plugins.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, plugin_dir) in plugins {
                update_plugin(ctx, loader, maintainer, &name, &plugin_dir, &mut on_step, &mut report);
            }
        }
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "cannot list third-party plugins");
            report.errors.push(PluginError::new(
                dir.display().to_string(),
                Phase::Scan,
                Error::from_io(err, "cannot read plugin directory").with_path(dir),
            ));
        }
    }

    update_client(ctx, maintainer, &mut on_step, &mut report);
    report
}

fn update_client<M, F>(
    ctx: &Context,
    maintainer: &M,
    on_step: &mut F,
    report: &mut UpdateReport,
) where
    M: Maintainer,
    F: FnMut(UpdateStep<'_>),
{
    let client = &ctx.config.package.name;
    let Some(source_dir) = &ctx.config.source_dir else {
        debug!(
            install_dir = %ctx.config.install_dir.display(),
            "skipping {client} self-update: no source checkout found"
        );
        return;
    };

    on_step(UpdateStep::Client);
    if let Err(err) = maintainer.pull(source_dir) {
        report.errors.push(PluginError::client(client, Phase::Pull, err));
        return;
    }
    if let Err(err) = maintainer.reinstall(source_dir) {
        report.errors.push(PluginError::client(client, Phase::Install, err));
    }
}

fn update_plugin<I, M, F>(
    ctx: &Context,
    loader: &PluginLoader<I>,
    maintainer: &M,
    name: &str,
    plugin_dir: &Path,
    on_step: &mut F,
    report: &mut UpdateReport,
) where
    I: PluginImporter,
    M: Maintainer,
    F: FnMut(UpdateStep<'_>),
{
    match std::fs::metadata(plugin_dir.join(".git")) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            debug!(plugin = name, "skipping plugin: .git is not a directory");
            report.skipped.push(name.to_string());
            return;
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(plugin = name, "skipping plugin: not a git checkout");
            report.skipped.push(name.to_string());
            return;
        }
        Err(err) => {
            warn!(plugin = name, error = %err, "skipping plugin: cannot inspect checkout");
            report.skipped.push(name.to_string());
            report.errors.push(PluginError::new(
                name,
                Phase::Inspect,
                Error::from_io(err, "cannot inspect plugin checkout").with_path(plugin_dir),
            ));
            return;
        }
    }

    on_step(UpdateStep::Plugin(name));
    if let Err(err) = maintainer.pull(plugin_dir) {
        report.errors.push(PluginError::new(name, Phase::Pull, err));
        return;
    }

    // Re-import so the hook that runs is the freshly pulled one.
    let entry = match loader.import(name, plugin_dir, PluginSource::ThirdParty) {
        Ok(entry) => entry,
        Err(err) => {
            report.errors.push(PluginError::new(name, Phase::Load, err));
            return;
        }
    };
    if entry.capabilities().has_update {
        if let Err(err) = entry.plugin().update(ctx) {
            report.errors.push(PluginError::new(name, Phase::Update, err));
            return;
        }
    }
    report.updated.push(name.to_string());
}
