use std::path::{Path, PathBuf};

use tracing::debug;

use super::manifest::ManifestPlugin;
use super::{INDEX_FILE, Phase, Plugin, PluginError, PluginSource, RegisteredPlugin};
use crate::core::context::Context;
use crate::core::error::Error;

/// Turns a plugin directory into a descriptor.
pub trait PluginImporter {
    fn import(&self, name: &str, dir: &Path) -> Result<Box<dyn Plugin>, Error>;
}

/// Reads `index.json` descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifestImporter;

impl PluginImporter for ManifestImporter {
    fn import(&self, name: &str, dir: &Path) -> Result<Box<dyn Plugin>, Error> {
        Ok(Box::new(ManifestPlugin::from_dir(name, dir)?))
    }
}

/// Outcome of scanning one plugin directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names registered from this directory, in load order.
    pub loaded: Vec<String>,
    pub errors: Vec<PluginError>,
}

pub struct PluginLoader<I = ManifestImporter> {
    importer: I,
}

impl PluginLoader<ManifestImporter> {
    pub fn new() -> Self {
        Self {
            importer: ManifestImporter,
        }
    }
}

impl Default for PluginLoader<ManifestImporter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PluginImporter> PluginLoader<I> {
    pub fn with_importer(importer: I) -> Self {
        Self { importer }
    }

    /// Loads every plugin under `dir` in file-name order into `ctx.registry`.
    ///
    /// Each plugin is registered before its init hook runs, so a hook sees
    /// every plugin loaded ahead of it, itself included. A plugin that fails
    /// to import is left out and reported under `Phase::Load`. A plugin whose
    /// init hook fails stays registered and is reported under `Phase::Init`.
    pub fn load(&self, dir: &Path, source: PluginSource, ctx: &mut Context) -> LoadReport {
        let mut report = LoadReport::default();
        let candidates = match plugin_candidates(dir) {
            Ok(candidates) => candidates,
            Err(err) => {
                report
                    .errors
                    .push(PluginError::new(dir.display().to_string(), Phase::Scan, err));
                return report;
            }
        };

        for (name, plugin_dir) in candidates {
            let entry = match self.import(&name, &plugin_dir, source) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(plugin = %name, error = %err, "plugin failed to load");
                    report.errors.push(PluginError::new(name, Phase::Load, err));
                    continue;
                }
            };

            let has_init = entry.capabilities().has_init;
            ctx.registry.extend([entry]);
            debug!(plugin = %name, source = source.as_str(), "plugin loaded");

            let shared: &Context = ctx;
            if let Some(entry) = shared.registry.get(&name).filter(|_| has_init) {
                if let Err(err) = entry.plugin().init(shared) {
                    debug!(plugin = %name, error = %err, "plugin failed to initialize");
                    report.errors.push(PluginError::new(name.clone(), Phase::Init, err));
                }
            }
            report.loaded.push(name);
        }
        report
    }

    pub fn import(
        &self,
        name: &str,
        dir: &Path,
        source: PluginSource,
    ) -> Result<RegisteredPlugin, Error> {
        let plugin = self
            .importer
            .import(name, dir)
            .map_err(|err| err.with_plugin(name))?;
        Ok(RegisteredPlugin::new(name, source, dir, plugin))
    }
}

/// Scans the built-in then the third-party directory into `ctx.registry`.
pub fn load_all<I: PluginImporter>(ctx: &mut Context, loader: &PluginLoader<I>) -> Vec<PluginError> {
    let dirs = [
        (ctx.config.plugins_dir.clone(), PluginSource::Builtin),
        (ctx.config.third_party_plugins_dir.clone(), PluginSource::ThirdParty),
    ];
    let mut errors = Vec::new();
    for (dir, source) in dirs {
        errors.extend(loader.load(&dir, source, ctx).errors);
    }
    errors
}

/// Immediate subdirectories of `dir` that carry an index file, sorted by name.
pub(crate) fn plugin_candidates(dir: &Path) -> Result<Vec<(String, PathBuf)>, Error> {
    let entries = std::fs::read_dir(dir)
        .map_err(|err| Error::from_io(err, "cannot read plugin directory").with_path(dir))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| Error::from_io(err, "cannot read plugin directory").with_path(dir))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %path.display(), "skipping non-utf8 plugin directory name");
            continue;
        };
        if !path.is_dir() {
            continue;
        }
        if !path.join(INDEX_FILE).is_file() {
            debug!(plugin = %name, "skipping directory without {INDEX_FILE}");
            continue;
        }
        candidates.push((name, path));
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::{PluginImporter, PluginLoader, load_all};
    use crate::core::config::Config;
    use crate::core::context::Context;
    use crate::core::error::{Error, ErrorKind};
    use crate::plugins::{Capabilities, Phase, Plugin, PluginSource};
    use std::path::Path;

    /// Decides behavior from the index file's contents.
    struct ScriptedImporter;

    struct Scripted {
        group: String,
        fail_init: bool,
        requires: Option<String>,
    }

    impl Plugin for Scripted {
        fn group(&self) -> &str {
            &self.group
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                has_init: true,
                has_update: false,
            }
        }

        fn init(&self, ctx: &Context) -> Result<(), Error> {
            if self.fail_init {
                return Err(Error::new(ErrorKind::Plugin).with_message("init exploded"));
            }
            if let Some(required) = &self.requires {
                if ctx.registry.get(required).is_none() {
                    return Err(Error::new(ErrorKind::Plugin)
                        .with_message(format!("{required} is not registered")));
                }
            }
            Ok(())
        }
    }

    impl PluginImporter for ScriptedImporter {
        fn import(&self, name: &str, dir: &Path) -> Result<Box<dyn Plugin>, Error> {
            let text = std::fs::read_to_string(dir.join("index.json"))
                .map_err(|err| Error::from_io(err, "read"))?;
            match text.trim() {
                "load-error" => Err(Error::new(ErrorKind::Plugin).with_message("bad module")),
                "init-error" => Ok(Box::new(Scripted {
                    group: name.to_string(),
                    fail_init: true,
                    requires: None,
                })),
                text => match text.strip_prefix("requires:") {
                    Some(required) => Ok(Box::new(Scripted {
                        group: name.to_string(),
                        fail_init: false,
                        requires: Some(required.to_string()),
                    })),
                    None => Ok(Box::new(Scripted {
                        group: text.to_string(),
                        fail_init: false,
                        requires: None,
                    })),
                },
            }
        }
    }

    fn write_plugin(root: &Path, name: &str, index: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("index.json"), index).expect("write index");
    }

    fn context(home: &Path, install: &Path) -> Context {
        let home = home.to_string_lossy().to_string();
        let config = Config::from_env(
            move |name| match name {
                "AKKERIS_API_HOST" => Some("api.example.io".to_string()),
                "AKKERIS_AUTH_HOST" => Some("auth.example.io".to_string()),
                "HOME" | "USERPROFILE" => Some(home.clone()),
                _ => None,
            },
            install.to_path_buf(),
        )
        .expect("config");
        config.prepare_dirs().expect("dirs");
        Context::new(config, None)
    }

    #[test]
    fn loads_valid_plugins_in_name_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("plugins");
        write_plugin(&root, "zeta", "Zeta");
        write_plugin(&root, "alpha", "Alpha");
        write_plugin(&root, "mid", "Mid");
        std::fs::create_dir_all(root.join("no-index")).expect("mkdir");
        std::fs::write(root.join("stray.txt"), "x").expect("write");

        let mut ctx = context(&temp.path().join("home"), &temp.path().join("install"));
        let report = PluginLoader::with_importer(ScriptedImporter).load(
            &root,
            PluginSource::Builtin,
            &mut ctx,
        );

        assert_eq!(report.loaded, vec!["alpha", "mid", "zeta"]);
        assert_eq!(ctx.registry.names(), vec!["alpha", "mid", "zeta"]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn load_failure_excludes_but_init_failure_keeps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("plugins");
        write_plugin(&root, "a-good", "Good");
        write_plugin(&root, "b-broken", "load-error");
        write_plugin(&root, "c-flaky", "init-error");

        let mut ctx = context(&temp.path().join("home"), &temp.path().join("install"));
        let report = PluginLoader::with_importer(ScriptedImporter).load(
            &root,
            PluginSource::ThirdParty,
            &mut ctx,
        );

        assert_eq!(report.loaded, vec!["a-good", "c-flaky"]);
        assert_eq!(ctx.registry.names(), vec!["a-good", "c-flaky"]);

        let errors: Vec<(&str, Phase)> = report
            .errors
            .iter()
            .map(|e| (e.plugin.as_str(), e.phase))
            .collect();
        assert_eq!(errors, vec![("b-broken", Phase::Load), ("c-flaky", Phase::Init)]);
        assert_eq!(report.errors[0].error.plugin(), Some("b-broken"));
    }

    #[test]
    fn unreadable_directory_is_a_scan_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(&temp.path().join("home"), &temp.path().join("install"));
        let report = PluginLoader::with_importer(ScriptedImporter).load(
            &temp.path().join("absent"),
            PluginSource::Builtin,
            &mut ctx,
        );
        assert!(report.loaded.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].phase, Phase::Scan);
    }

    #[test]
    fn init_hooks_see_plugins_loaded_before_them() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(&temp.path().join("home"), &temp.path().join("install"));
        let root = ctx.config.third_party_plugins_dir.clone();
        write_plugin(&root, "a-base", "Base");
        write_plugin(&root, "b-needs-base", "requires:a-base");
        write_plugin(&root, "c-needs-itself", "requires:c-needs-itself");
        write_plugin(&root, "d-needs-later", "requires:e-later");
        write_plugin(&root, "e-later", "Later");

        let errors = load_all(&mut ctx, &PluginLoader::with_importer(ScriptedImporter));

        let failed: Vec<(&str, Phase)> =
            errors.iter().map(|e| (e.plugin.as_str(), e.phase)).collect();
        assert_eq!(failed, vec![("d-needs-later", Phase::Init)]);
        assert_eq!(
            ctx.registry.names(),
            vec!["a-base", "b-needs-base", "c-needs-itself", "d-needs-later", "e-later"]
        );
    }

    #[test]
    fn third_party_overrides_builtin_with_same_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let install = temp.path().join("install");
        let home = temp.path().join("home");
        let mut ctx = context(&home, &install);

        write_plugin(&ctx.config.plugins_dir, "apps", "Builtin Apps");
        write_plugin(&ctx.config.plugins_dir, "logs", "Builtin Logs");
        write_plugin(&ctx.config.third_party_plugins_dir, "apps", "Custom Apps");
        write_plugin(&ctx.config.third_party_plugins_dir, "metrics", "Metrics");

        let errors = load_all(&mut ctx, &PluginLoader::with_importer(ScriptedImporter));
        assert!(errors.is_empty());

        assert_eq!(ctx.registry.names(), vec!["apps", "logs", "metrics"]);
        let apps = ctx.registry.get("apps").expect("apps");
        assert_eq!(apps.group(), "Custom Apps");
        assert_eq!(apps.source, PluginSource::ThirdParty);
    }
}
