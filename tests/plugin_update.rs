//! Purpose: Drive loading and the update loop against real `index.json` plugins.
//! Exports: None (integration test module).
//! Role: Check that process-backed hooks run with the plugin environment.
//! Invariants: Version control is replaced by a recording maintainer; no network.
#![cfg(unix)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use aka::core::config::Config;
use aka::core::context::Context;
use aka::core::error::{Error, ErrorKind};
use aka::plugins::{Maintainer, Phase, PluginLoader, UpdateStep, load_all, update};
use serde_json::json;

#[derive(Default)]
struct Recorder {
    pulls: RefCell<Vec<PathBuf>>,
    reinstalls: RefCell<Vec<PathBuf>>,
    refuse: Option<&'static str>,
}

impl Maintainer for Recorder {
    fn pull(&self, dir: &Path) -> Result<(), Error> {
        self.pulls.borrow_mut().push(dir.to_path_buf());
        if self.refuse.is_some_and(|name| dir.ends_with(name)) {
            return Err(Error::new(ErrorKind::Io).with_message("`git` exited with 1"));
        }
        Ok(())
    }

    fn reinstall(&self, dir: &Path) -> Result<(), Error> {
        self.reinstalls.borrow_mut().push(dir.to_path_buf());
        Ok(())
    }
}

fn context(root: &Path) -> Context {
    let home = root.join("home").to_string_lossy().to_string();
    let config = Config::from_env(
        move |name| match name {
            "AKKERIS_API_HOST" => Some("api.example.io".to_string()),
            "AKKERIS_AUTH_HOST" => Some("auth.example.io".to_string()),
            "HOME" | "USERPROFILE" => Some(home.clone()),
            _ => None,
        },
        root.join("install"),
    )
    .expect("config");
    config.prepare_dirs().expect("dirs");
    Context::new(config, None)
}

/// Writes a plugin whose hooks append `<hook>:<name>:<api host>` to `hooks.log`.
fn write_plugin(ctx: &Context, name: &str, checkout: bool, update_exit: i32) -> PathBuf {
    let dir = ctx.config.third_party_plugins_dir.join(name);
    std::fs::create_dir_all(&dir).expect("mkdir");
    if checkout {
        std::fs::create_dir_all(dir.join(".git")).expect("mkdir .git");
    }
    let record = "echo \"$AKA_HOOK:$AKA_PLUGIN_NAME:$AKKERIS_API_HOST\" >> hooks.log";
    let index = json!({
        "group": name.to_uppercase(),
        "hooks": {
            "init": ["sh", "-c", record],
            "update": ["sh", "-c", format!("{record}; exit {update_exit}")]
        }
    });
    std::fs::write(dir.join("index.json"), index.to_string()).expect("index");
    dir
}

fn hook_log(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("hooks.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn init_hooks_run_with_plugin_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut ctx = context(temp.path());
    let dir = write_plugin(&ctx, "apps", false, 0);

    let errors = load_all(&mut ctx, &PluginLoader::new());
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(ctx.registry.get("apps").expect("apps").group(), "APPS");
    assert_eq!(hook_log(&dir), vec!["init:apps:api.example.io"]);
}

#[test]
fn update_pulls_checkouts_and_runs_their_hooks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut ctx = context(temp.path());
    let source = temp.path().join("source");
    ctx.config.source_dir = Some(source.clone());
    let apps = write_plugin(&ctx, "apps", true, 0);
    let plain = write_plugin(&ctx, "plain", false, 0);
    let broken = write_plugin(&ctx, "broken", true, 3);
    let offline = write_plugin(&ctx, "offline", true, 0);

    let maintainer = Recorder {
        refuse: Some("offline"),
        ..Recorder::default()
    };
    let mut steps = Vec::new();
    let report = update(&ctx, &PluginLoader::new(), &maintainer, |step| {
        steps.push(match step {
            UpdateStep::Plugin(name) => name.to_string(),
            UpdateStep::Client => "<client>".to_string(),
        })
    });

    assert_eq!(steps, vec!["apps", "broken", "offline", "<client>"]);
    assert_eq!(report.updated, vec!["apps"]);
    assert_eq!(report.skipped, vec!["plain"]);

    let failures: Vec<(&str, Phase)> = report
        .errors
        .iter()
        .map(|err| (err.plugin.as_str(), err.phase))
        .collect();
    assert_eq!(failures, vec![("broken", Phase::Update), ("offline", Phase::Pull)]);

    assert_eq!(hook_log(&apps), vec!["update:apps:api.example.io"]);
    assert_eq!(hook_log(&broken), vec!["update:broken:api.example.io"]);
    assert!(hook_log(&plain).is_empty());
    assert!(hook_log(&offline).is_empty());

    assert_eq!(maintainer.pulls.borrow().len(), 4);
    assert_eq!(maintainer.pulls.borrow().last(), Some(&source));
    assert_eq!(maintainer.reinstalls.borrow().as_slice(), [source]);
}

#[test]
fn update_without_a_client_checkout_leaves_the_install_dir_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path());
    assert_eq!(ctx.config.source_dir, None);
    write_plugin(&ctx, "apps", true, 0);

    let maintainer = Recorder::default();
    let report = update(&ctx, &PluginLoader::new(), &maintainer, |step| {
        assert_ne!(step, UpdateStep::Client);
    });

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.updated, vec!["apps"]);
    assert!(!maintainer.pulls.borrow().contains(&ctx.config.install_dir));
    assert!(maintainer.reinstalls.borrow().is_empty());
}
