//! Purpose: Assemble the immutable runtime configuration from the environment.
//! Exports: `Config`, `PackageInfo`, `ensure_dir`, `find_checkout`, env var name constants.
//! Role: First step of startup; everything else reads from `Config`.
//! Invariants: Missing `AKKERIS_API_HOST`/`AKKERIS_AUTH_HOST` is a fatal config error.
//! Invariants: Directory layout is `<home>/.akkeris/plugins` + `<install>/plugins`.
//! Invariants: `source_dir`, when set, is the checkout `update` pulls and reinstalls from.

use std::path::{Path, PathBuf};

use super::error::{Error, ErrorKind};

pub const API_HOST_VAR: &str = "AKKERIS_API_HOST";
pub const AUTH_HOST_VAR: &str = "AKKERIS_AUTH_HOST";
pub const DEBUG_VAR: &str = "AKKERIS_DEBUG";
pub const SOURCE_DIR_VAR: &str = "AKA_SOURCE_DIR";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_host: String,
    pub auth_host: String,
    pub home_dir: PathBuf,
    pub akkeris_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub third_party_plugins_dir: PathBuf,
    pub install_dir: PathBuf,
    pub source_dir: Option<PathBuf>,
    pub package: PackageInfo,
    pub debug: bool,
}

impl Config {
    /// Builds the configuration from an environment lookup.
    ///
    /// `install_dir` is the directory holding the running executable; built-in
    /// plugins live in its `plugins` subdirectory. The client checkout comes
    /// from `AKA_SOURCE_DIR`, or else from the nearest ancestor of
    /// `install_dir` that is one.
    pub fn from_env<F>(env: F, install_dir: PathBuf) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let api_host = lookup(API_HOST_VAR);
        let auth_host = lookup(AUTH_HOST_VAR);
        let missing: Vec<&str> = [(API_HOST_VAR, &api_host), (AUTH_HOST_VAR, &auth_host)]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect();
        let (Some(api_host), Some(auth_host)) = (api_host, auth_host) else {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!(
                    "cannot find environment variables {}",
                    missing.join(" and ")
                ))
                .with_hint(format!(
                    "Set them with `export {API_HOST_VAR}=...` and `export {AUTH_HOST_VAR}=...` or add them to your profile. If you do not know these values ask someone!"
                )));
        };

        let home_var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
        let home_dir = lookup(home_var).map(PathBuf::from).ok_or_else(|| {
            Error::new(ErrorKind::Config)
                .with_message(format!("cannot determine home directory (${home_var} is not set)"))
                .with_hint(format!("Set {home_var} to your home directory."))
        })?;

        let akkeris_dir = home_dir.join(".akkeris");
        let third_party_plugins_dir = akkeris_dir.join("plugins");
        let plugins_dir = install_dir.join("plugins");
        let debug = lookup(DEBUG_VAR).is_some();
        let source_dir = lookup(SOURCE_DIR_VAR)
            .map(PathBuf::from)
            .or_else(|| find_checkout(&install_dir));

        Ok(Self {
            api_host,
            auth_host,
            home_dir,
            akkeris_dir,
            plugins_dir,
            third_party_plugins_dir,
            install_dir,
            source_dir,
            package: PackageInfo::current(),
            debug,
        })
    }

    /// Base URL for API calls; bare hosts are assumed to speak https.
    pub fn api_base_url(&self) -> String {
        let host = self.api_host.trim_end_matches('/');
        if host.starts_with("http") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Hostname used as the credential-file key.
    pub fn api_hostname(&self) -> String {
        url::Url::parse(&self.api_base_url())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.api_host.clone())
    }

    /// Creates the directories the client depends on.
    ///
    /// The home and third-party directories are required. A built-in plugin
    /// directory that cannot be prepared is returned as a soft error so the
    /// caller can surface it and carry on with an empty scan.
    pub fn prepare_dirs(&self) -> Result<Option<Error>, Error> {
        ensure_dir(&self.akkeris_dir)?;
        ensure_dir(&self.third_party_plugins_dir)?;
        Ok(ensure_dir(&self.plugins_dir).err())
    }
}

/// Nearest directory at or above `start` holding both `Cargo.toml` and `.git`.
pub fn find_checkout(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join("Cargo.toml").is_file() && dir.join(".git").exists())
        .map(Path::to_path_buf)
}

pub fn ensure_dir(path: &Path) -> Result<(), Error> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::new(ErrorKind::Config)
            .with_message("expected a directory but found a file")
            .with_path(path)
            .with_hint("Move the file out of the way and re-run.")),
        Err(_) => std::fs::create_dir_all(path).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_message("directory cannot be accessed or created")
                .with_path(path)
                .with_source(err)
        }),
    }
}
