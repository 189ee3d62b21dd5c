//! Purpose: Read the per-host credential file (`.netrc`) once at startup.
//! Exports: `Netrc`, `default_netrc_path`.
//! Role: Backing store for the lowest-precedence credential source.
//! Invariants: A missing file is not an error; lookups simply find nothing.
//! Invariants: Entries without a password never produce a credential.

use std::path::{Path, PathBuf};

use super::Credential;
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Netrc {
    machines: Vec<Entry>,
    default: Option<Entry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    host: String,
    login: Option<String>,
    password: Option<String>,
}

impl Entry {
    fn credential(&self, host: &str) -> Option<Credential> {
        let secret = self.password.clone().filter(|p| !p.is_empty())?;
        Some(Credential {
            host: host.to_string(),
            login: self.login.clone(),
            secret,
        })
    }
}

pub fn default_netrc_path<F>(env: F, home: &Path) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env("NETRC").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if cfg!(windows) {
        home.join("_netrc")
    } else {
        home.join(".netrc")
    }
}

impl Netrc {
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::from_io(err, "failed to read credential file").with_path(path));
            }
        };
        Self::parse(&text).map(Some).map_err(|err| err.with_path(path))
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut netrc = Netrc::default();
        let mut current: Option<(bool, Entry)> = None;
        let mut in_macro = false;

        for line in text.lines() {
            if in_macro {
                if line.trim().is_empty() {
                    in_macro = false;
                }
                continue;
            }

            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }
                match token {
                    "machine" => {
                        netrc.push(current.take());
                        let host = expect_value(&mut tokens, token)?;
                        current = Some((false, Entry::named(host)));
                    }
                    "default" => {
                        netrc.push(current.take());
                        current = Some((true, Entry::named("")));
                    }
                    "login" | "password" | "account" => {
                        let value = expect_value(&mut tokens, token)?;
                        if let Some((_, entry)) = current.as_mut() {
                            match token {
                                "login" => entry.login = Some(value),
                                "password" => entry.password = Some(value),
                                _ => {}
                            }
                        }
                    }
                    "macdef" => {
                        in_macro = true;
                        break;
                    }
                    _ => {}
                }
            }
        }
        netrc.push(current.take());
        Ok(netrc)
    }

    /// Looks up the credential for `host`, falling back to a `default` entry.
    pub fn lookup(&self, host: &str) -> Option<Credential> {
        self.machines
            .iter()
            .find(|entry| entry.host.eq_ignore_ascii_case(host))
            .or(self.default.as_ref())
            .and_then(|entry| entry.credential(host))
    }

    fn push(&mut self, entry: Option<(bool, Entry)>) {
        match entry {
            Some((true, entry)) => self.default = Some(entry),
            Some((false, entry)) => self.machines.push(entry),
            None => {}
        }
    }
}

impl Entry {
    fn named(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            login: None,
            password: None,
        }
    }
}

fn expect_value<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    keyword: &str,
) -> Result<String, Error> {
    tokens.next().map(str::to_string).ok_or_else(|| {
        Error::new(ErrorKind::Parse)
            .with_message(format!("credential file is missing a value after `{keyword}`"))
    })
}
