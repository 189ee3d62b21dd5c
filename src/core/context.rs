use crate::auth::Credential;
use crate::plugins::Registry;

use super::config::Config;

/// Process-wide state handed to every command and plugin hook.
///
/// Built once at startup. Only `registry` grows, and only while plugins are
/// being loaded.
pub struct Context {
    pub config: Config,
    pub credential: Option<Credential>,
    pub registry: Registry,
}

impl Context {
    pub fn new(config: Config, credential: Option<Credential>) -> Self {
        Self {
            config,
            credential,
            registry: Registry::default(),
        }
    }
}
