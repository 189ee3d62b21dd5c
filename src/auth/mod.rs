//! Purpose: Credential sources for authenticated API calls.
//! Exports: `Credential`, `CredentialResolver`, `Netrc`, `default_netrc_path`.
//! Role: Feeds the `authorization` header attached by `api::ApiClient`.
//! Invariants: Precedence is API_AUTH > API_TOKEN > --authtoken > credential file.

mod netrc;
mod resolver;

pub use netrc::{Netrc, default_netrc_path};
pub use resolver::{API_AUTH_VAR, API_TOKEN_VAR, CredentialResolver};

/// A stored secret for one API host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub host: String,
    pub login: Option<String>,
    pub secret: String,
}
