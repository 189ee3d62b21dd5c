use super::Credential;

pub const API_AUTH_VAR: &str = "API_AUTH";
pub const API_TOKEN_VAR: &str = "API_TOKEN";

/// Picks the authorization header value for an API call.
///
/// Precedence, first match wins:
/// 1. `API_AUTH`, used verbatim (shared secret)
/// 2. `API_TOKEN`, as a bearer token
/// 3. the `--authtoken` flag, as a bearer token
/// 4. the credential-file entry for the API host, as a bearer token
///
/// Nothing is cached: every call re-reads the environment.
#[derive(Clone, Debug, Default)]
pub struct CredentialResolver {
    token_flag: Option<String>,
    account: Option<Credential>,
}

impl CredentialResolver {
    pub fn new(account: Option<Credential>, token_flag: Option<String>) -> Self {
        Self {
            token_flag,
            account,
        }
    }

    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|value| !value.is_empty());

        if let Some(shared_secret) = env(API_AUTH_VAR) {
            return Some(shared_secret);
        }
        if let Some(token) = env(API_TOKEN_VAR) {
            return Some(bearer(&token));
        }
        if let Some(token) = self.token_flag.as_deref().filter(|t| !t.is_empty()) {
            return Some(bearer(token));
        }
        self.account
            .as_ref()
            .filter(|account| !account.secret.is_empty())
            .map(|account| bearer(&account.secret))
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
