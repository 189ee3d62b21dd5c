use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::headers::Headers;
use super::http::{Body, HttpClient, HttpError, Method, Request};
use crate::auth::CredentialResolver;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind};

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Decoded body of a successful API call.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Bytes(Vec<u8>),
}

impl ApiBody {
    pub fn json(&self) -> Option<&Value> {
        match self {
            ApiBody::Json(value) => Some(value),
            ApiBody::Bytes(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Request(HttpError),
    InvalidJson {
        url: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Request(err) => write!(f, "{err}"),
            ApiError::InvalidJson { url, source } => {
                write!(f, "response from {url} is not valid json: {source}")
            }
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Request(err) => err.source(),
            ApiError::InvalidJson { source, .. } => Some(source),
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        ApiError::Request(err)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(err) => err.into(),
            invalid @ ApiError::InvalidJson { .. } => Error::new(ErrorKind::Parse)
                .with_message("api returned a body that is not json")
                .with_source(invalid),
        }
    }
}

/// Authenticated client for the Akkeris API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    user_agent: String,
    resolver: CredentialResolver,
    env: EnvLookup,
    http: HttpClient,
}

impl ApiClient {
    pub fn new(config: &Config, resolver: CredentialResolver) -> Self {
        Self {
            base_url: config.api_base_url(),
            user_agent: format!("{}/{}", config.package.name, config.package.version),
            resolver,
            env: Arc::new(|name| std::env::var(name).ok()),
            http: HttpClient::new(),
        }
    }

    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Replaces the environment consulted for `API_AUTH`/`API_TOKEN`.
    pub fn with_env_lookup<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute `http(s)` targets pass through; anything else is a path on the API host.
    pub fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("http") {
            return target.to_string();
        }
        if target.starts_with('/') {
            format!("{}{target}", self.base_url)
        } else {
            format!("{}/{target}", self.base_url)
        }
    }

    pub fn headers(&self, extra: Headers) -> Headers {
        let mut headers = extra;
        headers.insert_default("content-type", "application/json");
        headers.insert_default("user-agent", self.user_agent.clone());
        if let Some(authorization) = self.resolver.resolve_with(|name| (self.env)(name)) {
            headers.insert("authorization", authorization);
        }
        headers
    }

    pub async fn call(
        &self,
        method: Method,
        body: Option<Vec<u8>>,
        target: &str,
    ) -> Result<ApiBody, ApiError> {
        self.call_with_headers(method, body, target, Headers::new())
            .await
    }

    pub async fn call_with_headers(
        &self,
        method: Method,
        body: Option<Vec<u8>>,
        target: &str,
        extra: Headers,
    ) -> Result<ApiBody, ApiError> {
        let url = self.resolve_url(target);
        let mut request = Request::new(method, url.clone()).with_headers(self.headers(extra));
        if let Some(body) = body {
            request = request.with_body(body);
        }
        debug!(method = %method, url = %url, "api call");
        let response = self.http.request(request).await?;
        match response.body {
            Body::Bytes(bytes) => Ok(ApiBody::Bytes(bytes)),
            Body::Text(text) if text.trim().is_empty() => Ok(ApiBody::Json(Value::Null)),
            Body::Text(text) => serde_json::from_str(&text)
                .map(ApiBody::Json)
                .map_err(|source| ApiError::InvalidJson {
                    url: response.url,
                    source,
                }),
        }
    }

    pub async fn get(&self, target: &str) -> Result<ApiBody, ApiError> {
        self.call(Method::Get, None, target).await
    }

    pub async fn post(&self, body: Option<Vec<u8>>, target: &str) -> Result<ApiBody, ApiError> {
        self.call(Method::Post, body, target).await
    }

    pub async fn put(&self, body: Option<Vec<u8>>, target: &str) -> Result<ApiBody, ApiError> {
        self.call(Method::Put, body, target).await
    }

    pub async fn patch(&self, body: Option<Vec<u8>>, target: &str) -> Result<ApiBody, ApiError> {
        self.call(Method::Patch, body, target).await
    }

    pub async fn delete(&self, target: &str) -> Result<ApiBody, ApiError> {
        self.call(Method::Delete, None, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiClient, ApiError, Headers};
    use crate::auth::{Credential, CredentialResolver};
    use crate::core::config::Config;
    use crate::core::error::{Error, ErrorKind};
    use std::path::PathBuf;

    fn config(api_host: &str) -> Config {
        let api_host = api_host.to_string();
        Config::from_env(
            move |name| match name {
                "AKKERIS_API_HOST" => Some(api_host.clone()),
                "AKKERIS_AUTH_HOST" => Some("auth.example.io".to_string()),
                "HOME" | "USERPROFILE" => Some("/home/u".to_string()),
                _ => None,
            },
            PathBuf::from("/opt/aka"),
        )
        .expect("config")
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn paths_join_the_api_host() {
        let client = ApiClient::new(&config("api.example.io"), CredentialResolver::default());
        assert_eq!(client.resolve_url("/apps"), "https://api.example.io/apps");
        assert_eq!(client.resolve_url("apps"), "https://api.example.io/apps");
        assert_eq!(
            client.resolve_url("http://other.example.io/x"),
            "http://other.example.io/x"
        );

        let local = ApiClient::new(&config("http://localhost:5000"), CredentialResolver::default());
        assert_eq!(local.resolve_url("/apps"), "http://localhost:5000/apps");
    }

    #[test]
    fn default_headers_are_attached() {
        let client = ApiClient::new(&config("api.example.io"), CredentialResolver::default())
            .with_env_lookup(no_env);
        let headers = client.headers(Headers::new());
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert!(headers.get("user-agent").expect("ua").starts_with("aka/"));
        assert!(!headers.contains("authorization"));
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let client = ApiClient::new(&config("api.example.io"), CredentialResolver::default())
            .with_env_lookup(no_env);
        let extra: Headers = [("Content-Type", "application/zip")].into_iter().collect();
        let headers = client.headers(extra);
        assert_eq!(headers.get("content-type"), Some("application/zip"));
    }

    #[test]
    fn authorization_follows_resolver_precedence() {
        let account = Credential {
            host: "api.example.io".to_string(),
            login: None,
            secret: "netrc-secret".to_string(),
        };
        let resolver = CredentialResolver::new(Some(account), Some("flag-token".to_string()));
        let client = ApiClient::new(&config("api.example.io"), resolver.clone())
            .with_env_lookup(|name| (name == "API_AUTH").then(|| "shared".to_string()));
        assert_eq!(
            client.headers(Headers::new()).get("authorization"),
            Some("shared")
        );

        let flag_only = ApiClient::new(&config("api.example.io"), resolver).with_env_lookup(no_env);
        assert_eq!(
            flag_only.headers(Headers::new()).get("authorization"),
            Some("Bearer flag-token")
        );
    }

    #[test]
    fn invalid_json_maps_to_parse_error() {
        let source = serde_json::from_str::<serde_json::Value>("<html>").expect_err("bad json");
        let err = Error::from(ApiError::InvalidJson {
            url: "https://api.example.io/apps".to_string(),
            source,
        });
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
