//! Purpose: Perform one HTTP(S) request and classify its outcome.
//! Exports: `HttpClient`, `Method`, `Request`, `Response`, `Body`, `HttpError`, `HttpFailure`.
//! Role: Transport layer under `ApiClient`; also usable directly by plugins.
//! Invariants: Only GET + 301/302 + `location` redirects, at most `MAX_REDIRECTS` hops.
//! Invariants: 2xx is success; every other status is `HttpError::Status`.
//! Invariants: Transport failures never pass through status classification.
//! Invariants: Bodies are read fully, gunzipped when declared, then classified.

use std::error::Error as StdError;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use tracing::debug;
use url::Url;

use super::headers::Headers;
use crate::core::error::{Error, ErrorKind};

pub const MAX_REDIRECTS: usize = 5;

const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/gzip",
    "application/x-gzip",
    "application/x-tar",
    "application/octet-stream",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported http method `{value}`"))
                .with_hint("Use one of get, post, put, patch, delete.")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub headers: Headers,
    pub body: Body,
}

/// A completed exchange whose status was outside 2xx.
#[derive(Clone, Debug)]
pub struct HttpFailure {
    pub status: u16,
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Headers,
}

impl HttpFailure {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug)]
pub enum HttpError {
    Status(HttpFailure),
    Transport {
        url: String,
        source: Box<dyn StdError + Send + Sync>,
    },
    TooManyRedirects {
        url: String,
        hops: usize,
    },
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    Decode {
        url: String,
        source: std::io::Error,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status(failure) => Some(failure.status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport { .. })
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Status(failure) => {
                write!(f, "{} returned status {}", failure.url, failure.status)
            }
            HttpError::Transport { url, source } => write!(f, "request to {url} failed: {source}"),
            HttpError::TooManyRedirects { url, hops } => {
                write!(f, "gave up after {hops} redirects (next location: {url})")
            }
            HttpError::InvalidUrl { url, source } => write!(f, "invalid url `{url}`: {source}"),
            HttpError::Decode { url, source } => {
                write!(f, "failed to decode gzip body from {url}: {source}")
            }
        }
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            HttpError::Transport { source, .. } => Some(source.as_ref()),
            HttpError::InvalidUrl { source, .. } => Some(source),
            HttpError::Decode { source, .. } => Some(source),
            HttpError::Status(_) | HttpError::TooManyRedirects { .. } => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status(failure) => {
                let hint = match failure.status {
                    401 | 403 => Some("Check API_TOKEN, API_AUTH, --authtoken or your .netrc entry."),
                    404 => Some("Check the name or id you passed."),
                    _ => None,
                };
                let detail = failure.body_text();
                let mut mapped = Error::new(ErrorKind::Http)
                    .with_status(failure.status)
                    .with_message(if detail.trim().is_empty() {
                        format!("{} returned status {}", failure.url, failure.status)
                    } else {
                        detail.trim().to_string()
                    });
                if let Some(hint) = hint {
                    mapped = mapped.with_hint(hint);
                }
                mapped
            }
            invalid @ HttpError::InvalidUrl { .. } => Error::new(ErrorKind::Usage)
                .with_message("invalid request url")
                .with_source(invalid),
            other => Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_hint("Check your network connection and AKKERIS_API_HOST.")
                .with_source(other),
        }
    }
}

struct RawResponse {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
}

#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    max_redirects: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        // Redirects are followed by hand so only GET requests chase them.
        let agent = ureq::AgentBuilder::new().redirects(0).build();
        Self {
            agent,
            max_redirects: MAX_REDIRECTS,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sends `request` on the blocking pool and waits for the classified result.
    pub async fn request(&self, request: Request) -> Result<Response, HttpError> {
        let client = self.clone();
        let url = request.url.clone();
        match tokio::task::spawn_blocking(move || client.execute(request)).await {
            Ok(result) => result,
            Err(join_err) => Err(HttpError::Transport {
                url,
                source: Box::new(join_err),
            }),
        }
    }

    pub async fn get(&self, url: &str, headers: Headers) -> Result<Response, HttpError> {
        self.request(Request::new(Method::Get, url).with_headers(headers))
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        headers: Headers,
    ) -> Result<Response, HttpError> {
        self.request(with_optional_body(Method::Post, url, body, headers))
            .await
    }

    pub async fn put(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        headers: Headers,
    ) -> Result<Response, HttpError> {
        self.request(with_optional_body(Method::Put, url, body, headers))
            .await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        headers: Headers,
    ) -> Result<Response, HttpError> {
        self.request(with_optional_body(Method::Patch, url, body, headers))
            .await
    }

    pub async fn delete(&self, url: &str, headers: Headers) -> Result<Response, HttpError> {
        self.request(Request::new(Method::Delete, url).with_headers(headers))
            .await
    }

    /// Blocking form of [`HttpClient::request`].
    pub fn execute(&self, request: Request) -> Result<Response, HttpError> {
        let mut url = Url::parse(&request.url).map_err(|source| HttpError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;
        let mut body = request.body.as_deref();
        let mut hops = 0;

        loop {
            let raw = self.send_once(request.method, &url, &request.headers, body)?;
            let Some(location) = redirect_location(request.method, &raw) else {
                return classify(&url, raw);
            };

            let next = url.join(location).map_err(|source| HttpError::InvalidUrl {
                url: location.to_string(),
                source,
            })?;
            if hops >= self.max_redirects {
                return Err(HttpError::TooManyRedirects {
                    url: next.to_string(),
                    hops,
                });
            }
            hops += 1;
            debug!(from = %url, to = %next, hop = hops, "following redirect");
            url = next;
            body = None;
        }
    }

    fn send_once(
        &self,
        method: Method,
        url: &Url,
        headers: &Headers,
        body: Option<&[u8]>,
    ) -> Result<RawResponse, HttpError> {
        debug!(method = %method, url = %url, "sending request");
        let mut request = self.agent.request(method.as_str(), url.as_str());
        for (name, value) in headers.iter() {
            request = request.set(name, value);
        }
        let result = match body {
            Some(bytes) => request.send_bytes(bytes),
            None => request.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(HttpError::Transport {
                    url: url.to_string(),
                    source: Box::new(err),
                });
            }
        };

        let status = response.status();
        let headers = Headers::from_response(&response);
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| HttpError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;
        debug!(status, bytes = body.len(), "received response");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_optional_body(
    method: Method,
    url: &str,
    body: Option<Vec<u8>>,
    headers: Headers,
) -> Request {
    let request = Request::new(method, url).with_headers(headers);
    match body {
        Some(body) => request.with_body(body),
        None => request,
    }
}

fn redirect_location(method: Method, raw: &RawResponse) -> Option<&str> {
    if method != Method::Get || !matches!(raw.status, 301 | 302) {
        return None;
    }
    raw.headers
        .get("location")
        .map(str::trim)
        .filter(|location| !location.is_empty())
}

fn classify(url: &Url, raw: RawResponse) -> Result<Response, HttpError> {
    if !(200..300).contains(&raw.status) {
        return Err(HttpError::Status(HttpFailure {
            status: raw.status,
            url: url.to_string(),
            body: raw.body,
            headers: raw.headers,
        }));
    }

    let bytes = if is_gzip(&raw.headers) {
        gunzip(&raw.body).map_err(|source| HttpError::Decode {
            url: url.to_string(),
            source,
        })?
    } else {
        raw.body
    };

    let body = if is_binary(&raw.headers) {
        Body::Bytes(bytes)
    } else {
        Body::Text(String::from_utf8_lossy(&bytes).into_owned())
    };

    Ok(Response {
        status: raw.status,
        url: url.to_string(),
        headers: raw.headers,
        body,
    })
}

fn is_gzip(headers: &Headers) -> bool {
    headers
        .get("content-encoding")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"))
}

fn is_binary(headers: &Headers) -> bool {
    headers.get("content-type").is_some_and(|value| {
        let essence = value.split(';').next().unwrap_or_default().trim();
        BINARY_CONTENT_TYPES
            .iter()
            .any(|binary| essence.eq_ignore_ascii_case(binary))
    })
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{Body, HttpError, Method, RawResponse, classify, redirect_location};
    use crate::core::error::{Error, ErrorKind};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use url::Url;

    fn raw(status: u16, headers: &[(&str, &str)], body: &[u8]) -> RawResponse {
        RawResponse {
            status,
            headers: headers.iter().copied().collect(),
            body: body.to_vec(),
        }
    }

    fn url() -> Url {
        Url::parse("https://api.example.io/apps").expect("url")
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<Method>().expect("get"), Method::Get);
        assert_eq!("Patch".parse::<Method>().expect("patch"), Method::Patch);
        let err = "TRACE".parse::<Method>().expect_err("trace");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn only_get_follows_301_and_302_with_location() {
        let moved = raw(302, &[("Location", "/elsewhere")], b"");
        assert_eq!(redirect_location(Method::Get, &moved), Some("/elsewhere"));
        assert_eq!(redirect_location(Method::Post, &moved), None);

        let permanent = raw(301, &[("location", "https://b.example.io/")], b"");
        assert!(redirect_location(Method::Get, &permanent).is_some());

        let see_other = raw(303, &[("location", "/x")], b"");
        assert_eq!(redirect_location(Method::Get, &see_other), None);

        let no_location = raw(302, &[], b"");
        assert_eq!(redirect_location(Method::Get, &no_location), None);
    }

    #[test]
    fn non_2xx_is_a_status_failure_with_raw_body() {
        let err = classify(&url(), raw(404, &[("x-request-id", "abc")], b"no such app"))
            .expect_err("404");
        match err {
            HttpError::Status(failure) => {
                assert_eq!(failure.status, 404);
                assert_eq!(failure.body, b"no such app");
                assert_eq!(failure.headers.get("X-Request-Id"), Some("abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gzip_bodies_are_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"name\":\"api\"}").expect("write");
        let compressed = encoder.finish().expect("finish");

        let response = classify(
            &url(),
            raw(200, &[("Content-Encoding", "gzip")], &compressed),
        )
        .expect("ok");
        assert_eq!(response.body, Body::Text("{\"name\":\"api\"}".to_string()));
    }

    #[test]
    fn corrupt_gzip_is_a_decode_error() {
        let err = classify(&url(), raw(200, &[("content-encoding", "gzip")], b"plain"))
            .expect_err("decode");
        assert!(matches!(err, HttpError::Decode { .. }));
    }

    #[test]
    fn archive_content_types_stay_binary() {
        let response = classify(
            &url(),
            raw(200, &[("content-type", "application/zip")], &[0x50, 0x4b, 0xff]),
        )
        .expect("ok");
        assert_eq!(response.body, Body::Bytes(vec![0x50, 0x4b, 0xff]));

        let text = classify(
            &url(),
            raw(200, &[("content-type", "application/json; charset=utf-8")], b"[]"),
        )
        .expect("ok");
        assert_eq!(text.body.as_text(), Some("[]"));
    }

    #[test]
    fn status_failures_map_to_http_errors_with_hints() {
        let err = classify(&url(), raw(401, &[], b"")).expect_err("401");
        let mapped = Error::from(err);
        assert_eq!(mapped.kind(), ErrorKind::Http);
        assert_eq!(mapped.status(), Some(401));
        assert!(mapped.hint().is_some());
    }
}
