//! Purpose: HTTP access to the Akkeris API for built-in commands and plugins.
//! Exports: `HttpClient` (raw transport) and `ApiClient` (host + auth aware).
//! Role: The only module that performs network I/O.
//! Invariants: Success, HTTP failure, and transport failure are distinct result shapes.
//! Invariants: Authorization is resolved per call, never cached.

mod client;
mod headers;
mod http;

pub use client::{ApiBody, ApiClient, ApiError};
pub use headers::Headers;
pub use http::{
    Body, HttpClient, HttpError, HttpFailure, MAX_REDIRECTS, Method, Request, Response,
};
