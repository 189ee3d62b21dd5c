//! Purpose: Library crate behind the `aka` CLI and its integration tests.
//! Exports: `api` (HTTP + API client), `auth`, `core`, `plugins`, output helpers.
//! Role: Everything except argument parsing and process exit lives here.
//! Invariants: Library code returns `core::error::Error`; only the binary exits.
pub mod api;
pub mod auth;
pub mod core;
pub mod notice;
pub mod plugins;
pub mod render;
pub mod version;
