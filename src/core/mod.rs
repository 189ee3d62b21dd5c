//! Purpose: Core runtime types shared by the CLI, API client, and plugin system.
//! Exports: `config`, `context`, `error`.
//! Role: Leaf modules with no knowledge of command dispatch.
pub mod config;
pub mod context;
pub mod error;
