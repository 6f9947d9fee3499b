//! Transport layer for hashgate.
//!
//! Provides the HTTP transport via axum.

pub mod http;

pub use http::{ServerConfig, serve};
