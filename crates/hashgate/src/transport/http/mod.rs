//! HTTP transport.

mod routes;
mod server;

pub use routes::{INTERNAL_ERROR_MESSAGE, VerifyRequest, VerifyResponse, routes};
pub use server::{ServerConfig, serve};
