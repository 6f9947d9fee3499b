//! Version information for hashgate.

/// hashgate version from Cargo.toml
pub const HASHGATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub hashgate: &'static str,
    /// Name of the protected task (e.g. `argon2i`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<&'static str>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            hashgate: HASHGATE_VERSION,
            algorithm: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(mut self, algorithm: &'static str) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
}
