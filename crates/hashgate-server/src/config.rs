//! Startup configuration from environment variables.

use std::str::FromStr;

use anyhow::{Context, bail};
use hashgate::HashParams;
use hashgate::transport::ServerConfig;

pub const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Admission limit and worker pool size.
    pub max_concurrent_operations: usize,
    pub hash: HashParams,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = ServerConfig::default();
        let hash_defaults = HashParams::default();

        let server = ServerConfig {
            host: lookup("HASHGATE_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "HASHGATE_PORT", defaults.port)?,
            await_explicit_shutdown: parse_bool_or(
                &lookup,
                "HASHGATE_AWAIT_EXPLICIT_SHUTDOWN",
                defaults.await_explicit_shutdown,
            )?,
        };

        let max_concurrent_operations = parse_or(
            &lookup,
            "HASHGATE_MAX_CONCURRENT_OPERATIONS",
            DEFAULT_MAX_CONCURRENT_OPERATIONS,
        )?;
        if max_concurrent_operations == 0 {
            bail!("HASHGATE_MAX_CONCURRENT_OPERATIONS must be at least 1");
        }

        let hash = HashParams {
            memory_kib: parse_or(&lookup, "HASHGATE_HASH_MEMORY_KIB", hash_defaults.memory_kib)?,
            iterations: parse_or(&lookup, "HASHGATE_HASH_ITERATIONS", hash_defaults.iterations)?,
            parallelism: parse_or(
                &lookup,
                "HASHGATE_HASH_PARALLELISM",
                hash_defaults.parallelism,
            )?,
        };

        Ok(Self {
            server,
            max_concurrent_operations,
            hash,
        })
    }

    /// Upper bound on hashing memory: one `memory_kib` buffer per slot.
    pub fn memory_budget_bytes(&self) -> u64 {
        self.hash.memory_bytes() * self.max_concurrent_operations as u64
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

fn parse_bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> anyhow::Result<bool> {
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("") => Ok(false),
        Some(other) => bail!("invalid value for {}: {:?}", name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert!(!config.server.await_explicit_shutdown);
        assert_eq!(config.max_concurrent_operations, 10);
        assert_eq!(config.hash, HashParams::default());
        assert_eq!(config.memory_budget_bytes(), 10 * 64 * 1024 * 1024);
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HASHGATE_HOST", "127.0.0.1"),
            ("HASHGATE_PORT", "8080"),
            ("HASHGATE_MAX_CONCURRENT_OPERATIONS", " 4 "),
            ("HASHGATE_HASH_MEMORY_KIB", "1024"),
            ("HASHGATE_HASH_ITERATIONS", "2"),
            ("HASHGATE_HASH_PARALLELISM", "2"),
            ("HASHGATE_AWAIT_EXPLICIT_SHUTDOWN", "true"),
        ]))
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.await_explicit_shutdown);
        assert_eq!(config.max_concurrent_operations, 4);
        assert_eq!(
            config.hash,
            HashParams {
                memory_kib: 1024,
                iterations: 2,
                parallelism: 2,
            }
        );
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err =
            Config::from_lookup(lookup(&[("HASHGATE_MAX_CONCURRENT_OPERATIONS", "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("HASHGATE_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("HASHGATE_PORT"));
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let err = Config::from_lookup(lookup(&[("HASHGATE_AWAIT_EXPLICIT_SHUTDOWN", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("HASHGATE_AWAIT_EXPLICIT_SHUTDOWN"));
    }
}
