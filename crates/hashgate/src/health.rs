//! Health status types.

use serde::{Deserialize, Serialize};

use crate::version::VersionInfo;

/// Health status of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Accepting requests with free slots
    Ready,
    /// Accepting requests, but every slot is held; new requests wait
    Busy,
    /// Shutdown triggered; waiting requests are interrupted
    ShuttingDown,
}

impl Health {
    pub fn from_usage(in_use: usize, max_concurrency: usize, shutting_down: bool) -> Self {
        if shutting_down {
            Health::ShuttingDown
        } else if in_use >= max_concurrency {
            Health::Busy
        } else {
            Health::Ready
        }
    }
}

/// Point-in-time view of service health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: Health,
    /// Admission slots currently held.
    pub in_use: usize,
    pub max_concurrency: usize,
    /// Tasks executing on the worker pool.
    pub running: usize,
    /// Tasks admitted but waiting for a worker.
    pub queued: usize,
    pub version: VersionInfo,
}

impl HealthSnapshot {
    pub fn is_ready(&self) -> bool {
        self.status == Health::Ready
    }

    pub fn is_busy(&self) -> bool {
        self.status == Health::Busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [Health::Ready, Health::Busy, Health::ShuttingDown],
            @r#"
        [
          "READY",
          "BUSY",
          "SHUTTING_DOWN"
        ]
        "#
        );
    }

    #[test]
    fn health_deserializes_screaming_snake_case() {
        assert_eq!(
            serde_json::from_str::<Health>("\"SHUTTING_DOWN\"").unwrap(),
            Health::ShuttingDown
        );
    }

    #[test]
    fn health_from_usage() {
        assert_eq!(Health::from_usage(0, 10, false), Health::Ready);
        assert_eq!(Health::from_usage(9, 10, false), Health::Ready);
        assert_eq!(Health::from_usage(10, 10, false), Health::Busy);
        assert_eq!(Health::from_usage(0, 10, true), Health::ShuttingDown);
    }

    #[test]
    fn snapshot_serializes() {
        let snapshot = HealthSnapshot {
            status: Health::Busy,
            in_use: 10,
            max_concurrency: 10,
            running: 10,
            queued: 0,
            version: VersionInfo {
                hashgate: "0.1.0",
                algorithm: Some("argon2i"),
            },
        };
        assert!(snapshot.is_busy());
        assert!(!snapshot.is_ready());
        insta::assert_json_snapshot!(snapshot, @r#"
        {
          "status": "BUSY",
          "in_use": 10,
          "max_concurrency": 10,
          "running": 10,
          "queued": 0,
          "version": {
            "hashgate": "0.1.0",
            "algorithm": "argon2i"
          }
        }
        "#);
    }
}
