//! hashgate: admission-controlled argon2 hashing.
//!
//! Requests are admitted without limit at the edge; the memory-hungry hash
//! step runs on at most `max_concurrency` executions at once, and requests
//! beyond the cap wait their turn instead of being rejected.

mod health;
mod version;

pub mod admission;
pub mod dispatch;
pub mod hasher;
pub mod pool;
pub mod service;
pub mod task;
pub mod transport;

pub use admission::{AdmissionController, AdmissionError, AdmissionSlot, ResourceId};
pub use dispatch::{DispatchError, Dispatcher};
pub use hasher::{Argon2Task, HashInput, HashOutput, HashParams};
pub use health::{Health, HealthSnapshot};
pub use pool::{PoolError, TaskError, TaskHandle, WorkerPool};
pub use service::{HASH_API_IDENTIFIER, HashService, HashTask, ServiceError};
pub use task::{ProtectedTask, TaskFailure};
pub use version::{HASHGATE_VERSION, VersionInfo};
