//! HashService: transport-agnostic hashing behind admission control.
//!
//! This service owns:
//! - The dispatcher for the hashing resource (admission + worker pool)
//! - Health reporting
//! - Shutdown coordination
//!
//! Transports delegate to this service and only translate results.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::watch;

use crate::admission::AdmissionController;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::health::{Health, HealthSnapshot};
use crate::hasher::{Argon2Task, HashInput, HashOutput};
use crate::pool::{PoolError, WorkerPool};
use crate::task::ProtectedTask;
use crate::version::VersionInfo;

/// Resource identifier of the hashing endpoint.
pub const HASH_API_IDENTIFIER: &str = "API_HASHING";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A protected task that hashes text.
pub trait HashTask: ProtectedTask<Input = HashInput, Output = HashOutput> {}

impl<T> HashTask for T where T: ProtectedTask<Input = HashInput, Output = HashOutput> {}

pub struct HashService<T: HashTask = Argon2Task> {
    dispatcher: Dispatcher<T>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    version: VersionInfo,
}

impl<T: HashTask> HashService<T> {
    /// Build a service whose admission limit and pool size are both
    /// `max_concurrency`.
    pub fn new(task: T, max_concurrency: usize) -> Result<Self, ServiceError> {
        let limit = NonZeroUsize::new(max_concurrency).ok_or(ServiceError::ZeroConcurrency)?;
        let version = VersionInfo::new().with_algorithm(task.name());
        let admission = Arc::new(AdmissionController::new(limit));
        let pool = Arc::new(WorkerPool::new(task, limit)?);
        let dispatcher = Dispatcher::new(admission, pool, HASH_API_IDENTIFIER);
        Ok(Self::from_dispatcher(dispatcher).with_version(version))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher<T>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            dispatcher,
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Hash `input`, waiting for a slot if every slot is held.
    pub async fn hash(&self, input: HashInput) -> Result<HashOutput, ServiceError> {
        let output = self.dispatcher.dispatch(input).await.inspect_err(|e| {
            tracing::error!(error = %e, "Hash request failed");
        })?;
        Ok(output)
    }

    /// Check `output` against `input`, admitted like a hash request.
    pub async fn verify(&self, input: HashInput, output: HashOutput) -> Result<bool, ServiceError> {
        let valid = self
            .dispatcher
            .dispatch_verify(output, input)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "Verify request failed");
            })?;
        Ok(valid)
    }

    pub fn health(&self) -> HealthSnapshot {
        let admission = self.dispatcher.admission();
        let pool = self.dispatcher.pool();
        let in_use = admission.in_use(self.dispatcher.resource());
        let max_concurrency = admission.max_limit();

        HealthSnapshot {
            status: Health::from_usage(in_use, max_concurrency, self.is_shutting_down()),
            in_use,
            max_concurrency,
            running: pool.running(),
            queued: pool.queued(),
            version: self.version.clone(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Stop admitting: waiting requests fail with `Interrupted`, admitted ones
    /// run to completion.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.dispatcher.admission().close();
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
