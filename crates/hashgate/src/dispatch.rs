//! Dispatch loop: admission, execution and release for one request.
//!
//! ```text
//! TRY_ACQUIRE --admitted--> EXECUTE --> RELEASE --> DONE | FAILED
//!      ^
//!      +-- WAIT <--denied--+
//! ```
//!
//! The slot is released before a result or failure leaves `dispatch`. A
//! denial is not an error: the loop waits for a release and retries, with no
//! retry limit and no backoff.

use std::sync::Arc;

use crate::admission::{AdmissionController, AdmissionError, AdmissionSlot, ResourceId};
use crate::pool::{TaskError, TaskHandle, WorkerPool};
use crate::task::ProtectedTask;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Task(TaskError),
    /// Waiting for a slot or for the task was cut short by shutdown.
    #[error("Interrupted while waiting")]
    Interrupted,
    /// The acquire/release pairing was broken somewhere else.
    #[error("Admission protocol violation: {0}")]
    Protocol(AdmissionError),
}

impl From<TaskError> for DispatchError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::Interrupted => DispatchError::Interrupted,
            other => DispatchError::Task(other),
        }
    }
}

impl From<AdmissionError> for DispatchError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Interrupted => DispatchError::Interrupted,
            other => DispatchError::Protocol(other),
        }
    }
}

/// Runs protected tasks for one resource through admission control.
pub struct Dispatcher<T: ProtectedTask> {
    admission: Arc<AdmissionController>,
    pool: Arc<WorkerPool<T>>,
    resource: ResourceId,
}

impl<T: ProtectedTask> Dispatcher<T> {
    pub fn new(
        admission: Arc<AdmissionController>,
        pool: Arc<WorkerPool<T>>,
        resource: impl Into<ResourceId>,
    ) -> Self {
        Self {
            admission,
            pool,
            resource: resource.into(),
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn pool(&self) -> &Arc<WorkerPool<T>> {
        &self.pool
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Run the task on `input` once admitted.
    pub async fn dispatch(&self, input: T::Input) -> Result<T::Output, DispatchError> {
        self.run_admitted(|pool| pool.submit(input)).await
    }

    /// Run the task's verification once admitted.
    ///
    /// Verification costs as much as the task itself, so it goes through the
    /// same gate.
    pub async fn dispatch_verify(
        &self,
        output: T::Output,
        input: T::Input,
    ) -> Result<bool, DispatchError> {
        self.run_admitted(|pool| pool.verify(output, input)).await
    }

    async fn run_admitted<R>(
        &self,
        submit: impl FnOnce(&WorkerPool<T>) -> TaskHandle<R>,
    ) -> Result<R, DispatchError> {
        let slot = self.admit().await?;

        let outcome = submit(&self.pool).await;

        if let Err(e) = slot.release() {
            tracing::error!(resource = %self.resource, error = %e, "Admission slot release failed");
            return Err(DispatchError::Protocol(e));
        }

        match outcome {
            Ok(value) => {
                tracing::trace!(resource = %self.resource, "Dispatch done");
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(resource = %self.resource, error = %e, "Dispatch failed");
                Err(e.into())
            }
        }
    }

    async fn admit(&self) -> Result<AdmissionSlot, DispatchError> {
        let mut waits: u64 = 0;
        loop {
            if let Some(slot) = self.admission.try_acquire_slot(&self.resource) {
                tracing::debug!(
                    resource = %self.resource,
                    waits,
                    in_use = self.admission.in_use(&self.resource),
                    "Admitted"
                );
                return Ok(slot);
            }

            tracing::trace!(resource = %self.resource, waits, "Waiting for capacity");
            if let Err(e) = self.admission.await_capacity(&self.resource).await {
                tracing::debug!(resource = %self.resource, error = %e, "Wait for capacity ended");
                return Err(e.into());
            }
            waits += 1;
        }
    }
}
