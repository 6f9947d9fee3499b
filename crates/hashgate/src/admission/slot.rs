//! AdmissionSlot - ownership of one unit of admitted capacity.

use std::sync::Arc;

use super::{AdmissionController, AdmissionError, ResourceId};

/// A held admission slot.
///
/// Call [`release`](Self::release) to give it back and observe protocol
/// errors. If the slot is dropped instead (a dispatch future dropped mid-flight,
/// a panic unwinding through the holder), it is released on drop so capacity
/// never leaks.
#[must_use = "dropping the slot releases it immediately"]
pub struct AdmissionSlot {
    controller: Arc<AdmissionController>,
    resource: ResourceId,
    released: bool,
}

impl AdmissionSlot {
    pub(crate) fn new(controller: Arc<AdmissionController>, resource: ResourceId) -> Self {
        Self {
            controller,
            resource,
            released: false,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn release(mut self) -> Result<(), AdmissionError> {
        self.released = true;
        self.controller.release(&self.resource)
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(resource = %self.resource, "AdmissionSlot dropped without release - releasing");
        if let Err(e) = self.controller.release(&self.resource) {
            tracing::error!(resource = %self.resource, error = %e, "Failed to release dropped slot");
        }
    }
}

impl std::fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot")
            .field("resource", &self.resource)
            .field("released", &self.released)
            .finish()
    }
}
