//! Per-resource counting gate.
//!
//! Gates are created lazily on first use and live for the lifetime of the
//! controller. Each gate has its own counter and its own broadcast signal, so
//! releasing capacity for one resource never wakes waiters of another.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::Notify;

use super::AdmissionSlot;

/// Name of the logical resource whose concurrency is bounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// `release` for an identifier that was never acquired.
    #[error("Resource identifier {0} is not registered yet")]
    Unregistered(ResourceId),
    /// `release` with no outstanding slot (double release).
    #[error("Resource {0} released without a held slot")]
    NotHeld(ResourceId),
    #[error("Admission controller closed while waiting for capacity")]
    Interrupted,
}

impl AdmissionError {
    /// True when the acquire/release pairing contract was broken by the caller.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            AdmissionError::Unregistered(_) | AdmissionError::NotHeld(_)
        )
    }
}

#[derive(Default)]
struct Gate {
    held: AtomicUsize,
    released: Notify,
}

/// Bounds how many callers hold an admission slot for each resource.
///
/// Shared between request handlers via `Arc`. The limit applies to every
/// resource identifier independently and is fixed at construction. A zero
/// limit would make every wait permanent, so it is unrepresentable.
pub struct AdmissionController {
    max_limit: usize,
    gates: DashMap<ResourceId, Arc<Gate>>,
    closed: AtomicBool,
}

impl AdmissionController {
    pub fn new(max_limit: NonZeroUsize) -> Self {
        Self {
            max_limit: max_limit.get(),
            gates: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    fn gate(&self, id: &ResourceId) -> Arc<Gate> {
        if let Some(gate) = self.gates.get(id) {
            return Arc::clone(gate.value());
        }
        Arc::clone(self.gates.entry(id.clone()).or_default().value())
    }

    /// Take a slot for `id` if one is free. Never blocks.
    pub fn acquire(&self, id: &ResourceId) -> bool {
        let gate = self.gate(id);
        let admitted = gate
            .held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                (held < self.max_limit).then_some(held + 1)
            })
            .is_ok();

        if admitted {
            tracing::trace!(resource = %id, "Slot acquired");
        } else {
            tracing::trace!(resource = %id, limit = self.max_limit, "At capacity");
        }
        admitted
    }

    /// RAII form of [`acquire`](Self::acquire).
    pub fn try_acquire_slot(self: &Arc<Self>, id: &ResourceId) -> Option<AdmissionSlot> {
        self.acquire(id)
            .then(|| AdmissionSlot::new(Arc::clone(self), id.clone()))
    }

    /// Give back one slot for `id` and wake every waiter of `id`.
    pub fn release(&self, id: &ResourceId) -> Result<(), AdmissionError> {
        let gate = self
            .gates
            .get(id)
            .map(|gate| Arc::clone(gate.value()))
            .ok_or_else(|| AdmissionError::Unregistered(id.clone()))?;

        gate.held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                held.checked_sub(1)
            })
            .map_err(|_| AdmissionError::NotHeld(id.clone()))?;

        gate.released.notify_waiters();
        tracing::trace!(resource = %id, "Slot released");
        Ok(())
    }

    /// Suspend until a slot for `id` is released.
    ///
    /// Waking is a hint, not a reservation: other waiters race for the freed
    /// slot, so callers must retry [`acquire`](Self::acquire). Returns at once
    /// if a slot is already free.
    pub async fn await_capacity(&self, id: &ResourceId) -> Result<(), AdmissionError> {
        let gate = self.gate(id);
        let released = gate.released.notified();
        tokio::pin!(released);
        // Registered before the checks below, so a concurrent release or close
        // cannot slip in unobserved.
        released.as_mut().enable();

        if self.is_closed() {
            return Err(AdmissionError::Interrupted);
        }
        if gate.held.load(Ordering::Acquire) < self.max_limit {
            return Ok(());
        }

        released.await;

        if self.is_closed() {
            Err(AdmissionError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Interrupt current and future waiters.
    ///
    /// Held slots can still be released so in-flight work drains normally.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for gate in self.gates.iter() {
            gate.value().released.notify_waiters();
        }
        tracing::info!("Admission controller closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Slots currently held for `id`.
    pub fn in_use(&self, id: &ResourceId) -> usize {
        self.gates
            .get(id)
            .map(|gate| gate.value().held.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn available(&self, id: &ResourceId) -> usize {
        self.max_limit.saturating_sub(self.in_use(id))
    }
}
