//! Admission control for scarce-resource operations.
//!
//! Each resource identifier owns a counting gate:
//! - `acquire` / `release` never block and cost O(1)
//! - `await_capacity` is the only suspension point, woken by `release`
//! - `AdmissionSlot` pairs a successful acquire with exactly one release

mod controller;
mod slot;

pub use controller::{AdmissionController, AdmissionError, ResourceId};
pub use slot::AdmissionSlot;
