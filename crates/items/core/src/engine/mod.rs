//! Graph operations, fragment dispatch and reconciliation bookkeeping.
//!
//! Stores drive these through [`graph::GraphReducer`], which borrows the
//! collection, the fragment table and the store's event queue for one
//! operation at a time.
pub mod audit;
mod fragments;
pub(crate) mod graph;
mod pending;

pub use audit::GraphViolation;
pub use fragments::{FragmentEvent, FragmentHook, FragmentRegistry};
pub use pending::PendingAttachments;
