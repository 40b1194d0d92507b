//! Reconciliation core
//!
//! Data model, remote client seam, plans, and the four lifecycle operations.

pub mod attachment;
pub mod client;
pub mod config;
pub mod memory;
pub mod plan;
pub mod principal;
pub mod reconcile;
pub mod resource;
pub mod validation;
