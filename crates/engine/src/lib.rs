//! Personalization overlay engine for voice-command rule sets.
//!
//! This crate provides:
//! - CSV directive parsing (control files plus per-directive data files)
//! - In-memory list and command overlays computed on top of the base registry
//! - A watch manager with modification-time deduplication
//! - Artifact generation in the rule set's native textual form
//! - A reconciliation controller tying it together under a single mutex
//! - Registry adapters (in-memory and filesystem-backed) and a list report

pub mod artifact;
pub mod controller;
pub mod directive;
pub mod error;
pub mod overlay;
pub mod registry;
pub mod report;
pub mod watch;

pub use controller::{Controller, EngineState, ReconcileReport};
pub use error::{OverlayError, Result};
