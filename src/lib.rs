//! Workspace placeholder crate.
//!
//! This crate exposes the `desktop-shims` feature flag and re-exports the
//! `core-service` façade so host applications can depend on
//! `mediahub-workspace` without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
