//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types, the `tracing` setup conventions and the broadcast event bus used to
//! report task, library and node activity.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
