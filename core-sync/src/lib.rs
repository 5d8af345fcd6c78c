//! # Metadata Synchronization Module
//!
//! Keeps catalog records consistent with the files on disk.
//!
//! ## Overview
//!
//! This module handles:
//! - Discovering media files in library directories
//! - Matching new files to catalog entries and linking them
//! - Creating and refreshing movie, show and person records
//! - Removing records of vanished files and orphaned people
//!
//! ## Components
//!
//! - **Scanner** (`scanner`): recursive discovery and content fingerprints
//! - **Reconciler** (`reconciler`): id-idempotent create-or-update of entries
//! - **People** (`people`): person sync and reference-counted cleanup
//! - **Synchronizer** (`synchronizer`): scan, refresh and deletion flows
//! - **Executors** (`executors`): task engine integration

pub mod error;
pub mod executors;
pub mod people;
pub mod progress;
pub mod reconciler;
mod run;
pub mod scanner;
pub mod synchronizer;

pub use error::{Result, SyncError};
pub use executors::{PersonCleanupExecutor, RefreshExecutor, ScanExecutor};
pub use people::PeopleSync;
pub use progress::ProgressTracker;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use scanner::{Discovery, LibraryScanner, ScannedFile};
pub use synchronizer::{MetadataSynchronizer, SyncRepositories};
