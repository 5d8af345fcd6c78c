//! # Host Bridge Traits
//!
//! Platform abstraction traits the core depends on.
//!
//! ## Overview
//!
//! This crate defines the contract between the media core and the host that
//! embeds it. Each trait is a capability the core needs but does not own:
//!
//! - [`HttpClient`](http::HttpClient) - request/response calls and streaming
//!   downloads, used by the catalog client and the federation client
//! - [`Clock`](time::Clock) - time source for deterministic tests
//! - [`LoggerSink`](log::LoggerSink) - forward structured logs to the host
//!
//! The desktop implementations live in `bridge-desktop`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should keep timeouts, connection failures and non-2xx statuses apart so
//! callers can tell connectivity problems from protocol problems.

pub mod error;
pub mod http;
pub mod log;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream, RetryPolicy};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use time::{Clock, FixedClock, SystemClock};
