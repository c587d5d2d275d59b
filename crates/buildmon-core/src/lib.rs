//! # buildmon-core - Core Domain Types
//!
//! Foundation crate for buildmon. Provides error handling, event definitions,
//! and logging setup for the supervision harness.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing, reqwest).
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum covering spawn, runtime, and request failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`FailureReason`] - Clonable cause used to reject every outstanding wait
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Output chunk / exit events from a supervised process
//! - [`StreamSource`] - Stdout/stderr tag, used for logging only
//!
//! ### Logging (`logging`)
//! - [`logging::init()`] - `tracing` subscriber writing to stderr, filtered by
//!   the `BUILDMON_LOG` environment variable
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use buildmon_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, FailureReason, Result};
pub use events::{ProcessEvent, StreamSource};
