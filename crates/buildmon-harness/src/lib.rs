//! # buildmon-harness - Process Supervision Harness
//!
//! Launches a long-lived watch-mode tool (a build watcher or dev server),
//! observes its combined stdout/stderr, and exposes events scraped from that
//! free-text output as awaitable signals: pattern waits, pattern races, and
//! build-completion waits.
//!
//! Depends on [`buildmon_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Supervision
//! - [`SupervisedProcess`] - Wraps one spawned process; pattern/build/exit
//!   waits, kill, and the HTTP pass-through for server processes
//! - [`BUILD_SUCCESS_MARKER`] - The output substring that signals a rebuild
//!
//! ### Launching
//! - [`LaunchSpec`] - Program, args, working directory, env overrides
//! - [`launch()`] - Spawn immediately; failures surface through the supervisor
//!
//! ### Sandbox
//! - [`Sandbox`] - Throwaway fixture copy with `build` / `serve` / `test`
//!   entry points and file/manifest helpers
//! - [`HarnessConfig`] - Tool binary and fixture directory
//!
//! ### Ports
//! - [`next_port()`] - Process-wide monotonic port allocator (base 4210)

pub mod launcher;
pub mod ports;
pub mod sandbox;
pub mod supervisor;

// Public API re-exports
pub use launcher::{launch, LaunchSpec, ProcessHandle};
pub use ports::{next_port, PortAllocator, BASE_PORT};
pub use sandbox::{HarnessConfig, Sandbox};
pub use supervisor::{SupervisedProcess, BUILD_SUCCESS_MARKER};
