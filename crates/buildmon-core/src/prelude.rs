//! Prelude for common imports used throughout all buildmon crates

pub use crate::error::{Error, FailureReason, Result};
pub use tracing::{debug, error, info, trace, warn};
