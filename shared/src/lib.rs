//! Shared types for StaffDesk
//!
//! Record models of the store collections, the unified error code system and
//! small time helpers used by the workflow engines and any presentation layer.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
