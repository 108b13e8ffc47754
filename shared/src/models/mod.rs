//! Data models
//!
//! Record shapes of the store collections, shared between the engines and the
//! presentation layer. Field names are camelCase on the wire; document ids
//! come from the snapshot key and are never written into the document body.

pub mod attendance;
pub mod deletion_request;
pub mod request;
pub mod status;
pub mod timestamp;
pub mod user;

// Re-exports
pub use attendance::*;
pub use deletion_request::*;
pub use request::*;
pub use status::*;
pub use timestamp::*;
pub use user::*;

/// Collection names
pub mod collections {
    pub const USERS: &str = "users";
    pub const REQUESTS: &str = "requests";
    pub const DELETION_REQUESTS: &str = "deletion_requests";
    pub const ATTENDANCE: &str = "attendance";
    pub const DEDUCTIONS: &str = "deductions";
}
