//! Directory / scope resolution
//!
//! - [`permissions`]: role → permission and (role, collection) → petition tables
//! - [`resolver`]: visibility filters and write-right checks used by both engines

pub mod permissions;
pub mod resolver;

pub use resolver::{Capabilities, Denial, ScopeView, authorize, can, capabilities, resolve_scope};
