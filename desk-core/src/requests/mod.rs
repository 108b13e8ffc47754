//! Employee requests (leave and similar)
//!
//! - [`RequestEngine`]: create / transition / live view
//! - [`AutoApprovalPolicy`]: decides the initial status of a new request

pub mod engine;
pub mod policy;

pub use engine::{RequestEngine, RequestReceipt, RequestRow};
pub use policy::{AutoApprovalPolicy, AutoApprovalRule, AutoDecision};
