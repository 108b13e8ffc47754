//! Deletion petitions
//!
//! Records are never deleted directly: a [`DeletionEngine::request`] creates a
//! pending petition and a Manager's [`DeletionEngine::resolve`] performs the delete.

pub mod engine;

pub use engine::{DeletionEngine, Resolution, RetryPolicy};
