//! Attendance and payroll figures
//!
//! Pure computations over attendance logs and deductions. Loading the records
//! and the HR/Manager gate live in [`crate::workspace::Workspace::payroll_summary`].

mod calculator;

pub use calculator::*;
