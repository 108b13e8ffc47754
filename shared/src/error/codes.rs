//! Unified error codes for StaffDesk
//!
//! This module defines all error codes surfaced by the workflow engines to the
//! presentation layer. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Session errors
//! - 2xxx: Permission errors
//! - 4xxx: Request errors
//! - 5xxx: Deletion workflow errors
//! - 8xxx: Employee errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Session ====================
    /// No signed-in identity
    NotAuthenticated = 1001,
    /// Account is inactive
    AccountDisabled = 1007,
    /// Signed-in identity has no user profile
    ProfileNotFound = 1008,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Record is outside the actor's scope
    OutOfScope = 2003,

    // ==================== 4xxx: Request ====================
    /// Request not found
    RequestNotFound = 4001,
    /// Request already approved or rejected
    RequestAlreadyResolved = 4002,
    /// Status change not allowed by the state machine
    InvalidStatusTransition = 4003,

    // ==================== 5xxx: Deletion ====================
    /// Deletion request not found
    DeletionRequestNotFound = 5001,
    /// Deletion request already approved or rejected
    DeletionAlreadyResolved = 5002,
    /// Target deleted but the approval mark could not be written
    DeletionPartiallyApplied = 5004,

    // ==================== 8xxx: Employee ====================
    /// Employee not found
    EmployeeNotFound = 8001,
    /// Shift start is not a HH:MM value
    InvalidShiftStart = 8002,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Data store rejected or failed the call
    StoreUnavailable = 9002,
    /// Data store call timed out
    StoreTimeout = 9003,
    /// Stored document could not be decoded
    MalformedRecord = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::Unknown => "Unknown error",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field missing",

            ErrorCode::NotAuthenticated => "Not signed in",
            ErrorCode::AccountDisabled => "Account is inactive",
            ErrorCode::ProfileNotFound => "User profile not found",

            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::OutOfScope => "Record is outside your scope",

            ErrorCode::RequestNotFound => "Request not found",
            ErrorCode::RequestAlreadyResolved => "Request already resolved",
            ErrorCode::InvalidStatusTransition => "Invalid status transition",

            ErrorCode::DeletionRequestNotFound => "Deletion request not found",
            ErrorCode::DeletionAlreadyResolved => "Deletion request already resolved",
            ErrorCode::DeletionPartiallyApplied => {
                "Record deleted but approval could not be recorded"
            }

            ErrorCode::EmployeeNotFound => "Employee not found",
            ErrorCode::InvalidShiftStart => "Invalid shift start",

            ErrorCode::InternalError => "Internal error",
            ErrorCode::StoreUnavailable => "Data store unavailable",
            ErrorCode::StoreTimeout => "Data store timed out",
            ErrorCode::MalformedRecord => "Malformed record",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when converting an unknown u16 into [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),

            // Session
            1001 => Ok(ErrorCode::NotAuthenticated),
            1007 => Ok(ErrorCode::AccountDisabled),
            1008 => Ok(ErrorCode::ProfileNotFound),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2003 => Ok(ErrorCode::OutOfScope),

            // Request
            4001 => Ok(ErrorCode::RequestNotFound),
            4002 => Ok(ErrorCode::RequestAlreadyResolved),
            4003 => Ok(ErrorCode::InvalidStatusTransition),

            // Deletion
            5001 => Ok(ErrorCode::DeletionRequestNotFound),
            5002 => Ok(ErrorCode::DeletionAlreadyResolved),
            5004 => Ok(ErrorCode::DeletionPartiallyApplied),

            // Employee
            8001 => Ok(ErrorCode::EmployeeNotFound),
            8002 => Ok(ErrorCode::InvalidShiftStart),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StoreUnavailable),
            9003 => Ok(ErrorCode::StoreTimeout),
            9004 => Ok(ErrorCode::MalformedRecord),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
