//! 统一错误处理
//!
//! 引擎层错误 [`EngineError`] 以及到统一错误码的映射：
//!
//! | 变体 | 错误码 |
//! |------|--------|
//! | Unauthorized | 1xxx 会话 / 2xxx 权限 |
//! | InvalidTransition | 4002/4003, 5002 |
//! | NotFound | 4001, 5001, 8001, 0003 |
//! | StoreUnavailable | 9002/9003 |
//! | PartiallyApplied | 5004 |
//!
//! # 使用示例
//!
//! ```ignore
//! let receipt = engine.create(&actor, draft).await?;
//!
//! // 交给展示层
//! let app_err: AppError = engine_err.into();
//! ```

use shared::models::{ApprovalStatus, collections};
use thiserror::Error;

use crate::scope::Denial;
use crate::store::StoreError;

pub use shared::error::{AppError, AppResult, ErrorCategory, ErrorCode};

/// Workflow engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Unauthorized: {0}")]
    Unauthorized(Denial),

    #[error("Invalid transition of {collection}/{id}: {from} -> {to}")]
    InvalidTransition {
        collection: &'static str,
        id: String,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Required field missing: {0}")]
    MissingField(&'static str),

    #[error("Malformed record {path}: {message}")]
    MalformedRecord { path: String, message: String },

    #[error("Deleted {target} but could not mark deletion request {deletion_id} approved: {source}")]
    PartiallyApplied {
        deletion_id: String,
        target: String,
        source: StoreError,
    },

    #[error("Invalid shift start: {0}")]
    InvalidShiftStart(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// 统一错误码（展示层负责本地化）
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Unauthorized(denial) => match denial {
                Denial::NoSession => ErrorCode::NotAuthenticated,
                Denial::ProfileMissing => ErrorCode::ProfileNotFound,
                Denial::Inactive => ErrorCode::AccountDisabled,
                Denial::OutOfScope => ErrorCode::OutOfScope,
                Denial::MissingPermission(_) | Denial::NotPetitionable { .. } => {
                    ErrorCode::PermissionDenied
                }
            },
            EngineError::InvalidTransition {
                collection, from, ..
            } => match (*collection, from.is_terminal()) {
                (collections::REQUESTS, true) => ErrorCode::RequestAlreadyResolved,
                (collections::DELETION_REQUESTS, true) => ErrorCode::DeletionAlreadyResolved,
                _ => ErrorCode::InvalidStatusTransition,
            },
            EngineError::NotFound { collection, .. } => match collection.as_str() {
                collections::REQUESTS => ErrorCode::RequestNotFound,
                collections::DELETION_REQUESTS => ErrorCode::DeletionRequestNotFound,
                collections::USERS => ErrorCode::EmployeeNotFound,
                _ => ErrorCode::NotFound,
            },
            EngineError::StoreUnavailable(StoreError::Timeout(_)) => ErrorCode::StoreTimeout,
            EngineError::StoreUnavailable(StoreError::InvalidPayload(_)) => {
                ErrorCode::InternalError
            }
            EngineError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            EngineError::Validation(_) => ErrorCode::ValidationFailed,
            EngineError::MissingField(_) => ErrorCode::RequiredField,
            EngineError::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            EngineError::PartiallyApplied { .. } => ErrorCode::DeletionPartiallyApplied,
            EngineError::InvalidShiftStart(_) => ErrorCode::InvalidShiftStart,
        }
    }

    /// Store failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(StoreError::Unavailable(_) | StoreError::Timeout(_))
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => {
                let (collection, id) = path.split_once('/').unwrap_or((path.as_str(), ""));
                EngineError::not_found(collection, id)
            }
            StoreError::Decode { path, message } => EngineError::MalformedRecord { path, message },
            other => EngineError::StoreUnavailable(other),
        }
    }
}

impl From<Denial> for EngineError {
    fn from(denial: Denial) -> Self {
        EngineError::Unauthorized(denial)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let app = AppError::with_message(code, message);
        match err {
            EngineError::InvalidTransition { id, from, to, .. } => app
                .with_detail("id", id)
                .with_detail("from", from.as_str())
                .with_detail("to", to.as_str()),
            EngineError::NotFound { collection, id } => app
                .with_detail("collection", collection)
                .with_detail("id", id),
            EngineError::PartiallyApplied {
                deletion_id,
                target,
                ..
            } => app
                .with_detail("deletionId", deletion_id)
                .with_detail("target", target),
            EngineError::StoreUnavailable(e) => {
                tracing::error!(error = %e, error_code = ?code, "Store error occurred");
                app
            }
            _ => app,
        }
    }
}
