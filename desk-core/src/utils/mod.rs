//! 工具模块 - 错误类型和日志
//!
//! # 内容
//!
//! - [`EngineError`] - 引擎错误类型及错误码映射
//! - [`AppError`] - 展示层错误类型 (from shared::error)
//! - 日志初始化

pub mod error;
pub mod logger;

pub use error::{AppError, AppResult, EngineError, EngineResult, ErrorCategory, ErrorCode};
