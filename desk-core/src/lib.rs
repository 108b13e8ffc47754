//! StaffDesk Core - 人事申请与审批工作流引擎
//!
//! # 架构概述
//!
//! 本 crate 实现 StaffDesk 的工作流核心，展示层只负责渲染：
//!
//! - **数据存储** (`store`): 文档存储抽象、实时订阅、内存实现
//! - **会话** (`session`): 身份来源与会话状态
//! - **作用域** (`scope`): 基于角色和部门的可见性与权限
//! - **申请** (`requests`): 申请创建、自动审批、状态流转
//! - **删除审批** (`deletion`): 删除申请与经理审批
//! - **工资** (`payroll`): 迟到分钟数与月度工资计算
//! - **工作区** (`workspace`): 身份变化时重建会话与实时视图
//!
//! # 模块结构
//!
//! ```text
//! desk-core/src/
//! ├── core/          # 配置
//! ├── store/         # DocumentStore、LiveCollection、MemoryStore
//! ├── session/       # 身份与会话
//! ├── scope/         # 权限表、可见性
//! ├── requests/      # 申请引擎、自动审批策略
//! ├── deletion/      # 删除审批引擎
//! ├── payroll/       # 考勤与工资计算
//! ├── utils/         # 错误、日志
//! └── workspace.rs   # 会话协调
//! ```

pub mod core;
pub mod deletion;
pub mod payroll;
pub mod requests;
pub mod scope;
pub mod session;
pub mod store;
pub mod utils;
pub mod workspace;

// Re-export 公共类型
pub use core::Config;
pub use deletion::{DeletionEngine, Resolution};
pub use requests::{AutoApprovalPolicy, RequestEngine, RequestReceipt};
pub use session::{AuthIdentity, IdentityProvider, ManualIdentityProvider, Session};
pub use store::{DocumentStore, MemoryStore};
pub use utils::{EngineError, EngineResult};
pub use workspace::Workspace;

// Re-export unified error types from shared
pub use utils::{AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
  ____  _         __  __ ____            _
 / ___|| |_ __ _ / _|/ _|  _ \  ___  ___| | __
 \___ \| __/ _` | |_| |_| | | |/ _ \/ __| |/ /
  ___) | || (_| |  _|  _| |_| |  __/\__ \   <
 |____/ \__\__,_|_| |_| |____/ \___||___/_|\_\
    "#
    );
}
