//! 自动审批策略
//!
//! 提交时评估一次；命中任意规则即以 `Approved` 写入，否则为 `Pending`。
//! 规则按 角色 → 类型 → 原因 的顺序匹配，类型与原因忽略大小写和首尾空白。

use std::fmt;

use shared::models::{ApprovalStatus, RequestDraft, Role, User};

use crate::core::Config;

/// Rule that auto-approved a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoApprovalRule {
    SubmitterRole(Role),
    RequestType(String),
    Reason(String),
}

impl fmt::Display for AutoApprovalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoApprovalRule::SubmitterRole(role) => write!(f, "role:{role}"),
            AutoApprovalRule::RequestType(kind) => write!(f, "type:{kind}"),
            AutoApprovalRule::Reason(reason) => write!(f, "reason:{reason}"),
        }
    }
}

/// Outcome of evaluating a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDecision {
    pub status: ApprovalStatus,
    pub rule: Option<AutoApprovalRule>,
}

impl AutoDecision {
    pub fn is_auto_approved(&self) -> bool {
        self.rule.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoApprovalPolicy {
    roles: Vec<Role>,
    types: Vec<String>,
    reasons: Vec<String>,
}

impl AutoApprovalPolicy {
    pub fn new(roles: Vec<Role>, types: Vec<String>, reasons: Vec<String>) -> Self {
        Self {
            roles,
            types: types.iter().map(|t| normalize(t)).collect(),
            reasons: reasons.iter().map(|r| normalize(r)).collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.auto_approve_roles.clone(),
            config.auto_approve_types.clone(),
            config.auto_approve_reasons.clone(),
        )
    }

    /// Never auto-approves
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, submitter: &User, draft: &RequestDraft) -> AutoDecision {
        let rule = self.matching_rule(submitter, draft);
        AutoDecision {
            status: if rule.is_some() {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Pending
            },
            rule,
        }
    }

    fn matching_rule(&self, submitter: &User, draft: &RequestDraft) -> Option<AutoApprovalRule> {
        if self.roles.contains(&submitter.role) {
            return Some(AutoApprovalRule::SubmitterRole(submitter.role));
        }
        let kind = normalize(&draft.kind);
        if self.types.contains(&kind) {
            return Some(AutoApprovalRule::RequestType(draft.kind.trim().to_string()));
        }
        let reason = normalize(&draft.reason);
        if self.reasons.contains(&reason) {
            return Some(AutoApprovalRule::Reason(draft.reason.trim().to_string()));
        }
        None
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
