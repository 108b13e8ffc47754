//! Request Model (假期等员工申请)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::ApprovalStatus;
use super::timestamp::Timestamp;
use super::user::ActorRef;

/// Employee-initiated request (`requests` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Document id, filled from the snapshot key
    #[serde(default, skip_serializing)]
    pub id: String,
    pub user_id: String,
    /// Requester name copied at creation time
    pub user_name: String,
    /// Requester department copied at creation time (older records lack it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub status: ApprovalStatus,
    /// Server-assigned creation time
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ActorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

impl Request {
    /// "Request: Leave by Emp User"
    pub fn describe(&self) -> String {
        format!("Request: {} by {}", self.kind, self.user_name)
    }
}

/// Draft submitted by an employee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
}

impl RequestDraft {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Create request payload (written by `add_doc`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreate {
    pub user_id: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub status: ApprovalStatus,
    /// Server timestamp sentinel
    pub timestamp: Value,
}

/// Status change payload (merged by `update_doc`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResolve {
    pub status: ApprovalStatus,
    pub resolved_by: ActorRef,
    /// Server timestamp sentinel
    pub resolved_at: Value,
}
