//! Deletion Request Model (删除申请)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::ApprovalStatus;
use super::timestamp::Timestamp;
use super::user::ActorRef;

/// Petition to delete a record in another collection (`deletion_requests`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequest {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub target_collection: String,
    pub target_id: String,
    pub requested_by: ActorRef,
    /// "HR User wants to delete Request: Leave by Emp User"
    pub target_description: String,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ActorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

/// Create deletion request payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequestCreate {
    pub target_collection: String,
    pub target_id: String,
    pub requested_by: ActorRef,
    pub target_description: String,
    pub status: ApprovalStatus,
    pub timestamp: Value,
}

/// Resolve deletion request payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequestResolve {
    pub status: ApprovalStatus,
    pub resolved_by: ActorRef,
    pub resolved_at: Value,
}
