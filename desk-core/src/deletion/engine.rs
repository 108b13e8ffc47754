//! Deletion workflow engine
//!
//! 删除申请流程：任何有权限的角色可以对可见记录提出删除申请，只有经理可以审批。
//! 批准时先删除目标记录，再把申请标记为 Approved（申请本身保留）。
//!
//! 两次写入之间不是原子的：删除成功而标记失败时按配置重试，重试耗尽后返回
//! [`EngineError::PartiallyApplied`]，申请保持 Pending，可以再次审批或驳回。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shared::models::{
    ApprovalStatus, DeletionRequest, DeletionRequestCreate, DeletionRequestResolve, Request, User,
    collections,
};
use tokio::sync::watch;

use crate::core::Config;
use crate::scope::resolver;
use crate::store::{
    DocRef, Document, DocumentStore, LiveCollection, LiveState, RecordFilter, StoreError, collection, doc,
    server_timestamp, timed, to_document,
};
use crate::utils::{EngineError, EngineResult};

/// Retry policy for the approval mark written after a successful delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.mark_retry_attempts.max(1),
            backoff: config.mark_retry_backoff(),
        }
    }
}

/// Outcome of a resolve call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub deletion_id: String,
    pub status: ApprovalStatus,
    /// Target record removed by this call
    pub target_deleted: bool,
}

pub struct DeletionEngine {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    retry: RetryPolicy,
    live: LiveCollection<DeletionRequest>,
}

impl fmt::Debug for DeletionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionEngine")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("live", &self.live)
            .finish()
    }
}

impl DeletionEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            live: LiveCollection::new(collections::DELETION_REQUESTS, store.clone()),
            store,
            timeout: config.store_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }

    // ========== Live view ==========

    /// Listen to the deletion requests `viewer` may see, newest first
    pub async fn activate(&self, viewer: &User) -> EngineResult<u64> {
        let query = collection(collections::DELETION_REQUESTS);
        let viewer = viewer.clone();
        let filter: RecordFilter<DeletionRequest> = Arc::new(move |items| {
            let mut visible = resolver::visible_deletion_requests(&viewer, items);
            visible.sort_by_key(|d| std::cmp::Reverse(d.timestamp.map_or(i64::MAX, |t| t.seconds)));
            visible
        });
        Ok(self.live.activate(query, filter).await?)
    }

    pub fn deactivate(&self) {
        self.live.deactivate();
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState<DeletionRequest>> {
        self.live.subscribe()
    }

    pub fn deletion_requests(&self) -> Vec<DeletionRequest> {
        self.live.items()
    }

    /// Visible deletion requests still awaiting a decision
    pub fn pending(&self) -> Vec<DeletionRequest> {
        self.live
            .items()
            .into_iter()
            .filter(|d| d.status == ApprovalStatus::Pending)
            .collect()
    }

    // ========== Operations ==========

    /// Petition deletion of `target_collection/target_id`.
    ///
    /// The stored description reads "<actor name> wants to delete <target_description>".
    pub async fn request(
        &self,
        actor: &User,
        target_collection: &str,
        target_id: &str,
        target_description: &str,
    ) -> EngineResult<String> {
        let target_description = target_description.trim();
        if target_id.trim().is_empty() {
            return Err(EngineError::MissingField("targetId"));
        }
        if target_description.is_empty() {
            return Err(EngineError::MissingField("targetDescription"));
        }

        // 先按角色和集合判断，避免向无权角色泄露记录是否存在
        resolver::authorize_petition_collection(actor, target_collection)?;

        let target = timed(self.timeout, self.store.get_doc(&doc(target_collection, target_id))).await?;
        if !target.exists() {
            return Err(EngineError::not_found(target_collection, target_id));
        }
        resolver::authorize_petition(actor, target_collection, target.str_field("userId"))?;

        if self
            .pending()
            .iter()
            .any(|d| d.target_collection == target_collection && d.target_id == target_id)
        {
            tracing::warn!(
                target_path = %format!("{target_collection}/{target_id}"),
                "A pending deletion request already exists for this record"
            );
        }

        let payload = DeletionRequestCreate {
            target_collection: target_collection.to_string(),
            target_id: target_id.to_string(),
            requested_by: actor.actor_ref(),
            target_description: format!("{} wants to delete {}", actor.name, target_description),
            status: ApprovalStatus::Pending,
            timestamp: server_timestamp(),
        };
        let id = timed(
            self.timeout,
            self.store
                .add_doc(collections::DELETION_REQUESTS, to_document(&payload)?),
        )
        .await?;

        tracing::info!(
            deletion_id = %id,
            target_path = %format!("{target_collection}/{target_id}"),
            requested_by = %actor.uid,
            "Deletion requested"
        );
        Ok(id)
    }

    /// Petition deletion of a request ("Request: <type> by <userName>")
    pub async fn request_for_request(&self, actor: &User, request: &Request) -> EngineResult<String> {
        self.request(actor, collections::REQUESTS, &request.id, &request.describe())
            .await
    }

    /// Approve (delete target, then mark) or reject a pending deletion request
    pub async fn resolve(
        &self,
        actor: &User,
        deletion_id: &str,
        decision: ApprovalStatus,
    ) -> EngineResult<Resolution> {
        resolver::authorize_deletion_resolve(actor)?;

        let deletion_ref = doc(collections::DELETION_REQUESTS, deletion_id);
        let deletion = self.load_resolvable(&deletion_ref, decision).await?;

        let patch = to_document(&DeletionRequestResolve {
            status: decision,
            resolved_by: actor.actor_ref(),
            resolved_at: server_timestamp(),
        })?;

        if decision == ApprovalStatus::Rejected {
            // 写入前重读，另一位经理可能已经批准
            self.load_resolvable(&deletion_ref, decision).await?;
            timed(self.timeout, self.store.update_doc(&deletion_ref, patch)).await?;
            tracing::info!(deletion_id = %deletion_id, actor = %actor.uid, "Deletion request rejected");
            return Ok(Resolution {
                deletion_id: deletion_id.to_string(),
                status: decision,
                target_deleted: false,
            });
        }

        // (a) 删除目标
        let target_ref = doc(&deletion.target_collection, &deletion.target_id);
        let target = timed(self.timeout, self.store.get_doc(&target_ref)).await?;
        if !target.exists() {
            return Err(EngineError::not_found(
                &deletion.target_collection,
                &deletion.target_id,
            ));
        }
        // 删除前重读，已被驳回的申请不能再删除目标
        self.load_resolvable(&deletion_ref, decision).await?;
        timed(self.timeout, self.store.delete_doc(&target_ref)).await?;

        // (b) 标记申请
        if let Err(source) = self.mark_with_retry(&deletion_ref, patch).await {
            tracing::error!(
                deletion_id = %deletion_id,
                target_path = %target_ref.path(),
                error = %source,
                "Target deleted but deletion request could not be marked approved"
            );
            return Err(EngineError::PartiallyApplied {
                deletion_id: deletion_id.to_string(),
                target: target_ref.path(),
                source,
            });
        }

        tracing::info!(
            deletion_id = %deletion_id,
            target_path = %target_ref.path(),
            actor = %actor.uid,
            "Deletion approved and applied"
        );
        Ok(Resolution {
            deletion_id: deletion_id.to_string(),
            status: decision,
            target_deleted: true,
        })
    }

    /// Read the deletion request and check it can still move to `decision`
    async fn load_resolvable(
        &self,
        deletion_ref: &DocRef,
        decision: ApprovalStatus,
    ) -> EngineResult<DeletionRequest> {
        let snapshot = timed(self.timeout, self.store.get_doc(deletion_ref)).await?;
        if !snapshot.exists() {
            return Err(EngineError::not_found(
                collections::DELETION_REQUESTS,
                &deletion_ref.id,
            ));
        }
        let deletion: DeletionRequest = snapshot.decode()?;

        if !deletion.status.can_transition_to(decision) {
            return Err(EngineError::InvalidTransition {
                collection: collections::DELETION_REQUESTS,
                id: deletion_ref.id.clone(),
                from: deletion.status,
                to: decision,
            });
        }
        Ok(deletion)
    }

    async fn mark_with_retry(
        &self,
        deletion_ref: &DocRef,
        patch: Document,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match timed(self.timeout, self.store.update_doc(deletion_ref, patch.clone())).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.attempts && is_retryable(&e) => {
                    tracing::warn!(
                        deletion_id = %deletion_ref.id,
                        attempt,
                        error = %e,
                        "Marking deletion request failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_) | StoreError::Timeout(_))
}
