//! Request lifecycle engine
//!
//! `Pending → {Approved, Rejected}`. Creation evaluates the auto-approval
//! policy and writes the resulting status in the single create write; every
//! transition re-reads the stored document before writing.

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shared::models::{
    ApprovalStatus, Request, RequestCreate, RequestDraft, RequestResolve, User, collections,
};
use tokio::sync::watch;

use super::policy::{AutoApprovalPolicy, AutoDecision};
use crate::core::Config;
use crate::scope::permissions::{REQUESTS_CREATE, REQUESTS_RESOLVE, REQUESTS_VIEW_ALL, role_has_permission};
use crate::scope::{Denial, authorize, resolver};
use crate::store::{
    DocumentStore, LiveCollection, LiveState, RecordFilter, collection, doc, server_timestamp,
    timed, to_document,
};
use crate::utils::{EngineError, EngineResult};

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReceipt {
    pub id: String,
    pub decision: AutoDecision,
}

impl RequestReceipt {
    pub fn status(&self) -> ApprovalStatus {
        self.decision.status
    }
}

/// Request joined with the requester's department
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub request: Request,
    pub department: Option<String>,
}

pub struct RequestEngine {
    store: Arc<dyn DocumentStore>,
    policy: AutoApprovalPolicy,
    timeout: Duration,
    live: LiveCollection<Request>,
}

impl fmt::Debug for RequestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEngine")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("live", &self.live)
            .finish()
    }
}

impl RequestEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            live: LiveCollection::new(collections::REQUESTS, store.clone()),
            store,
            policy: AutoApprovalPolicy::from_config(config),
            timeout: config.store_timeout(),
        }
    }

    pub fn with_policy(mut self, policy: AutoApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &AutoApprovalPolicy {
        &self.policy
    }

    // ========== Live view ==========

    /// Listen to the requests `viewer` may see, newest first
    pub async fn activate(&self, viewer: &User) -> EngineResult<u64> {
        let query = if role_has_permission(viewer.role, REQUESTS_VIEW_ALL) {
            collection(collections::REQUESTS)
        } else {
            collection(collections::REQUESTS).where_eq("userId", viewer.uid.as_str())
        };
        let viewer = viewer.clone();
        let filter: RecordFilter<Request> = Arc::new(move |items| {
            let mut visible = resolver::visible_requests(&viewer, items);
            sort_newest_first(&mut visible);
            visible
        });
        Ok(self.live.activate(query, filter).await?)
    }

    pub fn deactivate(&self) {
        self.live.deactivate();
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState<Request>> {
        self.live.subscribe()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.live.items()
    }

    /// Visible requests with the department filled from `directory` when the
    /// record predates the denormalized field
    pub fn rows(&self, directory: &[User]) -> Vec<RequestRow> {
        join_departments(self.requests(), directory)
    }

    // ========== Operations ==========

    /// Submit a request as `actor`
    pub async fn create(&self, actor: &User, draft: RequestDraft) -> EngineResult<RequestReceipt> {
        authorize(actor, REQUESTS_CREATE)?;

        let kind = draft.kind.trim();
        let reason = draft.reason.trim();
        if kind.is_empty() {
            return Err(EngineError::MissingField("type"));
        }
        if reason.is_empty() {
            return Err(EngineError::MissingField("reason"));
        }

        let decision = self.policy.evaluate(actor, &draft);
        let payload = RequestCreate {
            user_id: actor.uid.clone(),
            user_name: actor.name.clone(),
            department: Some(actor.department.clone()).filter(|d| !d.is_empty()),
            kind: kind.to_string(),
            reason: reason.to_string(),
            status: decision.status,
            timestamp: server_timestamp(),
        };

        let id = timed(
            self.timeout,
            self.store.add_doc(collections::REQUESTS, to_document(&payload)?),
        )
        .await?;

        match &decision.rule {
            Some(rule) => tracing::info!(
                request_id = %id,
                user_id = %actor.uid,
                rule = %rule,
                "Request created and auto-approved"
            ),
            None => tracing::info!(request_id = %id, user_id = %actor.uid, "Request created"),
        }
        Ok(RequestReceipt { id, decision })
    }

    /// Authoritative read of one request, scoped to `actor`
    pub async fn get(&self, actor: &User, id: &str) -> EngineResult<Request> {
        let request = self.load(id).await?;
        if !resolver::can_view_request(actor, &request) {
            return Err(Denial::OutOfScope.into());
        }
        Ok(request)
    }

    /// Approve or reject a pending request
    pub async fn transition(&self, actor: &User, id: &str, to: ApprovalStatus) -> EngineResult<()> {
        authorize(actor, REQUESTS_RESOLVE)?;

        let request = self.load(id).await?;
        resolver::authorize_transition(actor, &request)?;

        if !request.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                collection: collections::REQUESTS,
                id: id.to_string(),
                from: request.status,
                to,
            });
        }

        let patch = RequestResolve {
            status: to,
            resolved_by: actor.actor_ref(),
            resolved_at: server_timestamp(),
        };
        timed(
            self.timeout,
            self.store
                .update_doc(&doc(collections::REQUESTS, id), to_document(&patch)?),
        )
        .await?;

        tracing::info!(request_id = %id, actor = %actor.uid, status = %to, "Request status changed");
        Ok(())
    }

    async fn load(&self, id: &str) -> EngineResult<Request> {
        let snapshot = timed(self.timeout, self.store.get_doc(&doc(collections::REQUESTS, id))).await?;
        if !snapshot.exists() {
            return Err(EngineError::not_found(collections::REQUESTS, id));
        }
        Ok(snapshot.decode()?)
    }
}

/// Newest first; records still waiting for a server timestamp sort on top
fn sort_newest_first(requests: &mut [Request]) {
    requests.sort_by(|a, b| {
        let key = |r: &Request| r.timestamp.map_or(i64::MAX, |t| t.seconds);
        Reverse(key(a))
            .cmp(&Reverse(key(b)))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn join_departments(requests: Vec<Request>, directory: &[User]) -> Vec<RequestRow> {
    requests
        .into_iter()
        .map(|request| {
            let department = request
                .department
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| {
                    directory
                        .iter()
                        .find(|u| u.uid == request.user_id)
                        .map(|u| u.department.clone())
                        .filter(|d| !d.is_empty())
                });
            RequestRow {
                request,
                department,
            }
        })
        .collect()
}
