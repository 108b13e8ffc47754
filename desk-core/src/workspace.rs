//! Workspace
//!
//! 工作区持有当前会话，并在身份变化时重建所有实时视图：
//!
//! ```text
//! identity change ─► generation += 1 ─► deactivate all ─► read users/{uid}
//!                                                           │
//!                               still current? ◄────────────┘
//!                                  │ yes
//!                                  ▼
//!                directory ─► requests ─► deletion_requests (activate)
//! ```
//!
//! 资料读取在锁外进行；激活阶段持有 `activation` 锁串行执行，每一步之后重新
//! 检查代数，被新身份取代的激活会自行撤销。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use shared::models::{
    ApprovalStatus, AttendanceLog, Deduction, DeletionRequest, Request, RequestDraft, User,
    collections,
};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::deletion::{DeletionEngine, Resolution};
use crate::payroll::{FinancialSummary, calculate_financials};
use crate::requests::{RequestEngine, RequestReceipt, RequestRow};
use crate::scope::{Denial, ScopeView, resolve_scope, resolver};
use crate::session::{AuthIdentity, IdentityProvider, Session};
use crate::store::{
    DocumentStore, LiveCollection, LiveState, QuerySnapshot, Record, RecordFilter, collection,
    doc, timed,
};
use crate::utils::{EngineError, EngineResult};

pub struct Workspace {
    store: Arc<dyn DocumentStore>,
    config: Config,
    directory: LiveCollection<User>,
    requests: RequestEngine,
    deletions: DeletionEngine,
    session_tx: watch::Sender<Session>,
    session_generation: AtomicU64,
    activation: Mutex<()>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("session", &*self.session_tx.borrow())
            .field("generation", &self.session_generation.load(Ordering::SeqCst))
            .field("requests", &self.requests)
            .field("deletions", &self.deletions)
            .finish()
    }
}

impl Workspace {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        let (session_tx, _) = watch::channel(Session::SignedOut);
        Self {
            directory: LiveCollection::new(collections::USERS, store.clone()),
            requests: RequestEngine::new(store.clone(), &config),
            deletions: DeletionEngine::new(store.clone(), &config),
            store,
            config,
            session_tx,
            session_generation: AtomicU64::new(0),
            activation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn requests(&self) -> &RequestEngine {
        &self.requests
    }

    pub fn deletions(&self) -> &DeletionEngine {
        &self.deletions
    }

    // ========== Session ==========

    pub fn session(&self) -> Session {
        self.session_tx.borrow().clone()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.session_tx.subscribe()
    }

    pub fn session_generation(&self) -> u64 {
        self.session_generation.load(Ordering::SeqCst)
    }

    /// Profile of the active session
    pub fn current_user(&self) -> EngineResult<User> {
        match &*self.session_tx.borrow() {
            Session::Active(user) => Ok(user.clone()),
            Session::ProfileMissing { .. } => Err(Denial::ProfileMissing.into()),
            Session::SignedOut | Session::Resolving { .. } | Session::Failed { .. } => {
                Err(Denial::NoSession.into())
            }
        }
    }

    /// Follow `provider` until `shutdown` fires.
    ///
    /// Each identity is applied on its own task, so a slow profile read never
    /// delays a newer identity; the superseded one discards itself.
    pub fn spawn(
        self: &Arc<Self>,
        provider: &dyn IdentityProvider,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = provider.subscribe();
        let workspace = Arc::clone(self);
        tokio::spawn(async move {
            let mut pending;
            loop {
                let identity = rx.borrow_and_update().clone();
                // 按到达顺序编号，任务调度顺序不影响新旧判断
                let generation = workspace.next_generation();
                let ws = Arc::clone(&workspace);
                pending =
                    tokio::spawn(async move { ws.apply_identity_at(generation, identity).await });

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            tracing::debug!("Identity provider closed");
                            break;
                        }
                    }
                }
            }
            pending.abort();
            workspace.close().await;
            tracing::info!("Workspace stopped");
        })
    }

    /// Switch to `identity`. Returns `false` when a newer identity superseded
    /// this one before it finished.
    pub async fn apply_identity(&self, identity: Option<AuthIdentity>) -> bool {
        let generation = self.next_generation();
        self.apply_identity_at(generation, identity).await
    }

    /// Claim the generation for the next identity change
    fn next_generation(&self) -> u64 {
        self.session_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply_identity_at(&self, generation: u64, identity: Option<AuthIdentity>) -> bool {
        {
            let _guard = self.activation.lock().await;
            if !self.is_current(generation) {
                return false;
            }
            self.deactivate_all();
            let next = match &identity {
                Some(identity) => Session::Resolving {
                    uid: identity.uid.clone(),
                },
                None => Session::SignedOut,
            };
            self.session_tx.send_replace(next);
        }

        let Some(identity) = identity else {
            tracing::info!("Signed out");
            return true;
        };

        let resolved = self.resolve_profile(&identity.uid).await;

        let _guard = self.activation.lock().await;
        if !self.is_current(generation) {
            tracing::debug!(uid = %identity.uid, generation, "Discarding superseded profile read");
            return false;
        }

        let user = match resolved {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(uid = %identity.uid, "Signed-in identity has no user profile");
                self.session_tx.send_replace(Session::ProfileMissing { uid: identity.uid });
                return true;
            }
            Err(e) => {
                tracing::error!(uid = %identity.uid, error = %e, "Failed to resolve user profile");
                self.session_tx.send_replace(Session::Failed {
                    uid: identity.uid,
                    message: e.to_string(),
                });
                return true;
            }
        };

        match self.activate_all(&user, generation).await {
            Ok(true) => {
                tracing::info!(
                    uid = %user.uid,
                    role = %user.role,
                    department = %user.department,
                    generation,
                    "Session active"
                );
                self.session_tx.send_replace(Session::Active(user));
                true
            }
            Ok(false) => {
                self.deactivate_all();
                false
            }
            Err(e) => {
                tracing::error!(uid = %user.uid, error = %e, "Failed to activate live views");
                self.deactivate_all();
                self.session_tx.send_replace(Session::Failed {
                    uid: user.uid,
                    message: e.to_string(),
                });
                true
            }
        }
    }

    /// Tear down every live view and sign out
    pub async fn close(&self) {
        self.session_generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.activation.lock().await;
        self.deactivate_all();
        self.session_tx.send_replace(Session::SignedOut);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session_generation.load(Ordering::SeqCst) == generation
    }

    async fn resolve_profile(&self, uid: &str) -> EngineResult<Option<User>> {
        let snapshot = timed(
            self.config.store_timeout(),
            self.store.get_doc(&doc(collections::USERS, uid)),
        )
        .await?;
        if !snapshot.exists() {
            return Ok(None);
        }
        Ok(Some(snapshot.decode()?))
    }

    /// Activate in dependency order, stopping as soon as `generation` is stale
    async fn activate_all(&self, user: &User, generation: u64) -> EngineResult<bool> {
        let viewer = user.clone();
        let filter: RecordFilter<User> = Arc::new(move |users| {
            let mut visible = resolver::visible_users(&viewer, users);
            visible.sort_by(|a, b| a.name.cmp(&b.name));
            visible
        });
        self.directory
            .activate(collection(collections::USERS), filter)
            .await?;
        if !self.is_current(generation) {
            return Ok(false);
        }

        self.requests.activate(user).await?;
        if !self.is_current(generation) {
            return Ok(false);
        }

        self.deletions.activate(user).await?;
        Ok(self.is_current(generation))
    }

    fn deactivate_all(&self) {
        self.directory.deactivate();
        self.requests.deactivate();
        self.deletions.deactivate();
    }

    // ========== Views ==========

    /// Users visible to the session user, by name
    pub fn directory(&self) -> Vec<User> {
        self.directory.items()
    }

    pub fn subscribe_directory(&self) -> watch::Receiver<LiveState<User>> {
        self.directory.subscribe()
    }

    pub fn scope_view(&self) -> EngineResult<ScopeView> {
        let user = self.current_user()?;
        Ok(resolve_scope(
            &user,
            &self.directory.items(),
            &self.requests.requests(),
            &self.deletions.deletion_requests(),
        ))
    }

    pub fn request_rows(&self) -> Vec<RequestRow> {
        self.requests.rows(&self.directory.items())
    }

    pub fn pending_deletions(&self) -> Vec<DeletionRequest> {
        self.deletions.pending()
    }

    // ========== Operations as the session user ==========

    pub async fn submit_request(&self, draft: RequestDraft) -> EngineResult<RequestReceipt> {
        let actor = self.current_user()?;
        self.requests.create(&actor, draft).await
    }

    pub async fn set_request_status(&self, id: &str, status: ApprovalStatus) -> EngineResult<()> {
        let actor = self.current_user()?;
        self.requests.transition(&actor, id, status).await
    }

    pub async fn get_request(&self, id: &str) -> EngineResult<Request> {
        let actor = self.current_user()?;
        self.requests.get(&actor, id).await
    }

    pub async fn request_deletion(
        &self,
        target_collection: &str,
        target_id: &str,
        target_description: &str,
    ) -> EngineResult<String> {
        let actor = self.current_user()?;
        self.deletions
            .request(&actor, target_collection, target_id, target_description)
            .await
    }

    /// Petition deletion of a request, described as "Request: <type> by <userName>"
    pub async fn request_deletion_of_request(&self, request_id: &str) -> EngineResult<String> {
        let actor = self.current_user()?;
        let request = self.requests.get(&actor, request_id).await?;
        self.deletions.request_for_request(&actor, &request).await
    }

    pub async fn resolve_deletion(
        &self,
        deletion_id: &str,
        decision: ApprovalStatus,
    ) -> EngineResult<Resolution> {
        let actor = self.current_user()?;
        self.deletions.resolve(&actor, deletion_id, decision).await
    }

    /// Attendance and salary figures of `uid` (HR / Manager only)
    pub async fn payroll_summary(&self, uid: &str) -> EngineResult<FinancialSummary> {
        let actor = self.current_user()?;
        resolver::authorize_payroll(&actor)?;

        let timeout = self.config.store_timeout();
        let profile = timed(timeout, self.store.get_doc(&doc(collections::USERS, uid))).await?;
        if !profile.exists() {
            return Err(EngineError::not_found(collections::USERS, uid));
        }
        let employee: User = profile.decode()?;
        if !resolver::can_view_user(&actor, &employee) {
            return Err(Denial::OutOfScope.into());
        }

        let logs = timed(
            timeout,
            self.store
                .get_once(&collection(collections::ATTENDANCE).where_eq("userId", uid)),
        )
        .await?;
        let deductions = timed(
            timeout,
            self.store
                .get_once(&collection(collections::DEDUCTIONS).where_eq("userId", uid)),
        )
        .await?;

        let logs: Vec<AttendanceLog> = decode_all(&logs)?;
        let deductions: Vec<Deduction> = decode_all(&deductions)?;
        calculate_financials(&employee, &logs, &deductions, self.config.timezone)
    }
}

fn decode_all<T: Record>(snapshot: &QuerySnapshot) -> EngineResult<Vec<T>> {
    snapshot
        .docs
        .iter()
        .map(|d| d.decode::<T>().map_err(EngineError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn seed_users(store: &MemoryStore) {
        for (uid, name, role, department) in [
            ("hr1", "HR User", "HR", "HR"),
            ("mgr1", "Manager User", "Manager", "Management"),
            ("emp1", "Emp User", "Employee", "Engineering"),
            ("emp2", "Other Emp", "Employee", "Sales"),
        ] {
            store
                .seed(
                    "users",
                    uid,
                    &json!({
                        "uid": uid,
                        "name": name,
                        "role": role,
                        "department": department,
                        "status": "active",
                        "salary": 2500,
                    }),
                )
                .unwrap();
        }
    }

    fn create_test_workspace() -> (MemoryStore, Workspace) {
        let store = MemoryStore::with_clock(|| 1715670000);
        seed_users(&store);
        let workspace = Workspace::new(Arc::new(store.clone()), Config::default());
        (store, workspace)
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let (_store, ws) = create_test_workspace();
        assert_eq!(
            ws.submit_request(RequestDraft::new("Leave", "Vacation")).await,
            Err(EngineError::Unauthorized(Denial::NoSession))
        );
        assert!(matches!(ws.scope_view(), Err(EngineError::Unauthorized(Denial::NoSession))));
    }

    #[tokio::test]
    async fn test_identity_without_profile() {
        let (_store, ws) = create_test_workspace();
        assert!(ws.apply_identity(Some(AuthIdentity::new("ghost"))).await);
        assert_eq!(ws.session(), Session::ProfileMissing { uid: "ghost".into() });
        assert_eq!(
            ws.submit_request(RequestDraft::new("Leave", "Vacation")).await,
            Err(EngineError::Unauthorized(Denial::ProfileMissing))
        );
    }

    #[tokio::test]
    async fn test_employee_directory_is_department_scoped() {
        let (_store, ws) = create_test_workspace();
        assert!(ws.apply_identity(Some(AuthIdentity::new("emp1"))).await);
        assert_eq!(ws.current_user().unwrap().role, shared::models::Role::Employee);

        let mut rx = ws.subscribe_directory();
        let state = rx.wait_for(|s| s.loaded).await.unwrap().clone();
        let uids: Vec<_> = state.items.iter().map(|u| u.uid.as_str()).collect();
        assert_eq!(uids, vec!["emp1"]);

        let view = ws.scope_view().unwrap();
        assert!(view.capabilities.create_request);
        assert!(!view.capabilities.resolve_requests);
        assert!(!view.capabilities.view_payroll);
    }

    #[tokio::test]
    async fn test_sign_out_tears_down_views() {
        let (_store, ws) = create_test_workspace();
        ws.apply_identity(Some(AuthIdentity::new("mgr1"))).await;
        assert!(ws.requests().subscribe().borrow().generation > 0);

        ws.apply_identity(None).await;
        assert_eq!(ws.session(), Session::SignedOut);
        assert!(ws.directory().is_empty());
        assert!(ws.requests().requests().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_identity_is_discarded() {
        let (_store, ws) = create_test_workspace();
        let ws = Arc::new(ws);

        // 占住激活锁，让两次身份切换排队
        let guard = ws.activation.lock().await;
        let first = {
            let ws = Arc::clone(&ws);
            tokio::spawn(async move { ws.apply_identity(Some(AuthIdentity::new("emp1"))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let ws = Arc::clone(&ws);
            tokio::spawn(async move { ws.apply_identity(Some(AuthIdentity::new("mgr1"))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());
        assert_eq!(ws.current_user().unwrap().uid, "mgr1");
        assert_eq!(ws.session_generation(), 2);
    }

    #[tokio::test]
    async fn test_earlier_generation_loses_even_when_run_last() {
        let (_store, ws) = create_test_workspace();
        let older = ws.next_generation();
        let newer = ws.next_generation();

        // 新身份先完成，旧身份后到也不能覆盖
        assert!(ws.apply_identity_at(newer, Some(AuthIdentity::new("mgr1"))).await);
        assert!(!ws.apply_identity_at(older, Some(AuthIdentity::new("emp1"))).await);
        assert_eq!(ws.current_user().unwrap().uid, "mgr1");
        assert_eq!(ws.session_generation(), newer);
    }

    #[tokio::test]
    async fn test_payroll_summary() {
        let (store, ws) = create_test_workspace();
        store
            .seed(
                "attendance",
                "a1",
                &json!({ "userId": "emp1", "type": "in", "timestamp": { "seconds": 1715679000 } }),
            )
            .unwrap();
        store
            .seed("deductions", "d1", &json!({ "userId": "emp1", "amount": "100" }))
            .unwrap();
        store
            .seed("deductions", "d2", &json!({ "userId": "emp2", "amount": 999 }))
            .unwrap();

        ws.apply_identity(Some(AuthIdentity::new("hr1"))).await;
        let summary = ws.payroll_summary("emp1").await.unwrap();
        assert_eq!(summary.total_lateness, 30);
        assert_eq!(summary.total_deductions, rust_decimal::Decimal::from(100));
        assert_eq!(summary.net_salary, rust_decimal::Decimal::from(2395));

        assert_eq!(
            ws.payroll_summary("nobody").await,
            Err(EngineError::not_found("users", "nobody"))
        );

        ws.apply_identity(Some(AuthIdentity::new("emp1"))).await;
        assert!(matches!(
            ws.payroll_summary("emp1").await,
            Err(EngineError::Unauthorized(Denial::MissingPermission(_)))
        ));
    }
}
