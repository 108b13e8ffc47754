use std::sync::Arc;
use std::time::Duration;

use desk_core::scope::Denial;
use desk_core::store::LiveState;
use desk_core::{
    AuthIdentity, Config, EngineError, ManualIdentityProvider, MemoryStore, Session, Workspace,
};
use serde_json::json;
use shared::models::{ApprovalStatus, Request, RequestDraft};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const SETTLE: Duration = Duration::from_secs(2);

fn seed(store: &MemoryStore) {
    for (uid, name, role, department) in [
        ("hr1", "HR User", "HR", "HR"),
        ("mgr1", "Manager User", "Manager", "Management"),
        ("emp1", "Emp User", "Employee", "Engineering"),
        ("emp2", "Other Emp", "Employee", "Engineering"),
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
                    "status": "active"
                }),
            )
            .unwrap();
    }
    store
        .seed(
            "requests",
            "r1",
            &json!({
                "userId": "emp1",
                "userName": "Emp User",
                "type": "Leave",
                "reason": "Vacation",
                "status": "Pending",
                "timestamp": { "seconds": 1715670000 }
            }),
        )
        .unwrap();
}

fn setup() -> MemoryStore {
    let store = MemoryStore::with_clock(|| 1715670100);
    seed(&store);
    store
}

/// One client session on the shared store
async fn signed_in(store: &MemoryStore, uid: &str) -> Workspace {
    let config = Config {
        mark_retry_backoff_ms: 1,
        ..Config::default()
    };
    signed_in_with(store, uid, config).await
}

async fn signed_in_with(store: &MemoryStore, uid: &str, config: Config) -> Workspace {
    let ws = Workspace::new(Arc::new(store.clone()), config);
    assert!(ws.apply_identity(Some(AuthIdentity::new(uid))).await);
    assert!(ws.session().is_active(), "{uid} should be active");
    ws
}

async fn settle<T: Clone>(
    rx: &mut watch::Receiver<LiveState<T>>,
    done: impl FnMut(&LiveState<T>) -> bool,
) -> LiveState<T> {
    tokio::time::timeout(SETTLE, rx.wait_for(done))
        .await
        .expect("live view did not settle")
        .unwrap()
        .clone()
}

fn status_of(state: &LiveState<Request>, id: &str) -> Option<ApprovalStatus> {
    state.items.iter().find(|r| r.id == id).map(|r| r.status)
}

#[tokio::test]
async fn test_hr_petition_manager_approval() {
    let store = setup();
    let hr = signed_in(&store, "hr1").await;
    let manager = signed_in(&store, "mgr1").await;

    let deletion_id = hr.request_deletion_of_request("r1").await.unwrap();

    // 经理端实时看到待审批的删除申请
    let mut deletions = manager.deletions().subscribe();
    let state = settle(&mut deletions, |s| s.items.iter().any(|d| d.id == deletion_id)).await;
    let pending = &state.items[0];
    assert_eq!(
        pending.target_description,
        "HR User wants to delete Request: Leave by Emp User"
    );
    assert_eq!(pending.status, ApprovalStatus::Pending);
    assert_eq!(pending.requested_by.uid, "hr1");

    let resolution = manager
        .resolve_deletion(&deletion_id, ApprovalStatus::Approved)
        .await
        .unwrap();
    assert!(resolution.target_deleted);

    // 稳定后：目标消失且申请为 Approved，两端一致
    for ws in [&hr, &manager] {
        let mut requests = ws.requests().subscribe();
        settle(&mut requests, |s| s.loaded && status_of(s, "r1").is_none()).await;
        let mut deletions = ws.deletions().subscribe();
        let state = settle(&mut deletions, |s| {
            s.items
                .iter()
                .any(|d| d.id == deletion_id && d.status == ApprovalStatus::Approved)
        })
        .await;
        assert_eq!(state.items.len(), 1);
    }
    assert!(store.document("requests", "r1").is_none());
}

#[tokio::test]
async fn test_only_manager_resolves_deletions() {
    let store = setup();
    let hr = signed_in(&store, "hr1").await;
    let deletion_id = hr.request_deletion_of_request("r1").await.unwrap();

    let err = hr
        .resolve_deletion(&deletion_id, ApprovalStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(Denial::MissingPermission(_))));

    let employee = signed_in(&store, "emp1").await;
    let err = employee
        .resolve_deletion(&deletion_id, ApprovalStatus::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    assert!(store.document("requests", "r1").is_some());
    assert_eq!(
        store.document("deletion_requests", &deletion_id).unwrap()["status"],
        "Pending"
    );
    // 员工看不到别人提出的删除申请
    let mut deletions = employee.deletions().subscribe();
    let state = settle(&mut deletions, |s| s.loaded).await;
    assert!(state.items.is_empty());
}

#[tokio::test]
async fn test_employee_isolation() {
    let store = setup();
    let emp1 = signed_in(&store, "emp1").await;
    let emp2 = signed_in(&store, "emp2").await;

    let own = emp1
        .submit_request(RequestDraft::new("Sick", "Flu"))
        .await
        .unwrap();
    let other = emp2
        .submit_request(RequestDraft::new("Leave", "Wedding"))
        .await
        .unwrap();

    let mut requests = emp1.requests().subscribe();
    let state = settle(&mut requests, |s| status_of(s, &own.id).is_some()).await;
    assert!(state.items.iter().all(|r| r.user_id == "emp1"));
    assert_eq!(state.items.len(), 2);

    assert_eq!(
        emp1.get_request(&other.id).await,
        Err(EngineError::Unauthorized(Denial::OutOfScope))
    );
    assert!(matches!(
        emp1.set_request_status(&own.id, ApprovalStatus::Approved).await,
        Err(EngineError::Unauthorized(Denial::MissingPermission(_)))
    ));
    assert_eq!(
        store.document("requests", &own.id).unwrap()["status"],
        "Pending"
    );
}

#[tokio::test]
async fn test_status_is_monotone() {
    let store = setup();
    let hr = signed_in(&store, "hr1").await;
    let manager = signed_in(&store, "mgr1").await;

    // 记录 HR 端观察到的 r1 状态序列
    let mut rx = hr.requests().subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let status = status_of(&rx.borrow_and_update(), "r1");
            if let Some(status) = status
                && seen.last() != Some(&status)
            {
                seen.push(status);
            }
            if status == Some(ApprovalStatus::Approved) {
                return seen;
            }
            if rx.changed().await.is_err() {
                return seen;
            }
        }
    });

    manager
        .set_request_status("r1", ApprovalStatus::Approved)
        .await
        .unwrap();
    let err = hr
        .set_request_status("r1", ApprovalStatus::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    let err = manager
        .set_request_status("r1", ApprovalStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let seen = tokio::time::timeout(SETTLE, observer).await.unwrap().unwrap();
    assert_eq!(seen.last(), Some(&ApprovalStatus::Approved));
    assert!(seen.len() <= 2);
    assert_eq!(store.document("requests", "r1").unwrap()["status"], "Approved");
}

#[tokio::test]
async fn test_create_round_trip() {
    let store = setup();
    let employee = signed_in(&store, "emp1").await;

    let receipt = employee
        .submit_request(RequestDraft::new("Leave", "Family trip"))
        .await
        .unwrap();
    assert_eq!(receipt.status(), ApprovalStatus::Pending);

    let mut requests = employee.requests().subscribe();
    let state = settle(&mut requests, |s| status_of(s, &receipt.id).is_some()).await;
    // 最新的在最前
    let created = &state.items[0];
    assert_eq!(created.id, receipt.id);
    assert_eq!(created.user_id, "emp1");
    assert_eq!(created.user_name, "Emp User");
    assert_eq!(created.kind, "Leave");
    assert_eq!(created.reason, "Family trip");
    assert_eq!(created.timestamp.map(|t| t.seconds), Some(1715670100));

    let row = employee
        .request_rows()
        .into_iter()
        .find(|r| r.request.id == receipt.id)
        .unwrap();
    assert_eq!(row.department.as_deref(), Some("Engineering"));
}

#[tokio::test]
async fn test_auto_approved_never_seen_pending() {
    let store = setup();
    let manager = signed_in(&store, "mgr1").await;
    let hr = signed_in(&store, "hr1").await;

    let mut rx = manager.requests().subscribe();
    let watcher = tokio::spawn(async move {
        let mut observed = Vec::new();
        loop {
            {
                let state = rx.borrow_and_update();
                observed.extend(
                    state
                        .items
                        .iter()
                        .filter(|r| r.user_id == "hr1")
                        .map(|r| r.status),
                );
            }
            if !observed.is_empty() || rx.changed().await.is_err() {
                return observed;
            }
        }
    });

    let receipt = hr
        .submit_request(RequestDraft::new("Leave", "Conference"))
        .await
        .unwrap();
    assert_eq!(receipt.status(), ApprovalStatus::Approved);

    let observed = tokio::time::timeout(SETTLE, watcher).await.unwrap().unwrap();
    assert!(!observed.is_empty());
    assert!(observed.iter().all(|s| *s == ApprovalStatus::Approved));
}

/// 经理端记录 emp1 新申请（非 r1）的全部状态
fn watch_new_employee_requests(
    manager: &Workspace,
) -> tokio::task::JoinHandle<Vec<ApprovalStatus>> {
    let mut rx = manager.requests().subscribe();
    tokio::spawn(async move {
        let mut observed = Vec::new();
        loop {
            {
                let state = rx.borrow_and_update();
                observed.extend(
                    state
                        .items
                        .iter()
                        .filter(|r| r.user_id == "emp1" && r.id != "r1")
                        .map(|r| r.status),
                );
            }
            if !observed.is_empty() || rx.changed().await.is_err() {
                return observed;
            }
        }
    })
}

#[tokio::test]
async fn test_employee_reason_rule_auto_approves() {
    let store = setup();
    let manager = signed_in(&store, "mgr1").await;
    let config = Config {
        auto_approve_reasons: vec!["Auto approve test".into()],
        ..Config::default()
    };
    let employee = signed_in_with(&store, "emp1", config).await;

    let watcher = watch_new_employee_requests(&manager);

    let receipt = employee
        .submit_request(RequestDraft::new("Leave", "Auto approve test"))
        .await
        .unwrap();
    assert_eq!(receipt.status(), ApprovalStatus::Approved);

    let observed = tokio::time::timeout(SETTLE, watcher).await.unwrap().unwrap();
    assert!(!observed.is_empty());
    assert!(observed.iter().all(|s| *s == ApprovalStatus::Approved));
    assert_eq!(
        store.document("requests", &receipt.id).unwrap()["status"],
        "Approved"
    );
}

#[tokio::test]
async fn test_reason_rule_off_by_default() {
    let store = setup();
    let manager = signed_in(&store, "mgr1").await;
    let employee = signed_in_with(&store, "emp1", Config::default()).await;

    let watcher = watch_new_employee_requests(&manager);

    let receipt = employee
        .submit_request(RequestDraft::new("Leave", "Auto approve test"))
        .await
        .unwrap();
    assert_eq!(receipt.status(), ApprovalStatus::Pending);

    let observed = tokio::time::timeout(SETTLE, watcher).await.unwrap().unwrap();
    assert_eq!(observed, vec![ApprovalStatus::Pending]);
    assert_eq!(
        store.document("requests", &receipt.id).unwrap()["status"],
        "Pending"
    );
}

#[tokio::test]
async fn test_workspace_follows_identity_provider() {
    let store = setup();
    let workspace = Arc::new(Workspace::new(Arc::new(store.clone()), Config::default()));
    let provider = ManualIdentityProvider::new();
    let shutdown = CancellationToken::new();
    let handle = workspace.spawn(&provider, shutdown.clone());

    let mut session = workspace.subscribe_session();

    provider.sign_in(AuthIdentity::new("emp1"));
    tokio::time::timeout(SETTLE, session.wait_for(|s| s.uid() == Some("emp1") && s.is_active()))
        .await
        .unwrap()
        .unwrap();
    assert!(workspace.scope_view().unwrap().capabilities.create_request);

    provider.sign_in(AuthIdentity::new("mgr1"));
    tokio::time::timeout(SETTLE, session.wait_for(|s| s.uid() == Some("mgr1") && s.is_active()))
        .await
        .unwrap()
        .unwrap();
    let mut deletions = workspace.deletions().subscribe();
    settle(&mut deletions, |s| s.loaded).await;
    assert!(workspace.scope_view().unwrap().capabilities.resolve_deletions);

    provider.sign_in(AuthIdentity::new("nobody"));
    tokio::time::timeout(SETTLE, session.wait_for(|s| matches!(s, Session::ProfileMissing { .. })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        workspace.submit_request(RequestDraft::new("Leave", "x")).await,
        Err(EngineError::Unauthorized(Denial::ProfileMissing))
    );

    shutdown.cancel();
    handle.await.unwrap();
    assert_eq!(workspace.session(), Session::SignedOut);

    // 监听任务异步退出
    tokio::time::timeout(SETTLE, async {
        while store.listener_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listeners were not released");
}

#[tokio::test]
async fn test_failed_write_leaves_views_untouched() {
    let store = setup();
    let employee = signed_in(&store, "emp1").await;
    let mut requests = employee.requests().subscribe();
    let before = settle(&mut requests, |s| s.loaded).await;

    store.set_available(false);
    let err = employee
        .submit_request(RequestDraft::new("Leave", "Vacation"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    store.set_available(true);

    assert_eq!(employee.requests().requests(), before.items);
}
