use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use desk_core::{
    AuthIdentity, Config, ManualIdentityProvider, MemoryStore, Session, Workspace, cleanup_old_logs,
    init_logger_with_file, print_banner,
};
use serde_json::json;
use shared::models::{ApprovalStatus, RequestDraft, User};
use tokio_util::sync::CancellationToken;

const SESSION_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境与日志
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        config.log_dir.as_deref(),
    );
    if let Some(dir) = &config.log_dir {
        match cleanup_old_logs(dir, config.log_retention_days) {
            Ok(removed) if removed > 0 => tracing::info!(removed, "Old log files removed"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Log cleanup failed"),
        }
    }

    print_banner();
    tracing::info!("StaffDesk demo starting...");

    // 2. 演示数据
    let store = MemoryStore::new();
    seed_demo_data(&store)?;

    // 3. 工作区跟随身份变化
    let workspace = Arc::new(Workspace::new(Arc::new(store.clone()), config.clone()));
    let provider = ManualIdentityProvider::from_config(&config);
    let shutdown = CancellationToken::new();
    let handle = workspace.spawn(&provider, shutdown.clone());

    let result = run_scenario(&workspace, &provider).await;

    shutdown.cancel();
    handle.await.context("workspace task panicked")?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "Demo scenario failed");
    }
    result
}

async fn run_scenario(workspace: &Workspace, provider: &ManualIdentityProvider) -> anyhow::Result<()> {
    // HR 提出删除申请
    let hr = sign_in_as(workspace, provider, "hr1").await?;
    let deletion_id = workspace.request_deletion_of_request("r1").await?;
    tracing::info!(actor = %hr.name, %deletion_id, "Deletion requested");

    // HR 提交的申请按策略自动批准
    let receipt = workspace
        .submit_request(RequestDraft::new("Leave", "Auto approve test"))
        .await?;
    tracing::info!(request_id = %receipt.id, status = %receipt.status(), "HR request submitted");

    // 经理审批删除
    let manager = sign_in_as(workspace, provider, "mgr1").await?;
    let mut deletions = workspace.deletions().subscribe();
    deletions
        .wait_for(|s| s.items.iter().any(|d| d.id == deletion_id))
        .await?;
    for pending in workspace.pending_deletions() {
        tracing::info!(id = %pending.id, description = %pending.target_description, "Pending deletion");
    }

    let resolution = workspace
        .resolve_deletion(&deletion_id, ApprovalStatus::Approved)
        .await?;
    tracing::info!(
        actor = %manager.name,
        status = %resolution.status,
        target_deleted = resolution.target_deleted,
        "Deletion resolved"
    );

    let mut requests = workspace.requests().subscribe();
    requests
        .wait_for(|s| s.loaded && s.items.iter().all(|r| r.id != "r1"))
        .await?;

    // 员工提交，经理批准
    sign_in_as(workspace, provider, "emp1").await?;
    let receipt = workspace
        .submit_request(RequestDraft::new("Sick", "Flu"))
        .await?;
    tracing::info!(request_id = %receipt.id, status = %receipt.status(), "Employee request submitted");

    sign_in_as(workspace, provider, "mgr1").await?;
    workspace
        .set_request_status(&receipt.id, ApprovalStatus::Approved)
        .await?;

    for row in workspace.request_rows() {
        tracing::info!(
            id = %row.request.id,
            user = %row.request.user_name,
            department = row.department.as_deref().unwrap_or("-"),
            kind = %row.request.kind,
            status = %row.request.status,
            "Request"
        );
    }

    let summary = workspace.payroll_summary("emp1").await?;
    tracing::info!(
        lateness_minutes = summary.total_lateness,
        deductions = %summary.total_deductions,
        late_cost = %summary.late_cost,
        net_salary = %summary.net_salary,
        "Payroll summary for emp1"
    );

    provider.sign_out();
    Ok(())
}

/// Switch identity and wait for the workspace to activate it
async fn sign_in_as(
    workspace: &Workspace,
    provider: &ManualIdentityProvider,
    uid: &str,
) -> anyhow::Result<User> {
    provider.sign_in(AuthIdentity::new(uid));
    let mut rx = workspace.subscribe_session();
    let session = tokio::time::timeout(
        SESSION_WAIT,
        rx.wait_for(|s| s.uid() == Some(uid) && !matches!(s, Session::Resolving { .. })),
    )
    .await
    .with_context(|| format!("timed out resolving session for {uid}"))??
    .clone();

    match session {
        Session::Active(user) => Ok(user),
        other => bail!("session for {uid} did not become active: {other:?}"),
    }
}

fn seed_demo_data(store: &MemoryStore) -> anyhow::Result<()> {
    let users = [
        ("hr1", "HR User", "HR", "HR"),
        ("hr_user", "HR Manager", "HR", "HR"),
        ("mgr1", "Manager User", "Manager", "Management"),
        ("emp1", "Emp User", "Employee", "Engineering"),
    ];
    for (uid, name, role, department) in users {
        store.seed(
            "users",
            uid,
            &json!({
                "uid": uid,
                "name": name,
                "role": role,
                "department": department,
                "status": "active",
                "salary": 2500,
                "shiftStart": "09:00"
            }),
        )?;
    }

    store.seed(
        "requests",
        "r1",
        &json!({
            "userId": "emp1",
            "userName": "Emp User",
            "department": "Engineering",
            "type": "Leave",
            "reason": "Vacation",
            "status": "Pending",
            "timestamp": { "seconds": 1715670000 }
        }),
    )?;

    store.seed(
        "attendance",
        "a1",
        &json!({ "userId": "emp1", "type": "in", "timestamp": { "seconds": 1715679000 } }),
    )?;
    store.seed(
        "deductions",
        "d1",
        &json!({ "userId": "emp1", "amount": "50", "note": "Uniform" }),
    )?;
    Ok(())
}
