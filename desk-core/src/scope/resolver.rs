//! Scope resolver
//!
//! Pure functions over the acting user and collection snapshots. Reading scope
//! follows the role; write rights additionally require an active account.

use std::fmt;

use serde::Serialize;
use shared::models::{DeletionRequest, Request, Role, User, collections};

use super::permissions::{
    DELETIONS_PETITION, DELETIONS_RESOLVE, DELETIONS_VIEW_ALL, PAYROLL_VIEW, REQUESTS_CREATE,
    REQUESTS_RESOLVE, REQUESTS_VIEW_ALL, USERS_VIEW_ALL, may_petition_deletion,
    role_has_permission,
};

/// Why an actor may not perform an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No signed-in identity
    NoSession,
    /// Signed in, but the identity has no profile document
    ProfileMissing,
    /// Account is inactive
    Inactive,
    MissingPermission(&'static str),
    /// Record exists but is outside the actor's scope
    OutOfScope,
    /// The role may not petition deletion in this collection
    NotPetitionable { role: Role, collection: String },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::NoSession => f.write_str("not signed in"),
            Denial::ProfileMissing => f.write_str("no user profile for the signed-in identity"),
            Denial::Inactive => f.write_str("account is inactive"),
            Denial::MissingPermission(p) => write!(f, "missing permission {p}"),
            Denial::OutOfScope => f.write_str("record is outside the actor's scope"),
            Denial::NotPetitionable { role, collection } => {
                write!(f, "{role} may not request deletion in {collection}")
            }
        }
    }
}

/// Actions the UI may offer to the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub create_request: bool,
    pub resolve_requests: bool,
    pub petition_deletion: bool,
    pub resolve_deletions: bool,
    pub view_payroll: bool,
}

/// Everything the actor may see, plus the actions they may take
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeView {
    pub users: Vec<User>,
    pub requests: Vec<Request>,
    pub deletion_requests: Vec<DeletionRequest>,
    pub capabilities: Capabilities,
}

// ========== Write rights ==========

/// Permission check for writes: active account plus a role grant
pub fn authorize(actor: &User, permission: &'static str) -> Result<(), Denial> {
    if !actor.is_active() {
        return Err(Denial::Inactive);
    }
    if !role_has_permission(actor.role, permission) {
        return Err(Denial::MissingPermission(permission));
    }
    Ok(())
}

pub fn can(actor: &User, permission: &'static str) -> bool {
    authorize(actor, permission).is_ok()
}

pub fn capabilities(actor: &User) -> Capabilities {
    Capabilities {
        create_request: can(actor, REQUESTS_CREATE),
        resolve_requests: can(actor, REQUESTS_RESOLVE),
        petition_deletion: can(actor, DELETIONS_PETITION),
        resolve_deletions: can(actor, DELETIONS_RESOLVE),
        view_payroll: role_has_permission(actor.role, PAYROLL_VIEW),
    }
}

/// Approve / reject a request
pub fn authorize_transition(actor: &User, request: &Request) -> Result<(), Denial> {
    authorize(actor, REQUESTS_RESOLVE)?;
    if !can_view_request(actor, request) {
        return Err(Denial::OutOfScope);
    }
    Ok(())
}

/// Role-level petition check, independent of the target record
pub fn authorize_petition_collection(actor: &User, collection: &str) -> Result<(), Denial> {
    authorize(actor, DELETIONS_PETITION)?;
    if !may_petition_deletion(actor.role, collection) {
        return Err(Denial::NotPetitionable {
            role: actor.role,
            collection: collection.to_string(),
        });
    }
    Ok(())
}

/// Petition deletion of a record owned by `owner_uid` in `collection`
pub fn authorize_petition(
    actor: &User,
    collection: &str,
    owner_uid: Option<&str>,
) -> Result<(), Denial> {
    authorize_petition_collection(actor, collection)?;
    if !can_view_record(actor, collection, owner_uid) {
        return Err(Denial::OutOfScope);
    }
    Ok(())
}

pub fn authorize_deletion_resolve(actor: &User) -> Result<(), Denial> {
    authorize(actor, DELETIONS_RESOLVE)
}

/// Read access to another user's attendance and payroll figures
pub fn authorize_payroll(actor: &User) -> Result<(), Denial> {
    if role_has_permission(actor.role, PAYROLL_VIEW) {
        Ok(())
    } else {
        Err(Denial::MissingPermission(PAYROLL_VIEW))
    }
}

// ========== Visibility ==========

pub fn can_view_request(actor: &User, request: &Request) -> bool {
    role_has_permission(actor.role, REQUESTS_VIEW_ALL) || request.user_id == actor.uid
}

pub fn can_view_deletion_request(actor: &User, deletion: &DeletionRequest) -> bool {
    role_has_permission(actor.role, DELETIONS_VIEW_ALL) || deletion.requested_by.uid == actor.uid
}

/// Employees see their own department; an empty department shows only self
pub fn can_view_user(actor: &User, user: &User) -> bool {
    role_has_permission(actor.role, USERS_VIEW_ALL)
        || user.uid == actor.uid
        || (!actor.department.is_empty() && user.department == actor.department)
}

/// Visibility of a record by collection and owning user id
pub fn can_view_record(actor: &User, collection: &str, owner_uid: Option<&str>) -> bool {
    let view_all = match collection {
        collections::REQUESTS => REQUESTS_VIEW_ALL,
        collections::DELETION_REQUESTS => DELETIONS_VIEW_ALL,
        collections::ATTENDANCE | collections::DEDUCTIONS => PAYROLL_VIEW,
        collections::USERS => USERS_VIEW_ALL,
        _ => return false,
    };
    role_has_permission(actor.role, view_all) || owner_uid == Some(actor.uid.as_str())
}

pub fn visible_requests(actor: &User, requests: Vec<Request>) -> Vec<Request> {
    requests
        .into_iter()
        .filter(|r| can_view_request(actor, r))
        .collect()
}

pub fn visible_users(actor: &User, users: Vec<User>) -> Vec<User> {
    users.into_iter().filter(|u| can_view_user(actor, u)).collect()
}

pub fn visible_deletion_requests(
    actor: &User,
    deletions: Vec<DeletionRequest>,
) -> Vec<DeletionRequest> {
    deletions
        .into_iter()
        .filter(|d| can_view_deletion_request(actor, d))
        .collect()
}

/// Subset of each collection the actor may display, plus capabilities
pub fn resolve_scope(
    actor: &User,
    users: &[User],
    requests: &[Request],
    deletions: &[DeletionRequest],
) -> ScopeView {
    ScopeView {
        users: visible_users(actor, users.to_vec()),
        requests: visible_requests(actor, requests.to_vec()),
        deletion_requests: visible_deletion_requests(actor, deletions.to_vec()),
        capabilities: capabilities(actor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ActorRef, ApprovalStatus, UserStatus};

    fn user(uid: &str, role: Role, department: &str) -> User {
        User {
            uid: uid.into(),
            name: format!("{uid} name"),
            department: department.into(),
            role,
            status: UserStatus::Active,
            salary: None,
            shift_start: None,
        }
    }

    fn request(id: &str, user_id: &str) -> Request {
        Request {
            id: id.into(),
            user_id: user_id.into(),
            user_name: user_id.into(),
            department: None,
            kind: "Leave".into(),
            reason: "Vacation".into(),
            status: ApprovalStatus::Pending,
            timestamp: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    fn deletion(id: &str, by: &str) -> DeletionRequest {
        DeletionRequest {
            id: id.into(),
            target_collection: "requests".into(),
            target_id: "r1".into(),
            requested_by: ActorRef {
                uid: by.into(),
                name: by.into(),
            },
            target_description: "x".into(),
            status: ApprovalStatus::Pending,
            timestamp: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    #[test]
    fn test_employee_sees_only_own_requests() {
        let emp = user("emp1", Role::Employee, "Engineering");
        let all = vec![request("r1", "emp1"), request("r2", "emp2")];
        let visible = visible_requests(&emp, all.clone());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "r1");

        for role in [Role::Hr, Role::Manager] {
            assert_eq!(visible_requests(&user("x", role, "HR"), all.clone()).len(), 2);
        }
    }

    #[test]
    fn test_directory_by_department() {
        let emp = user("emp1", Role::Employee, "Engineering");
        let users = vec![
            emp.clone(),
            user("emp2", Role::Employee, "Engineering"),
            user("emp3", Role::Employee, "Sales"),
        ];
        let visible: Vec<_> = visible_users(&emp, users.clone())
            .into_iter()
            .map(|u| u.uid)
            .collect();
        assert_eq!(visible, vec!["emp1", "emp2"]);
        assert_eq!(visible_users(&user("hr", Role::Hr, "HR"), users).len(), 3);
    }

    #[test]
    fn test_empty_department_sees_only_self() {
        let loner = user("emp1", Role::Employee, "");
        let users = vec![loner.clone(), user("emp2", Role::Employee, "")];
        assert_eq!(visible_users(&loner, users).len(), 1);
    }

    #[test]
    fn test_deletion_requests_visible_to_manager_or_requester() {
        let all = vec![deletion("d1", "hr1"), deletion("d2", "emp1")];
        assert_eq!(visible_deletion_requests(&user("m", Role::Manager, ""), all.clone()).len(), 2);
        let hr_view = visible_deletion_requests(&user("hr1", Role::Hr, ""), all);
        assert_eq!(hr_view.len(), 1);
        assert_eq!(hr_view[0].id, "d1");
    }

    #[test]
    fn test_transition_rights() {
        let req = request("r1", "emp1");
        assert_eq!(
            authorize_transition(&user("emp1", Role::Employee, ""), &req),
            Err(Denial::MissingPermission(REQUESTS_RESOLVE))
        );
        assert!(authorize_transition(&user("hr", Role::Hr, ""), &req).is_ok());

        let mut inactive = user("mgr", Role::Manager, "");
        inactive.status = UserStatus::Inactive;
        assert_eq!(authorize_transition(&inactive, &req), Err(Denial::Inactive));
    }

    #[test]
    fn test_petition_rights() {
        let emp = user("emp1", Role::Employee, "");
        assert!(authorize_petition(&emp, "requests", Some("emp1")).is_ok());
        assert_eq!(
            authorize_petition(&emp, "requests", Some("emp2")),
            Err(Denial::OutOfScope)
        );
        assert!(matches!(
            authorize_petition(&emp, "attendance", Some("emp1")),
            Err(Denial::NotPetitionable { .. })
        ));
        assert!(matches!(
            authorize_petition(&user("hr", Role::Hr, ""), "users", None),
            Err(Denial::NotPetitionable { .. })
        ));
    }

    #[test]
    fn test_capabilities_by_role() {
        let manager = capabilities(&user("m", Role::Manager, ""));
        assert!(manager.resolve_deletions && manager.resolve_requests);

        let hr = capabilities(&user("h", Role::Hr, ""));
        assert!(hr.resolve_requests && hr.petition_deletion);
        assert!(!hr.resolve_deletions);

        let mut emp = user("e", Role::Employee, "");
        assert!(capabilities(&emp).create_request);
        emp.status = UserStatus::Inactive;
        assert_eq!(capabilities(&emp), Capabilities::default());
    }

    #[test]
    fn test_resolve_scope_combines_views() {
        let emp = user("emp1", Role::Employee, "Engineering");
        let view = resolve_scope(
            &emp,
            &[emp.clone(), user("emp3", Role::Employee, "Sales")],
            &[request("r1", "emp1"), request("r2", "emp3")],
            &[deletion("d1", "emp1"), deletion("d2", "hr1")],
        );
        assert_eq!(view.users.len(), 1);
        assert_eq!(view.requests.len(), 1);
        assert_eq!(view.deletion_requests.len(), 1);
        assert!(!view.capabilities.resolve_requests);
    }
}
