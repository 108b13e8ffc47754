//! Permission Definitions
//!
//! Table-driven RBAC for the approval workflows.
//!
//! ## 设计原则
//! - 角色 → 权限：固定表，不在运行时修改
//! - 删除申请：每个 (角色, 集合) 单独授权，没有角色可以直接删除记录
//! - 停用账号没有任何写权限（由 resolver 统一判断）

use shared::models::{Role, collections};

// === 申请 (requests) ===
pub const REQUESTS_CREATE: &str = "requests:create"; // 为自己提交申请
pub const REQUESTS_VIEW_ALL: &str = "requests:view_all"; // 查看所有申请
pub const REQUESTS_RESOLVE: &str = "requests:resolve"; // 批准/驳回申请

// === 人员目录 ===
pub const USERS_VIEW_ALL: &str = "users:view_all"; // 查看全部门员工

// === 删除申请 ===
pub const DELETIONS_PETITION: &str = "deletions:petition"; // 提交删除申请
pub const DELETIONS_VIEW_ALL: &str = "deletions:view_all"; // 查看所有删除申请
pub const DELETIONS_RESOLVE: &str = "deletions:resolve"; // 审批删除申请（执行删除）

// === 考勤/薪资 ===
pub const PAYROLL_VIEW: &str = "payroll:view"; // 查看他人考勤与薪资

/// 全部权限
pub const ALL_PERMISSIONS: &[&str] = &[
    REQUESTS_CREATE,
    REQUESTS_VIEW_ALL,
    REQUESTS_RESOLVE,
    USERS_VIEW_ALL,
    DELETIONS_PETITION,
    DELETIONS_VIEW_ALL,
    DELETIONS_RESOLVE,
    PAYROLL_VIEW,
];

/// 员工：只能提交自己的申请，对可见记录提出删除申请
pub const EMPLOYEE_PERMISSIONS: &[&str] = &[REQUESTS_CREATE, DELETIONS_PETITION];

/// 经理：全部可见，审批申请，唯一可以审批删除申请的角色
pub const MANAGER_PERMISSIONS: &[&str] = &[
    REQUESTS_CREATE,
    REQUESTS_VIEW_ALL,
    REQUESTS_RESOLVE,
    USERS_VIEW_ALL,
    DELETIONS_PETITION,
    DELETIONS_VIEW_ALL,
    DELETIONS_RESOLVE,
    PAYROLL_VIEW,
];

/// HR：全部可见，审批申请，可以提出删除申请但不能审批
pub const HR_PERMISSIONS: &[&str] = &[
    REQUESTS_CREATE,
    REQUESTS_VIEW_ALL,
    REQUESTS_RESOLVE,
    USERS_VIEW_ALL,
    DELETIONS_PETITION,
    PAYROLL_VIEW,
];

/// 可被申请删除的集合及允许提出申请的角色
///
/// `users` 与 `deletion_requests` 不在表中：人员不由本系统删除，删除申请本身只会被标记。
pub const DELETION_PETITION_RULES: &[(&str, &[Role])] = &[
    (collections::REQUESTS, &[Role::Employee, Role::Manager, Role::Hr]),
    (collections::ATTENDANCE, &[Role::Manager, Role::Hr]),
    (collections::DEDUCTIONS, &[Role::Manager, Role::Hr]),
];

/// Permissions granted to a role
pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::Employee => EMPLOYEE_PERMISSIONS,
        Role::Manager => MANAGER_PERMISSIONS,
        Role::Hr => HR_PERMISSIONS,
    }
}

pub fn role_has_permission(role: Role, permission: &str) -> bool {
    permissions_for(role).contains(&permission)
}

/// Whether `role` may petition deletion of records in `collection`
pub fn may_petition_deletion(role: Role, collection: &str) -> bool {
    DELETION_PETITION_RULES
        .iter()
        .any(|(name, roles)| *name == collection && roles.contains(&role))
}

/// Validate if a permission string is known
pub fn is_valid_permission(permission: &str) -> bool {
    ALL_PERMISSIONS.contains(&permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tables_only_use_known_permissions() {
        for role in Role::ALL {
            for perm in permissions_for(role) {
                assert!(is_valid_permission(perm), "{role}: {perm}");
            }
        }
    }

    #[test]
    fn test_only_manager_resolves_deletions() {
        assert!(role_has_permission(Role::Manager, DELETIONS_RESOLVE));
        assert!(!role_has_permission(Role::Hr, DELETIONS_RESOLVE));
        assert!(!role_has_permission(Role::Employee, DELETIONS_RESOLVE));
    }

    #[test]
    fn test_employee_cannot_resolve_requests() {
        assert!(role_has_permission(Role::Employee, REQUESTS_CREATE));
        assert!(!role_has_permission(Role::Employee, REQUESTS_RESOLVE));
        assert!(role_has_permission(Role::Hr, REQUESTS_RESOLVE));
    }

    #[test]
    fn test_petition_table() {
        assert!(may_petition_deletion(Role::Hr, collections::REQUESTS));
        assert!(may_petition_deletion(Role::Employee, collections::REQUESTS));
        assert!(!may_petition_deletion(Role::Employee, collections::ATTENDANCE));
        for role in Role::ALL {
            assert!(!may_petition_deletion(role, collections::USERS));
            assert!(!may_petition_deletion(role, collections::DELETION_REQUESTS));
        }
    }
}
