// Access context — namespaced authorization and routing
//
//! An access context is a named namespace that binds groups to roles
//! (authorization) and groups to a reporting hierarchy (routing). The same
//! group can carry different roles — and sit at different points in the
//! hierarchy — in two different contexts, which is how one engine instance
//! supports e.g. distinct approval chains per business unit.

use serde::{Deserialize, Serialize};

use super::ids::{AccessContextId, GroupId, RoleId};

/// A namespace binding groups to roles and to a reporting hierarchy.
/// Inactive contexts still answer permission queries (§4.1) — `active` is
/// informational at this layer; it is `Workflow.active` that gates whether
/// events are accepted at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessContext {
    pub id: AccessContextId,
    pub name: String,
    pub active: bool,
}

/// One `(group, role)` assignment within a context (`ac_group_roles`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupRole {
    pub ac_id: AccessContextId,
    pub group_id: GroupId,
    pub role_id: RoleId,
}

/// One group's place in a context's reporting hierarchy
/// (`ac_group_hierarchy`). `reports_to = None` means the group is a root
/// within this context. A group appears at most once in the hierarchy of a
/// given context, and `reports_to` (when present) must resolve to a group
/// in the same context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupHierarchyEntry {
    pub ac_id: AccessContextId,
    pub group_id: GroupId,
    pub reports_to: Option<GroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_group_has_no_reports_to() {
        let entry = GroupHierarchyEntry {
            ac_id: AccessContextId(1),
            group_id: GroupId(1),
            reports_to: None,
        };
        assert!(entry.reports_to.is_none());
    }
}
