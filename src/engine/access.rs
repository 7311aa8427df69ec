// Access context operations
//
//! Authorization (`HasPermission`) and hierarchy (`ReportsTo`/`Reportees`)
//! queries over an access context, plus the maintenance operations that
//! shape it (spec §4.1). All of this is a thin, validating layer over
//! `Store` — the actual union-of-roles-across-groups computation is the
//! store's `effective_permission`, which each backend is free to implement
//! as a join (`PgStore`) or a direct set computation (`MemoryStore`).

use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

fn require_positive(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(EngineError::NonPositiveId(id));
    }
    Ok(())
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }
    Ok(())
}

pub async fn create_access_context<S: Store>(store: &S, name: &str) -> Result<AccessContext> {
    require_name(name)?;
    store.create_access_context(None, name).await
}

/// `HasPermission(ctx, user, doctype, action) → bool`.
pub async fn has_permission<S: Store>(
    store: &S,
    ac_id: AccessContextId,
    user_id: UserId,
    doctype_id: DocTypeId,
    docaction_id: DocActionId,
) -> Result<bool> {
    store.effective_permission(None, ac_id, user_id, doctype_id, docaction_id).await
}

pub async fn groups<S: Store>(store: &S, ac_id: AccessContextId) -> Result<Vec<GroupId>> {
    store.groups_in_context(None, ac_id).await
}

pub async fn group_roles<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<RoleId>> {
    store.group_roles(None, ac_id, group_id).await
}

pub async fn reports_to<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId) -> Result<Option<GroupId>> {
    store.reports_to(None, ac_id, group_id).await
}

pub async fn reportees<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<GroupId>> {
    store.reportees(None, ac_id, group_id).await
}

pub async fn add_group_role<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
    require_positive(group_id.get())?;
    require_positive(role_id.get())?;
    store.add_group_role(None, ac_id, group_id, role_id).await
}

pub async fn remove_group_role<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
    store.remove_group_role(None, ac_id, group_id, role_id).await
}

/// `AddGroup(ctx, group, reportsTo)`: admits a group into a context's
/// hierarchy. `reports_to = None` makes the group a root within `ctx`.
pub async fn add_group<S: Store>(
    store: &S,
    ac_id: AccessContextId,
    group_id: GroupId,
    reports_to: Option<GroupId>,
) -> Result<()> {
    if store.get_group(None, group_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("group {group_id}")));
    }
    store.add_group_to_hierarchy(None, ac_id, group_id, reports_to).await
}

pub async fn delete_group<S: Store>(store: &S, ac_id: AccessContextId, group_id: GroupId) -> Result<()> {
    store.delete_group_from_hierarchy(None, ac_id, group_id).await
}

pub async fn change_reporting<S: Store>(
    store: &S,
    ac_id: AccessContextId,
    group_id: GroupId,
    reports_to: Option<GroupId>,
) -> Result<()> {
    store.change_reporting(None, ac_id, group_id, reports_to).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    async fn seed_user(store: &MemoryStore) -> (UserId, GroupId) {
        let user = User { id: UserId(0), first_name: "Ada".into(), last_name: "Lovelace".into(), email: "ada@example.com".into(), active: true };
        let (user, group_id) = store.create_user(None, user).await.unwrap();
        (user.id, group_id)
    }

    #[tokio::test]
    async fn permission_follows_from_a_granted_role() {
        let store = MemoryStore::new();
        let (user_id, group_id) = seed_user(&store).await;
        let ac = create_access_context(&store, "C1").await.unwrap();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let action = store.create_docaction(None, "approve").await.unwrap();
        let role = store.create_role(None, "approver").await.unwrap();
        store.add_role_permission(None, role.id, doctype.id, action.id).await.unwrap();

        assert!(!has_permission(&store, ac.id, user_id, doctype.id, action.id).await.unwrap());
        add_group_role(&store, ac.id, group_id, role.id).await.unwrap();
        assert!(has_permission(&store, ac.id, user_id, doctype.id, action.id).await.unwrap());
    }

    #[tokio::test]
    async fn reportees_reflect_change_reporting() {
        let store = MemoryStore::new();
        let ac = create_access_context(&store, "C2").await.unwrap();
        let manager = store.create_group(None, "managers", GroupType::General).await.unwrap();
        let report = store.create_group(None, "reports", GroupType::General).await.unwrap();
        add_group(&store, ac.id, manager.id, None).await.unwrap();
        add_group(&store, ac.id, report.id, Some(manager.id)).await.unwrap();

        assert_eq!(reportees(&store, ac.id, manager.id).await.unwrap(), vec![report.id]);
        assert_eq!(reports_to(&store, ac.id, report.id).await.unwrap(), Some(manager.id));
    }
}
