// Postgres Store backend
//
//! Maps every `Store` operation onto the logical tables described in
//! SPEC_FULL §6.1. Every method accepts `Option<&mut Transaction>` per the
//! transaction-parameter-polymorphism contract (spec §5, §9 redesign
//! flags): `None` means "open your own transaction, commit on success,
//! rollback on error"; `Some(tx)` means "run inside the caller's already
//! open transaction and let them decide when to commit."
//!
//! `sqlx::PgExecutor` would let single-statement queries take either a
//! `&PgPool` or a `&mut PgConnection` directly, but the `Store` trait's
//! transaction type is shared across every method, so the dispatch happens
//! once per method via the small `exec!` macro below rather than by
//! threading a generic executor parameter through every call site.

use std::collections::BTreeSet;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::models::*;
use crate::{EngineError, Result};

use super::store::Store;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Run `$body`, which must reference `$exec` as the query executor,
    /// against either the caller's open transaction or a freshly begun one
    /// that this helper commits/rolls back itself.
    async fn run<'a, F, Fut, T>(&'a self, tx: Option<&mut Transaction<'static, Postgres>>, f: F) -> Result<T>
    where
        F: for<'e> FnOnce(&'e mut Transaction<'static, Postgres>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match tx {
            Some(t) => f(t).await,
            None => {
                let mut owned = self.pool.begin().await?;
                match f(&mut owned).await {
                    Ok(v) => {
                        owned.commit().await?;
                        Ok(v)
                    }
                    Err(e) => {
                        owned.rollback().await?;
                        Err(e)
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }

    // ---- Taxonomy ----

    async fn create_doctype(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<DocType> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, DocType>(
                "INSERT INTO doctypes_master (name) VALUES ($1) RETURNING id, name",
            )
            .bind(name)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "doctype"))
        })
        .await
    }

    async fn get_doctype(&self, tx: Option<&mut Self::Tx>, id: DocTypeId) -> Result<Option<DocType>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocType>("SELECT id, name FROM doctypes_master WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **t)
                .await?)
        })
        .await
    }

    async fn get_doctype_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocType>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocType>("SELECT id, name FROM doctypes_master WHERE name = $1")
                .bind(name)
                .fetch_optional(&mut **t)
                .await?)
        })
        .await
    }

    async fn list_doctypes(&self, tx: Option<&mut Self::Tx>) -> Result<Vec<DocType>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocType>("SELECT id, name FROM doctypes_master ORDER BY id")
                .fetch_all(&mut **t)
                .await?)
        })
        .await
    }

    async fn create_docstate(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, name: &str) -> Result<DocState> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, DocState>(
                "INSERT INTO docstates_master (doctype_id, name) VALUES ($1, $2) RETURNING id, doctype_id, name",
            )
            .bind(doctype_id)
            .bind(name)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "docstate"))
        })
        .await
    }

    async fn get_docstate(&self, tx: Option<&mut Self::Tx>, id: DocStateId) -> Result<Option<DocState>> {
        self.run(tx, |t| async move {
            Ok(
                sqlx::query_as::<_, DocState>("SELECT id, doctype_id, name FROM docstates_master WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **t)
                    .await?,
            )
        })
        .await
    }

    async fn list_docstates(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<DocState>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocState>(
                "SELECT id, doctype_id, name FROM docstates_master WHERE doctype_id = $1 ORDER BY id",
            )
            .bind(doctype_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn create_docaction(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<DocAction> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, DocAction>("INSERT INTO docactions_master (name) VALUES ($1) RETURNING id, name")
                .bind(name)
                .fetch_one(&mut **t)
                .await
                .map_err(|e| conflict_or(e, "docaction"))
        })
        .await
    }

    async fn get_docaction(&self, tx: Option<&mut Self::Tx>, id: DocActionId) -> Result<Option<DocAction>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocAction>("SELECT id, name FROM docactions_master WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **t)
                .await?)
        })
        .await
    }

    async fn get_docaction_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocAction>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocAction>("SELECT id, name FROM docactions_master WHERE name = $1")
                .bind(name)
                .fetch_optional(&mut **t)
                .await?)
        })
        .await
    }

    async fn create_role(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Role> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, Role>("INSERT INTO roles_master (name) VALUES ($1) RETURNING id, name")
                .bind(name)
                .fetch_one(&mut **t)
                .await
                .map_err(|e| conflict_or(e, "role"))
        })
        .await
    }

    async fn get_role(&self, tx: Option<&mut Self::Tx>, id: RoleId) -> Result<Option<Role>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Role>("SELECT id, name FROM roles_master WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **t)
                .await?)
        })
        .await
    }

    async fn delete_role(&self, tx: Option<&mut Self::Tx>, id: RoleId) -> Result<()> {
        self.run(tx, |t| async move {
            let in_use: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ac_group_roles WHERE role_id = $1)")
                    .bind(id)
                    .fetch_one(&mut **t)
                    .await?;
            if in_use {
                return Err(EngineError::Conflict("role is in use by an access context".into()));
            }
            sqlx::query("DELETE FROM roles_master WHERE id = $1").bind(id).execute(&mut **t).await?;
            Ok(())
        })
        .await
    }

    async fn add_role_permission(&self, tx: Option<&mut Self::Tx>, role_id: RoleId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO role_docactions (role_id, doctype_id, docaction_id) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(role_id)
            .bind(doctype_id)
            .bind(docaction_id)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn role_permissions(&self, tx: Option<&mut Self::Tx>, role_id: RoleId) -> Result<Vec<RolePermission>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, RolePermission>(
                "SELECT role_id, doctype_id, docaction_id FROM role_docactions WHERE role_id = $1",
            )
            .bind(role_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn role_in_use(&self, tx: Option<&mut Self::Tx>, id: RoleId) -> Result<bool> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ac_group_roles WHERE role_id = $1)")
                .bind(id)
                .fetch_one(&mut **t)
                .await?)
        })
        .await
    }

    // ---- Principals ----

    async fn create_user(&self, tx: Option<&mut Self::Tx>, user: User) -> Result<(User, GroupId)> {
        self.run(tx, |t| async move {
            let row = sqlx::query_as::<_, User>(
                "INSERT INTO users_master (first_name, last_name, email, active) VALUES ($1, $2, $3, $4) \
                 RETURNING id, first_name, last_name, email, active",
            )
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(user.active)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "user"))?;

            let group_name = format!("{}-singleton", row.full_name());
            let group_id: GroupId = sqlx::query_scalar(
                "INSERT INTO groups_master (name, group_type) VALUES ($1, 'singleton') RETURNING id",
            )
            .bind(&group_name)
            .fetch_one(&mut **t)
            .await?;

            sqlx::query("INSERT INTO group_users (group_id, user_id) VALUES ($1, $2)")
                .bind(group_id)
                .bind(row.id)
                .execute(&mut **t)
                .await?;

            Ok((row, group_id))
        })
        .await
    }

    async fn get_user(&self, tx: Option<&mut Self::Tx>, id: UserId) -> Result<Option<User>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, User>(
                "SELECT id, first_name, last_name, email, active FROM users_master WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn create_group(&self, tx: Option<&mut Self::Tx>, name: &str, group_type: GroupType) -> Result<Group> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, Group>(
                "INSERT INTO groups_master (name, group_type) VALUES ($1, $2) RETURNING id, name, group_type",
            )
            .bind(name)
            .bind(group_type)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "group"))
        })
        .await
    }

    async fn get_group(&self, tx: Option<&mut Self::Tx>, id: GroupId) -> Result<Option<Group>> {
        self.run(tx, |t| async move {
            Ok(
                sqlx::query_as::<_, Group>("SELECT id, name, group_type FROM groups_master WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **t)
                    .await?,
            )
        })
        .await
    }

    async fn delete_group(&self, tx: Option<&mut Self::Tx>, id: GroupId) -> Result<()> {
        self.run(tx, |t| async move {
            let group_type: Option<GroupType> =
                sqlx::query_scalar("SELECT group_type FROM groups_master WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **t)
                    .await?;
            if group_type == Some(GroupType::Singleton) {
                return Err(EngineError::InvalidInput("singleton groups cannot be deleted".into()));
            }
            sqlx::query("DELETE FROM groups_master WHERE id = $1").bind(id).execute(&mut **t).await?;
            Ok(())
        })
        .await
    }

    async fn add_user_to_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.run(tx, |t| async move {
            let group_type: Option<GroupType> =
                sqlx::query_scalar("SELECT group_type FROM groups_master WHERE id = $1")
                    .bind(group_id)
                    .fetch_optional(&mut **t)
                    .await?;
            match group_type {
                None => Err(EngineError::NotFound(format!("group {group_id}"))),
                Some(GroupType::Singleton) => {
                    Err(EngineError::InvalidInput("cannot add members to a singleton group".into()))
                }
                Some(GroupType::General) => {
                    sqlx::query(
                        "INSERT INTO group_users (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                    )
                    .bind(group_id)
                    .bind(user_id)
                    .execute(&mut **t)
                    .await?;
                    Ok(())
                }
            }
        })
        .await
    }

    async fn remove_user_from_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.run(tx, |t| async move {
            let group_type: Option<GroupType> =
                sqlx::query_scalar("SELECT group_type FROM groups_master WHERE id = $1")
                    .bind(group_id)
                    .fetch_optional(&mut **t)
                    .await?;
            if group_type == Some(GroupType::Singleton) {
                return Err(EngineError::InvalidInput("cannot remove members from a singleton group".into()));
            }
            sqlx::query("DELETE FROM group_users WHERE group_id = $1 AND user_id = $2")
                .bind(group_id)
                .bind(user_id)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }

    async fn group_members(&self, tx: Option<&mut Self::Tx>, group_id: GroupId) -> Result<Vec<UserId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar("SELECT user_id FROM group_users WHERE group_id = $1")
                .bind(group_id)
                .fetch_all(&mut **t)
                .await?)
        })
        .await
    }

    async fn user_groups(&self, tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Vec<GroupId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar("SELECT group_id FROM group_users WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut **t)
                .await?)
        })
        .await
    }

    async fn singleton_group_of(&self, tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Option<GroupId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT gu.group_id FROM group_users gu JOIN groups_master g ON g.id = gu.group_id \
                 WHERE gu.user_id = $1 AND g.group_type = 'singleton'",
            )
            .bind(user_id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    // ---- Access context ----

    async fn create_access_context(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<AccessContext> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, AccessContext>(
                "INSERT INTO access_contexts (name, active) VALUES ($1, true) RETURNING id, name, active",
            )
            .bind(name)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "access context"))
        })
        .await
    }

    async fn get_access_context(&self, tx: Option<&mut Self::Tx>, id: AccessContextId) -> Result<Option<AccessContext>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, AccessContext>(
                "SELECT id, name, active FROM access_contexts WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn set_access_context_active(&self, tx: Option<&mut Self::Tx>, id: AccessContextId, active: bool) -> Result<()> {
        self.run(tx, |t| async move {
            let result = sqlx::query("UPDATE access_contexts SET active = $2 WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&mut **t)
                .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound(format!("access context {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn add_group_role(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO ac_group_roles (ac_id, group_id, role_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(ac_id)
            .bind(group_id)
            .bind(role_id)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn remove_group_role(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query("DELETE FROM ac_group_roles WHERE ac_id = $1 AND group_id = $2 AND role_id = $3")
                .bind(ac_id)
                .bind(group_id)
                .bind(role_id)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }

    async fn group_roles(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<RoleId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar("SELECT role_id FROM ac_group_roles WHERE ac_id = $1 AND group_id = $2")
                .bind(ac_id)
                .bind(group_id)
                .fetch_all(&mut **t)
                .await?)
        })
        .await
    }

    async fn groups_in_context(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId) -> Result<Vec<GroupId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT group_id FROM ac_group_roles WHERE ac_id = $1 \
                 UNION SELECT group_id FROM ac_group_hierarchy WHERE ac_id = $1",
            )
            .bind(ac_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn add_group_to_hierarchy(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO ac_group_hierarchy (ac_id, group_id, reports_to) VALUES ($1, $2, $3) \
                 ON CONFLICT (ac_id, group_id) DO UPDATE SET reports_to = EXCLUDED.reports_to",
            )
            .bind(ac_id)
            .bind(group_id)
            .bind(reports_to)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete_group_from_hierarchy(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query("DELETE FROM ac_group_hierarchy WHERE ac_id = $1 AND group_id = $2")
                .bind(ac_id)
                .bind(group_id)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }

    async fn reports_to(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Option<GroupId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT reports_to FROM ac_group_hierarchy WHERE ac_id = $1 AND group_id = $2",
            )
            .bind(ac_id)
            .bind(group_id)
            .fetch_optional(&mut **t)
            .await?
            .flatten())
        })
        .await
    }

    async fn reportees(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<GroupId>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT group_id FROM ac_group_hierarchy WHERE ac_id = $1 AND reports_to = $2",
            )
            .bind(ac_id)
            .bind(group_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn change_reporting(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()> {
        self.add_group_to_hierarchy(tx, ac_id, group_id, reports_to).await
    }

    async fn effective_permission(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, user_id: UserId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<bool> {
        // Joins the `ac_perms_v` derived read model (§6.1) rather than
        // walking the primitive tables in Rust.
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT EXISTS( \
                    SELECT 1 FROM ac_group_roles agr \
                    JOIN group_users gu ON gu.group_id = agr.group_id \
                    JOIN role_docactions rd ON rd.role_id = agr.role_id \
                    WHERE agr.ac_id = $1 AND gu.user_id = $2 \
                      AND rd.doctype_id = $3 AND rd.docaction_id = $4 \
                 )",
            )
            .bind(ac_id)
            .bind(user_id)
            .bind(doctype_id)
            .bind(docaction_id)
            .fetch_one(&mut **t)
            .await?)
        })
        .await
    }

    // ---- State graph ----

    async fn add_transition(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId, to_state_id: DocStateId) -> Result<Transition> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, Transition>(
                "INSERT INTO docstate_transitions (doctype_id, from_state_id, docaction_id, to_state_id) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING doctype_id, from_state_id, docaction_id, to_state_id",
            )
            .bind(doctype_id)
            .bind(from_state_id)
            .bind(docaction_id)
            .bind(to_state_id)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "transition"))
        })
        .await
    }

    async fn get_transition(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<Option<Transition>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Transition>(
                "SELECT doctype_id, from_state_id, docaction_id, to_state_id FROM docstate_transitions \
                 WHERE doctype_id = $1 AND from_state_id = $2 AND docaction_id = $3",
            )
            .bind(doctype_id)
            .bind(from_state_id)
            .bind(docaction_id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn list_transitions(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<Transition>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Transition>(
                "SELECT doctype_id, from_state_id, docaction_id, to_state_id FROM docstate_transitions \
                 WHERE doctype_id = $1",
            )
            .bind(doctype_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    // ---- Workflow registry ----

    async fn create_workflow(&self, tx: Option<&mut Self::Tx>, name: &str, doctype_id: DocTypeId, begin_state_id: DocStateId) -> Result<Workflow> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, Workflow>(
                "INSERT INTO workflows (name, doctype_id, docstate_id, active) VALUES ($1, $2, $3, false) \
                 RETURNING id, name, doctype_id, docstate_id AS begin_state_id, active",
            )
            .bind(name)
            .bind(doctype_id)
            .bind(begin_state_id)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "workflow"))
        })
        .await
    }

    async fn get_workflow(&self, tx: Option<&mut Self::Tx>, id: WorkflowId) -> Result<Option<Workflow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Workflow>(
                "SELECT id, name, doctype_id, docstate_id AS begin_state_id, active FROM workflows WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn get_workflow_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<Workflow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Workflow>(
                "SELECT id, name, doctype_id, docstate_id AS begin_state_id, active FROM workflows WHERE name = $1",
            )
            .bind(name)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn get_active_workflow_by_doctype(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Option<Workflow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Workflow>(
                "SELECT id, name, doctype_id, docstate_id AS begin_state_id, active FROM workflows \
                 WHERE doctype_id = $1 AND active = true",
            )
            .bind(doctype_id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn list_workflows(&self, tx: Option<&mut Self::Tx>) -> Result<Vec<Workflow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Workflow>(
                "SELECT id, name, doctype_id, docstate_id AS begin_state_id, active FROM workflows ORDER BY id",
            )
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn rename_workflow(&self, tx: Option<&mut Self::Tx>, id: WorkflowId, name: &str) -> Result<()> {
        self.run(tx, |t| async move {
            let result = sqlx::query("UPDATE workflows SET name = $2 WHERE id = $1")
                .bind(id)
                .bind(name)
                .execute(&mut **t)
                .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound(format!("workflow {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn set_workflow_active(&self, tx: Option<&mut Self::Tx>, id: WorkflowId, active: bool) -> Result<()> {
        self.run(tx, |t| async move {
            let doctype_id: Option<DocTypeId> =
                sqlx::query_scalar("SELECT doctype_id FROM workflows WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **t)
                    .await?;
            let doctype_id = doctype_id.ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))?;
            if active {
                sqlx::query("UPDATE workflows SET active = false WHERE doctype_id = $1 AND id <> $2")
                    .bind(doctype_id)
                    .bind(id)
                    .execute(&mut **t)
                    .await?;
            }
            sqlx::query("UPDATE workflows SET active = $2 WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }

    async fn add_node(&self, tx: Option<&mut Self::Tx>, node: Node) -> Result<Node> {
        self.run(tx, |t| async move {
            let id: NodeId = sqlx::query_scalar(
                "INSERT INTO workflow_nodes (doctype_id, docstate_id, ac_id, workflow_id, name, type) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(node.doctype_id)
            .bind(node.from_state_id)
            .bind(node.access_context_id)
            .bind(node.workflow_id)
            .bind(&node.name)
            .bind(node.node_type)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "node"))?;

            for pred in &node.predecessors {
                sqlx::query("INSERT INTO workflow_node_predecessors (node_id, from_state_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(pred)
                    .execute(&mut **t)
                    .await?;
            }

            Ok(Node { id, ..node })
        })
        .await
    }

    async fn remove_node(&self, tx: Option<&mut Self::Tx>, node_id: NodeId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query("DELETE FROM workflow_nodes WHERE id = $1").bind(node_id).execute(&mut **t).await?;
            Ok(())
        })
        .await
    }

    async fn get_node(&self, tx: Option<&mut Self::Tx>, id: NodeId) -> Result<Option<Node>> {
        self.run(tx, |t| async move { fetch_node(&mut **t, "id = $1", id.get()).await }).await
    }

    async fn get_node_by_workflow_state(&self, tx: Option<&mut Self::Tx>, workflow_id: WorkflowId, from_state_id: DocStateId) -> Result<Option<Node>> {
        self.run(tx, |t| async move {
            let row = sqlx::query(
                "SELECT id, workflow_id, doctype_id, docstate_id AS from_state_id, ac_id, name, type \
                 FROM workflow_nodes WHERE workflow_id = $1 AND docstate_id = $2",
            )
            .bind(workflow_id)
            .bind(from_state_id)
            .fetch_optional(&mut **t)
            .await?;
            match row {
                None => Ok(None),
                Some(row) => {
                    let id: NodeId = row.try_get("id")?;
                    Ok(Some(node_from_row(row, load_predecessors(&mut **t, id).await?)))
                }
            }
        })
        .await
    }

    async fn list_nodes(&self, tx: Option<&mut Self::Tx>, workflow_id: WorkflowId) -> Result<Vec<Node>> {
        self.run(tx, |t| async move {
            let rows = sqlx::query(
                "SELECT id, workflow_id, doctype_id, docstate_id AS from_state_id, ac_id, name, type \
                 FROM workflow_nodes WHERE workflow_id = $1",
            )
            .bind(workflow_id)
            .fetch_all(&mut **t)
            .await?;
            let mut nodes = Vec::with_capacity(rows.len());
            for row in rows {
                let id: NodeId = row.try_get("id")?;
                let preds = load_predecessors(&mut **t, id).await?;
                nodes.push(node_from_row(row, preds));
            }
            Ok(nodes)
        })
        .await
    }

    // ---- Document store ----

    async fn create_document(&self, tx: Option<&mut Self::Tx>, doc: Document) -> Result<Document> {
        self.run(tx, |t| async move {
            let id: DocumentId = sqlx::query_scalar(
                "INSERT INTO documents (doctype_id, orig_ac_id, ac_id, docstate_id, user_id, ctime, title, data) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(doc.doctype_id)
            .bind(doc.originating_ac_id)
            .bind(doc.current_ac_id)
            .bind(doc.current_state_id)
            .bind(doc.owner_user_id)
            .bind(doc.ctime)
            .bind(&doc.title)
            .bind(&doc.body)
            .fetch_one(&mut **t)
            .await?;

            if let Some(parent) = doc.parent {
                sqlx::query(
                    "INSERT INTO document_children (parent_doctype_id, parent_id, child_doctype_id, child_id) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(parent.doctype_id)
                .bind(parent.doc_id)
                .bind(doc.doctype_id)
                .bind(id)
                .execute(&mut **t)
                .await?;
            }

            Ok(Document { id, ..doc })
        })
        .await
    }

    async fn get_document(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Option<Document>> {
        self.run(tx, |t| async move {
            let row = sqlx::query_as::<_, Document>(
                "SELECT id, doctype_id, docstate_id AS current_state_id, ac_id AS current_ac_id, \
                        orig_ac_id AS originating_ac_id, user_id AS owner_user_id, ctime, title, data AS body \
                 FROM documents WHERE doctype_id = $1 AND id = $2",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_optional(&mut **t)
            .await?;
            let Some(mut row) = row else { return Ok(None) };
            row.parent = sqlx::query_as::<_, ParentRef>(
                "SELECT parent_doctype_id AS doctype_id, parent_id AS doc_id FROM document_children \
                 WHERE child_doctype_id = $1 AND child_id = $2",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_optional(&mut **t)
            .await?;
            Ok(Some(row))
        })
        .await
    }

    async fn update_document_state(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, new_state_id: DocStateId, new_ac_id: Option<AccessContextId>) -> Result<()> {
        self.run(tx, |t| async move {
            let result = sqlx::query(
                "UPDATE documents SET docstate_id = $3, ac_id = COALESCE($4, ac_id) \
                 WHERE doctype_id = $1 AND id = $2",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .bind(new_state_id)
            .bind(new_ac_id)
            .execute(&mut **t)
            .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound(format!("document {doctype_id}/{doc_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn set_title(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, title: &str) -> Result<()> {
        self.run(tx, |t| async move {
            let is_child: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_children WHERE child_doctype_id = $1 AND child_id = $2)",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_one(&mut **t)
            .await?;
            if is_child {
                return Err(EngineError::DocumentIsChild);
            }
            let result = sqlx::query("UPDATE documents SET title = $3 WHERE doctype_id = $1 AND id = $2")
                .bind(doctype_id)
                .bind(doc_id)
                .bind(title)
                .execute(&mut **t)
                .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound(format!("document {doctype_id}/{doc_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn set_data(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, body: serde_json::Value) -> Result<()> {
        self.run(tx, |t| async move {
            let is_child: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_children WHERE child_doctype_id = $1 AND child_id = $2)",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_one(&mut **t)
            .await?;
            if is_child {
                return Err(EngineError::DocumentIsChild);
            }
            let result = sqlx::query("UPDATE documents SET data = $3 WHERE doctype_id = $1 AND id = $2")
                .bind(doctype_id)
                .bind(doc_id)
                .bind(&body)
                .execute(&mut **t)
                .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound(format!("document {doctype_id}/{doc_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn add_child_link(&self, tx: Option<&mut Self::Tx>, parent_doctype_id: DocTypeId, parent_id: DocumentId, child_doctype_id: DocTypeId, child_id: DocumentId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO document_children (parent_doctype_id, parent_id, child_doctype_id, child_id) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(parent_doctype_id)
            .bind(parent_id)
            .bind(child_doctype_id)
            .bind(child_id)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn children_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<DocumentChild>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, DocumentChild>(
                "SELECT parent_doctype_id, parent_id, child_doctype_id, child_id FROM document_children \
                 WHERE parent_doctype_id = $1 AND parent_id = $2",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn add_tag(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, tag: &str) -> Result<()> {
        self.run(tx, |t| async move {
            let is_child: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_children WHERE child_doctype_id = $1 AND child_id = $2)",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_one(&mut **t)
            .await?;
            if is_child {
                return Err(EngineError::DocumentIsChild);
            }
            let normalized = Tag::normalize(tag);
            sqlx::query(
                "INSERT INTO document_tags (doctype_id, doc_id, tag) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .bind(normalized)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn tags_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<String>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar("SELECT tag FROM document_tags WHERE doctype_id = $1 AND doc_id = $2")
                .bind(doctype_id)
                .bind(doc_id)
                .fetch_all(&mut **t)
                .await?)
        })
        .await
    }

    async fn insert_blob_row(&self, tx: Option<&mut Self::Tx>, blob: Blob) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO document_blobs (doctype_id, doc_id, name, path, sha1) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(blob.doctype_id)
            .bind(blob.doc_id)
            .bind(&blob.name)
            .bind(&blob.path)
            .bind(&blob.sha1)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn blobs_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<Blob>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Blob>(
                "SELECT doctype_id, doc_id, name, path, sha1 FROM document_blobs WHERE doctype_id = $1 AND doc_id = $2",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    // ---- Events & join accounting ----

    async fn event_is_redundant(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<bool> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT EXISTS( \
                    SELECT 1 FROM docevents \
                    WHERE doctype_id = $1 AND doc_id = $2 AND from_state_id = $3 AND docaction_id = $4 \
                      AND status = 'applied' \
                 )",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .bind(from_state_id)
            .bind(docaction_id)
            .fetch_one(&mut **t)
            .await?)
        })
        .await
    }

    async fn insert_applied_event(&self, tx: Option<&mut Self::Tx>, event: DocEvent) -> Result<DocEvent> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, DocEvent>(
                "INSERT INTO docevents (doctype_id, doc_id, from_state_id, docaction_id, user_id, group_id, ctime, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 'applied') \
                 RETURNING id, doctype_id, doc_id, from_state_id, docaction_id, user_id, group_id, ctime, status",
            )
            .bind(event.doctype_id)
            .bind(event.doc_id)
            .bind(event.from_state_id)
            .bind(event.docaction_id)
            .bind(event.user_id)
            .bind(event.group_id)
            .bind(event.ctime)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "applied event"))
        })
        .await
    }

    async fn join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<BTreeSet<DocStateId>> {
        self.run(tx, |t| async move {
            let rows: Vec<DocStateId> = sqlx::query_scalar(
                "SELECT from_state_id FROM join_progress WHERE node_id = $1 AND doc_id = $2",
            )
            .bind(node_id)
            .bind(doc_id)
            .fetch_all(&mut **t)
            .await?;
            Ok(rows.into_iter().collect())
        })
        .await
    }

    async fn record_join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId, from_state_id: DocStateId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "INSERT INTO join_progress (node_id, doc_id, from_state_id) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(node_id)
            .bind(doc_id)
            .bind(from_state_id)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn clear_join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query("DELETE FROM join_progress WHERE node_id = $1 AND doc_id = $2")
                .bind(node_id)
                .bind(doc_id)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }

    // ---- Messages & mailboxes ----

    async fn insert_message(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, docevent_id: DocEventId, payload: MessagePayload) -> Result<Message> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, Message>(
                "INSERT INTO messages (doctype_id, doc_id, docevent_id, title, data) VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, doctype_id, doc_id, docevent_id, title, data AS body",
            )
            .bind(doctype_id)
            .bind(doc_id)
            .bind(docevent_id)
            .bind(payload.title)
            .bind(payload.body)
            .fetch_one(&mut **t)
            .await
            .map_err(EngineError::from)
        })
        .await
    }

    async fn insert_mailbox_row(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId) -> Result<MailboxRow> {
        self.run(tx, |t| async move {
            sqlx::query_as::<_, MailboxRow>(
                "INSERT INTO mailboxes (group_id, message_id, unread, ctime) VALUES ($1, $2, true, now()) \
                 RETURNING id, group_id, message_id, unread, ctime",
            )
            .bind(group_id)
            .bind(message_id)
            .fetch_one(&mut **t)
            .await
            .map_err(|e| conflict_or(e, "mailbox row"))
        })
        .await
    }

    async fn get_message(&self, tx: Option<&mut Self::Tx>, message_id: MessageId) -> Result<Option<Message>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, Message>(
                "SELECT id, doctype_id, doc_id, docevent_id, title, data AS body FROM messages WHERE id = $1",
            )
            .bind(message_id)
            .fetch_optional(&mut **t)
            .await?)
        })
        .await
    }

    async fn count_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, unread: Option<bool>) -> Result<i64> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT COUNT(*) FROM mailboxes WHERE group_id = $1 AND ($2::boolean IS NULL OR unread = $2)",
            )
            .bind(group_id)
            .bind(unread)
            .fetch_one(&mut **t)
            .await?)
        })
        .await
    }

    async fn count_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, unread: Option<bool>) -> Result<i64> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_scalar(
                "SELECT COUNT(*) FROM mailboxes m JOIN group_users gu ON gu.group_id = m.group_id \
                 WHERE gu.user_id = $1 AND ($2::boolean IS NULL OR m.unread = $2)",
            )
            .bind(user_id)
            .bind(unread)
            .fetch_one(&mut **t)
            .await?)
        })
        .await
    }

    async fn list_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, MailboxRow>(
                "SELECT id, group_id, message_id, unread, ctime FROM mailboxes \
                 WHERE group_id = $1 AND ($4::boolean IS NULL OR unread = $4) \
                 ORDER BY id OFFSET $2 LIMIT $3",
            )
            .bind(group_id)
            .bind(offset)
            .bind(limit)
            .bind(unread)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn list_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>> {
        self.run(tx, |t| async move {
            Ok(sqlx::query_as::<_, MailboxRow>(
                "SELECT m.id, m.group_id, m.message_id, m.unread, m.ctime FROM mailboxes m \
                 JOIN group_users gu ON gu.group_id = m.group_id \
                 WHERE gu.user_id = $1 AND ($4::boolean IS NULL OR m.unread = $4) \
                 ORDER BY m.id OFFSET $2 LIMIT $3",
            )
            .bind(user_id)
            .bind(offset)
            .bind(limit)
            .bind(unread)
            .fetch_all(&mut **t)
            .await?)
        })
        .await
    }

    async fn reassign_message(&self, tx: Option<&mut Self::Tx>, from_group: GroupId, to_group: GroupId, message_id: MessageId) -> Result<()> {
        if from_group == to_group {
            return Ok(());
        }
        self.run(tx, |t| async move {
            let result = sqlx::query(
                "UPDATE mailboxes SET group_id = $3, unread = true WHERE group_id = $1 AND message_id = $2",
            )
            .bind(from_group)
            .bind(message_id)
            .bind(to_group)
            .execute(&mut **t)
            .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::NotFound("mailbox row for this (group, message)".into()));
            }
            Ok(())
        })
        .await
    }

    async fn set_status_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, message_id: MessageId, unread: bool) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query(
                "UPDATE mailboxes SET unread = $3 WHERE message_id = $2 \
                 AND group_id IN (SELECT group_id FROM group_users WHERE user_id = $1)",
            )
            .bind(user_id)
            .bind(message_id)
            .bind(unread)
            .execute(&mut **t)
            .await?;
            Ok(())
        })
        .await
    }

    async fn set_status_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId, unread: bool) -> Result<()> {
        self.run(tx, |t| async move {
            sqlx::query("UPDATE mailboxes SET unread = $3 WHERE group_id = $1 AND message_id = $2")
                .bind(group_id)
                .bind(message_id)
                .bind(unread)
                .execute(&mut **t)
                .await?;
            Ok(())
        })
        .await
    }
}

async fn fetch_node(conn: &mut sqlx::PgConnection, predicate: &str, id: i64) -> Result<Option<Node>> {
    let sql = format!(
        "SELECT id, workflow_id, doctype_id, docstate_id AS from_state_id, ac_id, name, type \
         FROM workflow_nodes WHERE {predicate}"
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    match row {
        None => Ok(None),
        Some(row) => {
            let node_id: NodeId = row.try_get("id")?;
            let preds = load_predecessors(conn, node_id).await?;
            Ok(Some(node_from_row(row, preds)))
        }
    }
}

async fn load_predecessors(conn: &mut sqlx::PgConnection, node_id: NodeId) -> Result<BTreeSet<DocStateId>> {
    let rows: Vec<DocStateId> = sqlx::query_scalar("SELECT from_state_id FROM workflow_node_predecessors WHERE node_id = $1")
        .bind(node_id)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().collect())
}

fn node_from_row(row: sqlx::postgres::PgRow, predecessors: BTreeSet<DocStateId>) -> Node {
    Node {
        id: row.try_get("id").unwrap(),
        workflow_id: row.try_get("workflow_id").unwrap(),
        doctype_id: row.try_get("doctype_id").unwrap(),
        from_state_id: row.try_get("from_state_id").unwrap(),
        access_context_id: row.try_get("ac_id").unwrap(),
        name: row.try_get("name").unwrap(),
        node_type: row.try_get("type").unwrap(),
        predecessors,
    }
}

/// Postgres reports a unique-violation as SQLSTATE 23505; surface that as
/// the engine's `Conflict` rather than a bare transport error.
fn conflict_or(e: sqlx::Error, what: &str) -> EngineError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            debug!(what, "unique violation mapped to Conflict");
            return EngineError::Conflict(format!("{what} already exists"));
        }
    }
    EngineError::from(e)
}
