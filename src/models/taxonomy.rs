// Identifier & taxonomy layer — doctypes, states, actions, roles
//
//! The leaf layer of the data model (spec §3, §4.2). Every row here is a
//! named, opaquely-identified entity with a uniqueness constraint on name
//! and a simple CRUD surface; the interesting behavior lives one layer up,
//! in the state graph and the access context.

use serde::{Deserialize, Serialize};

use super::ids::{DocActionId, DocStateId, DocTypeId, RoleId};

/// A named category of documents. Each doctype owns a per-type document
/// storage table (`documents_<NNN>` in the logical schema, §6.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocType {
    pub id: DocTypeId,
    pub name: String,
}

/// A named phase within a document type. `(doctype, name)` is unique; the
/// doctype a state belongs to is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocState {
    pub id: DocStateId,
    pub doctype_id: DocTypeId,
    pub name: String,
}

/// A named operation that may cause a state transition. Action names are
/// unique crate-wide — the same action (e.g. `"approve"`) can be reused
/// across many doctypes' transition tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocAction {
    pub id: DocActionId,
    pub name: String,
}

/// A named bundle of `(doctype, action)` permissions. Roles are assigned to
/// groups inside an access context (§4.1); a role with no assignments in any
/// context is deletable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// One `(doctype, action)` permission carried by a role. Modeled as its own
/// row (`role_docactions` in §6.1) rather than a field on `Role` so a role
/// can carry any number of permissions without a variable-length struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub doctype_id: DocTypeId,
    pub docaction_id: DocActionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctype_identity_is_by_id_not_name() {
        let a = DocType { id: DocTypeId(1), name: "RFQ".into() };
        let b = DocType { id: DocTypeId(2), name: "RFQ".into() };
        assert_ne!(a, b);
    }

    #[test]
    fn role_permission_is_keyed_by_all_three_ids() {
        let p1 = RolePermission { role_id: RoleId(1), doctype_id: DocTypeId(1), docaction_id: DocActionId(1) };
        let p2 = RolePermission { role_id: RoleId(1), doctype_id: DocTypeId(1), docaction_id: DocActionId(2) };
        assert_ne!(p1, p2);
    }
}
