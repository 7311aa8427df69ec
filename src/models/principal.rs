// Principal layer — users and groups
//
//! Users are external identities, looked up by id only (§1 — authentication
//! and the user directory are external collaborators). Groups come in two
//! flavors: every user has exactly one **singleton** group that wraps them
//! 1-to-1, and any number of **general** groups that may contain many users.

use serde::{Deserialize, Serialize};

use super::ids::{GroupId, UserId};

/// An external identity, referenced by id. `active` gates whether the user
/// can be the origin of new events; it is authoritative, not advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Whether a group wraps exactly one user (and is immutable while that user
/// exists) or is an ordinary many-member group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "group_type", rename_all = "lowercase")]
pub enum GroupType {
    Singleton,
    General,
}

/// A set of users. Singleton groups have exactly one member, created
/// alongside the user they wrap, and cannot be renamed, deleted, or have
/// members added/removed while that user exists (spec invariant: singleton
/// immutability).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub group_type: GroupType,
}

impl Group {
    pub fn is_singleton(&self) -> bool {
        matches!(self.group_type, GroupType::Singleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_group_reports_as_such() {
        let g = Group { id: GroupId(1), name: "u1-singleton".into(), group_type: GroupType::Singleton };
        assert!(g.is_singleton());
    }

    #[test]
    fn full_name_joins_first_and_last() {
        let u = User {
            id: UserId(1),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            active: true,
        };
        assert_eq!(u.full_name(), "Ada Lovelace");
    }
}
