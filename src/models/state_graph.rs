// State graph — the deterministic per-doctype transition function
//
//! `δ(from_state, action) → to_state` (spec §4.2). Each row of this table is
//! one edge; `(doctype, from_state, action)` is unique, which is what makes
//! the function deterministic rather than a relation.

use serde::{Deserialize, Serialize};

use super::ids::{DocActionId, DocStateId, DocTypeId};

/// One edge of a doctype's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transition {
    pub doctype_id: DocTypeId,
    pub from_state_id: DocStateId,
    pub docaction_id: DocActionId,
    pub to_state_id: DocStateId,
}

impl Transition {
    /// The key that must be unique across a doctype's transition table.
    pub fn key(&self) -> (DocTypeId, DocStateId, DocActionId) {
        (self.doctype_id, self.from_state_id, self.docaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_key_ignores_to_state() {
        let t1 = Transition {
            doctype_id: DocTypeId(1),
            from_state_id: DocStateId(1),
            docaction_id: DocActionId(1),
            to_state_id: DocStateId(2),
        };
        let t2 = Transition { to_state_id: DocStateId(3), ..t1 };
        assert_eq!(t1.key(), t2.key());
    }
}
