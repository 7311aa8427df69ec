// In-memory Store backend — for exercising the pipeline without Postgres
//
//! Mirrors the role the teacher's `InMemoryStorage` plays opposite its
//! NATS-backed storage: a single-process, lock-guarded backend good enough
//! to drive the full `ApplyEvent` pipeline and the scenario tests in
//! `tests/`, but not meant for production use. `Tx` is `()` — every
//! operation takes the same global lock, so there is no real isolation
//! between a "transaction" and a concurrent caller, only the appearance of
//! one for single-threaded test code.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::*;
use crate::{EngineError, Result};

use super::store::Store;

#[derive(Default)]
struct State {
    next_id: i64,

    doctypes: HashMap<i64, DocType>,
    docstates: HashMap<i64, DocState>,
    docactions: HashMap<i64, DocAction>,
    roles: HashMap<i64, Role>,
    role_permissions: Vec<RolePermission>,

    users: HashMap<i64, User>,
    groups: HashMap<i64, Group>,
    group_members: HashMap<i64, HashSet<i64>>, // group_id -> user_ids
    singleton_of: HashMap<i64, i64>,            // user_id -> group_id

    access_contexts: HashMap<i64, AccessContext>,
    group_roles: HashSet<(i64, i64, i64)>,      // (ac, group, role)
    hierarchy: HashMap<(i64, i64), Option<i64>>, // (ac, group) -> reports_to

    transitions: HashMap<(i64, i64, i64), Transition>, // (doctype, from_state, action)

    workflows: HashMap<i64, Workflow>,
    nodes: HashMap<i64, Node>,

    documents: HashMap<(i64, i64), Document>,
    children: Vec<DocumentChild>,
    tags: HashMap<(i64, i64), Vec<String>>,
    blobs: HashMap<(i64, i64), Vec<Blob>>,

    events: Vec<DocEvent>,
    join_progress: HashMap<(i64, i64), BTreeSet<DocStateId>>, // (node, doc) -> applied from_states

    messages: HashMap<i64, Message>,
    mailboxes: HashMap<i64, MailboxRow>,
}

impl State {
    fn alloc(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A single-process, in-memory [`Store`] implementation for tests.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore { state: Mutex::new(State { next_id: 0, ..Default::default() }) }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = ();

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(())
    }

    async fn commit(&self, _tx: Self::Tx) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<()> {
        Ok(())
    }

    // ---- Taxonomy ----

    async fn create_doctype(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<DocType> {
        let mut s = self.state.lock().unwrap();
        if s.doctypes.values().any(|d| d.name == name) {
            return Err(EngineError::Conflict(format!("doctype '{name}' already exists")));
        }
        let id = s.alloc();
        let row = DocType { id: DocTypeId(id), name: name.to_string() };
        s.doctypes.insert(id, row.clone());
        Ok(row)
    }

    async fn get_doctype(&self, _tx: Option<&mut Self::Tx>, id: DocTypeId) -> Result<Option<DocType>> {
        Ok(self.state.lock().unwrap().doctypes.get(&id.get()).cloned())
    }

    async fn get_doctype_by_name(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocType>> {
        Ok(self.state.lock().unwrap().doctypes.values().find(|d| d.name == name).cloned())
    }

    async fn list_doctypes(&self, _tx: Option<&mut Self::Tx>) -> Result<Vec<DocType>> {
        Ok(self.state.lock().unwrap().doctypes.values().cloned().collect())
    }

    async fn create_docstate(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, name: &str) -> Result<DocState> {
        let mut s = self.state.lock().unwrap();
        if s.docstates.values().any(|d| d.doctype_id == doctype_id && d.name == name) {
            return Err(EngineError::Conflict(format!("docstate '{name}' already exists for this doctype")));
        }
        let id = s.alloc();
        let row = DocState { id: DocStateId(id), doctype_id, name: name.to_string() };
        s.docstates.insert(id, row.clone());
        Ok(row)
    }

    async fn get_docstate(&self, _tx: Option<&mut Self::Tx>, id: DocStateId) -> Result<Option<DocState>> {
        Ok(self.state.lock().unwrap().docstates.get(&id.get()).cloned())
    }

    async fn list_docstates(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<DocState>> {
        Ok(self.state.lock().unwrap().docstates.values().filter(|d| d.doctype_id == doctype_id).cloned().collect())
    }

    async fn create_docaction(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<DocAction> {
        let mut s = self.state.lock().unwrap();
        if s.docactions.values().any(|d| d.name == name) {
            return Err(EngineError::Conflict(format!("docaction '{name}' already exists")));
        }
        let id = s.alloc();
        let row = DocAction { id: DocActionId(id), name: name.to_string() };
        s.docactions.insert(id, row.clone());
        Ok(row)
    }

    async fn get_docaction(&self, _tx: Option<&mut Self::Tx>, id: DocActionId) -> Result<Option<DocAction>> {
        Ok(self.state.lock().unwrap().docactions.get(&id.get()).cloned())
    }

    async fn get_docaction_by_name(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocAction>> {
        Ok(self.state.lock().unwrap().docactions.values().find(|d| d.name == name).cloned())
    }

    async fn create_role(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<Role> {
        let mut s = self.state.lock().unwrap();
        if s.roles.values().any(|r| r.name == name) {
            return Err(EngineError::Conflict(format!("role '{name}' already exists")));
        }
        let id = s.alloc();
        let row = Role { id: RoleId(id), name: name.to_string() };
        s.roles.insert(id, row.clone());
        Ok(row)
    }

    async fn get_role(&self, _tx: Option<&mut Self::Tx>, id: RoleId) -> Result<Option<Role>> {
        Ok(self.state.lock().unwrap().roles.get(&id.get()).cloned())
    }

    async fn delete_role(&self, _tx: Option<&mut Self::Tx>, id: RoleId) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.group_roles.iter().any(|(_, _, role)| *role == id.get()) {
            return Err(EngineError::Conflict("role is in use by an access context".into()));
        }
        s.roles.remove(&id.get());
        Ok(())
    }

    async fn add_role_permission(&self, _tx: Option<&mut Self::Tx>, role_id: RoleId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let perm = RolePermission { role_id, doctype_id, docaction_id };
        if !s.role_permissions.contains(&perm) {
            s.role_permissions.push(perm);
        }
        Ok(())
    }

    async fn role_permissions(&self, _tx: Option<&mut Self::Tx>, role_id: RoleId) -> Result<Vec<RolePermission>> {
        Ok(self.state.lock().unwrap().role_permissions.iter().filter(|p| p.role_id == role_id).cloned().collect())
    }

    async fn role_in_use(&self, _tx: Option<&mut Self::Tx>, id: RoleId) -> Result<bool> {
        Ok(self.state.lock().unwrap().group_roles.iter().any(|(_, _, role)| *role == id.get()))
    }

    // ---- Principals ----

    async fn create_user(&self, _tx: Option<&mut Self::Tx>, mut user: User) -> Result<(User, GroupId)> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        user.id = UserId(id);
        s.users.insert(id, user.clone());

        let group_id = s.alloc();
        let singleton = Group {
            id: GroupId(group_id),
            name: format!("{}-singleton", user.full_name()),
            group_type: GroupType::Singleton,
        };
        s.groups.insert(group_id, singleton);
        s.group_members.entry(group_id).or_default().insert(id);
        s.singleton_of.insert(id, group_id);

        Ok((user, GroupId(group_id)))
    }

    async fn get_user(&self, _tx: Option<&mut Self::Tx>, id: UserId) -> Result<Option<User>> {
        Ok(self.state.lock().unwrap().users.get(&id.get()).cloned())
    }

    async fn create_group(&self, _tx: Option<&mut Self::Tx>, name: &str, group_type: GroupType) -> Result<Group> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        let row = Group { id: GroupId(id), name: name.to_string(), group_type };
        s.groups.insert(id, row.clone());
        Ok(row)
    }

    async fn get_group(&self, _tx: Option<&mut Self::Tx>, id: GroupId) -> Result<Option<Group>> {
        Ok(self.state.lock().unwrap().groups.get(&id.get()).cloned())
    }

    async fn delete_group(&self, _tx: Option<&mut Self::Tx>, id: GroupId) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(g) = s.groups.get(&id.get()) {
            if g.is_singleton() {
                return Err(EngineError::InvalidInput("singleton groups cannot be deleted".into()));
            }
        }
        s.groups.remove(&id.get());
        s.group_members.remove(&id.get());
        Ok(())
    }

    async fn add_user_to_group(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        match s.groups.get(&group_id.get()) {
            Some(g) if g.is_singleton() => Err(EngineError::InvalidInput("cannot add members to a singleton group".into())),
            Some(_) => {
                s.group_members.entry(group_id.get()).or_default().insert(user_id.get());
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("group {group_id}"))),
        }
    }

    async fn remove_user_from_group(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(g) = s.groups.get(&group_id.get()) {
            if g.is_singleton() {
                return Err(EngineError::InvalidInput("cannot remove members from a singleton group".into()));
            }
        }
        if let Some(members) = s.group_members.get_mut(&group_id.get()) {
            members.remove(&user_id.get());
        }
        Ok(())
    }

    async fn group_members(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId) -> Result<Vec<UserId>> {
        Ok(self.state.lock().unwrap().group_members.get(&group_id.get()).map(|m| m.iter().map(|id| UserId(*id)).collect()).unwrap_or_default())
    }

    async fn user_groups(&self, _tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Vec<GroupId>> {
        let s = self.state.lock().unwrap();
        Ok(s.group_members
            .iter()
            .filter(|(_, members)| members.contains(&user_id.get()))
            .map(|(group_id, _)| GroupId(*group_id))
            .collect())
    }

    async fn singleton_group_of(&self, _tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Option<GroupId>> {
        Ok(self.state.lock().unwrap().singleton_of.get(&user_id.get()).map(|id| GroupId(*id)))
    }

    // ---- Access context ----

    async fn create_access_context(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<AccessContext> {
        let mut s = self.state.lock().unwrap();
        if s.access_contexts.values().any(|a| a.name == name) {
            return Err(EngineError::Conflict(format!("access context '{name}' already exists")));
        }
        let id = s.alloc();
        let row = AccessContext { id: AccessContextId(id), name: name.to_string(), active: true };
        s.access_contexts.insert(id, row.clone());
        Ok(row)
    }

    async fn get_access_context(&self, _tx: Option<&mut Self::Tx>, id: AccessContextId) -> Result<Option<AccessContext>> {
        Ok(self.state.lock().unwrap().access_contexts.get(&id.get()).cloned())
    }

    async fn set_access_context_active(&self, _tx: Option<&mut Self::Tx>, id: AccessContextId, active: bool) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let ac = s.access_contexts.get_mut(&id.get()).ok_or_else(|| EngineError::NotFound(format!("access context {id}")))?;
        ac.active = active;
        Ok(())
    }

    async fn add_group_role(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
        self.state.lock().unwrap().group_roles.insert((ac_id.get(), group_id.get(), role_id.get()));
        Ok(())
    }

    async fn remove_group_role(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()> {
        self.state.lock().unwrap().group_roles.remove(&(ac_id.get(), group_id.get(), role_id.get()));
        Ok(())
    }

    async fn group_roles(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<RoleId>> {
        Ok(self.state.lock().unwrap().group_roles.iter()
            .filter(|(ac, g, _)| *ac == ac_id.get() && *g == group_id.get())
            .map(|(_, _, role)| RoleId(*role))
            .collect())
    }

    async fn groups_in_context(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId) -> Result<Vec<GroupId>> {
        let s = self.state.lock().unwrap();
        let mut ids: HashSet<i64> = s.group_roles.iter().filter(|(ac, _, _)| *ac == ac_id.get()).map(|(_, g, _)| *g).collect();
        ids.extend(s.hierarchy.keys().filter(|(ac, _)| *ac == ac_id.get()).map(|(_, g)| *g));
        Ok(ids.into_iter().map(GroupId).collect())
    }

    async fn add_group_to_hierarchy(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()> {
        self.state.lock().unwrap().hierarchy.insert((ac_id.get(), group_id.get()), reports_to.map(|g| g.get()));
        Ok(())
    }

    async fn delete_group_from_hierarchy(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<()> {
        self.state.lock().unwrap().hierarchy.remove(&(ac_id.get(), group_id.get()));
        Ok(())
    }

    async fn reports_to(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Option<GroupId>> {
        Ok(self.state.lock().unwrap().hierarchy.get(&(ac_id.get(), group_id.get())).copied().flatten().map(GroupId))
    }

    async fn reportees(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<GroupId>> {
        Ok(self.state.lock().unwrap().hierarchy.iter()
            .filter(|((ac, _), reports_to)| *ac == ac_id.get() && **reports_to == Some(group_id.get()))
            .map(|((_, g), _)| GroupId(*g))
            .collect())
    }

    async fn change_reporting(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()> {
        self.state.lock().unwrap().hierarchy.insert((ac_id.get(), group_id.get()), reports_to.map(|g| g.get()));
        Ok(())
    }

    async fn effective_permission(&self, _tx: Option<&mut Self::Tx>, ac_id: AccessContextId, user_id: UserId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<bool> {
        let s = self.state.lock().unwrap();
        let groups: Vec<i64> = s.group_members.iter().filter(|(_, m)| m.contains(&user_id.get())).map(|(g, _)| *g).collect();
        let roles: HashSet<i64> = s.group_roles.iter()
            .filter(|(ac, g, _)| *ac == ac_id.get() && groups.contains(g))
            .map(|(_, _, r)| *r)
            .collect();
        Ok(s.role_permissions.iter().any(|p| roles.contains(&p.role_id.get()) && p.doctype_id == doctype_id && p.docaction_id == docaction_id))
    }

    // ---- State graph ----

    async fn add_transition(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId, to_state_id: DocStateId) -> Result<Transition> {
        let mut s = self.state.lock().unwrap();
        let key = (doctype_id.get(), from_state_id.get(), docaction_id.get());
        if s.transitions.contains_key(&key) {
            return Err(EngineError::Conflict("a transition already exists for this (doctype, from_state, action)".into()));
        }
        let row = Transition { doctype_id, from_state_id, docaction_id, to_state_id };
        s.transitions.insert(key, row);
        Ok(row)
    }

    async fn get_transition(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<Option<Transition>> {
        Ok(self.state.lock().unwrap().transitions.get(&(doctype_id.get(), from_state_id.get(), docaction_id.get())).copied())
    }

    async fn list_transitions(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<Transition>> {
        Ok(self.state.lock().unwrap().transitions.values().filter(|t| t.doctype_id == doctype_id).copied().collect())
    }

    // ---- Workflow registry ----

    async fn create_workflow(&self, _tx: Option<&mut Self::Tx>, name: &str, doctype_id: DocTypeId, begin_state_id: DocStateId) -> Result<Workflow> {
        let mut s = self.state.lock().unwrap();
        if s.workflows.values().any(|w| w.name == name) {
            return Err(EngineError::Conflict(format!("workflow '{name}' already exists")));
        }
        let id = s.alloc();
        let row = Workflow { id: WorkflowId(id), name: name.to_string(), doctype_id, begin_state_id, active: false };
        s.workflows.insert(id, row.clone());
        Ok(row)
    }

    async fn get_workflow(&self, _tx: Option<&mut Self::Tx>, id: WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.state.lock().unwrap().workflows.get(&id.get()).cloned())
    }

    async fn get_workflow_by_name(&self, _tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<Workflow>> {
        Ok(self.state.lock().unwrap().workflows.values().find(|w| w.name == name).cloned())
    }

    async fn get_active_workflow_by_doctype(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Option<Workflow>> {
        Ok(self.state.lock().unwrap().workflows.values().find(|w| w.doctype_id == doctype_id && w.active).cloned())
    }

    async fn list_workflows(&self, _tx: Option<&mut Self::Tx>) -> Result<Vec<Workflow>> {
        Ok(self.state.lock().unwrap().workflows.values().cloned().collect())
    }

    async fn rename_workflow(&self, _tx: Option<&mut Self::Tx>, id: WorkflowId, name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let w = s.workflows.get_mut(&id.get()).ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))?;
        w.name = name.to_string();
        Ok(())
    }

    async fn set_workflow_active(&self, _tx: Option<&mut Self::Tx>, id: WorkflowId, active: bool) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let doctype_id = s.workflows.get(&id.get()).ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))?.doctype_id;
        if active {
            for other in s.workflows.values_mut() {
                if other.doctype_id == doctype_id && other.id != id {
                    other.active = false;
                }
            }
        }
        s.workflows.get_mut(&id.get()).unwrap().active = active;
        Ok(())
    }

    async fn add_node(&self, _tx: Option<&mut Self::Tx>, node: Node) -> Result<Node> {
        let mut s = self.state.lock().unwrap();
        let exists = s.nodes.values().any(|n| n.workflow_id == node.workflow_id && n.from_state_id == node.from_state_id);
        if exists {
            return Err(EngineError::Conflict("a node already exists for this (workflow, from_state)".into()));
        }
        let id = s.alloc();
        let mut row = node;
        row.id = NodeId(id);
        s.nodes.insert(id, row.clone());
        Ok(row)
    }

    async fn remove_node(&self, _tx: Option<&mut Self::Tx>, node_id: NodeId) -> Result<()> {
        self.state.lock().unwrap().nodes.remove(&node_id.get());
        Ok(())
    }

    async fn get_node(&self, _tx: Option<&mut Self::Tx>, id: NodeId) -> Result<Option<Node>> {
        Ok(self.state.lock().unwrap().nodes.get(&id.get()).cloned())
    }

    async fn get_node_by_workflow_state(&self, _tx: Option<&mut Self::Tx>, workflow_id: WorkflowId, from_state_id: DocStateId) -> Result<Option<Node>> {
        Ok(self.state.lock().unwrap().nodes.values().find(|n| n.workflow_id == workflow_id && n.from_state_id == from_state_id).cloned())
    }

    async fn list_nodes(&self, _tx: Option<&mut Self::Tx>, workflow_id: WorkflowId) -> Result<Vec<Node>> {
        Ok(self.state.lock().unwrap().nodes.values().filter(|n| n.workflow_id == workflow_id).cloned().collect())
    }

    // ---- Document store ----

    async fn create_document(&self, _tx: Option<&mut Self::Tx>, doc: Document) -> Result<Document> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        let mut row = doc;
        row.id = DocumentId(id);
        if let Some(parent) = row.parent {
            s.children.push(DocumentChild {
                parent_doctype_id: parent.doctype_id,
                parent_id: parent.doc_id,
                child_doctype_id: row.doctype_id,
                child_id: row.id,
            });
        }
        s.documents.insert((row.doctype_id.get(), row.id.get()), row.clone());
        Ok(row)
    }

    async fn get_document(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Option<Document>> {
        Ok(self.state.lock().unwrap().documents.get(&(doctype_id.get(), doc_id.get())).cloned())
    }

    async fn update_document_state(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, new_state_id: DocStateId, new_ac_id: Option<AccessContextId>) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let doc = s.documents.get_mut(&(doctype_id.get(), doc_id.get())).ok_or_else(|| EngineError::NotFound(format!("document {doctype_id}/{doc_id}")))?;
        doc.current_state_id = new_state_id;
        if let Some(ac) = new_ac_id {
            doc.current_ac_id = ac;
        }
        Ok(())
    }

    async fn set_title(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, title: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let doc = s.documents.get_mut(&(doctype_id.get(), doc_id.get())).ok_or_else(|| EngineError::NotFound(format!("document {doctype_id}/{doc_id}")))?;
        if doc.is_child() {
            return Err(EngineError::DocumentIsChild);
        }
        doc.title = Some(title.to_string());
        Ok(())
    }

    async fn set_data(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, body: serde_json::Value) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let doc = s.documents.get_mut(&(doctype_id.get(), doc_id.get())).ok_or_else(|| EngineError::NotFound(format!("document {doctype_id}/{doc_id}")))?;
        if doc.is_child() {
            return Err(EngineError::DocumentIsChild);
        }
        doc.body = body;
        Ok(())
    }

    async fn add_child_link(&self, _tx: Option<&mut Self::Tx>, parent_doctype_id: DocTypeId, parent_id: DocumentId, child_doctype_id: DocTypeId, child_id: DocumentId) -> Result<()> {
        self.state.lock().unwrap().children.push(DocumentChild { parent_doctype_id, parent_id, child_doctype_id, child_id });
        Ok(())
    }

    async fn children_of(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<DocumentChild>> {
        Ok(self.state.lock().unwrap().children.iter().filter(|c| c.parent_doctype_id == doctype_id && c.parent_id == doc_id).copied().collect())
    }

    async fn add_tag(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, tag: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let is_child = s.documents.get(&(doctype_id.get(), doc_id.get())).map(|d| d.is_child()).unwrap_or(false);
        if is_child {
            return Err(EngineError::DocumentIsChild);
        }
        let normalized = Tag::normalize(tag);
        let entry = s.tags.entry((doctype_id.get(), doc_id.get())).or_default();
        if !entry.contains(&normalized) {
            entry.push(normalized);
        }
        Ok(())
    }

    async fn tags_of(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().tags.get(&(doctype_id.get(), doc_id.get())).cloned().unwrap_or_default())
    }

    async fn insert_blob_row(&self, _tx: Option<&mut Self::Tx>, blob: Blob) -> Result<()> {
        self.state.lock().unwrap().blobs.entry((blob.doctype_id.get(), blob.doc_id.get())).or_default().push(blob);
        Ok(())
    }

    async fn blobs_of(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<Blob>> {
        Ok(self.state.lock().unwrap().blobs.get(&(doctype_id.get(), doc_id.get())).cloned().unwrap_or_default())
    }

    // ---- Events & join accounting ----

    async fn event_is_redundant(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<bool> {
        let s = self.state.lock().unwrap();
        Ok(s.events.iter().any(|e| {
            e.status == EventStatus::Applied
                && e.doctype_id == doctype_id
                && e.doc_id == doc_id
                && e.from_state_id == from_state_id
                && e.docaction_id == docaction_id
        }))
    }

    async fn insert_applied_event(&self, _tx: Option<&mut Self::Tx>, event: DocEvent) -> Result<DocEvent> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        let mut row = event;
        row.id = DocEventId(id);
        s.events.push(row.clone());
        Ok(row)
    }

    async fn join_progress(&self, _tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<BTreeSet<DocStateId>> {
        Ok(self.state.lock().unwrap().join_progress.get(&(node_id.get(), doc_id.get())).cloned().unwrap_or_default())
    }

    async fn record_join_progress(&self, _tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId, from_state_id: DocStateId) -> Result<()> {
        self.state.lock().unwrap().join_progress.entry((node_id.get(), doc_id.get())).or_default().insert(from_state_id);
        Ok(())
    }

    async fn clear_join_progress(&self, _tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<()> {
        self.state.lock().unwrap().join_progress.remove(&(node_id.get(), doc_id.get()));
        Ok(())
    }

    // ---- Messages & mailboxes ----

    async fn insert_message(&self, _tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, docevent_id: DocEventId, payload: MessagePayload) -> Result<Message> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        let row = Message { id: MessageId(id), doctype_id, doc_id, docevent_id, title: payload.title, body: payload.body };
        s.messages.insert(id, row.clone());
        Ok(row)
    }

    async fn insert_mailbox_row(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId) -> Result<MailboxRow> {
        let mut s = self.state.lock().unwrap();
        let id = s.alloc();
        let row = MailboxRow { id: MailboxId(id), group_id, message_id, unread: true, ctime: epoch() };
        s.mailboxes.insert(id, row.clone());
        Ok(row)
    }

    async fn get_message(&self, _tx: Option<&mut Self::Tx>, message_id: MessageId) -> Result<Option<Message>> {
        Ok(self.state.lock().unwrap().messages.get(&message_id.get()).cloned())
    }

    async fn count_by_group(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, unread: Option<bool>) -> Result<i64> {
        let s = self.state.lock().unwrap();
        Ok(s.mailboxes.values().filter(|m| m.group_id == group_id && unread.map_or(true, |u| m.unread == u)).count() as i64)
    }

    async fn count_by_user(&self, _tx: Option<&mut Self::Tx>, user_id: UserId, unread: Option<bool>) -> Result<i64> {
        let s = self.state.lock().unwrap();
        let groups: HashSet<i64> = s.group_members.iter().filter(|(_, m)| m.contains(&user_id.get())).map(|(g, _)| *g).collect();
        Ok(s.mailboxes.values().filter(|m| groups.contains(&m.group_id.get()) && unread.map_or(true, |u| m.unread == u)).count() as i64)
    }

    async fn list_by_group(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>> {
        let s = self.state.lock().unwrap();
        let mut rows: Vec<MailboxRow> = s.mailboxes.values().filter(|m| m.group_id == group_id && unread.map_or(true, |u| m.unread == u)).cloned().collect();
        rows.sort_by_key(|m| m.id.get());
        Ok(rows.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn list_by_user(&self, _tx: Option<&mut Self::Tx>, user_id: UserId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>> {
        let s = self.state.lock().unwrap();
        let groups: HashSet<i64> = s.group_members.iter().filter(|(_, m)| m.contains(&user_id.get())).map(|(g, _)| *g).collect();
        let mut rows: Vec<MailboxRow> = s.mailboxes.values().filter(|m| groups.contains(&m.group_id.get()) && unread.map_or(true, |u| m.unread == u)).cloned().collect();
        rows.sort_by_key(|m| m.id.get());
        Ok(rows.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn reassign_message(&self, _tx: Option<&mut Self::Tx>, from_group: GroupId, to_group: GroupId, message_id: MessageId) -> Result<()> {
        if from_group == to_group {
            return Ok(());
        }
        let mut s = self.state.lock().unwrap();
        let row = s.mailboxes.values_mut().find(|m| m.group_id == from_group && m.message_id == message_id)
            .ok_or_else(|| EngineError::NotFound("mailbox row for this (group, message)".into()))?;
        row.group_id = to_group;
        row.unread = true;
        Ok(())
    }

    async fn set_status_by_user(&self, _tx: Option<&mut Self::Tx>, user_id: UserId, message_id: MessageId, unread: bool) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let groups: HashSet<i64> = s.group_members.iter().filter(|(_, m)| m.contains(&user_id.get())).map(|(g, _)| *g).collect();
        for row in s.mailboxes.values_mut() {
            if row.message_id == message_id && groups.contains(&row.group_id.get()) {
                row.unread = unread;
            }
        }
        Ok(())
    }

    async fn set_status_by_group(&self, _tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId, unread: bool) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        for row in s.mailboxes.values_mut() {
            if row.message_id == message_id && row.group_id == group_id {
                row.unread = unread;
            }
        }
        Ok(())
    }
}

/// `MailboxRow::ctime` needs a timestamp; the in-memory backend has no
/// clock dependency elsewhere, so it stamps a fixed epoch rather than
/// pulling in a wall-clock source purely for test fixtures. `PgStore` uses
/// `now()` at the database.
fn epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(0, 0).unwrap()
}
