//! Authorization port and the data-driven role matrix that backs it
use super::types::Actor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Assets,
    Borrow,
    Stationary,
    Purchasing,
    Tickets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Update,
    Approve,
    ApproveFinal,
    Reject,
    Issue,
    Receive,
    Return,
    Cancel,
    Close,
    Assign,
    Resolve,
}

/// How far a grant reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    Department,
    CrossDepartment,
    Global,
}

/// What the action touches: the record's department and owning user, when it has them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    pub department: Option<String>,
    pub owner: Option<String>,
}

impl ScopeContext {
    pub fn global() -> Self {
        Self::default()
    }
    pub fn owned_by(owner: &str) -> Self {
        Self {
            department: None,
            owner: Some(owner.to_string()),
        }
    }
    pub fn department(mut self, department: Option<&str>) -> Self {
        self.department = department.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub module: Module,
    /// empty means every action in the module
    #[serde(default)]
    pub actions: Vec<Action>,
    pub scope: Scope,
}

impl Grant {
    pub fn new(module: Module, actions: &[Action], scope: Scope) -> Self {
        Self {
            module,
            actions: actions.to_vec(),
            scope,
        }
    }
    pub fn all(module: Module, scope: Scope) -> Self {
        Self::new(module, &[], scope)
    }

    fn covers(&self, module: Module, action: Action) -> bool {
        self.module == module && (self.actions.is_empty() || self.actions.contains(&action))
    }

    fn reaches(&self, actor: &Actor, ctx: &ScopeContext) -> bool {
        let owns = ctx.owner.as_deref() == Some(actor.id.as_str());
        match self.scope {
            Scope::Own => owns,
            Scope::Department => {
                owns || (actor.department.is_some() && ctx.department == actor.department)
            }
            Scope::CrossDepartment => owns || ctx.department.is_some(),
            Scope::Global => true,
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub trait Authorizer: Send + Sync {
    fn can_perform(&self, actor: &Actor, module: Module, action: Action, ctx: &ScopeContext)
    -> bool;

    /// Module gating, independent of any specific action
    fn has_module_access(&self, actor: &Actor, module: Module) -> bool;
}

/// Role name -> grants. Roles not in the matrix grant nothing.
#[derive(Debug, Clone, Default)]
pub struct PolicyMatrix {
    roles: HashMap<String, Vec<Grant>>,
}

impl PolicyMatrix {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn grant(mut self, role: &str, grant: Grant) -> Self {
        self.roles.entry(role.to_string()).or_default().push(grant);
        self
    }

    fn grants_for<'a>(&'a self, actor: &'a Actor) -> impl Iterator<Item = &'a Grant> + 'a {
        actor
            .roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
    }
}

impl Authorizer for PolicyMatrix {
    fn can_perform(
        &self,
        actor: &Actor,
        module: Module,
        action: Action,
        ctx: &ScopeContext,
    ) -> bool {
        self.grants_for(actor)
            .any(|g| g.covers(module, action) && g.reaches(actor, ctx))
    }

    fn has_module_access(&self, actor: &Actor, module: Module) -> bool {
        self.grants_for(actor).any(|g| g.module == module)
    }
}
