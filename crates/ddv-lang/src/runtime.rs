//! The runtime contract: the `@member` names compiled code may reference, and
//! the provider that binds them to values for each invocation.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::model::{Model, ModelDescriptor};
use crate::value::{Dict, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContract {
    pub name: SmolStr,
    pub members: Vec<SmolStr>,
}

impl RuntimeContract {
    pub fn new<S: Into<SmolStr>>(name: impl Into<SmolStr>, members: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }

    /// Part of the checksum of anything compiled against this contract.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.members.join(","))
    }
}

/// Values bound to the contract's members for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Runtime {
    members: FxHashMap<SmolStr, Value>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.members.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    Read,
    Create,
    Update,
    Delete,
    Render,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "Read",
            Action::Create => "Create",
            Action::Update => "Update",
            Action::Delete => "Delete",
            Action::Render => "Render",
        };
        write!(f, "{}", name)
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Principal {
    pub id: SmolStr,
    #[serde(default)]
    pub name: SmolStr,
    #[serde(default)]
    pub roles: Vec<SmolStr>,
    #[serde(default)]
    pub claims: Dict,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(id: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<SmolStr>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut dict = Dict::new();
        dict.insert("id".into(), self.id.clone().into());
        dict.insert("name".into(), self.name.clone().into());
        dict.insert(
            "roles".into(),
            Value::Array(self.roles.iter().cloned().map(Value::from).collect()),
        );
        dict.insert("claims".into(), Value::Dict(self.claims.clone()));
        dict.insert("authenticated".into(), (!self.id.is_empty()).into());
        Value::Dict(dict)
    }
}

/// Field-level changes of an update: field name to `(old, new)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    changes: BTreeMap<SmolStr, (Value, Value)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change(mut self, field: impl Into<SmolStr>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        self.changes.insert(field.into(), (old.into(), new.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Dict(
            self.changes
                .iter()
                .map(|(field, (old, new))| {
                    let mut change = Dict::new();
                    change.insert("old".into(), old.clone());
                    change.insert("new".into(), new.clone());
                    (field.clone(), Value::Dict(change))
                })
                .collect(),
        )
    }
}

/// Binds the runtime contract's members for an invocation.
pub trait RuntimeProvider: Send + Sync {
    fn contract(&self) -> &RuntimeContract;

    fn runtime(
        &self,
        action: Action,
        principal: &Principal,
        model: &Model,
        descriptor: Option<&ModelDescriptor>,
        changes: &ChangeSet,
    ) -> Runtime;
}

/// Exposes `@model`, `@user`, `@action`, `@changes` and `@type`.
#[derive(Debug, Clone)]
pub struct DefaultRuntimeProvider {
    contract: RuntimeContract,
}

impl Default for DefaultRuntimeProvider {
    fn default() -> Self {
        Self {
            contract: RuntimeContract::new("default", ["model", "user", "action", "changes", "type"]),
        }
    }
}

impl RuntimeProvider for DefaultRuntimeProvider {
    fn contract(&self) -> &RuntimeContract {
        &self.contract
    }

    fn runtime(
        &self,
        action: Action,
        principal: &Principal,
        model: &Model,
        descriptor: Option<&ModelDescriptor>,
        changes: &ChangeSet,
    ) -> Runtime {
        let model_type = match descriptor {
            Some(descriptor) => {
                let mut dict = Dict::new();
                dict.insert("name".into(), descriptor.name.clone().into());
                dict.insert(
                    "fields".into(),
                    Value::Array(descriptor.fields.iter().map(|field| field.name.clone().into()).collect()),
                );
                Value::Dict(dict)
            }
            None => model.model_type.clone().into(),
        };

        Runtime::new()
            .with("model", model.to_value())
            .with("user", principal.to_value())
            .with("action", action.to_string())
            .with("changes", changes.to_value())
            .with("type", model_type)
    }
}
