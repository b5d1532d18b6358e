use std::fmt::{self, Display, Formatter};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::value::{Dict, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown model type \"{0}\"")]
    UnknownModelType(SmolStr),
    #[error("Model \"{model_type}\" is missing field \"{field}\"")]
    MissingField { model_type: SmolStr, field: SmolStr },
    #[error("Field \"{field}\" of model \"{model_type}\" must be {expected}, got {actual}")]
    InvalidFieldType {
        model_type: SmolStr,
        field: SmolStr,
        expected: FieldKind,
        actual: SmolStr,
    },
    #[error("Model type \"{0}\" is already registered")]
    DuplicateModelType(SmolStr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    Bool,
    Number,
    String,
    Array,
    Dict,
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::Any, _)
                | (_, Value::None)
                | (FieldKind::Bool, Value::Bool(_))
                | (FieldKind::Number, Value::Number(_))
                | (FieldKind::String, Value::String(_))
                | (FieldKind::Array, Value::Array(_))
                | (FieldKind::Dict, Value::Dict(_))
        )
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Any => "any",
            FieldKind::Bool => "bool",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::Array => "array",
            FieldKind::Dict => "dict",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<SmolStr>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
        });
        self
    }
}

/// An instance of a registered model type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    #[serde(rename = "type")]
    pub model_type: SmolStr,
    #[serde(default)]
    pub fields: Dict,
}

impl Model {
    pub fn new(model_type: impl Into<SmolStr>) -> Self {
        Self {
            model_type: model_type.into(),
            fields: Dict::new(),
        }
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The model's fields as a dict value, the shape compiled code sees through `@model`.
    pub fn to_value(&self) -> Value {
        Value::Dict(self.fields.clone())
    }
}

/// Model types known to the query compiler and the template/rule engines.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: FxHashMap<SmolStr, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) -> Result<(), RegistryError> {
        if self.models.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateModelType(descriptor.name));
        }
        self.models.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Loads a JSON array of model descriptors.
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let descriptors: Vec<ModelDescriptor> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.models
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModelType(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn type_of<'a>(&'a self, model: &Model) -> Result<&'a ModelDescriptor, RegistryError> {
        self.get(&model.model_type)
    }

    pub fn names(&self) -> Vec<&SmolStr> {
        let mut names: Vec<_> = self.models.keys().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Checks that the instance's type is registered and that every declared field is present with its kind.
    pub fn validate(&self, model: &Model) -> Result<(), RegistryError> {
        let descriptor = self.type_of(model)?;

        descriptor.fields.iter().try_for_each(|field| {
            let value = match model.fields.get(&field.name) {
                Some(value) => value,
                None if field.kind == FieldKind::Any => return Ok(()),
                None => {
                    return Err(RegistryError::MissingField {
                        model_type: descriptor.name.clone(),
                        field: field.name.clone(),
                    });
                }
            };

            if field.kind.accepts(value) {
                Ok(())
            } else {
                Err(RegistryError::InvalidFieldType {
                    model_type: descriptor.name.clone(),
                    field: field.name.clone(),
                    expected: field.kind,
                    actual: value.type_name().into(),
                })
            }
        })
    }
}
