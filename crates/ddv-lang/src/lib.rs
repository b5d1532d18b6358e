//! `ddv-lang` compiles BQL graph queries into step pipelines, and rules and
//! HTML templates into closures cached by the checksum of their source.
//!
//! ## Examples
//!
//! ```rust
//! use ddv_lang::{FieldKind, Model, ModelDescriptor, ModelRegistry, Principal, Template, TemplateEngine};
//!
//! let pipeline = ddv_lang::compile_query("Person UNION Robot LIMIT 10").unwrap();
//! assert_eq!(pipeline.step_names(), vec!["Union", "ReturnFor", "Limit", "Project"]);
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(ModelDescriptor::new("Person").field("Name", FieldKind::String)).unwrap();
//!
//! let engine = TemplateEngine::new(registry);
//! let template = Template::new("greeting", "Hello [[@model.Name]]!");
//! let model = Model::new("Person").with("Name", "Ada");
//!
//! assert_eq!(engine.render(&template, &model, &Principal::anonymous()).unwrap(), "Hello Ada!");
//! ```
pub mod cache;
pub mod code;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod markup;
pub mod model;
pub mod options;
pub mod query;
pub mod rule;
pub mod runtime;
pub mod script;
pub mod template;

mod number;
mod range;
mod value;

pub use cache::{ArtifactCache, CacheStats, Checksum};
pub use code::{CodeContext, CompiledBlock, CompiledFunction, Outcome};
pub use error::Error;
pub use error::compile::CompileError;
pub use error::runtime::RuntimeError;
pub use error::syntax::{SyntaxError, SyntaxErrorKind};
pub use grammar::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_ERRORS, ErrorReporter, Grammar, Limits, Parsed, Validation};
pub use markup::MarkupGrammar;
pub use model::{FieldDescriptor, FieldKind, Model, ModelDescriptor, ModelRegistry, RegistryError};
pub use number::Number;
pub use options::Options;
pub use query::{
    ExecError, GraphStore, MemoryGraph, Pipeline, QueryEngine, QueryGrammar, QueryResult, QueryStep, compile_query,
    compile_query_with,
};
pub use range::{Position, Range};
pub use rule::RuleEngine;
pub use runtime::{Action, ChangeSet, DefaultRuntimeProvider, Principal, Runtime, RuntimeContract, RuntimeProvider};
pub use script::{BindingGrammar, ExpressionGrammar, RuleGrammar, ScriptGrammar};
pub use template::{Template, TemplateEngine};
pub use value::{Dict, Value};

/// The grammars accepted by [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    Query,
    Rule,
    Script,
    Expression,
    Markup,
}

/// Validates `text` under `grammar`, collecting every syntax error.
pub fn validate(grammar: GrammarKind, text: &str) -> Validation {
    match grammar {
        GrammarKind::Query => QueryGrammar::validate(text),
        GrammarKind::Rule => RuleGrammar::validate(text),
        GrammarKind::Script => ScriptGrammar::validate(text),
        GrammarKind::Expression => ExpressionGrammar::validate(text),
        GrammarKind::Markup => MarkupGrammar::validate(text),
    }
}
