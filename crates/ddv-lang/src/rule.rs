//! Rules: scripts whose last statement yields a value, evaluated against a model
//! instance, typically to decide whether an action is allowed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{ArtifactCache, Checksum};
use crate::code::{CodeContext, CompileEnv, CompiledBlock, CompiledFunction, ContextKind, Outcome};
use crate::error::Error;
use crate::error::compile::CompileError;
use crate::grammar::{Grammar, Limits};
use crate::model::{Model, ModelRegistry};
use crate::options::Options;
use crate::runtime::{Action, ChangeSet, DefaultRuntimeProvider, Principal, RuntimeProvider};
use crate::script::RuleGrammar;

pub struct RuleEngine {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn RuntimeProvider>,
    options: Options,
    functions: ArtifactCache<CompiledFunction>,
    blocks: ArtifactCache<CompiledBlock>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(ModelRegistry::new())
    }
}

impl RuleEngine {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            provider: Arc::new(DefaultRuntimeProvider::default()),
            options: Options::default(),
            functions: ArtifactCache::new(),
            blocks: ArtifactCache::new(),
        }
    }

    pub fn set_registry(&mut self, registry: Arc<ModelRegistry>) {
        self.registry = registry;
    }

    pub fn set_provider(&mut self, provider: Arc<dyn RuntimeProvider>) {
        self.provider = provider;
        self.functions.clear();
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
        self.functions.clear();
    }

    pub fn functions(&self) -> &ArtifactCache<CompiledFunction> {
        &self.functions
    }

    /// Compiles the rule `name` for `model_type`; any syntax or resolution error fails the compilation.
    pub fn compile(&self, name: &str, model_type: &str, source: &str) -> Result<Arc<CompiledFunction>, Error> {
        self.registry
            .get(model_type)
            .map_err(|e| Error::from_error(source, e))?;

        let name = Some(name).filter(|_| self.options.cache);
        let checksum = Checksum::of(source);

        self.functions
            .get_or_build(name, model_type, checksum, || {
                let program = RuleGrammar::parse_with(source, Limits::from(&self.options))
                    .into_result()
                    .map_err(CompileError::Syntax)?;
                let env = CompileEnv {
                    contract: self.provider.contract(),
                    blocks: &self.blocks,
                    options: &self.options,
                };

                let mut context = CodeContext::new(env, ContextKind::Rule, name, model_type, checksum);
                context.append_statements(&program)?;
                debug!(rule = name, model_type, "Compiled rule");
                Ok::<_, CompileError>(context.complete())
            })
            .map_err(|e| Error::from_error(source, e))
    }

    /// Runs `rule` against `model`. Faults are part of the outcome; an unregistered,
    /// invalid or mismatched model is an error.
    pub fn evaluate(
        &self,
        rule: &CompiledFunction,
        model: &Model,
        principal: &Principal,
        action: Action,
        changes: &ChangeSet,
    ) -> Result<Outcome, Error> {
        if model.model_type != rule.model_type {
            return Err(Error::from_error(
                "",
                CompileError::UnsupportedModelType {
                    template: rule.name.clone().unwrap_or_default(),
                    model_type: model.model_type.clone(),
                },
            ));
        }

        let descriptor = self
            .registry
            .validate(model)
            .and_then(|_| self.registry.type_of(model))
            .map_err(|e| Error::from_error("", e))?;

        let runtime = self
            .provider
            .runtime(action, principal, model, Some(descriptor), changes);
        Ok(rule.invoke(&runtime))
    }

    /// Whether `rule` grants `action`. Only a truthy value allows it; faults and errors deny.
    pub fn authorize(
        &self,
        rule: &CompiledFunction,
        model: &Model,
        principal: &Principal,
        action: Action,
        changes: &ChangeSet,
    ) -> bool {
        match self.evaluate(rule, model, principal, action, changes) {
            Ok(Outcome::Value(value)) => value.is_truthy(),
            Ok(Outcome::Fault(fault)) => {
                warn!(rule = rule.name.as_deref(), %action, %fault, "Rule faulted, denying");
                false
            }
            Err(error) => {
                warn!(rule = rule.name.as_deref(), %action, %error, "Rule could not be evaluated, denying");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InnerError;
    use crate::error::syntax::SyntaxErrorKind;
    use crate::model::{FieldKind, ModelDescriptor, RegistryError};
    use crate::value::Value;
    use rstest::{fixture, rstest};

    #[fixture]
    fn engine() -> RuleEngine {
        let mut registry = ModelRegistry::new();
        registry
            .register(ModelDescriptor::new("Document").field("Owner", FieldKind::String))
            .unwrap();
        RuleEngine::new(registry)
    }

    fn document() -> Model {
        Model::new("Document").with("Owner", "u1").with("Pages", 12)
    }

    #[rstest]
    #[case("@model.Pages * 2", Outcome::Value(Value::from(24)))]
    #[case("let n = 0; for (i in range(4)) { n = n + i; } n", Outcome::Value(Value::from(6)))]
    #[case("if (@model.Pages > 10) { return \"long\"; } \"short\"", Outcome::Value(Value::from("long")))]
    #[case("@model.Missing.deeper == null", Outcome::Value(Value::TRUE))]
    #[case("upper(@model.Pages)", Outcome::Fault("Invalid types for \"upper\", got number".into()))]
    fn test_evaluate(engine: RuleEngine, #[case] source: &str, #[case] expected: Outcome) {
        let rule = engine.compile("r", "Document", source).unwrap();
        let outcome = engine
            .evaluate(&rule, &document(), &Principal::anonymous(), Action::Read, &ChangeSet::new())
            .unwrap();
        assert_eq!(outcome, expected);
    }

    #[rstest]
    #[case("@user.id == @model.Owner", "u1", true)]
    #[case("@user.id == @model.Owner", "u2", false)]
    #[case("contains(@user.roles, \"admin\") || @action == \"Read\"", "u2", true)]
    #[case("error(\"nope\")", "u1", false)]
    #[case("@model.Pages", "u1", true)]
    fn test_authorize(engine: RuleEngine, #[case] source: &str, #[case] user: &str, #[case] allowed: bool) {
        let rule = engine.compile("owner", "Document", source).unwrap();
        let principal = Principal::new(user, user);
        assert_eq!(
            engine.authorize(&rule, &document(), &principal, Action::Read, &ChangeSet::new()),
            allowed
        );
    }

    #[rstest]
    fn test_rule_must_end_with_value(engine: RuleEngine) {
        let err = engine.compile("r", "Document", "let x = 1;").unwrap_err();
        assert_eq!(err.syntax_errors()[0].kind, SyntaxErrorKind::MissingValue);
        assert!(engine.functions().is_empty());
    }

    #[rstest]
    fn test_unknown_member_fails_compilation(engine: RuleEngine) {
        let err = engine.compile("r", "Document", "@request.ip").unwrap_err();
        assert!(matches!(
            err.cause,
            InnerError::Compile(CompileError::UnknownRuntimeMember(_, ref name)) if name == "request"
        ));
    }

    #[rstest]
    fn test_compile_rejects_unregistered_type(engine: RuleEngine) {
        let err = engine.compile("r", "Invoice", "true").unwrap_err();
        assert_eq!(
            err.cause,
            InnerError::Registry(RegistryError::UnknownModelType("Invoice".into()))
        );
    }

    #[rstest]
    fn test_evaluate_rejects_invalid_model(engine: RuleEngine) {
        let rule = engine.compile("r", "Document", "true").unwrap();
        let model = Model::new("Document").with("Owner", 1);
        let err = engine
            .evaluate(&rule, &model, &Principal::anonymous(), Action::Read, &ChangeSet::new())
            .unwrap_err();
        assert!(matches!(err.cause, InnerError::Registry(RegistryError::InvalidFieldType { .. })));
    }

    #[rstest]
    fn test_compiled_rule_is_cached(engine: RuleEngine) {
        let first = engine.compile("r", "Document", "true").unwrap();
        let second = engine.compile("r", "Document", "true").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
