//! HTML templates with `[[ ]]` interpolation, `<ddv>` scriptlets and the
//! `ddv-repeat` / `ddv-if` control attributes, compiled once per model type.

pub mod evaluator;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

pub use evaluator::{IF_ATTRIBUTE, REPEAT_ATTRIBUTE, Segment, segments};

use crate::cache::{ArtifactCache, Checksum};
use crate::code::{CodeContext, CompileEnv, CompiledBlock, CompiledFunction, ContextKind};
use crate::error::Error;
use crate::error::compile::CompileError;
use crate::grammar::{Grammar, Limits};
use crate::markup::MarkupGrammar;
use crate::model::{Model, ModelRegistry};
use crate::options::Options;
use crate::runtime::{Action, ChangeSet, DefaultRuntimeProvider, Principal, RuntimeProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: SmolStr,
    pub source: String,
    /// Model types the template renders; empty means every registered type.
    #[serde(default)]
    pub model_types: Vec<SmolStr>,
}

impl Template {
    pub fn new(name: impl Into<SmolStr>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            model_types: Vec::new(),
        }
    }

    pub fn supporting(mut self, model_type: impl Into<SmolStr>) -> Self {
        self.model_types.push(model_type.into());
        self
    }

    pub fn supports(&self, model_type: &str) -> bool {
        self.model_types.is_empty() || self.model_types.iter().any(|supported| supported == model_type)
    }
}

/// Compiles templates against registered model types and renders model instances with them.
pub struct TemplateEngine {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn RuntimeProvider>,
    options: Options,
    functions: ArtifactCache<CompiledFunction>,
    blocks: ArtifactCache<CompiledBlock>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(ModelRegistry::new())
    }
}

impl TemplateEngine {
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

    /// Replaces the runtime provider. Compiled templates are dropped since they
    /// were resolved against the previous contract.
    pub fn set_provider(&mut self, provider: Arc<dyn RuntimeProvider>) {
        self.provider = provider;
        self.clear_cache();
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
        self.clear_cache();
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn functions(&self) -> &ArtifactCache<CompiledFunction> {
        &self.functions
    }

    pub fn blocks(&self) -> &ArtifactCache<CompiledBlock> {
        &self.blocks
    }

    pub fn clear_cache(&self) {
        self.functions.clear();
        self.blocks.clear();
    }

    /// Compiles `template` for `model_type`, reusing the cached function while the source is unchanged.
    pub fn compile(&self, template: &Template, model_type: &str) -> Result<Arc<CompiledFunction>, Error> {
        self.registry
            .get(model_type)
            .map_err(|e| Error::from_error(template.source.as_str(), e))?;

        if !template.supports(model_type) {
            return Err(Error::from_error(
                template.source.as_str(),
                CompileError::UnsupportedModelType {
                    template: template.name.clone(),
                    model_type: model_type.into(),
                },
            ));
        }

        let name = Some(template.name.as_str()).filter(|_| self.options.cache);
        let checksum = Checksum::of(&template.source);

        self.functions
            .get_or_build(name, model_type, checksum, || {
                let document = MarkupGrammar::parse_with(&template.source, Limits::from(&self.options)).tree;
                let env = CompileEnv {
                    contract: self.provider.contract(),
                    blocks: &self.blocks,
                    options: &self.options,
                };

                let mut context = CodeContext::new(env, ContextKind::Template, name, model_type, checksum);
                evaluator::evaluate(&mut context, &document)?;
                let function = context.complete();

                debug!(
                    template = %template.name,
                    model_type,
                    diagnostics = function.diagnostics.len(),
                    "Compiled template"
                );
                Ok::<_, CompileError>(function)
            })
            .map_err(|e| Error::from_error(template.source.as_str(), e))
    }

    pub fn render(&self, template: &Template, model: &Model, principal: &Principal) -> Result<String, Error> {
        self.render_with(template, model, principal, Action::Render, &ChangeSet::new())
    }

    /// Renders `model`; a fault raised while rendering replaces the output with its description.
    pub fn render_with(
        &self,
        template: &Template,
        model: &Model,
        principal: &Principal,
        action: Action,
        changes: &ChangeSet,
    ) -> Result<String, Error> {
        let function = self.compile(template, &model.model_type)?;
        let descriptor = self
            .registry
            .validate(model)
            .and_then(|_| self.registry.type_of(model))
            .map_err(|e| Error::from_error(template.source.as_str(), e))?;

        let runtime = self
            .provider
            .runtime(action, principal, model, Some(descriptor), changes);
        Ok(function.invoke(&runtime).into_text())
    }
}
