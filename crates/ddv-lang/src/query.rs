//! BQL: graph queries compiled into a pipeline of join, aggregate, sort, limit
//! and projection steps.

pub mod ast;
pub mod compiler;
pub mod exec;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod step;
pub mod token;

use std::sync::Arc;

pub use ast::{Aggregator, CompareOp, Direction, Predicate, QueryExpression, ReturnType, SortExpression};
pub use compiler::{QueryVisitor, StepCompiler, walk_query};
pub use exec::{ExecError, Executor, QueryResult, ResultNode, ResultPath};
pub use graph::{GraphStore, MemoryGraph, Vertex};
pub use parser::Parser;
pub use step::{AggregateStep, Pipeline, QueryStep};

use crate::cache::{ArtifactCache, Checksum};
use crate::error::Error;
use crate::grammar::{Grammar, Limits, Parsed};
use crate::model::ModelRegistry;
use crate::options::Options;

pub struct QueryGrammar;

impl Grammar for QueryGrammar {
    type Tree = QueryExpression;

    fn parse_with(text: &str, limits: Limits) -> Parsed<QueryExpression> {
        let tokens = lexer::tokenize(text);
        let (tree, reporter) = Parser::with_max_errors(&tokens, limits.max_errors).parse();
        Parsed { tree, reporter }
    }
}

/// Parses, validates and compiles `text` into a step pipeline.
pub fn compile_query(text: &str) -> Result<Pipeline, Error> {
    compile(text, None, &Options::default())
}

/// Like [`compile_query`], additionally rejecting vertex model types missing from `registry`.
pub fn compile_query_with(text: &str, registry: &ModelRegistry) -> Result<Pipeline, Error> {
    compile(text, Some(registry), &Options::default())
}

fn compile(text: &str, registry: Option<&ModelRegistry>, options: &Options) -> Result<Pipeline, Error> {
    let tree = QueryGrammar::parse_with(text, Limits::from(options))
        .into_result()
        .map_err(|errors| Error::from_error(text, errors))?;

    let compiler = match registry {
        Some(registry) => StepCompiler::with_registry(registry),
        None => StepCompiler::new(),
    };

    compiler.compile(&tree).map_err(|e| Error::from_error(text, e))
}

/// Compiles named queries through the artifact cache and runs them.
#[derive(Debug, Default)]
pub struct QueryEngine {
    cache: ArtifactCache<Pipeline>,
    registry: Option<Arc<ModelRegistry>>,
    options: Options,
}

impl QueryEngine {
    const MODEL_TYPE: &'static str = "query";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_registry(&mut self, registry: Arc<ModelRegistry>) {
        self.registry = Some(registry);
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn cache(&self) -> &ArtifactCache<Pipeline> {
        &self.cache
    }

    /// Compiles `text`; with a `name` the pipeline is cached until the text changes.
    pub fn compile(&self, name: Option<&str>, text: &str) -> Result<Arc<Pipeline>, Error> {
        let name = name.filter(|_| self.options.cache);

        self.cache.get_or_build(name, Self::MODEL_TYPE, Checksum::of(text), || {
            compile(text, self.registry.as_deref(), &self.options)
        })
    }

    pub fn execute<G: GraphStore + ?Sized>(&self, graph: &G, pipeline: &Pipeline) -> Result<QueryResult, Error> {
        Executor::new(graph)
            .execute(pipeline)
            .map_err(|e| Error::from_error(pipeline.to_string(), e))
    }

    pub fn query<G: GraphStore + ?Sized>(
        &self,
        graph: &G,
        name: Option<&str>,
        text: &str,
    ) -> Result<QueryResult, Error> {
        let pipeline = self.compile(name, text)?;
        self.execute(graph, &pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InnerError;
    use crate::error::compile::CompileError;
    use crate::error::syntax::SyntaxErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("A UNION B", true)]
    #[case("Person(age > 30)-[knows]->* ORDER BY name DESC LIMIT 0, 10 RETURNS PATHS", true)]
    #[case("A UNION", false)]
    #[case("A LIMIT 1 ORDER BY name", false)]
    #[case("a union b", false)]
    fn test_validate(#[case] query: &str, #[case] ok: bool) {
        assert_eq!(QueryGrammar::validate(query).ok, ok);
    }

    #[test]
    fn test_compile_query_reports_syntax_errors() {
        let err = compile_query("A UNION").unwrap_err();
        assert_eq!(err.syntax_errors().len(), 1);
        assert_eq!(err.syntax_errors()[0].kind, SyntaxErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_engine_caches_named_queries() {
        let engine = QueryEngine::new();
        let first = engine.compile(Some("people"), "Person").unwrap();
        let second = engine.compile(Some("people"), "Person").unwrap();
        let changed = engine.compile(Some("people"), "Person LIMIT 1").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(engine.cache().stats().builds, 2);
    }

    #[test]
    fn test_engine_with_registry() {
        let mut engine = QueryEngine::new();
        engine.set_registry(Arc::new(ModelRegistry::new()));

        let err = engine.compile(None, "Person").unwrap_err();
        assert_eq!(
            err.cause,
            InnerError::Compile(CompileError::UnknownModelType("Person".into()))
        );
        assert!(engine.cache().is_empty());
    }
}
