use std::mem;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::{debug, warn};

use super::compiled::{self, CompiledBlock, CompiledFunction, Frame, Outcome, Unwind};
use super::ir::Code;
use super::lower::Lowering;
use super::scope::ScopeStack;
use crate::cache::{ArtifactCache, Checksum};
use crate::error::compile::CompileError;
use crate::grammar::{Grammar, Limits};
use crate::options::Options;
use crate::runtime::{Runtime, RuntimeContract};
use crate::script::ast::{Expr, Program, Stmt};
use crate::script::{BindingGrammar, ExpressionGrammar, ScriptGrammar};
use crate::value::Value;

/// What the compiled function of a context returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// The accumulated output text.
    Template,
    /// The value of the last statement, or of the first `return`.
    Rule,
}

/// Everything a context shares with the engine that created it.
#[derive(Clone, Copy)]
pub struct CompileEnv<'a> {
    pub contract: &'a RuntimeContract,
    pub blocks: &'a ArtifactCache<CompiledBlock>,
    pub options: &'a Options,
}

pub enum Completion {
    Function(CompiledFunction),
    Block(CompiledBlock),
}

/// Accumulates the statements of one compilation unit.
///
/// A template evaluator drives a context fragment by fragment: literal text,
/// inline `[[ ]]` expressions, `<ddv>` scriptlets and nested `ForEach`/`If`
/// sub-scopes. A fragment that fails to compile is reported as a diagnostic and,
/// when error markers are enabled, replaced by a marker comment in the output.
pub struct CodeContext<'a> {
    env: CompileEnv<'a>,
    kind: ContextKind,
    name: Option<SmolStr>,
    model_type: SmolStr,
    checksum: Checksum,
    statements: Vec<Code>,
    text: String,
    scopes: ScopeStack,
    nested: usize,
    diagnostics: Vec<CompileError>,
}

impl<'a> CodeContext<'a> {
    pub fn new(
        env: CompileEnv<'a>,
        kind: ContextKind,
        name: Option<&str>,
        model_type: &str,
        checksum: Checksum,
    ) -> Self {
        Self {
            env,
            kind,
            name: name.map(SmolStr::new),
            model_type: model_type.into(),
            checksum,
            statements: Vec::new(),
            text: String::new(),
            scopes: ScopeStack::new(),
            nested: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub fn options(&self) -> &Options {
        self.env.options
    }

    pub fn diagnostics(&self) -> &[CompileError] {
        &self.diagnostics
    }

    /// Buffers literal output; consecutive text is emitted as one statement.
    pub fn append_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Compiles an inline `[[ ]]` expression whose value is written to the output.
    pub fn append_inline(&mut self, source: &str) {
        let expr = match ExpressionGrammar::parse_with(source, Limits::from(self.env.options)).into_result() {
            Ok(expr) => expr,
            Err(errors) => return self.append_error(source, CompileError::Syntax(errors)),
        };

        match self.lower(|lowering| lowering.expr(&expr)) {
            Ok(code) => {
                self.flush_text();
                self.statements.push(Code::Emit(Box::new(code)));
            }
            Err(error) => self.append_error(source, error),
        }
    }

    /// Compiles a `<ddv>` scriptlet. Its statements run for their effects; only `write` produces output.
    pub fn append_code(&mut self, source: &str) {
        let program = match ScriptGrammar::parse_with(source, Limits::from(self.env.options)).into_result() {
            Ok(program) => program,
            Err(errors) => return self.append_error(source, CompileError::Syntax(errors)),
        };

        match self.lower(|lowering| lowering.statements(&program.statements)) {
            Ok(code) => {
                self.flush_text();
                self.statements.extend(code);
            }
            Err(error) => self.append_error(source, error),
        }
    }

    /// Appends a whole rule program; unlike template fragments, any error fails the compilation.
    pub fn append_statements(&mut self, program: &Program) -> Result<(), CompileError> {
        let code = self.lower(|lowering| lowering.statements(&program.statements))?;
        self.flush_text();
        self.statements.extend(code);
        Ok(())
    }

    /// Opens a `ForEach` sub-scope over `binding_source` (`x in expr` or a bare
    /// expression binding `item`) and lets `body` fill it.
    pub fn append_for<F>(&mut self, binding_source: &str, body_source: &str, body: F) -> Result<(), CompileError>
    where
        F: FnOnce(&mut CodeContext<'a>) -> Result<(), CompileError>,
    {
        let binding = match BindingGrammar::parse_with(binding_source, Limits::from(self.env.options)).into_result() {
            Ok(binding) => binding,
            Err(errors) => {
                self.append_error(binding_source, CompileError::Syntax(errors));
                return Ok(());
            }
        };

        let iterable = match self.lower(|lowering| lowering.expr(&binding.iterable)) {
            Ok(iterable) => iterable,
            Err(error) => {
                self.append_error(binding_source, error);
                return Ok(());
            }
        };

        let mut parent = scopeguard::guard(self, |context| context.scopes.pop());
        parent.scopes.push();
        let slot = parent.scopes.declare(&binding.variable.name);
        let block = parent.nested_block("ForEach", body_source, body)?;

        parent.flush_text();
        parent.statements.push(Code::Loop {
            slot,
            iterable: Box::new(iterable),
            body: Box::new(Code::Nested(block)),
        });
        Ok(())
    }

    /// Opens an `If` sub-scope guarded by `condition_source` and lets `body` fill it.
    pub fn append_if<F>(&mut self, condition_source: &str, body_source: &str, body: F) -> Result<(), CompileError>
    where
        F: FnOnce(&mut CodeContext<'a>) -> Result<(), CompileError>,
    {
        let condition = match ExpressionGrammar::parse_with(condition_source, Limits::from(self.env.options))
            .into_result()
            .map_err(CompileError::Syntax)
            .and_then(|condition: Expr| self.lower(|lowering| lowering.expr(&condition)))
        {
            Ok(condition) => condition,
            Err(error) => {
                self.append_error(condition_source, error);
                return Ok(());
            }
        };

        let mut parent = scopeguard::guard(self, |context| context.scopes.pop());
        parent.scopes.push();
        let block = parent.nested_block("If", body_source, body)?;

        parent.flush_text();
        parent.statements.push(Code::Conditional {
            condition: Box::new(condition),
            then: Box::new(Code::Nested(block)),
            otherwise: Box::new(Code::NONE),
        });
        Ok(())
    }

    /// Closes the context: `compile = true` yields the top-level function,
    /// `false` the body of a nested sub-scope.
    pub fn complete_scope(&mut self, compile: bool) -> Completion {
        if compile {
            Completion::Function(self.complete())
        } else {
            Completion::Block(self.complete_block())
        }
    }

    /// Builds the top-level function. Faults raised while it runs are caught
    /// and returned as the fault's description.
    pub fn complete(&mut self) -> CompiledFunction {
        self.flush_text();

        let scopes = scopeguard::guard(&mut self.scopes, ScopeStack::clear);
        let slot_count = scopes.slot_count();
        let body = compiled::compile(&Code::Block(mem::take(&mut self.statements)));
        let max_iterations = self.env.options.max_iterations;

        let routine: compiled::Routine = match self.kind {
            ContextKind::Template => Arc::new(move |runtime: &Runtime| {
                let mut frame = Frame::new(runtime, slot_count, max_iterations);
                match body(&mut frame) {
                    Ok(_) | Err(Unwind::Return(_)) => Outcome::Value(Value::String(frame.into_output())),
                    Err(Unwind::Fault(error)) => Outcome::Fault(error.to_string()),
                }
            }),
            ContextKind::Rule => Arc::new(move |runtime: &Runtime| {
                let mut frame = Frame::new(runtime, slot_count, max_iterations);
                match body(&mut frame) {
                    Ok(value) | Err(Unwind::Return(value)) => Outcome::Value(value),
                    Err(Unwind::Fault(error)) => Outcome::Fault(error.to_string()),
                }
            }),
        };

        debug!(
            name = self.name.as_deref(),
            model_type = %self.model_type,
            slot_count,
            diagnostics = self.diagnostics.len(),
            "Compiled function"
        );

        CompiledFunction {
            name: self.name.clone(),
            model_type: self.model_type.clone(),
            checksum: self.checksum,
            slot_count,
            diagnostics: mem::take(&mut self.diagnostics),
            routine,
        }
    }

    pub fn complete_block(&mut self) -> CompiledBlock {
        self.flush_text();

        CompiledBlock {
            name: self.name.clone(),
            checksum: self.checksum,
            slot_count: self.scopes.slot_count(),
            diagnostics: mem::take(&mut self.diagnostics),
            body: compiled::compile(&Code::Block(mem::take(&mut self.statements))),
        }
    }

    /// Compiles the body of a sub-scope, or reuses the block cached under the
    /// same synthetic name when its source and visible bindings are unchanged.
    fn nested_block<F>(&mut self, prefix: &str, body_source: &str, body: F) -> Result<Arc<CompiledBlock>, CompileError>
    where
        F: FnOnce(&mut CodeContext<'a>) -> Result<(), CompileError>,
    {
        self.nested += 1;
        let name = self
            .name
            .as_ref()
            .map(|parent| SmolStr::new(format!("{}.{}_{}", parent, prefix, self.nested)));
        let checksum = Checksum::of_parts(&[
            body_source,
            prefix,
            self.scopes.signature().as_str(),
            self.env.contract.signature().as_str(),
        ]);

        let block = self
            .env
            .blocks
            .get_or_build(name.as_deref(), &self.model_type, checksum, || {
                let mut nested = CodeContext {
                    env: self.env,
                    kind: self.kind,
                    name: name.clone(),
                    model_type: self.model_type.clone(),
                    checksum,
                    statements: Vec::new(),
                    text: String::new(),
                    scopes: self.scopes.clone(),
                    nested: 0,
                    diagnostics: Vec::new(),
                };
                body(&mut nested)?;
                Ok::<_, CompileError>(nested.complete_block())
            })?;

        self.scopes.reserve(block.slot_count);
        self.diagnostics.extend(block.diagnostics.iter().cloned());
        Ok(block)
    }

    /// Lowers against a copy of the scopes, committing declarations only on success.
    fn lower<T>(&mut self, f: impl FnOnce(&mut Lowering<'_>) -> Result<T, CompileError>) -> Result<T, CompileError> {
        let mut scopes = self.scopes.clone();
        let lowered = f(&mut Lowering::new(&mut scopes, self.env.contract))?;
        self.scopes = scopes;
        Ok(lowered)
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.statements.push(Code::Text(mem::take(&mut self.text)));
        }
    }

    /// Reports a fragment that failed to compile, leaving a marker in the output when enabled.
    pub fn append_error(&mut self, source: &str, error: CompileError) {
        warn!(
            name = self.name.as_deref(),
            model_type = %self.model_type,
            source,
            %error,
            "Failed to compile template fragment"
        );

        if self.env.options.error_markers {
            self.append_text(&marker(&error));
        }
        self.diagnostics.push(error);
    }
}

/// An HTML comment standing in for a fragment that failed to compile.
pub fn marker(error: &CompileError) -> String {
    format!("<!--[ddv] {} -->", error.to_string().replace("--", "- -"))
}

/// Whether the last statement of a rule program yields its value.
pub fn is_value_program(program: &Program) -> bool {
    program.statements.last().is_some_and(Stmt::is_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dict;
    use rstest::{fixture, rstest};

    struct Env {
        contract: RuntimeContract,
        blocks: ArtifactCache<CompiledBlock>,
        options: Options,
    }

    impl Env {
        fn env(&self) -> CompileEnv<'_> {
            CompileEnv {
                contract: &self.contract,
                blocks: &self.blocks,
                options: &self.options,
            }
        }

        fn context(&self, kind: ContextKind) -> CodeContext<'_> {
            CodeContext::new(self.env(), kind, Some("page"), "Person", Checksum::of("page"))
        }
    }

    #[fixture]
    fn env() -> Env {
        Env {
            contract: RuntimeContract::new("test", ["model"]),
            blocks: ArtifactCache::new(),
            options: Options::default(),
        }
    }

    fn person() -> Runtime {
        Runtime::new().with(
            "model",
            Dict::from([
                ("Name".into(), Value::from("Ada")),
                ("Tags".into(), Value::from(vec!["a", "b"])),
            ]),
        )
    }

    #[rstest]
    fn test_text_and_inline(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context.append_text("Hello ");
        context.append_inline("@model.Name");
        context.append_text("!");

        let function = context.complete();
        assert_eq!(function.invoke(&person()), Outcome::Value("Hello Ada!".into()));
        assert!(function.diagnostics.is_empty());
    }

    #[rstest]
    fn test_inline_error_becomes_marker(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context.append_text("a");
        context.append_inline("missing");
        context.append_text("b");

        let function = context.complete();
        assert_eq!(
            function.invoke(&person()),
            Outcome::Value("a<!--[ddv] Undefined variable \"missing\" -->b".into())
        );
        assert_eq!(function.diagnostics.len(), 1);
    }

    #[rstest]
    fn test_markers_disabled(mut env: Env) {
        env.options.error_markers = false;
        let mut context = env.context(ContextKind::Template);
        context.append_text("a");
        context.append_inline("1 +");

        assert_eq!(context.complete().invoke(&person()), Outcome::Value("a".into()));
    }

    #[rstest]
    fn test_for_each_sub_scope(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context
            .append_for("tag in @model.Tags", "<[[tag]]>", |nested| {
                nested.append_text("<");
                nested.append_inline("tag");
                nested.append_text(">");
                Ok(())
            })
            .unwrap();

        assert_eq!(context.scopes().depth(), 1);
        let function = context.complete();
        assert_eq!(function.invoke(&person()), Outcome::Value("<a><b>".into()));
        assert!(env.blocks.checksum("page.ForEach_1", "Person").is_some());
    }

    #[rstest]
    fn test_if_sub_scope(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context
            .append_if("@model.Name == \"Bob\"", "bob", |nested| {
                nested.append_text("bob");
                Ok(())
            })
            .unwrap();
        context
            .append_if("@model.Name == \"Ada\"", "ada", |nested| {
                nested.append_text("ada");
                Ok(())
            })
            .unwrap();

        assert_eq!(context.complete().invoke(&person()), Outcome::Value("ada".into()));
        assert!(env.blocks.get("page.If_2", "Person").is_some());
    }

    #[rstest]
    fn test_unchanged_sub_scope_is_reused(env: Env) {
        for _ in 0..2 {
            let mut context = env.context(ContextKind::Template);
            context
                .append_for("@model.Tags", "[[item]]", |nested| {
                    nested.append_inline("item");
                    Ok(())
                })
                .unwrap();
            assert_eq!(context.complete().invoke(&person()), Outcome::Value("ab".into()));
        }

        let stats = env.blocks.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
    }

    #[rstest]
    fn test_scriptlet_bindings_reach_later_fragments(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context.append_code("let greeting = \"Hi \" + @model.Name; write(\"[\");");
        context.append_inline("greeting");
        context.append_text("]");

        assert_eq!(context.complete().invoke(&person()), Outcome::Value("[Hi Ada]".into()));
    }

    #[rstest]
    fn test_fault_is_caught(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context.append_text("before");
        context.append_inline("1 / 0");

        assert_eq!(
            context.complete().invoke(&person()),
            Outcome::Fault("Divided by 0".into())
        );
    }

    #[rstest]
    fn test_rule_returns_last_value(env: Env) {
        let program = ScriptGrammar::parse("let n = len(@model.Tags); n * 2").tree;
        let mut context = env.context(ContextKind::Rule);
        context.append_statements(&program).unwrap();

        assert!(is_value_program(&program));
        assert_eq!(context.complete().invoke(&person()), Outcome::Value(Value::from(4)));
    }

    #[rstest]
    fn test_complete_scope_resets_scopes(env: Env) {
        let mut context = env.context(ContextKind::Template);
        context.append_code("let x = 1;");
        assert_eq!(context.scopes().lookup("x"), Some(0));

        assert!(matches!(context.complete_scope(true), Completion::Function(_)));
        assert_eq!(context.scopes().lookup("x"), None);
    }
}
