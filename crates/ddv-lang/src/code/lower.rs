use super::builtin::Builtin;
use super::ir::{Code, LogicalOp};
use super::scope::ScopeStack;
use crate::error::compile::CompileError;
use crate::runtime::RuntimeContract;
use crate::script::ast::{BinaryOp, Block, Expr, ExprKind, Stmt};

/// Resolves names in script trees and lowers them into [`Code`].
pub struct Lowering<'s> {
    scopes: &'s mut ScopeStack,
    contract: &'s RuntimeContract,
}

impl<'s> Lowering<'s> {
    pub fn new(scopes: &'s mut ScopeStack, contract: &'s RuntimeContract) -> Self {
        Self { scopes, contract }
    }

    pub fn statements(&mut self, statements: &[Stmt]) -> Result<Vec<Code>, CompileError> {
        statements.iter().map(|statement| self.statement(statement)).collect()
    }

    fn block(&mut self, block: &Block) -> Result<Code, CompileError> {
        self.scopes.push();
        let statements = self.statements(&block.statements);
        self.scopes.pop();
        Ok(Code::Block(statements?))
    }

    pub fn statement(&mut self, statement: &Stmt) -> Result<Code, CompileError> {
        match statement {
            Stmt::Let { name, value } => {
                let value = self.expr(value)?;
                let slot = self.scopes.declare(&name.name);
                Ok(Code::Assign(slot, Box::new(value)))
            }
            Stmt::Assign { target, value } => {
                let slot = self
                    .scopes
                    .lookup(&target.name)
                    .ok_or_else(|| CompileError::UndefinedVariable(target.range, target.name.clone()))?;
                Ok(Code::Assign(slot, Box::new(self.expr(value)?)))
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => Ok(Code::Conditional {
                condition: Box::new(self.expr(condition)?),
                then: Box::new(self.block(then)?),
                otherwise: Box::new(match otherwise {
                    Some(otherwise) => self.block(otherwise)?,
                    None => Code::NONE,
                }),
            }),
            Stmt::For {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.expr(iterable)?;
                self.scopes.push();
                let slot = self.scopes.declare(&binding.name);
                let body = self.statements(&body.statements);
                self.scopes.pop();

                Ok(Code::Loop {
                    slot,
                    iterable: Box::new(iterable),
                    body: Box::new(Code::Block(body?)),
                })
            }
            Stmt::Return { value, .. } => Ok(Code::Return(Box::new(match value {
                Some(value) => self.expr(value)?,
                None => Code::NONE,
            }))),
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Error(error) => Err(CompileError::Syntax(vec![error.clone()])),
        }
    }

    pub fn expr(&mut self, expr: &Expr) -> Result<Code, CompileError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Code::Constant(literal.into())),
            ExprKind::Ident(name) => self
                .scopes
                .lookup(name)
                .map(Code::Local)
                .ok_or_else(|| CompileError::UndefinedVariable(expr.range, name.clone())),
            ExprKind::RuntimeMember(name) => {
                if self.contract.has_member(name) {
                    Ok(Code::RuntimeMember(name.clone()))
                } else {
                    Err(CompileError::UnknownRuntimeMember(expr.range, name.clone()))
                }
            }
            ExprKind::Array(items) => Ok(Code::Array(
                items.iter().map(|item| self.expr(item)).collect::<Result<_, _>>()?,
            )),
            ExprKind::Member { target, name } => Ok(Code::Member(Box::new(self.expr(target)?), name.name.clone())),
            ExprKind::Index { target, index } => Ok(Code::Index(
                Box::new(self.expr(target)?),
                Box::new(self.expr(index)?),
            )),
            ExprKind::Call { function, args } => {
                let builtin = Builtin::lookup(&function.name)
                    .ok_or_else(|| CompileError::NotDefined(function.range, function.name.clone()))?;

                builtin.check_arity(args.len()).map_err(|expected| {
                    CompileError::InvalidNumberOfArguments(
                        function.range,
                        function.name.clone(),
                        expected,
                        u8::try_from(args.len()).unwrap_or(u8::MAX),
                    )
                })?;

                Ok(Code::Call(
                    builtin,
                    args.iter().map(|arg| self.expr(arg)).collect::<Result<_, _>>()?,
                ))
            }
            ExprKind::Unary { op, operand } => Ok(Code::Unary(*op, Box::new(self.expr(operand)?))),
            ExprKind::Binary { op, left, right } => {
                let left = Box::new(self.expr(left)?);
                let right = Box::new(self.expr(right)?);
                Ok(match op {
                    BinaryOp::And => Code::Logical(LogicalOp::And, left, right),
                    BinaryOp::Or => Code::Logical(LogicalOp::Or, left, right),
                    op => Code::Binary(*op, left, right),
                })
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => Ok(Code::Conditional {
                condition: Box::new(self.expr(condition)?),
                then: Box::new(self.expr(then)?),
                otherwise: Box::new(self.expr(otherwise)?),
            }),
            ExprKind::Error(error) => Err(CompileError::Syntax(vec![error.clone()])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::script::{ExpressionGrammar, ScriptGrammar};
    use rstest::rstest;

    fn contract() -> RuntimeContract {
        RuntimeContract::new("test", ["model"])
    }

    fn lower_expr(code: &str) -> Result<Code, CompileError> {
        let tree = ExpressionGrammar::parse(code).tree;
        let mut scopes = ScopeStack::new();
        scopes.declare("x");
        let contract = contract();
        Lowering::new(&mut scopes, &contract).expr(&tree)
    }

    #[rstest]
    #[case("x + 1")]
    #[case("@model.Name")]
    #[case("upper(@model.Name)")]
    #[case("@model.Name.lower()")]
    #[case("[x, 1][0]")]
    fn test_lower_ok(#[case] code: &str) {
        assert!(lower_expr(code).is_ok(), "{code}");
    }

    #[rstest]
    #[case("y", "Undefined variable \"y\"")]
    #[case("@user", "\"@user\" is not a member of the runtime contract")]
    #[case("eval(1)", "\"eval\" is not defined")]
    #[case("upper(1, 2)", "Invalid number of arguments in \"upper\", expected 1, got 2")]
    fn test_lower_errors(#[case] code: &str, #[case] message: &str) {
        assert_eq!(lower_expr(code).unwrap_err().to_string(), message);
    }

    #[test]
    fn test_block_scopes_are_popped() {
        let program = ScriptGrammar::parse("let a = 1; if (a) { let b = 2; } for (i in [1]) { a = i; }").tree;
        let mut scopes = ScopeStack::new();
        let contract = contract();
        let code = Lowering::new(&mut scopes, &contract).statements(&program.statements);

        assert!(code.is_ok());
        assert_eq!(scopes.depth(), 1);
        assert_eq!(scopes.lookup("a"), Some(0));
        assert_eq!(scopes.lookup("b"), None);
        assert_eq!(scopes.lookup("i"), None);
    }

    #[test]
    fn test_let_value_sees_outer_binding() {
        let program = ScriptGrammar::parse("let a = 1; if (true) { let a = a + 1; }").tree;
        let mut scopes = ScopeStack::new();
        let contract = contract();
        let code = Lowering::new(&mut scopes, &contract)
            .statements(&program.statements)
            .unwrap();

        let Code::Conditional { then, .. } = &code[1] else {
            panic!("expected conditional");
        };
        let Code::Block(statements) = then.as_ref() else {
            panic!("expected block");
        };
        assert!(matches!(
            &statements[0],
            Code::Assign(1, value) if matches!(value.as_ref(), Code::Binary(BinaryOp::Add, left, _) if matches!(left.as_ref(), Code::Local(0)))
        ));
    }
}
