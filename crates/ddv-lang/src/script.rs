//! The script language shared by rules, `<ddv>` scriptlets, inline `[[ ]]`
//! expressions and the `ddv-if` / `ddv-repeat` control attributes.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{BinaryOp, Block, Expr, ExprKind, ForBinding, Ident, Literal, Program, Stmt, UnaryOp};
pub use parser::Parser;

use crate::grammar::{Grammar, Limits, Parsed};

/// Scriptlet statements.
pub struct ScriptGrammar;

/// Statements whose last one yields the rule's value.
pub struct RuleGrammar;

/// A single expression with nothing after it.
pub struct ExpressionGrammar;

/// The `ddv-repeat` binding: `x in expr` or a bare iterable.
pub struct BindingGrammar;

impl Grammar for ScriptGrammar {
    type Tree = Program;

    fn parse_with(text: &str, limits: Limits) -> Parsed<Program> {
        let tokens = lexer::tokenize(text);
        let (tree, reporter) = Parser::with_limits(&tokens, limits).parse_program();
        Parsed { tree, reporter }
    }
}

impl Grammar for RuleGrammar {
    type Tree = Program;

    fn parse_with(text: &str, limits: Limits) -> Parsed<Program> {
        let tokens = lexer::tokenize(text);
        let (tree, reporter) = Parser::with_limits(&tokens, limits).parse_rule();
        Parsed { tree, reporter }
    }
}

impl Grammar for ExpressionGrammar {
    type Tree = Expr;

    fn parse_with(text: &str, limits: Limits) -> Parsed<Expr> {
        let tokens = lexer::tokenize(text);
        let (tree, reporter) = Parser::with_limits(&tokens, limits).parse_expression();
        Parsed { tree, reporter }
    }
}

impl Grammar for BindingGrammar {
    type Tree = ForBinding;

    fn parse_with(text: &str, limits: Limits) -> Parsed<ForBinding> {
        let tokens = lexer::tokenize(text);
        let (tree, reporter) = Parser::with_limits(&tokens, limits).parse_binding();
        Parsed { tree, reporter }
    }
}
