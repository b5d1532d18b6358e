use smol_str::SmolStr;

use crate::error::syntax::SyntaxError;
use crate::grammar::CollectErrors;
use crate::number::Number;
use crate::range::Range;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: SmolStr,
    pub range: Range,
}

impl Ident {
    pub fn new(name: impl Into<SmolStr>, range: Range) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::None,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(SmolStr),
    RuntimeMember(SmolStr),
    Array(Vec<Expr>),
    Member { target: Box<Expr>, name: Ident },
    Index { target: Box<Expr>, index: Box<Expr> },
    Call { function: Ident, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Conditional { condition: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Error(SyntaxError),
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self { kind, range }
    }

    pub fn error(error: SyntaxError) -> Self {
        let range = error.range;
        Self {
            kind: ExprKind::Error(error),
            range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: Ident, value: Expr },
    Assign { target: Ident, value: Expr },
    If { condition: Expr, then: Block, otherwise: Option<Block> },
    For { binding: Ident, iterable: Expr, body: Block },
    Return { value: Option<Expr>, range: Range },
    Expr(Expr),
    Error(SyntaxError),
}

impl Stmt {
    /// Whether the statement produces the value of a rule.
    pub fn is_value(&self) -> bool {
        matches!(self, Stmt::Expr(_) | Stmt::Return { value: Some(_), .. })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// `x in expr` as used by `ddv-repeat`; the bare form binds [`ForBinding::DEFAULT_VARIABLE`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForBinding {
    pub variable: Ident,
    pub iterable: Expr,
}

impl ForBinding {
    pub const DEFAULT_VARIABLE: &'static str = "item";
}

impl CollectErrors for Expr {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        match &self.kind {
            ExprKind::Error(error) => errors.push(error.clone()),
            ExprKind::Literal(_) | ExprKind::Ident(_) | ExprKind::RuntimeMember(_) => {}
            ExprKind::Array(items) => items.collect_errors(errors),
            ExprKind::Member { target, .. } => target.collect_errors(errors),
            ExprKind::Index { target, index } => {
                target.collect_errors(errors);
                index.collect_errors(errors);
            }
            ExprKind::Call { args, .. } => args.collect_errors(errors),
            ExprKind::Unary { operand, .. } => operand.collect_errors(errors),
            ExprKind::Binary { left, right, .. } => {
                left.collect_errors(errors);
                right.collect_errors(errors);
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_errors(errors);
                then.collect_errors(errors);
                otherwise.collect_errors(errors);
            }
        }
    }
}

impl CollectErrors for Block {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.statements.collect_errors(errors);
    }
}

impl CollectErrors for Stmt {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        match self {
            Stmt::Let { value, .. } | Stmt::Assign { value, .. } => value.collect_errors(errors),
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_errors(errors);
                then.collect_errors(errors);
                otherwise.collect_errors(errors);
            }
            Stmt::For { iterable, body, .. } => {
                iterable.collect_errors(errors);
                body.collect_errors(errors);
            }
            Stmt::Return { value, .. } => value.collect_errors(errors),
            Stmt::Expr(expr) => expr.collect_errors(errors),
            Stmt::Error(error) => errors.push(error.clone()),
        }
    }
}

impl CollectErrors for Program {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.statements.collect_errors(errors);
    }
}

impl CollectErrors for ForBinding {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.iterable.collect_errors(errors);
    }
}
