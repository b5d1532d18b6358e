use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::syntax::SyntaxError;
use crate::grammar::CollectErrors;
use crate::range::Range;
use crate::value::Value;

/// A parsed clause or the error node left where the parser recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause<T> {
    Parsed(T),
    Error(SyntaxError),
}

impl<T> Clause<T> {
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Clause::Parsed(node) => Some(node),
            Clause::Error(_) => None,
        }
    }
}

impl<T> CollectErrors for Clause<T> {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        if let Clause::Error(error) = self {
            errors.push(error.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    pub aggregate: AggregateExpression,
    pub sort: Option<Clause<SortExpression>>,
    pub limit: Option<Clause<LimitExpression>>,
    pub project: Option<Clause<ReturnType>>,
    /// Tokens left over after the last clause.
    pub trailing: Option<SyntaxError>,
}

impl CollectErrors for QueryExpression {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.aggregate.collect_errors(errors);
        self.sort.collect_errors(errors);
        self.limit.collect_errors(errors);
        self.project.collect_errors(errors);
        errors.extend(self.trailing.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpression {
    pub first: Clause<Predicate>,
    pub rest: Vec<(Aggregator, Clause<Predicate>)>,
}

impl CollectErrors for AggregateExpression {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.first.collect_errors(errors);
        self.rest.iter().for_each(|(_, predicate)| predicate.collect_errors(errors));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregator {
    Union,
    Intersect,
    Exclude,
}

impl Display for Aggregator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Aggregator::Union => write!(f, "UNION"),
            Aggregator::Intersect => write!(f, "INTERSECT"),
            Aggregator::Exclude => write!(f, "EXCLUDE"),
        }
    }
}

/// A chain of vertex patterns joined by edge patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub start: VertexPattern,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hops: Vec<Hop>,
    #[serde(skip)]
    pub range: Range,
}

impl Predicate {
    pub fn vertices(&self) -> impl Iterator<Item = &VertexPattern> {
        std::iter::once(&self.start).chain(self.hops.iter().map(|hop| &hop.vertex))
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for hop in &self.hops {
            write!(f, "{}{}", hop.edge, hop.vertex)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub edge: EdgePattern,
    pub vertex: VertexPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexPattern {
    /// `None` for the `*` wildcard.
    pub model: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

impl Display for VertexPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}", model)?,
            None => write!(f, "*")?,
        }
        if !self.filters.is_empty() {
            write!(f, "({})", self.filters.iter().join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: SmolStr,
    pub op: CompareOp,
    pub value: Value,
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => write!(f, "{} {} {:?}", self.field, self.op, s),
            Value::None => write!(f, "{} {} null", self.field, self.op),
            value => write!(f, "{} {} {}", self.field, self.op, value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn matches(&self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering;

        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::None, Value::None) => Some(Ordering::Equal),
            _ => None,
        };

        match (self, ordering) {
            (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
            (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
            (CompareOp::Lt, Some(ordering)) => ordering.is_lt(),
            (CompareOp::Lte, Some(ordering)) => ordering.is_le(),
            (CompareOp::Gt, Some(ordering)) => ordering.is_gt(),
            (CompareOp::Gte, Some(ordering)) => ordering.is_ge(),
            (_, None) => false,
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        };
        write!(f, "{}", op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePattern {
    pub label: Option<SmolStr>,
    pub direction: Direction,
}

impl Display for EdgePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = self.label.as_deref().unwrap_or_default();
        match self.direction {
            Direction::Outgoing => write!(f, "-[{}]->", label),
            Direction::Incoming => write!(f, "<-[{}]-", label),
            Direction::Both => write!(f, "-[{}]-", label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortExpression {
    pub keys: Vec<SortKey>,
}

impl Display for SortExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keys.iter().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: Vec<SmolStr>,
    pub descending: bool,
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.path.iter().join("."),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitExpression {
    pub offset: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnType {
    #[default]
    Nodes,
    Paths,
}

impl Display for ReturnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Nodes => write!(f, "NODES"),
            ReturnType::Paths => write!(f, "PATHS"),
        }
    }
}
