use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::ast::{Aggregator, Predicate, ReturnType, SortExpression};

/// One or more predicates folded into the path set by the same aggregator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateStep {
    pub predicates: Vec<Predicate>,
}

impl Display for AggregateStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicates.iter().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "args")]
pub enum QueryStep {
    Union(AggregateStep),
    Intersect(AggregateStep),
    Exclude(AggregateStep),
    Sort(SortExpression),
    Limit { offset: usize, count: usize },
    Project(ReturnType),
    ReturnFor,
}

impl QueryStep {
    pub fn aggregate(aggregator: Aggregator, step: AggregateStep) -> Self {
        match aggregator {
            Aggregator::Union => QueryStep::Union(step),
            Aggregator::Intersect => QueryStep::Intersect(step),
            Aggregator::Exclude => QueryStep::Exclude(step),
        }
    }

    pub fn aggregator(&self) -> Option<Aggregator> {
        match self {
            QueryStep::Union(_) => Some(Aggregator::Union),
            QueryStep::Intersect(_) => Some(Aggregator::Intersect),
            QueryStep::Exclude(_) => Some(Aggregator::Exclude),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryStep::Union(_) => "Union",
            QueryStep::Intersect(_) => "Intersect",
            QueryStep::Exclude(_) => "Exclude",
            QueryStep::Sort(_) => "Sort",
            QueryStep::Limit { .. } => "Limit",
            QueryStep::Project(_) => "Project",
            QueryStep::ReturnFor => "ReturnFor",
        }
    }
}

impl Display for QueryStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryStep::Union(step) | QueryStep::Intersect(step) | QueryStep::Exclude(step) => {
                write!(f, "{}[{}]", self.name(), step)
            }
            QueryStep::Sort(sort) => write!(f, "Sort[{}]", sort),
            QueryStep::Limit { offset, count } => write!(f, "Limit[offset={}, count={}]", offset, count),
            QueryStep::Project(return_type) => write!(f, "Project[{}]", return_type),
            QueryStep::ReturnFor => write!(f, "ReturnFor"),
        }
    }
}

/// The compiled, immutable step sequence of one query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    steps: Vec<QueryStep>,
}

impl Pipeline {
    pub(crate) fn new(steps: Vec<QueryStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryStep> {
        self.steps.iter()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(QueryStep::name).collect()
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a QueryStep;
    type IntoIter = std::slice::Iter<'a, QueryStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps.iter().join("\n"))
    }
}
