use tracing::debug;

use super::ast::{
    AggregateExpression, Aggregator, Clause, LimitExpression, Predicate, QueryExpression, ReturnType,
    SortExpression,
};
use super::step::{AggregateStep, Pipeline, QueryStep};
use crate::error::compile::CompileError;
use crate::model::ModelRegistry;

/// Callbacks fired by [`walk_query`] in source order.
pub trait QueryVisitor {
    fn enter_aggregate(&mut self, _aggregate: &AggregateExpression) {}
    fn visit_aggregator(&mut self, _aggregator: Aggregator) {}
    fn visit_predicate(&mut self, _predicate: &Predicate) {}
    fn exit_aggregate(&mut self, _aggregate: &AggregateExpression) {}
    fn visit_sort(&mut self, _sort: &SortExpression) {}
    fn visit_limit(&mut self, _limit: &LimitExpression) {}
    fn visit_project(&mut self, _return_type: ReturnType) {}
}

/// Depth-first walk over a query tree. Error nodes are skipped.
pub fn walk_query<V: QueryVisitor + ?Sized>(visitor: &mut V, query: &QueryExpression) {
    let aggregate = &query.aggregate;

    visitor.enter_aggregate(aggregate);
    if let Clause::Parsed(predicate) = &aggregate.first {
        visitor.visit_predicate(predicate);
    }
    for (aggregator, predicate) in &aggregate.rest {
        visitor.visit_aggregator(*aggregator);
        if let Clause::Parsed(predicate) = predicate {
            visitor.visit_predicate(predicate);
        }
    }
    visitor.exit_aggregate(aggregate);

    if let Some(Clause::Parsed(sort)) = &query.sort {
        visitor.visit_sort(sort);
    }
    if let Some(Clause::Parsed(limit)) = &query.limit {
        visitor.visit_limit(limit);
    }
    if let Some(Clause::Parsed(return_type)) = &query.project {
        visitor.visit_project(*return_type);
    }
}

/// Lowers a valid query tree into a [`Pipeline`] holding one pending aggregate step at a time.
#[derive(Debug, Default)]
pub struct StepCompiler<'a> {
    registry: Option<&'a ModelRegistry>,
    steps: Vec<QueryStep>,
    pending: Option<(Aggregator, AggregateStep)>,
    error: Option<CompileError>,
}

impl<'a> StepCompiler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects vertex patterns naming model types the registry does not know.
    pub fn with_registry(registry: &'a ModelRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    pub fn compile(mut self, query: &QueryExpression) -> Result<Pipeline, CompileError> {
        walk_query(&mut self, query);
        self.finish()
    }

    fn finish(mut self) -> Result<Pipeline, CompileError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        self.flush();
        if !self.steps.iter().any(|step| matches!(step, QueryStep::Project(_))) {
            self.ensure_return_for();
            self.emit(QueryStep::Project(ReturnType::Nodes));
        }

        Ok(Pipeline::new(self.steps))
    }

    fn flush(&mut self) {
        if let Some((aggregator, step)) = self.pending.take() {
            self.emit(QueryStep::aggregate(aggregator, step));
        }
    }

    fn ensure_return_for(&mut self) {
        if !self.steps.contains(&QueryStep::ReturnFor) {
            self.emit(QueryStep::ReturnFor);
        }
    }

    fn emit(&mut self, step: QueryStep) {
        debug!(step = %step, "Emitting query step");
        self.steps.push(step);
    }
}

impl QueryVisitor for StepCompiler<'_> {
    fn enter_aggregate(&mut self, _aggregate: &AggregateExpression) {
        self.flush();
        self.pending = Some((Aggregator::Union, AggregateStep::default()));
    }

    fn visit_aggregator(&mut self, aggregator: Aggregator) {
        if self.pending.as_ref().is_some_and(|(pending, _)| *pending == aggregator) {
            return;
        }

        self.flush();
        self.pending = Some((aggregator, AggregateStep::default()));
    }

    fn visit_predicate(&mut self, predicate: &Predicate) {
        if let Some(registry) = self.registry {
            let unknown = predicate
                .vertices()
                .filter_map(|vertex| vertex.model.as_ref())
                .find(|model| !registry.contains(model));

            if let (Some(model), None) = (unknown, &self.error) {
                self.error = Some(CompileError::UnknownModelType(model.clone()));
            }
        }

        let (_, step) = self
            .pending
            .get_or_insert_with(|| (Aggregator::Union, AggregateStep::default()));
        step.predicates.push(predicate.clone());
    }

    fn visit_sort(&mut self, sort: &SortExpression) {
        self.flush();
        self.ensure_return_for();
        self.emit(QueryStep::Sort(sort.clone()));
    }

    fn visit_limit(&mut self, limit: &LimitExpression) {
        self.flush();
        if !matches!(self.steps.last(), Some(QueryStep::Sort(_))) {
            self.ensure_return_for();
        }
        self.emit(QueryStep::Limit {
            offset: limit.offset,
            count: limit.count,
        });
    }

    fn visit_project(&mut self, return_type: ReturnType) {
        self.flush();
        self.ensure_return_for();
        self.emit(QueryStep::Project(return_type));
    }
}
