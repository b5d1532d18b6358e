use rustc_hash::FxHashSet;
use serde::Serialize;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::debug;

use super::ast::{Predicate, ReturnType, SortExpression, VertexPattern};
use super::graph::{EdgeId, GraphStore, VertexId};
use super::step::{AggregateStep, Pipeline, QueryStep};
use crate::value::{Dict, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("{0} step requires a materialized result set")]
    NotMaterialized(SmolStr),
    #[error("Unknown vertex \"{0}\"")]
    UnknownVertex(SmolStr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultNode {
    pub id: VertexId,
    #[serde(rename = "type")]
    pub model_type: SmolStr,
    pub fields: Dict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPath {
    pub nodes: Vec<ResultNode>,
    pub edges: Vec<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryResult {
    Nodes(Vec<ResultNode>),
    Paths(Vec<ResultPath>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Nodes(nodes) => nodes.len(),
            QueryResult::Paths(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the result nodes, or of the terminal node of each path.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            QueryResult::Nodes(nodes) => nodes.iter().map(|node| node.id.as_str()).collect(),
            QueryResult::Paths(paths) => paths
                .iter()
                .filter_map(|path| path.nodes.last())
                .map(|node| node.id.as_str())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Trail {
    vertices: Vec<VertexId>,
    edges: Vec<EdgeId>,
}

impl Trail {
    fn terminal(&self) -> &VertexId {
        // A trail always holds its start vertex.
        &self.vertices[self.vertices.len() - 1]
    }
}

/// Ordered path set, deduplicated by terminal vertex.
#[derive(Debug, Default)]
struct PathSet {
    trails: Vec<Trail>,
    terminals: FxHashSet<VertexId>,
    materialized: bool,
}

impl PathSet {
    fn insert(&mut self, trail: Trail) {
        if self.terminals.insert(trail.terminal().clone()) {
            self.trails.push(trail);
        }
    }

    fn retain(&mut self, keep: impl Fn(&VertexId) -> bool) {
        self.trails.retain(|trail| keep(trail.terminal()));
        self.terminals.retain(|terminal| keep(terminal));
    }
}

/// Runs compiled pipelines against a [`GraphStore`].
pub struct Executor<'a, G: GraphStore + ?Sized> {
    graph: &'a G,
}

impl<'a, G: GraphStore + ?Sized> Executor<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    pub fn execute(&self, pipeline: &Pipeline) -> Result<QueryResult, ExecError> {
        let mut paths = PathSet::default();
        let mut result = None;

        for step in pipeline {
            debug!(step = step.name(), paths = paths.trails.len(), "Executing query step");

            match step {
                QueryStep::Union(aggregate) => {
                    for trail in self.match_all(aggregate) {
                        paths.insert(trail);
                    }
                }
                QueryStep::Intersect(aggregate) => {
                    let matched = self.terminals(aggregate);
                    paths.retain(|terminal| matched.contains(terminal));
                }
                QueryStep::Exclude(aggregate) => {
                    let matched = self.terminals(aggregate);
                    paths.retain(|terminal| !matched.contains(terminal));
                }
                QueryStep::ReturnFor => paths.materialized = true,
                QueryStep::Sort(sort) => {
                    if !paths.materialized {
                        return Err(ExecError::NotMaterialized(step.name().into()));
                    }
                    self.sort(&mut paths.trails, sort)?;
                }
                QueryStep::Limit { offset, count } => {
                    if !paths.materialized {
                        return Err(ExecError::NotMaterialized(step.name().into()));
                    }
                    paths.trails = paths.trails.drain(..).skip(*offset).take(*count).collect();
                }
                QueryStep::Project(return_type) => {
                    if !paths.materialized {
                        return Err(ExecError::NotMaterialized(step.name().into()));
                    }
                    result = Some(self.project(&paths.trails, *return_type)?);
                }
            }
        }

        match result {
            Some(result) => Ok(result),
            None => Err(ExecError::NotMaterialized("Project".into())),
        }
    }

    fn match_all(&self, aggregate: &AggregateStep) -> Vec<Trail> {
        aggregate
            .predicates
            .iter()
            .flat_map(|predicate| self.match_predicate(predicate))
            .collect()
    }

    fn terminals(&self, aggregate: &AggregateStep) -> FxHashSet<VertexId> {
        self.match_all(aggregate)
            .into_iter()
            .map(|trail| trail.terminal().clone())
            .collect()
    }

    fn match_predicate(&self, predicate: &Predicate) -> Vec<Trail> {
        let mut trails: Vec<Trail> = self
            .graph
            .vertices(predicate.start.model.as_deref())
            .into_iter()
            .filter(|id| self.matches_vertex(id, &predicate.start))
            .map(|id| Trail {
                vertices: vec![id],
                edges: Vec::new(),
            })
            .collect();

        for hop in &predicate.hops {
            trails = trails
                .into_iter()
                .flat_map(|trail| {
                    self.graph
                        .edges(trail.terminal(), hop.edge.direction, hop.edge.label.as_deref())
                        .into_iter()
                        .filter(|(_, next)| !trail.vertices.contains(next))
                        .filter(|(_, next)| self.matches_vertex(next, &hop.vertex))
                        .map(|(edge, next)| {
                            let mut extended = trail.clone();
                            extended.edges.push(edge);
                            extended.vertices.push(next);
                            extended
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
        }

        trails
    }

    fn matches_vertex(&self, id: &str, pattern: &VertexPattern) -> bool {
        let Some(vertex) = self.graph.vertex(id) else {
            return false;
        };

        pattern.model.as_ref().is_none_or(|model| vertex.model_type == *model)
            && pattern.filters.iter().all(|filter| {
                let value = vertex.fields.get(&filter.field).unwrap_or(&Value::NONE);
                filter.op.matches(value, &filter.value)
            })
    }

    fn sort(&self, trails: &mut [Trail], sort: &SortExpression) -> Result<(), ExecError> {
        let keyed = trails
            .iter()
            .map(|trail| {
                let vertex = self
                    .graph
                    .vertex(trail.terminal())
                    .ok_or_else(|| ExecError::UnknownVertex(trail.terminal().clone()))?;
                let fields = Value::Dict(vertex.fields.clone());
                Ok(sort
                    .keys
                    .iter()
                    .map(|key| fields.get_path(&key.path).cloned().unwrap_or_default())
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>, ExecError>>()?;

        let mut order: Vec<usize> = (0..trails.len()).collect();
        order.sort_by(|&a, &b| {
            sort.keys
                .iter()
                .zip(keyed[a].iter().zip(keyed[b].iter()))
                .map(|(key, (left, right))| match (left, right) {
                    (Value::None, _) | (_, Value::None) => left.sort_cmp(right),
                    _ if key.descending => right.sort_cmp(left),
                    _ => left.sort_cmp(right),
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let sorted: Vec<Trail> = order.into_iter().map(|i| trails[i].clone()).collect();
        trails.clone_from_slice(&sorted);
        Ok(())
    }

    fn project(&self, trails: &[Trail], return_type: ReturnType) -> Result<QueryResult, ExecError> {
        match return_type {
            ReturnType::Nodes => trails
                .iter()
                .map(|trail| self.node(trail.terminal()))
                .collect::<Result<Vec<_>, _>>()
                .map(QueryResult::Nodes),
            ReturnType::Paths => trails
                .iter()
                .map(|trail| {
                    Ok(ResultPath {
                        nodes: trail
                            .vertices
                            .iter()
                            .map(|id| self.node(id))
                            .collect::<Result<Vec<_>, _>>()?,
                        edges: trail.edges.clone(),
                    })
                })
                .collect::<Result<Vec<_>, ExecError>>()
                .map(QueryResult::Paths),
        }
    }

    fn node(&self, id: &VertexId) -> Result<ResultNode, ExecError> {
        let vertex = self
            .graph
            .vertex(id)
            .ok_or_else(|| ExecError::UnknownVertex(id.clone()))?;

        Ok(ResultNode {
            id: vertex.id.clone(),
            model_type: vertex.model_type.clone(),
            fields: vertex.fields.clone(),
        })
    }
}
