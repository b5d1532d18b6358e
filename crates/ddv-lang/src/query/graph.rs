use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::ast::Direction;
use crate::value::Dict;

pub type VertexId = SmolStr;
pub type EdgeId = SmolStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    #[serde(rename = "type")]
    pub model_type: SmolStr,
    #[serde(default)]
    pub fields: Dict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub label: SmolStr,
    pub from: VertexId,
    pub to: VertexId,
}

/// Read access to the document/graph store a pipeline runs against.
pub trait GraphStore {
    /// Ids of every vertex of `model`, or of every vertex when `model` is `None`, in store order.
    fn vertices(&self, model: Option<&str>) -> Vec<VertexId>;

    fn vertex(&self, id: &str) -> Option<&Vertex>;

    /// Edges touching `id` in `direction`, optionally restricted to `label`, with the vertex at the other end.
    fn edges(&self, id: &str, direction: Direction, label: Option<&str>) -> Vec<(EdgeId, VertexId)>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphData {
    #[serde(default)]
    vertices: Vec<Vertex>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// An in-memory [`GraphStore`], loadable from `{"vertices": [...], "edges": [...]}` JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "GraphData")]
pub struct MemoryGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    index: FxHashMap<VertexId, usize>,
}

impl From<GraphData> for MemoryGraph {
    fn from(data: GraphData) -> Self {
        MemoryGraph::new(data.vertices, data.edges)
    }
}

impl MemoryGraph {
    pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Self {
        let index = vertices
            .iter()
            .enumerate()
            .map(|(i, vertex)| (vertex.id.clone(), i))
            .collect();

        Self {
            vertices,
            edges,
            index,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn add_vertex(&mut self, id: impl Into<VertexId>, model_type: impl Into<SmolStr>, fields: Dict) {
        let id = id.into();
        self.index.insert(id.clone(), self.vertices.len());
        self.vertices.push(Vertex {
            id,
            model_type: model_type.into(),
            fields,
        });
    }

    pub fn add_edge(&mut self, label: impl Into<SmolStr>, from: impl Into<VertexId>, to: impl Into<VertexId>) {
        let id = SmolStr::new(format!("e{}", self.edges.len()));
        self.edges.push(Edge {
            id,
            label: label.into(),
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn edge_list(&self) -> &[Edge] {
        &self.edges
    }
}

impl GraphStore for MemoryGraph {
    fn vertices(&self, model: Option<&str>) -> Vec<VertexId> {
        self.vertices
            .iter()
            .filter(|vertex| model.is_none_or(|model| vertex.model_type == model))
            .map(|vertex| vertex.id.clone())
            .collect()
    }

    fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.index.get(id).and_then(|&i| self.vertices.get(i))
    }

    fn edges(&self, id: &str, direction: Direction, label: Option<&str>) -> Vec<(EdgeId, VertexId)> {
        self.edges
            .iter()
            .filter(|edge| label.is_none_or(|label| edge.label == label))
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing if edge.from == id => &edge.to,
                    Direction::Incoming if edge.to == id => &edge.from,
                    Direction::Both if edge.from == id => &edge.to,
                    Direction::Both if edge.to == id => &edge.from,
                    _ => return None,
                };
                Some((edge.id.clone(), other.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let graph = MemoryGraph::from_json(
            r#"{
                "vertices": [
                    {"id": "1", "type": "Person", "fields": {"name": "Ada"}},
                    {"id": "2", "type": "Person"}
                ],
                "edges": [{"id": "k", "label": "knows", "from": "1", "to": "2"}]
            }"#,
        )
        .unwrap();

        assert_eq!(graph.vertices(Some("Person")).len(), 2);
        assert_eq!(graph.vertices(Some("Robot")).len(), 0);
        assert_eq!(graph.vertex("1").map(|v| v.model_type.as_str()), Some("Person"));
        assert_eq!(
            graph.edges("1", Direction::Outgoing, Some("knows")),
            vec![("k".into(), "2".into())]
        );
        assert!(graph.edges("1", Direction::Incoming, None).is_empty());
        assert_eq!(graph.edges("2", Direction::Both, None).len(), 1);
    }
}
