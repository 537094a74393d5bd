use serde::{Deserialize, Serialize};

use crate::model::{Operation, OperationId};

/// Serialisable snapshot of a dependency graph, served by `GET /operations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphListing {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: OperationId,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: OperationId,
    pub to: OperationId,
}
