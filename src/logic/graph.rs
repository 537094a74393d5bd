use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::logic::expand::{ExpandedOperations, Expander};
use crate::logic::registry::Registry;
use crate::logic::resolver::is_external;
use crate::logic::sandbox::Sandbox;
use crate::logic::translate::PathTranslator;
use crate::logic::validate::{parse_operation, SchemaValidator};
use crate::model::{
    entry_name, DescriptorFile, GraphEdge, GraphListing, GraphNode, Href, Operation, OperationId,
};

#[derive(Debug)]
struct Node {
    operation: Operation,
    dependencies: Vec<OperationId>,
    expanded: bool,
}

/// Strictly acyclic operation-to-operation dependency graph.
///
/// Nodes keep their insertion order, which makes the topological order
/// deterministic for a given workspace.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    order: Vec<OperationId>,
    nodes: HashMap<OperationId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns `false` and keeps the existing payload when
    /// the identifier is already taken.
    pub fn add_node(&mut self, id: OperationId, operation: Operation) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.nodes.insert(
            id,
            Node {
                operation,
                dependencies: Vec::new(),
                expanded: false,
            },
        );
        true
    }

    /// Record that `from` depends on `to`. Rejects edges that would close a cycle.
    pub fn add_edge(&mut self, from: &OperationId, to: &OperationId) -> ResolveResult<()> {
        if !self.nodes.contains_key(to) {
            return Err(ResolveError::Internal(format!("unknown operation {to}")));
        }
        let already_present = match self.nodes.get(from) {
            Some(node) => node.dependencies.contains(to),
            None => return Err(ResolveError::Internal(format!("unknown operation {from}"))),
        };
        if already_present {
            return Ok(());
        }

        if let Some(path) = self.path_between(to, from) {
            let mut cycle = vec![from.to_string()];
            cycle.extend(path.iter().map(ToString::to_string));
            return Err(ResolveError::CycleDetected { cycle });
        }

        if let Some(node) = self.nodes.get_mut(from) {
            node.dependencies.push(to.clone());
        }
        Ok(())
    }

    /// Dependency path from `start` to `goal`, both ends included.
    fn path_between(&self, start: &OperationId, goal: &OperationId) -> Option<Vec<OperationId>> {
        if start == goal {
            return Some(vec![start.clone()]);
        }

        let mut parents: HashMap<&OperationId, &OperationId> = HashMap::new();
        let mut seen: HashSet<&OperationId> = HashSet::from([start]);
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for next in &node.dependencies {
                if !seen.insert(next) {
                    continue;
                }
                parents.insert(next, current);
                if next == goal {
                    let mut path = vec![goal.clone()];
                    let mut at = goal;
                    while let Some(parent) = parents.get(at) {
                        path.push((*parent).clone());
                        at = *parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(next);
            }
        }
        None
    }

    /// Every node, dependencies before dependents (DFS post-order over insertion order).
    pub fn topological_order(&self) -> Vec<OperationId> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.order.len());
        for id in &self.order {
            self.visit(id, &mut visited, &mut order);
        }
        order
    }

    fn visit<'a>(
        &'a self,
        id: &'a OperationId,
        visited: &mut HashSet<&'a OperationId>,
        order: &mut Vec<OperationId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        if let Some(node) = self.nodes.get(id) {
            for dependency in &node.dependencies {
                self.visit(dependency, visited, order);
            }
        }
        order.push(id.clone());
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.nodes.get(id).map(|node| &node.operation)
    }

    pub fn dependencies(&self, id: &OperationId) -> &[OperationId] {
        self.nodes
            .get(id)
            .map(|node| node.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &OperationId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.order
            .iter()
            .flat_map(|from| {
                self.dependencies(from).iter().map(move |to| GraphEdge {
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect()
    }

    pub fn listing(&self) -> GraphListing {
        GraphListing {
            nodes: self
                .order
                .iter()
                .filter_map(|id| {
                    self.get(id).map(|operation| GraphNode {
                        id: id.clone(),
                        operation: operation.clone(),
                    })
                })
                .collect(),
            edges: self.edges(),
        }
    }
}

struct ExpandedNodes<'a>(&'a HashMap<OperationId, Node>);

impl ExpandedOperations for ExpandedNodes<'_> {
    fn expanded(&self, id: &OperationId) -> Option<&Operation> {
        self.0
            .get(id)
            .filter(|node| node.expanded)
            .map(|node| &node.operation)
    }
}

/// Scans the workspace and builds a fully expanded [`DependencyGraph`].
#[derive(Clone)]
pub struct GraphBuilder {
    workspace: Arc<Workspace>,
    sandbox: Sandbox,
    registry: Registry,
    expander: Expander,
    validator: Arc<dyn SchemaValidator>,
}

impl GraphBuilder {
    pub fn new(
        workspace: Arc<Workspace>,
        validator: Arc<dyn SchemaValidator>,
        translator: Arc<dyn PathTranslator>,
    ) -> Self {
        Self {
            sandbox: Sandbox::new(workspace.clone()),
            registry: Registry::new(workspace.clone()),
            expander: Expander::new(workspace.clone(), validator.clone(), translator),
            workspace,
            validator,
        }
    }

    pub fn build(&self) -> ResolveResult<DependencyGraph> {
        let mut graph = self.build_unexpanded()?;
        self.expand_all(&mut graph)?;
        info!(
            "Built dependency graph: {} operations, {} edges",
            graph.len(),
            graph.edges().len()
        );
        Ok(graph)
    }

    /// Discovery and edge derivation only; payloads keep their declared form.
    pub fn build_unexpanded(&self) -> ResolveResult<DependencyGraph> {
        let mut graph = self.discover()?;
        self.derive_edges(&mut graph)?;
        Ok(graph)
    }

    fn discover(&self) -> ResolveResult<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for descriptor in self.registry.descriptor_files()? {
            let dir = descriptor.parent().unwrap_or_else(|| self.workspace.root());
            let file = DescriptorFile::read(&descriptor)?;
            for entry in file.entries() {
                let operation = parse_operation(self.validator.as_ref(), entry)?;
                let Some(id) = OperationId::from_path(&self.workspace, &dir.join(&operation.name))
                else {
                    continue;
                };
                if !graph.add_node(id.clone(), operation) {
                    warn!(
                        "Duplicate operation {} in {}; keeping the first declaration",
                        id,
                        descriptor.display()
                    );
                }
            }
            debug!(
                "Registered {} declaration(s) from {}",
                file.entries().filter(|e| entry_name(e).is_some()).count(),
                descriptor.display()
            );
        }
        Ok(graph)
    }

    fn derive_edges(&self, graph: &mut DependencyGraph) -> ResolveResult<()> {
        let mut edges = Vec::new();
        for id in graph.ids() {
            let dir = id.dir(&self.workspace);
            let Some(operation) = graph.get(id) else {
                continue;
            };
            for href in operation.references() {
                if let Some(target) = self.dependency(&dir, href)? {
                    edges.push((id.clone(), target));
                }
            }
        }

        for (from, to) in edges {
            if graph.contains(&to) {
                graph.add_edge(&from, &to)?;
            }
        }
        Ok(())
    }

    /// The declared operation `href` points at, if it is one.
    fn dependency(&self, dir: &Path, href: &Href) -> ResolveResult<Option<OperationId>> {
        let Href::Raw(value) = href else {
            return Ok(None);
        };
        if is_external(value) {
            return Ok(None);
        }
        let target = self.sandbox.resolve(dir, value)?;
        if !self.registry.is_declared(&target)? {
            return Ok(None);
        }
        Ok(OperationId::from_path(&self.workspace, &target))
    }

    fn expand_all(&self, graph: &mut DependencyGraph) -> ResolveResult<()> {
        for id in graph.topological_order() {
            let dir = id.dir(&self.workspace);
            let Some(declared) = graph.get(&id).cloned() else {
                continue;
            };
            let expanded =
                self.expander
                    .expand_with(&ExpandedNodes(&graph.nodes), &dir, declared)?;
            if let Some(node) = graph.nodes.get_mut(&id) {
                node.operation = expanded;
                node.expanded = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OperationKind, Resolved};
    use crate::test_workspace::TestWorkspace;
    use serde_json::json;

    fn id(value: &str) -> OperationId {
        OperationId::parse(value)
    }

    fn raw(name: &str) -> Operation {
        Operation::new(name, OperationKind::Raw(json!("x")))
    }

    #[test]
    fn rejects_edges_closing_a_cycle() {
        let mut graph = DependencyGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_node(id(name), raw(name));
        }
        graph.add_edge(&id("a"), &id("b")).unwrap();
        graph.add_edge(&id("b"), &id("c")).unwrap();

        let err = graph.add_edge(&id("c"), &id("a")).unwrap_err();
        match err {
            ResolveError::CycleDetected { cycle } => {
                assert_eq!(cycle, vec!["/c", "/a", "/b", "/c"])
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(graph.dependencies(&id("c")).is_empty());

        let err = graph.add_edge(&id("a"), &id("a")).unwrap_err();
        assert_eq!(err.kind(), "CycleDetected");
    }

    #[test]
    fn duplicate_nodes_and_edges_are_ignored() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_node(id("a"), raw("first")));
        assert!(!graph.add_node(id("a"), raw("second")));
        graph.add_node(id("b"), raw("b"));
        graph.add_edge(&id("a"), &id("b")).unwrap();
        graph.add_edge(&id("a"), &id("b")).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(&id("a")).unwrap().name, "first");
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn topological_order_is_deterministic() {
        let mut graph = DependencyGraph::new();
        for name in ["app", "lib", "base", "other"] {
            graph.add_node(id(name), raw(name));
        }
        graph.add_edge(&id("app"), &id("lib")).unwrap();
        graph.add_edge(&id("lib"), &id("base")).unwrap();

        let order: Vec<_> = graph
            .topological_order()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(order, vec!["/base", "/lib", "/app", "/other"]);
        assert_eq!(graph.topological_order(), graph.topological_order());
    }

    #[test]
    fn builds_and_expands_the_workspace() {
        let ws = TestWorkspace::new();
        ws.file("lib/facts.n3", "");
        ws.file("lib/q.n3", "");
        ws.descriptor(
            "lib",
            json!([
                {"name": "reason", "inference": {
                    "query": {"href": "q.n3"},
                    "data": {"href": ["facts.n3", "derived"]}
                }},
                {"name": "derived", "raw": "<a> <b> <c>."}
            ]),
        );
        ws.descriptor(
            "app",
            json!([{"name": "extended", "imports": {"href": "/lib/reason"}}]),
        );

        let graph = ws.graph_builder().build().unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.contains(&id("/lib/reason")));
        assert_eq!(graph.dependencies(&id("/lib/reason")), &[id("/lib/derived")]);
        assert_eq!(graph.dependencies(&id("/app/extended")), &[id("/lib/reason")]);

        match &graph.get(&id("/app/extended")).unwrap().kind {
            OperationKind::Inference(inference) => {
                let data: Vec<_> = inference.data.href.iter().cloned().collect();
                assert_eq!(data.len(), 2);
                assert_eq!(data[1], Href::from(Resolved::Virtual("/lib/derived".into())));
            }
            other => panic!("expected inference, got {other:?}"),
        }
    }

    #[test]
    fn cycles_abort_before_expansion() {
        let ws = TestWorkspace::new();
        ws.descriptor(
            "",
            json!([
                {"name": "a", "imports": {"href": "b"}},
                {"name": "b", "href": "a"}
            ]),
        );

        let err = ws.graph_builder().build().unwrap_err();
        assert_eq!(err.kind(), "CycleDetected");
    }

    #[test]
    fn invalid_declarations_abort_the_build() {
        let ws = TestWorkspace::new();
        ws.descriptor("", json!([{"name": "broken"}]));

        let err = ws.graph_builder().build().unwrap_err();
        assert_eq!(err.kind(), "BadDescriptor");
    }

    #[test]
    fn listing_mirrors_nodes_and_edges() {
        let ws = TestWorkspace::new();
        ws.descriptor(
            "",
            json!([
                {"name": "alias", "imports": {"href": "facts"}},
                {"name": "facts", "raw": "x"}
            ]),
        );

        let listing = ws.graph_builder().build().unwrap().listing();
        assert_eq!(listing.nodes.len(), 2);
        assert_eq!(
            listing.edges,
            vec![GraphEdge {
                from: id("/alias"),
                to: id("/facts")
            }]
        );
    }
}
