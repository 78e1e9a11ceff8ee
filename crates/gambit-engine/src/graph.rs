use crate::{EngineError, GraphEdge, GraphNode, SharedNodeHandler};
use std::collections::{BTreeMap, BTreeSet};

/// Node name of the synthesized pre-flight readiness check.
pub const READINESS_CHECK_NODE: &str = "readiness-check";
/// Node name of the synthesized readiness recovery step.
pub const READINESS_RECOVERY_NODE: &str = "readiness-recovery";

/// Pre-flight "is the target ready" guard spliced ahead of a task's start
/// node: the check routes to the original start on success and through the
/// recovery handler on failure.
#[derive(Clone)]
pub struct ReadinessGuard {
    pub check: SharedNodeHandler,
    pub recover: SharedNodeHandler,
}

/// A validated, immutable task graph.
///
/// Rebuilt at the start of every execution so per-run node state starts
/// clean; dead nodes are tolerated, a missing or ambiguous start is not.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: BTreeMap<String, GraphNode>,
    edges_by_source: BTreeMap<String, Vec<GraphEdge>>,
    start: String,
}

impl Graph {
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Outgoing edges of `name` in declaration order.
    pub fn outgoing(&self, name: &str) -> &[GraphEdge] {
        self.edges_by_source
            .get(name)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }
}

/// Mutable registration surface a task fills in from `build_graph`, frozen
/// into a [`Graph`] by the engine.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(&mut self, edge: GraphEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn build(self, guard: Option<ReadinessGuard>) -> Result<Graph, EngineError> {
        let Self {
            mut nodes,
            mut edges,
        } = self;

        let mut names = BTreeSet::new();
        for node in &nodes {
            if !names.insert(node.name.clone()) {
                return Err(EngineError::InvalidGraph(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        for edge in &edges {
            for endpoint in [&edge.from, &edge.to] {
                if !names.contains(endpoint) {
                    return Err(EngineError::InvalidGraph(format!(
                        "edge '{}' -> '{}' references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    )));
                }
            }
        }

        check_edge_uniqueness(&edges)?;

        let mut start = resolve_start(&nodes, &edges)?;

        if let Some(guard) = guard {
            for reserved in [READINESS_CHECK_NODE, READINESS_RECOVERY_NODE] {
                if names.contains(reserved) {
                    return Err(EngineError::InvalidGraph(format!(
                        "node name '{}' is reserved for the readiness guard",
                        reserved
                    )));
                }
            }
            splice_readiness_guard(&mut nodes, &mut edges, guard, &start);
            start = READINESS_CHECK_NODE.to_string();
        }

        let mut edges_by_source: BTreeMap<String, Vec<GraphEdge>> = BTreeMap::new();
        for edge in edges {
            edges_by_source.entry(edge.from.clone()).or_default().push(edge);
        }

        Ok(Graph {
            nodes: nodes.into_iter().map(|node| (node.name.clone(), node)).collect(),
            edges_by_source,
            start,
        })
    }
}

fn check_edge_uniqueness(edges: &[GraphEdge]) -> Result<(), EngineError> {
    let mut defaults = BTreeSet::new();
    let mut fallbacks = BTreeSet::new();
    for edge in edges {
        let key = (edge.from.clone(), edge.requires_success);
        if edge.status.is_none() && !edge.fallback && !defaults.insert(key.clone()) {
            return Err(EngineError::InvalidGraph(format!(
                "node '{}' has multiple default {} edges",
                edge.from,
                gate_name(edge.requires_success)
            )));
        }
        if edge.fallback && !fallbacks.insert(key) {
            return Err(EngineError::InvalidGraph(format!(
                "node '{}' has multiple fallback {} edges",
                edge.from,
                gate_name(edge.requires_success)
            )));
        }
    }
    Ok(())
}

fn gate_name(requires_success: bool) -> &'static str {
    if requires_success { "success" } else { "failure" }
}

fn resolve_start(nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<String, EngineError> {
    let explicit: Vec<&GraphNode> = nodes.iter().filter(|node| node.is_start).collect();
    if explicit.len() > 1 {
        return Err(EngineError::InvalidGraph(
            "multiple start nodes declared".to_string(),
        ));
    }
    if let Some(node) = explicit.first() {
        return Ok(node.name.clone());
    }

    let targets: BTreeSet<&str> = edges.iter().map(|edge| edge.to.as_str()).collect();
    let roots: Vec<&GraphNode> = nodes
        .iter()
        .filter(|node| !targets.contains(node.name.as_str()))
        .collect();
    match roots.as_slice() {
        [] => Err(EngineError::InvalidGraph(
            "graph has no start node".to_string(),
        )),
        [root] => Ok(root.name.clone()),
        _ => Err(EngineError::InvalidGraph(format!(
            "multiple start nodes: {}",
            roots
                .iter()
                .map(|node| node.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn splice_readiness_guard(
    nodes: &mut Vec<GraphNode>,
    edges: &mut Vec<GraphEdge>,
    guard: ReadinessGuard,
    original_start: &str,
) {
    nodes.push(GraphNode::handler(READINESS_CHECK_NODE, guard.check));
    nodes.push(GraphNode::handler(READINESS_RECOVERY_NODE, guard.recover));
    // Fallback edges route regardless of whatever status the guard
    // handlers report, keeping the splice transparent to the task.
    edges.push(GraphEdge::on_success(READINESS_CHECK_NODE, original_start).fallback());
    edges.push(GraphEdge::on_failure(READINESS_CHECK_NODE, READINESS_RECOVERY_NODE).fallback());
    edges.push(GraphEdge::on_success(READINESS_RECOVERY_NODE, original_start).fallback());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Round;
    use crate::{EngineError, NodeHandler, RoundResult};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopHandler;

    #[async_trait]
    impl NodeHandler for NoopHandler {
        async fn run(&self, _round: &mut Round<'_>) -> Result<RoundResult, EngineError> {
            Ok(RoundResult::success())
        }
    }

    fn handler() -> SharedNodeHandler {
        Arc::new(NoopHandler)
    }

    fn node(name: &str) -> GraphNode {
        GraphNode::handler(name, handler())
    }

    #[test]
    fn build_linear_graph_expected_root_start() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("first"))
            .add_node(node("second"))
            .add_edge(GraphEdge::on_success("first", "second"));

        let graph = builder.build(None).expect("graph should build");
        assert_eq!(graph.start(), "first");
        assert_eq!(graph.outgoing("first").len(), 1);
        assert_eq!(graph.outgoing("second").len(), 0);
    }

    #[test]
    fn build_duplicate_node_name_expected_error() {
        let mut builder = GraphBuilder::new();
        builder.add_node(node("twice")).add_node(node("twice"));

        let error = builder.build(None).expect_err("build should fail");
        assert!(matches!(error, EngineError::InvalidGraph(message) if message.contains("duplicate")));
    }

    #[test]
    fn build_two_roots_expected_multiple_start_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("a"))
            .add_node(node("b"))
            .add_node(node("sink"))
            .add_edge(GraphEdge::on_success("a", "sink"))
            .add_edge(GraphEdge::on_success("b", "sink"));

        let error = builder.build(None).expect_err("build should fail");
        assert!(
            matches!(error, EngineError::InvalidGraph(message) if message.contains("multiple start"))
        );
    }

    #[test]
    fn build_explicit_start_expected_wins_over_in_degree() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("root"))
            .add_node(node("marked").start())
            .add_edge(GraphEdge::on_success("root", "marked"));

        let graph = builder.build(None).expect("graph should build");
        assert_eq!(graph.start(), "marked");
    }

    #[test]
    fn build_two_explicit_starts_expected_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("a").start())
            .add_node(node("b").start());

        let error = builder.build(None).expect_err("build should fail");
        assert!(
            matches!(error, EngineError::InvalidGraph(message) if message.contains("multiple start"))
        );
    }

    #[test]
    fn build_cycle_without_root_expected_no_start_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(GraphEdge::on_success("a", "b"))
            .add_edge(GraphEdge::on_success("b", "a"));

        let error = builder.build(None).expect_err("build should fail");
        assert!(matches!(error, EngineError::InvalidGraph(message) if message.contains("no start")));
    }

    #[test]
    fn build_dangling_edge_expected_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("only"))
            .add_edge(GraphEdge::on_success("only", "missing"));

        let error = builder.build(None).expect_err("build should fail");
        assert!(matches!(error, EngineError::InvalidGraph(message) if message.contains("missing")));
    }

    #[test]
    fn build_duplicate_default_edges_expected_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("from"))
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(GraphEdge::on_success("from", "a"))
            .add_edge(GraphEdge::on_success("from", "b"));

        let error = builder.build(None).expect_err("build should fail");
        assert!(
            matches!(error, EngineError::InvalidGraph(message) if message.contains("multiple default"))
        );
    }

    #[test]
    fn build_duplicate_fallback_edges_expected_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("from"))
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(GraphEdge::on_success("from", "a").with_status("x").fallback())
            .add_edge(GraphEdge::on_success("from", "b").with_status("y").fallback());

        let error = builder.build(None).expect_err("build should fail");
        assert!(
            matches!(error, EngineError::InvalidGraph(message) if message.contains("multiple fallback"))
        );
    }

    #[test]
    fn build_default_plus_fallback_per_gate_expected_ok() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("from"))
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(GraphEdge::on_success("from", "a"))
            .add_edge(GraphEdge::on_success("from", "b").fallback())
            .add_edge(GraphEdge::on_failure("from", "a"))
            .add_edge(GraphEdge::on_failure("from", "b").fallback());

        builder.build(None).expect("graph should build");
    }

    #[test]
    fn build_with_readiness_guard_expected_splice() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(node("work"))
            .add_node(node("done"))
            .add_edge(GraphEdge::on_success("work", "done"));

        let guard = ReadinessGuard {
            check: handler(),
            recover: handler(),
        };
        let graph = builder.build(Some(guard)).expect("graph should build");

        assert_eq!(graph.start(), READINESS_CHECK_NODE);
        let check_edges = graph.outgoing(READINESS_CHECK_NODE);
        assert_eq!(check_edges.len(), 2);
        assert!(
            check_edges
                .iter()
                .any(|edge| edge.requires_success && edge.to == "work")
        );
        assert!(
            check_edges
                .iter()
                .any(|edge| !edge.requires_success && edge.to == READINESS_RECOVERY_NODE)
        );
        let recovery_edges = graph.outgoing(READINESS_RECOVERY_NODE);
        assert_eq!(recovery_edges.len(), 1);
        assert_eq!(recovery_edges[0].to, "work");
    }

    #[test]
    fn build_reserved_guard_name_expected_error() {
        let mut builder = GraphBuilder::new();
        builder.add_node(node(READINESS_CHECK_NODE));

        let guard = ReadinessGuard {
            check: handler(),
            recover: handler(),
        };
        let error = builder.build(Some(guard)).expect_err("build should fail");
        assert!(matches!(error, EngineError::InvalidGraph(message) if message.contains("reserved")));
    }
}
