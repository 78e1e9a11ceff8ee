use crate::{GraphBuilder, OperationResult, ReadinessGuard};

/// Contract a concrete automated task supplies to the engine.
///
/// `build_graph` is called at the start of every execution, so node
/// registrations (and any state captured by their handlers) start clean on
/// each run. All hooks have no-op defaults; pause/resume hooks may fire
/// repeatedly while paused and must be idempotent.
pub trait OperationTask: Send + Sync {
    /// Human-readable name used in logs and events.
    fn display_name(&self) -> &str;

    /// Register this task's nodes and edges.
    fn build_graph(&self, graph: &mut GraphBuilder);

    /// Optional pre-flight guard spliced ahead of the start node.
    fn readiness_guard(&self) -> Option<ReadinessGuard> {
        None
    }

    /// Called once per execution, after the graph is built and before the
    /// first round.
    fn on_init(&self) {}

    fn on_pause(&self) {}

    fn on_resume(&self) {}

    /// Called with the terminal result just before `execute` returns.
    fn on_done(&self, _result: &OperationResult) {}
}
