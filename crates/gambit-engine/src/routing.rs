use crate::{GraphEdge, RoundResult};

/// Select the transition to take out of a node for the round's result.
///
/// Precedence, over the node's outgoing edges in declaration order:
/// 1. edges whose gate does not match the outcome are discarded;
/// 2. the first fallback edge among the remainder is remembered;
/// 3. the first exact status match wins: both sides `None`, or both sides
///    equal. A `None` filter against a status-carrying result is not a
///    match, and vice versa;
/// 4. otherwise the remembered fallback;
/// 5. otherwise there is no next node and the graph terminates here.
pub fn resolve_next_edge<'a>(
    edges: &'a [GraphEdge],
    result: &RoundResult,
) -> Option<&'a GraphEdge> {
    let mut fallback = None;
    for edge in edges {
        if edge.requires_success != result.outcome.is_success() {
            continue;
        }
        if edge.fallback && fallback.is_none() {
            fallback = Some(edge);
        }
        let exact = match (edge.status.as_deref(), result.status.as_deref()) {
            (None, None) => true,
            (Some(filter), Some(status)) => filter == status,
            _ => false,
        };
        if exact {
            return Some(edge);
        }
    }
    fallback
}
