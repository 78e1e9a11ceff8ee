use serde::{Deserialize, Serialize};

/// A directed transition between two nodes, gated on the source node's
/// round outcome and an optional status label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    /// `true` gates on a success outcome, `false` on a failure outcome.
    pub requires_success: bool,
    /// Status label this edge matches. `None` matches only results that
    /// carry no status at all.
    #[serde(default)]
    pub status: Option<String>,
    /// Catch-all taken when no status-specific edge matches.
    #[serde(default)]
    pub fallback: bool,
}

impl GraphEdge {
    pub fn on_success(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            requires_success: true,
            status: None,
            fallback: false,
        }
    }

    pub fn on_failure(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            requires_success: false,
            ..Self::on_success(from, to)
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_builders_expected_gates() {
        let edge = GraphEdge::on_success("a", "b");
        assert_eq!(edge.from, "a");
        assert_eq!(edge.to, "b");
        assert!(edge.requires_success);
        assert_eq!(edge.status, None);
        assert!(!edge.fallback);

        let edge = GraphEdge::on_failure("a", "c").with_status("not found").fallback();
        assert!(!edge.requires_success);
        assert_eq!(edge.status.as_deref(), Some("not found"));
        assert!(edge.fallback);
    }
}
