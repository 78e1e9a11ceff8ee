use crate::engine::{Operation, Round};
use crate::{EngineError, RoundResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One unit of work in a task graph, producing a [`RoundResult`] per round.
///
/// A handler error does not abort the run: the engine converts it into a
/// retry with the reserved "exception" status.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, round: &mut Round<'_>) -> Result<RoundResult, EngineError>;
}

pub type SharedNodeHandler = Arc<dyn NodeHandler>;

/// The work a node performs: an inline handler, or a nested operation run
/// to completion whose terminal result is translated back into a round
/// result.
#[derive(Clone)]
pub enum NodeWork {
    Handler(SharedNodeHandler),
    SubOperation(Arc<Operation>),
}

impl fmt::Debug for NodeWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::SubOperation(_) => f.write_str("SubOperation(..)"),
        }
    }
}

/// A named node plus its per-node execution policy.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub name: String,
    pub work: NodeWork,
    /// Retry attempts allowed beyond the first invocation.
    pub max_retries: u32,
    /// Node-local timeout, measured in active (pause-exempt) time since the
    /// node became current.
    pub timeout: Option<Duration>,
    /// Capture a fresh frame before each handler invocation.
    pub capture_before_run: bool,
    /// Keep this node's settled result addressable by later nodes.
    pub persist_result: bool,
    pub is_start: bool,
    /// Suppress transition logging while this node waits or retries.
    pub silent: bool,
    /// Translate a nested operation's failure into a retry instead of a
    /// failure.
    pub retry_on_sub_failure: bool,
}

impl GraphNode {
    pub fn handler(name: impl Into<String>, handler: SharedNodeHandler) -> Self {
        Self::new(name, NodeWork::Handler(handler))
    }

    pub fn sub_operation(name: impl Into<String>, operation: Arc<Operation>) -> Self {
        Self::new(name, NodeWork::SubOperation(operation))
    }

    fn new(name: impl Into<String>, work: NodeWork) -> Self {
        Self {
            name: name.into(),
            work,
            max_retries: 0,
            timeout: None,
            capture_before_run: false,
            persist_result: false,
            is_start: false,
            silent: false,
            retry_on_sub_failure: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_before_run(mut self) -> Self {
        self.capture_before_run = true;
        self
    }

    pub fn persist_result(mut self) -> Self {
        self.persist_result = true;
        self
    }

    pub fn start(mut self) -> Self {
        self.is_start = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn retry_on_sub_failure(mut self) -> Self {
        self.retry_on_sub_failure = true;
        self
    }
}
