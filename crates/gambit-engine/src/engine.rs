use crate::{
    ControlSignal, EngineError, GraphBuilder, GraphNode, ListenerId, NodeWork, OperationEvent,
    OperationEventKind, OperationEventSink, OperationTask, RoundOutcome, RoundResult, RunContext,
    resolve_next_edge, round::status,
};
use futures::future::BoxFuture;
use gambit_vision::{
    Frame, ScreenMap, SharedGameVision, SharedInputDriver, SharedScreenCapturer,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, mem};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal outcome of one [`Operation::execute`] call; the only thing a
/// caller observes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub status: Option<String>,
    pub data: Option<Value>,
}

impl OperationResult {
    pub fn failure(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status.into()),
            data: None,
        }
    }

    fn from_round(result: RoundResult) -> Self {
        Self {
            success: result.outcome.is_success(),
            status: result.status,
            data: result.data,
        }
    }
}

/// External collaborators every operation consumes.
#[derive(Clone)]
pub struct OperationServices {
    pub capturer: SharedScreenCapturer,
    pub vision: SharedGameVision,
    pub input: SharedInputDriver,
    pub screens: ScreenMap,
}

impl OperationServices {
    pub fn new(
        capturer: SharedScreenCapturer,
        vision: SharedGameVision,
        input: SharedInputDriver,
    ) -> Self {
        Self {
            capturer,
            vision,
            input,
            screens: ScreenMap::new(),
        }
    }

    pub fn with_screens(mut self, screens: ScreenMap) -> Self {
        self.screens = screens;
        self
    }
}

#[derive(Clone, Debug)]
pub struct OperationConfig {
    /// Whole-operation timeout, measured in active (pause-exempt) time.
    pub timeout: Option<Duration>,
    /// Poll interval of the pause loop.
    pub pause_poll: Duration,
    /// Directory diagnostic frames are written under; disabled when unset.
    pub diagnostics_root: Option<PathBuf>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            pause_poll: Duration::from_secs(1),
            diagnostics_root: None,
        }
    }
}

/// Context handed to a node handler for one round.
///
/// Holds the working frame, access to the collaborators, the results of
/// the preceding and persisted nodes, and the per-node click flag the
/// click-area helper keys on.
pub struct Round<'a> {
    pub(crate) services: &'a OperationServices,
    pub(crate) frame: Option<Frame>,
    pub(crate) previous: Option<&'a (String, RoundResult)>,
    pub(crate) persisted: &'a BTreeMap<String, RoundResult>,
    pub(crate) started_at: Instant,
    pub(crate) has_clicked: bool,
}

impl Round<'_> {
    pub fn services(&self) -> &OperationServices {
        self.services
    }

    /// The working frame, if one has been captured this node.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Capture a fresh frame, replacing the working frame.
    pub async fn refresh_frame(&mut self) -> Result<&Frame, EngineError> {
        let frame = self.services.capturer.capture().await?;
        Ok(self.frame.insert(frame))
    }

    /// The working frame, capturing one first when none is held.
    pub async fn ensure_frame(&mut self) -> Result<&Frame, EngineError> {
        if self.frame.is_none() {
            let frame = self.services.capturer.capture().await?;
            self.frame = Some(frame);
        }
        self.frame
            .as_ref()
            .ok_or_else(|| EngineError::Runtime("working frame unavailable".to_string()))
    }

    /// Drop the working frame so the next use captures a fresh one.
    pub fn invalidate_frame(&mut self) {
        self.frame = None;
    }

    /// Name and result of the immediately preceding node, if any.
    pub fn previous(&self) -> Option<(&str, &RoundResult)> {
        self.previous.map(|(name, result)| (name.as_str(), result))
    }

    /// Settled result a persist-enabled node stored earlier in this run.
    pub fn persisted(&self, node: &str) -> Option<&RoundResult> {
        self.persisted.get(node)
    }

    pub fn round_started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether this node already clicked in an earlier round.
    pub fn clicked_before(&self) -> bool {
        self.has_clicked
    }

    pub fn mark_clicked(&mut self) {
        self.has_clicked = true;
    }
}

/// Pause bookkeeping shared between the control-bus listeners and the
/// round loop. Only the first pause signal opens an interval, so repeated
/// signals never double-count; the accumulated total only grows.
#[derive(Clone, Default)]
struct PauseLedger {
    inner: Arc<Mutex<PauseLedgerState>>,
}

#[derive(Default)]
struct PauseLedgerState {
    paused_since: Option<Instant>,
    accumulated: Duration,
}

impl PauseLedger {
    fn mark_paused(&self, now: Instant) {
        let mut state = self.inner.lock().expect("pause ledger mutex should lock");
        if state.paused_since.is_none() {
            state.paused_since = Some(now);
        }
    }

    fn mark_resumed(&self, now: Instant) {
        let mut state = self.inner.lock().expect("pause ledger mutex should lock");
        if let Some(since) = state.paused_since.take() {
            state.accumulated += now.duration_since(since);
        }
    }

    fn total_paused(&self, now: Instant) -> Duration {
        let state = self.inner.lock().expect("pause ledger mutex should lock");
        let open = state
            .paused_since
            .map(|since| now.duration_since(since))
            .unwrap_or_default();
        state.accumulated + open
    }
}

struct EventEmitter<'a> {
    sink: &'a OperationEventSink,
    run_id: &'a str,
    sequence_no: AtomicU64,
}

impl<'a> EventEmitter<'a> {
    fn new(sink: &'a OperationEventSink, run_id: &'a str) -> Self {
        Self {
            sink,
            run_id,
            sequence_no: AtomicU64::new(0),
        }
    }

    fn emit(&self, kind: OperationEventKind) {
        let sequence_no = self.sequence_no.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.emit(OperationEvent {
            sequence_no,
            run_id: self.run_id.to_string(),
            kind,
        });
    }
}

struct RunState {
    current: String,
    previous: Option<(String, RoundResult)>,
    persisted: BTreeMap<String, RoundResult>,
    retry_count: u32,
    run_started_at: Instant,
    node_started_at: Instant,
    node_pause_mark: Duration,
    round_started_at: Instant,
    last_frame: Option<Frame>,
    has_clicked: bool,
    was_paused: bool,
    ledger: PauseLedger,
}

/// A runnable automated task: the round loop plus the task definition and
/// its collaborators.
///
/// Runtime state and the graph are rebuilt on every [`execute`] call, so
/// one operation value may be executed repeatedly (and is shared by
/// reference when nested inside another graph).
///
/// [`execute`]: Operation::execute
pub struct Operation {
    task: Arc<dyn OperationTask>,
    services: OperationServices,
    run_context: RunContext,
    config: OperationConfig,
    events: OperationEventSink,
}

impl Operation {
    pub fn new(
        task: Arc<dyn OperationTask>,
        services: OperationServices,
        run_context: RunContext,
    ) -> Self {
        Self {
            task,
            services,
            run_context,
            config: OperationConfig::default(),
            events: OperationEventSink::default(),
        }
    }

    pub fn with_config(mut self, config: OperationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: OperationEventSink) -> Self {
        self.events = events;
        self
    }

    pub fn display_name(&self) -> &str {
        self.task.display_name()
    }

    /// Run the operation to completion.
    ///
    /// Never returns an error: graph construction failures, handler
    /// errors that exhaust their retries, timeouts, and stop requests all
    /// degrade to a terminal failed result. Details are only visible
    /// through logs, events, and saved diagnostic frames.
    pub async fn execute(&self) -> OperationResult {
        let run_id = Uuid::new_v4().to_string();
        let task_name = self.task.display_name().to_string();
        let emitter = EventEmitter::new(&self.events, &run_id);

        info!(task = %task_name, run_id = %run_id, "operation started");
        emitter.emit(OperationEventKind::RunStarted {
            task: task_name.clone(),
        });

        let ledger = PauseLedger::default();
        let subscriptions = self.subscribe_control(&ledger);

        let result = match self.run_rounds(&ledger, &emitter).await {
            Ok(result) => result,
            Err(error) => {
                error!(task = %task_name, error = %error, "operation aborted");
                OperationResult::failure(error.to_string())
            }
        };

        for id in subscriptions {
            self.run_context.unsubscribe(id);
        }

        emitter.emit(OperationEventKind::RunFinished {
            task: task_name.clone(),
            success: result.success,
            status: result.status.clone(),
        });
        if result.success {
            info!(task = %task_name, status = result.status.as_deref().unwrap_or(""), "operation succeeded");
        } else {
            warn!(task = %task_name, status = result.status.as_deref().unwrap_or(""), "operation failed");
        }
        self.task.on_done(&result);
        result
    }

    fn subscribe_control(&self, ledger: &PauseLedger) -> Vec<ListenerId> {
        let pause_ledger = ledger.clone();
        let pause_task = Arc::clone(&self.task);
        let pause_id = self.run_context.subscribe(
            ControlSignal::Pause,
            Arc::new(move |_signal: ControlSignal| {
                pause_ledger.mark_paused(Instant::now());
                pause_task.on_pause();
            }),
        );

        let resume_ledger = ledger.clone();
        let resume_task = Arc::clone(&self.task);
        let resume_id = self.run_context.subscribe(
            ControlSignal::Resume,
            Arc::new(move |_signal: ControlSignal| {
                resume_ledger.mark_resumed(Instant::now());
                resume_task.on_resume();
            }),
        );

        vec![pause_id, resume_id]
    }

    async fn run_rounds(
        &self,
        ledger: &PauseLedger,
        emitter: &EventEmitter<'_>,
    ) -> Result<OperationResult, EngineError> {
        let mut builder = GraphBuilder::new();
        self.task.build_graph(&mut builder);
        let graph = builder.build(self.task.readiness_guard())?;
        self.task.on_init();

        let now = Instant::now();
        let mut state = RunState {
            current: graph.start().to_string(),
            previous: None,
            persisted: BTreeMap::new(),
            retry_count: 0,
            run_started_at: now,
            node_started_at: now,
            node_pause_mark: Duration::ZERO,
            round_started_at: now,
            last_frame: None,
            has_clicked: false,
            was_paused: false,
            ledger: ledger.clone(),
        };
        let task_name = self.task.display_name();

        loop {
            state.round_started_at = Instant::now();
            let now = state.round_started_at;

            if let Some(timeout) = self.config.timeout {
                let active = now
                    .duration_since(state.run_started_at)
                    .saturating_sub(state.ledger.total_paused(now));
                if active >= timeout {
                    warn!(task = %task_name, node = %state.current, "operation timed out");
                    return Ok(OperationResult::failure(status::TIMED_OUT));
                }
            }

            if self.run_context.is_stop_requested() {
                info!(task = %task_name, node = %state.current, "operation stopped by request");
                return Ok(OperationResult::failure(status::STOPPED));
            }

            if self.run_context.is_paused() {
                if !state.was_paused {
                    state.was_paused = true;
                    debug!(task = %task_name, node = %state.current, "operation paused");
                    emitter.emit(OperationEventKind::Paused {
                        node: state.current.clone(),
                    });
                    // The pause may have raced a handler that was still
                    // executing; re-fire the hook now that the round is
                    // over. Hooks are idempotent.
                    self.task.on_pause();
                }
                tokio::time::sleep(self.config.pause_poll).await;
                continue;
            }
            if mem::take(&mut state.was_paused) {
                debug!(task = %task_name, node = %state.current, "operation resumed");
                emitter.emit(OperationEventKind::Resumed {
                    node: state.current.clone(),
                });
            }

            let Some(node) = graph.node(&state.current).cloned() else {
                return Err(EngineError::Runtime(format!(
                    "traversal reached unknown node '{}'",
                    state.current
                )));
            };

            let mut result = match self.run_node(&node, &mut state).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(
                        task = %task_name,
                        node = %node.name,
                        error = %error,
                        "node handler failed, treating as retry"
                    );
                    self.save_diagnostic_frame(state.last_frame.as_ref());
                    RoundResult::retry().with_status(status::EXCEPTION)
                }
            };

            if let Some(wait) = result.wait.take() {
                wait.apply(state.round_started_at).await;
            }

            if result.outcome == RoundOutcome::Retry {
                state.retry_count += 1;
                if state.retry_count <= node.max_retries {
                    if node.silent {
                        debug!(task = %task_name, node = %node.name, attempt = state.retry_count, "node retrying");
                    } else {
                        info!(
                            task = %task_name,
                            node = %node.name,
                            attempt = state.retry_count,
                            max_retries = node.max_retries,
                            status = result.status.as_deref().unwrap_or(""),
                            "node retrying"
                        );
                    }
                    emitter.emit(OperationEventKind::Retrying {
                        node: node.name.clone(),
                        attempt: state.retry_count,
                        max_retries: node.max_retries,
                    });
                    continue;
                }
                warn!(
                    task = %task_name,
                    node = %node.name,
                    status = result.status.as_deref().unwrap_or(""),
                    "node retries exhausted"
                );
                result = result.into_failure();
                state.retry_count = 0;
            } else if result.outcome == RoundOutcome::Wait {
                state.retry_count = 0;
                if node.silent {
                    debug!(task = %task_name, node = %node.name, "node waiting");
                } else {
                    info!(
                        task = %task_name,
                        node = %node.name,
                        status = result.status.as_deref().unwrap_or(""),
                        "node waiting"
                    );
                }
                continue;
            } else {
                state.retry_count = 0;
            }

            if node.persist_result && result.outcome.is_settled() {
                state.persisted.insert(node.name.clone(), result.clone());
            }

            let next = resolve_next_edge(graph.outgoing(&node.name), &result).cloned();
            let Some(edge) = next else {
                if !result.outcome.is_settled() {
                    error!(
                        task = %task_name,
                        node = %node.name,
                        outcome = result.outcome.as_str(),
                        "graph terminated on an unsettled outcome, degrading to failure"
                    );
                    result = result.into_failure();
                }
                if !result.outcome.is_success() {
                    self.save_diagnostic_frame(state.last_frame.as_ref());
                }
                return Ok(OperationResult::from_round(result));
            };

            info!(
                task = %task_name,
                from = %node.name,
                to = %edge.to,
                status = result.status.as_deref().unwrap_or(""),
                "node transition"
            );
            emitter.emit(OperationEventKind::Transition {
                from: node.name.clone(),
                to: edge.to.clone(),
                status: result.status.clone(),
            });

            state.previous = Some((node.name.clone(), result));
            state.current = edge.to.clone();
            state.retry_count = 0;
            let now = Instant::now();
            state.node_started_at = now;
            state.node_pause_mark = state.ledger.total_paused(now);
            state.has_clicked = false;
        }
    }

    fn run_node<'a>(
        &'a self,
        node: &'a GraphNode,
        state: &'a mut RunState,
    ) -> BoxFuture<'a, Result<RoundResult, EngineError>> {
        Box::pin(async move {
            if let Some(timeout) = node.timeout {
                let now = Instant::now();
                let paused_since_node = state
                    .ledger
                    .total_paused(now)
                    .saturating_sub(state.node_pause_mark);
                let active = now
                    .duration_since(state.node_started_at)
                    .saturating_sub(paused_since_node);
                if active >= timeout {
                    return Ok(RoundResult::fail().with_status(status::TIMED_OUT));
                }
            }

            if node.capture_before_run {
                state.last_frame = Some(self.services.capturer.capture().await?);
            }

            match &node.work {
                NodeWork::Handler(handler) => {
                    let frame = state.last_frame.take();
                    let has_clicked = state.has_clicked;
                    let mut round = Round {
                        services: &self.services,
                        frame,
                        previous: state.previous.as_ref(),
                        persisted: &state.persisted,
                        started_at: state.round_started_at,
                        has_clicked,
                    };
                    let result = handler.run(&mut round).await;
                    let frame_after = round.frame;
                    let clicked_after = round.has_clicked;
                    state.last_frame = frame_after;
                    state.has_clicked = clicked_after;
                    result
                }
                NodeWork::SubOperation(operation) => {
                    let nested: BoxFuture<'_, OperationResult> = Box::pin(operation.execute());
                    let terminal = nested.await;
                    let mut result = if terminal.success {
                        RoundResult::success()
                    } else if node.retry_on_sub_failure {
                        RoundResult::retry()
                    } else {
                        RoundResult::fail()
                    };
                    if let Some(status) = terminal.status {
                        result = result.with_status(status);
                    }
                    if let Some(data) = terminal.data {
                        result = result.with_data(data);
                    }
                    Ok(result)
                }
            }
        })
    }

    fn save_diagnostic_frame(&self, frame: Option<&Frame>) {
        let Some(root) = self.config.diagnostics_root.as_ref() else {
            return;
        };
        let Some(frame) = frame else {
            return;
        };
        if let Err(error) = fs::create_dir_all(root) {
            warn!(error = %error, "failed to create diagnostics directory");
            return;
        }
        let digest = blake3::hash(&frame.image);
        let path = root.join(format!("frame-{}.png", &digest.to_hex().as_str()[..16]));
        match fs::write(&path, &frame.image) {
            Ok(()) => info!(path = %path.display(), "saved diagnostic frame"),
            Err(error) => {
                warn!(error = %error, path = %path.display(), "failed writing diagnostic frame");
            }
        }
    }
}
