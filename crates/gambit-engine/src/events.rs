use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One observable moment in an operation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub sequence_no: u64,
    pub run_id: String,
    pub kind: OperationEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationEventKind {
    RunStarted {
        task: String,
    },
    RunFinished {
        task: String,
        success: bool,
        status: Option<String>,
    },
    Transition {
        from: String,
        to: String,
        status: Option<String>,
    },
    Retrying {
        node: String,
        attempt: u32,
        max_retries: u32,
    },
    Paused {
        node: String,
    },
    Resumed {
        node: String,
    },
}

pub trait OperationEventObserver: Send + Sync {
    fn on_event(&self, event: &OperationEvent);
}

impl<F> OperationEventObserver for F
where
    F: Fn(&OperationEvent) + Send + Sync,
{
    fn on_event(&self, event: &OperationEvent) {
        self(event);
    }
}

pub type SharedOperationEventObserver = Arc<dyn OperationEventObserver>;
pub type OperationEventSender = mpsc::UnboundedSender<OperationEvent>;
pub type OperationEventReceiver = mpsc::UnboundedReceiver<OperationEvent>;

/// Fan-out for operation events: an optional synchronous observer plus an
/// optional unbounded channel sender.
#[derive(Clone, Default)]
pub struct OperationEventSink {
    observer: Option<SharedOperationEventObserver>,
    sender: Option<OperationEventSender>,
}

impl OperationEventSink {
    pub fn with_observer(observer: SharedOperationEventObserver) -> Self {
        Self {
            observer: Some(observer),
            sender: None,
        }
    }

    pub fn with_sender(sender: OperationEventSender) -> Self {
        Self {
            observer: None,
            sender: Some(sender),
        }
    }

    pub fn observer(mut self, observer: SharedOperationEventObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn sender(mut self, sender: OperationEventSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some() || self.sender.is_some()
    }

    pub fn emit(&self, event: OperationEvent) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_event(&event);
        }
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(event);
        }
    }
}

pub fn operation_event_channel() -> (OperationEventSender, OperationEventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn sink_observer_and_sender_expected_both_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_seen = Arc::clone(&seen);
        let observer: SharedOperationEventObserver = Arc::new(move |event: &OperationEvent| {
            observer_seen
                .lock()
                .expect("observer mutex should lock")
                .push(event.sequence_no);
        });
        let (tx, mut rx) = operation_event_channel();
        let sink = OperationEventSink::with_observer(observer).sender(tx);

        sink.emit(OperationEvent {
            sequence_no: 3,
            run_id: "run-1".to_string(),
            kind: OperationEventKind::RunStarted {
                task: "daily".to_string(),
            },
        });

        let streamed = rx.try_recv().expect("channel should receive one event");
        assert_eq!(streamed.sequence_no, 3);
        assert_eq!(
            seen.lock().expect("observer mutex should lock").as_slice(),
            &[3]
        );
    }

    #[test]
    fn default_sink_expected_disabled() {
        let sink = OperationEventSink::default();
        assert!(!sink.is_enabled());
        sink.emit(OperationEvent {
            sequence_no: 1,
            run_id: "run-1".to_string(),
            kind: OperationEventKind::Paused {
                node: "n".to_string(),
            },
        });
    }
}
