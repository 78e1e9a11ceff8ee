use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Control signals delivered on the run-context bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    Pause,
    Resume,
}

pub trait ControlListener: Send + Sync {
    fn on_signal(&self, signal: ControlSignal);
}

impl<F> ControlListener for F
where
    F: Fn(ControlSignal) + Send + Sync,
{
    fn on_signal(&self, signal: ControlSignal) {
        self(signal);
    }
}

pub type SharedControlListener = Arc<dyn ControlListener>;

/// Handle returned by [`RunContext::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct RunContextState {
    stop_requested: AtomicBool,
    paused: AtomicBool,
    next_listener_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, (ControlSignal, SharedControlListener)>>,
}

/// Shared stop/pause state and control-signal bus, one per process (or per
/// independent task group). Every operation holds a clone; the engine
/// subscribes its listeners at the start of each execution and removes
/// them at the end.
#[derive(Clone, Default)]
pub struct RunContext {
    inner: Arc<RunContextState>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Request a pause. The signal is delivered to subscribers even when
    /// already paused; pause hooks must be idempotent, and duration
    /// bookkeeping is the engine's concern.
    pub fn request_pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        self.emit(ControlSignal::Pause);
    }

    /// Request a resume; no-op unless currently paused.
    pub fn request_resume(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            self.emit(ControlSignal::Resume);
        }
    }

    pub fn subscribe(&self, signal: ControlSignal, listener: SharedControlListener) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .expect("listener mutex should lock")
            .insert(id, (signal, listener));
        ListenerId(id)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .expect("listener mutex should lock")
            .remove(&id.0);
    }

    fn emit(&self, signal: ControlSignal) {
        // Collect matching listeners first so a listener may re-enter the
        // context without deadlocking.
        let targets: Vec<SharedControlListener> = self
            .inner
            .listeners
            .lock()
            .expect("listener mutex should lock")
            .values()
            .filter(|(wanted, _)| *wanted == signal)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in targets {
            listener.on_signal(signal);
        }
    }
}
