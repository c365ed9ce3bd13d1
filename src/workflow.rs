//! Workflow state machine and observable value slots.
//!
//! `WorkflowModel` is the single shared holder for the session phase, the
//! camera-live flag, and the most recently detected result. State transitions
//! are driven from one designated callback context (the session's pump), but
//! the model carries explicit locks so that a misdirected call serializes
//! instead of corrupting state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ----------------------------------------------------------------------------
// WorkflowState
// ----------------------------------------------------------------------------

/// Session phase governing which operations are currently meaningful.
///
/// The live scanning pipeline exercises `NotStarted`, `Detecting` and
/// `Detected`; the remaining phases belong to confirm/search flows layered on
/// the same model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    NotStarted,
    Detecting,
    Detected,
    Confirming,
    Confirmed,
    Searching,
    Searched,
}

// ----------------------------------------------------------------------------
// ObservableValue: explicit subscription registry
// ----------------------------------------------------------------------------

/// Token returned by `ObservableValue::subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<T> = Box<dyn FnMut(&T) + Send>;

struct Registry<T> {
    observers: Vec<(SubscriptionId, Observer<T>)>,
    next_id: u64,
}

/// A value slot with synchronous observer notification.
///
/// Observers run in registration order with the registry lock held, so a
/// handler may read `get` on this same value, but must not subscribe,
/// unsubscribe or set it from inside its callback. Handler panics unwind
/// into the notifying call; the registry does not insulate them.
pub struct ObservableValue<T> {
    value: Mutex<Option<T>>,
    registry: Mutex<Registry<T>>,
}

impl<T> ObservableValue<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            registry: Mutex::new(Registry {
                observers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn subscribe(&self, observer: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let mut registry = lock(&self.registry);
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false when the token is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.observers.len();
        registry.observers.retain(|(existing, _)| *existing != id);
        registry.observers.len() != before
    }
}

impl<T: Clone> ObservableValue<T> {
    /// Store a value and notify every observer.
    pub fn set(&self, value: T) {
        {
            let mut slot = lock(&self.value);
            *slot = Some(value);
        }
        self.notify();
    }

    fn notify(&self) {
        // Clone the value out so the slot lock is not held while observers
        // run; a handler reading `get` must not deadlock.
        let Some(value) = lock(&self.value).clone() else {
            return;
        };
        let mut registry = lock(&self.registry);
        for (_, observer) in registry.observers.iter_mut() {
            observer(&value);
        }
    }

    pub fn get(&self) -> Option<T> {
        lock(&self.value).clone()
    }
}

impl<T: PartialEq + Clone> ObservableValue<T> {
    /// Store a value and notify observers, unless the new value equals the
    /// current one; a redundant set is a no-op with zero notifications.
    pub fn set_if_changed(&self, value: T) -> bool {
        {
            let mut slot = lock(&self.value);
            if slot.as_ref() == Some(&value) {
                return false;
            }
            *slot = Some(value);
        }
        self.notify();
        true
    }
}

impl<T> Default for ObservableValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned lock means an observer panicked; the stored state is intact.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// WorkflowModel
// ----------------------------------------------------------------------------

/// Single-writer, multi-reader holder for the session phase, camera liveness
/// and the last detected result.
///
/// The detected slot fires once per distinct value: setting an equal result
/// again does not re-notify, so downstream observers (toast/log equivalents)
/// see each payload once.
pub struct WorkflowModel<R> {
    state: ObservableValue<WorkflowState>,
    camera_live: AtomicBool,
    detected: ObservableValue<R>,
}

impl<R: PartialEq + Clone> WorkflowModel<R> {
    pub fn new() -> Self {
        let state = ObservableValue::new();
        state.set(WorkflowState::NotStarted);
        Self {
            state,
            camera_live: AtomicBool::new(false),
            detected: ObservableValue::new(),
        }
    }

    /// Transition the workflow state. A no-op (zero notifications) when the
    /// new state equals the current one; every accepted transition notifies
    /// all state observers synchronously.
    pub fn set_workflow_state(&self, new: WorkflowState) -> bool {
        let changed = self.state.set_if_changed(new);
        if changed {
            log::debug!("workflow state -> {:?}", new);
        }
        changed
    }

    pub fn workflow_state(&self) -> WorkflowState {
        self.state.get().unwrap_or_default()
    }

    pub fn subscribe_state(
        &self,
        observer: impl FnMut(&WorkflowState) + Send + 'static,
    ) -> SubscriptionId {
        self.state.subscribe(observer)
    }

    pub fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Camera liveness gates whether the processor's results are applied;
    /// it is independent of the workflow state itself.
    pub fn mark_camera_live(&self) {
        self.camera_live.store(true, Ordering::SeqCst);
    }

    pub fn mark_camera_frozen(&self) {
        self.camera_live.store(false, Ordering::SeqCst);
    }

    pub fn is_camera_live(&self) -> bool {
        self.camera_live.load(Ordering::SeqCst)
    }

    /// Record a detected result. Set only on entry to `Detected`; equal
    /// values are deduplicated.
    pub fn set_detected(&self, result: R) -> bool {
        self.detected.set_if_changed(result)
    }

    pub fn detected(&self) -> Option<R> {
        self.detected.get()
    }

    pub fn subscribe_detected(
        &self,
        observer: impl FnMut(&R) + Send + 'static,
    ) -> SubscriptionId {
        self.detected.subscribe(observer)
    }

    pub fn unsubscribe_detected(&self, id: SubscriptionId) -> bool {
        self.detected.unsubscribe(id)
    }
}

impl<R: PartialEq + Clone> Default for WorkflowModel<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
