//! Event system — observers of agent progress.
//!
//! Two layers:
//! - [`Subject`]: a generic observable bound to a state accessor. `notify`
//!   reads the state once and hands it to every attached [`Observer`].
//! - [`EventBus`]: the agent-facing bus. Observers implement
//!   [`AgentObserver`] and declare which callbacks they care about; events
//!   are also fanned out to `tokio::sync::broadcast` subscribers.
//!
//! A failing or panicking observer never affects the publisher or the other
//! observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    #[error("observer '{0}' declares no capabilities")]
    NoCapabilities(String),

    #[error("observer failed: {0}")]
    Delivery(String),

    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }
}

/// Run one delivery, converting a panic into an error.
fn deliver_isolated<F>(f: F) -> Result<(), ObserverError>
where
    F: FnOnce() -> Result<(), ObserverError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(ObserverError::Panicked(message))
        }
    }
}

/// Delivers to each observer in order, isolating failures. Returns the
/// number of successful deliveries.
fn deliver_all<O: ?Sized>(
    observers: &[Arc<O>],
    label: impl Fn(usize, &O) -> String,
    deliver: impl Fn(&O) -> Result<(), ObserverError>,
) -> usize {
    let mut delivered = 0;
    for (index, observer) in observers.iter().enumerate() {
        let observer: &O = observer;
        match deliver_isolated(|| deliver(observer)) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(observer = %label(index, observer), error = %e, "Observer delivery failed")
            }
        }
    }
    delivered
}

/// Identity of the allocation behind an `Arc`, ignoring vtables.
fn identity<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

/// Attached observers in attachment order, keyed by identity.
///
/// The lock is only held to copy or edit the list, never during delivery,
/// so observers may attach or detach from inside a callback.
struct ObserverSet<O: ?Sized> {
    entries: RwLock<Vec<(usize, Arc<O>)>>,
}

impl<O: ?Sized> ObserverSet<O> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn insert(&self, key: usize, observer: Arc<O>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|(k, _)| *k == key) {
            return false;
        }
        entries.push((key, observer));
        true
    }

    fn remove(&self, key: usize) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(k, _)| *k != key);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<O>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// --- Generic subject ---

/// Receives a subject's state on every notification.
pub trait Observer<S>: Send + Sync {
    fn notify(&self, state: &S) -> Result<(), ObserverError>;
}

type StateFn<S> = Box<dyn Fn() -> S + Send + Sync>;

/// An observable bound to a state accessor.
pub struct Subject<S> {
    state: StateFn<S>,
    observers: ObserverSet<dyn Observer<S>>,
}

impl<S> Subject<S> {
    pub fn new(state: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            state: Box::new(state),
            observers: ObserverSet::new(),
        }
    }

    /// Attach an observer. Returns `false` if it was already attached.
    pub fn attach(&self, observer: Arc<dyn Observer<S>>) -> bool {
        self.observers.insert(identity(&observer), observer)
    }

    /// Detach an observer. Returns `false` if it was not attached.
    pub fn detach(&self, observer: &Arc<dyn Observer<S>>) -> bool {
        self.observers.remove(identity(observer))
    }

    /// Deliver the current state to every observer in attachment order.
    ///
    /// Returns the number of successful deliveries.
    pub fn notify(&self) -> usize {
        let snapshot = self.observers.snapshot();
        if snapshot.is_empty() {
            return 0;
        }
        let state = (self.state)();
        deliver_all(
            &snapshot,
            |index, _| index.to_string(),
            |observer| observer.notify(&state),
        )
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

// --- Agent events ---

/// Lifecycle stage of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    Step,
    Completed,
    BudgetExhausted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageChange {
    pub agent: String,
    pub stage: Stage,
    /// Iteration index, for `Step` and terminal stages
    pub step: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub agent: String,
    pub step: usize,
    pub tool_name: String,
    pub call_id: String,
    pub success: bool,
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub agent: String,
    pub step: Option<usize>,
    pub tool_name: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything the agent loop publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    StageChanged(StageChange),
    ToolExecuted(ToolExecution),
    ErrorOccurred(ErrorReport),
}

impl AgentEvent {
    pub fn stage(agent: &str, stage: Stage, step: Option<usize>) -> Self {
        Self::StageChanged(StageChange {
            agent: agent.to_string(),
            stage,
            step,
            timestamp: Utc::now(),
        })
    }

    /// The capability an observer needs to receive this event.
    pub fn capability(&self) -> Capabilities {
        match self {
            Self::StageChanged(_) => Capabilities::STAGE_CHANGE,
            Self::ToolExecuted(_) => Capabilities::TOOL_EXECUTION,
            Self::ErrorOccurred(_) => Capabilities::ERROR,
        }
    }
}

/// The set of callbacks an [`AgentObserver`] implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const STAGE_CHANGE: Self = Self(1);
    pub const TOOL_EXECUTION: Self = Self(1 << 1);
    pub const ERROR: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An observer of agent runs.
///
/// Declare the callbacks you implement in [`AgentObserver::capabilities`];
/// the bus only invokes those.
pub trait AgentObserver: Send + Sync {
    fn name(&self) -> &str {
        "observer"
    }

    fn capabilities(&self) -> Capabilities;

    fn on_stage_change(&self, _event: &StageChange) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_tool_execution(&self, _event: &ToolExecution) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_error(&self, _event: &ErrorReport) -> Result<(), ObserverError> {
        Ok(())
    }
}

struct Registration {
    observer: Arc<dyn AgentObserver>,
    capabilities: Capabilities,
}

/// Explicit event bus passed to agents through their configuration.
pub struct EventBus {
    observers: ObserverSet<Registration>,
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            observers: ObserverSet::new(),
            sender,
        }
    }

    /// Attach an observer, recording its capabilities.
    ///
    /// Returns `Ok(false)` if it was already attached.
    pub fn attach(&self, observer: Arc<dyn AgentObserver>) -> Result<bool, ObserverError> {
        let capabilities = observer.capabilities();
        if capabilities.is_empty() {
            return Err(ObserverError::NoCapabilities(observer.name().to_string()));
        }
        let key = identity(&observer);
        Ok(self.observers.insert(
            key,
            Arc::new(Registration {
                observer,
                capabilities,
            }),
        ))
    }

    /// Detach an observer. Returns `false` if it was not attached.
    pub fn detach(&self, observer: &Arc<dyn AgentObserver>) -> bool {
        self.observers.remove(identity(observer))
    }

    /// Publish an event to observers and broadcast subscribers.
    ///
    /// Returns the number of successful observer deliveries.
    pub fn publish(&self, event: AgentEvent) -> usize {
        let needed = event.capability();
        let mut interested = self.observers.snapshot();
        interested.retain(|r| r.capabilities.contains(needed));

        let delivered = deliver_all(
            &interested,
            |_, r| r.observer.name().to_string(),
            |r| match &event {
                AgentEvent::StageChanged(e) => r.observer.on_stage_change(e),
                AgentEvent::ToolExecuted(e) => r.observer.on_tool_execution(e),
                AgentEvent::ErrorOccurred(e) => r.observer.on_error(e),
            },
        );

        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
        delivered
    }

    /// Subscribe to receive every event.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
