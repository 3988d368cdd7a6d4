//! Service lifecycle vocabulary: names, modes, states, events and the
//! listener contract shared by every runtime service handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::controller::OperationFailure;

// ---------------------------------------------------------------------------
// ServiceName
// ---------------------------------------------------------------------------

/// Dotted runtime service name, e.g. `deployment.unit.app.war`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the runtime service backing deployment `name`.
    #[must_use]
    pub fn deployment_unit(name: &str) -> Self {
        Self(format!("deployment.unit.{name}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Modes, states, events
// ---------------------------------------------------------------------------

/// Desired mode of a service. Setting the mode triggers the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Active,
    Never,
}

impl ServiceMode {
    /// State in which a transition to this mode is finished.
    #[must_use]
    pub fn terminal_state(self) -> ServiceState {
        match self {
            Self::Active => ServiceState::Up,
            Self::Never => ServiceState::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Down,
    Starting,
    Up,
    Stopping,
    StartFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Delivered once to a listener right after it is installed.
    ListenerAdded,
    Starting,
    Started,
    Stopping,
    Stopped,
    StartFailed { reason: String },
}

/// Returned by a listener to stay installed or remove itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerControl {
    Retain,
    Detach,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Observer of a service's lifecycle.
///
/// Callbacks may arrive on any thread, including synchronously from inside
/// [`ServiceHandle::add_listener`] or [`ServiceHandle::set_mode`].
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, service: &dyn ServiceHandle, event: &LifecycleEvent) -> ListenerControl;
}

/// A long-lived runtime service as seen by operation handlers.
pub trait ServiceHandle: Send + Sync {
    fn name(&self) -> &ServiceName;

    fn state(&self) -> ServiceState;

    fn mode(&self) -> ServiceMode;

    /// Installs `listener` and then delivers `ListenerAdded` to it, outside
    /// any internal lock.
    fn add_listener(&self, listener: Arc<dyn LifecycleListener>);

    /// Requests a transition. Completion is observed through listeners.
    fn set_mode(&self, mode: ServiceMode);
}

/// Read-only lookup of installed services.
pub trait ServiceLookup: Send + Sync {
    fn lookup(&self, name: &ServiceName) -> Option<Arc<dyn ServiceHandle>>;
}

// ---------------------------------------------------------------------------
// ListenerSet
// ---------------------------------------------------------------------------

/// Listener bookkeeping for a [`ServiceHandle`] implementation.
///
/// The lock is only held to mutate the list, never while a listener runs, so
/// listeners may call back into the service.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Arc<dyn LifecycleListener>)>>,
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `listener`, then announces `ListenerAdded` to it.
    pub fn add(&self, service: &dyn ServiceHandle, listener: Arc<dyn LifecycleListener>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::clone(&listener)));
        if listener.on_event(service, &LifecycleEvent::ListenerAdded) == ListenerControl::Detach {
            self.remove(id);
        }
    }

    /// Delivers `event` to every listener installed when the call began.
    pub fn notify(&self, service: &dyn ServiceHandle, event: &LifecycleEvent) {
        let snapshot = self.listeners.lock().clone();
        let detached: Vec<u64> = snapshot
            .iter()
            .filter(|(_, listener)| listener.on_event(service, event) == ListenerControl::Detach)
            .map(|(id, _)| *id)
            .collect();
        if !detached.is_empty() {
            self.listeners.lock().retain(|(id, _)| !detached.contains(id));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}

// ---------------------------------------------------------------------------
// RuntimeServices
// ---------------------------------------------------------------------------

/// What a runtime-enabled context hands to runtime effects.
#[derive(Clone)]
pub struct RuntimeServices {
    lookup: Arc<dyn ServiceLookup>,
}

impl RuntimeServices {
    #[must_use]
    pub fn new(lookup: Arc<dyn ServiceLookup>) -> Self {
        Self { lookup }
    }

    #[must_use]
    pub fn lookup(&self, name: &ServiceName) -> Option<Arc<dyn ServiceHandle>> {
        self.lookup.lookup(name)
    }

    /// # Errors
    ///
    /// Returns a runtime bridge failure if the service is not installed.
    pub fn require(&self, name: &ServiceName) -> Result<Arc<dyn ServiceHandle>, OperationFailure> {
        self.lookup(name)
            .ok_or_else(|| OperationFailure::runtime_bridge(format!("Service {name} is not installed")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::controller::FailureKind;

    struct Inert(ServiceName);

    impl ServiceHandle for Inert {
        fn name(&self) -> &ServiceName {
            &self.0
        }
        fn state(&self) -> ServiceState {
            ServiceState::Down
        }
        fn mode(&self) -> ServiceMode {
            ServiceMode::Never
        }
        fn add_listener(&self, _listener: Arc<dyn LifecycleListener>) {}
        fn set_mode(&self, _mode: ServiceMode) {}
    }

    /// Counts events and detaches after `limit` of them.
    struct Counting {
        seen: AtomicUsize,
        limit: usize,
    }

    impl LifecycleListener for Counting {
        fn on_event(&self, _service: &dyn ServiceHandle, _event: &LifecycleEvent) -> ListenerControl {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                ListenerControl::Detach
            } else {
                ListenerControl::Retain
            }
        }
    }

    #[test]
    fn deployment_unit_names_are_dotted() {
        assert_eq!(ServiceName::deployment_unit("app.war").as_str(), "deployment.unit.app.war");
    }

    #[test]
    fn terminal_states_follow_mode() {
        assert_eq!(ServiceMode::Active.terminal_state(), ServiceState::Up);
        assert_eq!(ServiceMode::Never.terminal_state(), ServiceState::Down);
    }

    #[test]
    fn listener_set_announces_and_detaches() {
        let service = Inert(ServiceName::new("svc"));
        let set = ListenerSet::new();
        let listener = Arc::new(Counting {
            seen: AtomicUsize::new(0),
            limit: 2,
        });
        set.add(&service, listener.clone());
        assert_eq!(listener.seen.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);

        set.notify(&service, &LifecycleEvent::Stopped);
        assert!(set.is_empty());

        set.notify(&service, &LifecycleEvent::Stopped);
        assert_eq!(listener.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_detaching_on_add_is_removed() {
        let service = Inert(ServiceName::new("svc"));
        let set = ListenerSet::new();
        set.add(
            &service,
            Arc::new(Counting {
                seen: AtomicUsize::new(0),
                limit: 1,
            }),
        );
        assert!(set.is_empty());
    }

    #[test]
    fn missing_service_is_a_runtime_bridge_failure() {
        struct Empty;
        impl ServiceLookup for Empty {
            fn lookup(&self, _name: &ServiceName) -> Option<Arc<dyn ServiceHandle>> {
                None
            }
        }
        let runtime = RuntimeServices::new(Arc::new(Empty));
        let Err(failure) = runtime.require(&ServiceName::deployment_unit("x.war")) else {
            panic!("lookup should fail");
        };
        assert_eq!(failure.kind(), FailureKind::RuntimeBridge);
        assert_eq!(failure.to_string(), "Service deployment.unit.x.war is not installed");
    }
}
