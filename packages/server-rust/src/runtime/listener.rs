//! The one-shot listener that turns an asynchronous service transition into
//! a single step completion.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::lifecycle::{
    LifecycleEvent, LifecycleListener, ListenerControl, RuntimeServices, ServiceHandle,
    ServiceMode, ServiceName,
};
use crate::controller::{OperationFailure, RuntimeEffect, StepCompletion};

/// Drives a service to `target` and completes the waiting step exactly once.
///
/// The mode change is requested from `ListenerAdded`, so the listener is
/// always installed before the transition it waits for can begin.
pub struct OneShotListener {
    target: ServiceMode,
    completion: Mutex<Option<StepCompletion>>,
}

impl OneShotListener {
    #[must_use]
    pub fn new(target: ServiceMode, completion: StepCompletion) -> Self {
        Self {
            target,
            completion: Mutex::new(Some(completion)),
        }
    }

    fn fire(&self, result: Result<(), OperationFailure>) {
        // Taken under the lock, signalled after it is released.
        let completion = self.completion.lock().take();
        if let Some(completion) = completion {
            completion.finish(result);
        }
    }

    fn finish_if_terminal(&self, service: &dyn ServiceHandle) -> ListenerControl {
        if service.state() == self.target.terminal_state() {
            debug!(service = %service.name(), mode = ?self.target, "service reached target state");
            self.fire(Ok(()));
            ListenerControl::Detach
        } else {
            ListenerControl::Retain
        }
    }
}

impl LifecycleListener for OneShotListener {
    fn on_event(&self, service: &dyn ServiceHandle, event: &LifecycleEvent) -> ListenerControl {
        match (event, self.target) {
            (LifecycleEvent::ListenerAdded, _) => {
                service.set_mode(self.target);
                self.finish_if_terminal(service)
            }
            (LifecycleEvent::Started, ServiceMode::Active)
            | (LifecycleEvent::Stopped, ServiceMode::Never) => {
                self.fire(Ok(()));
                ListenerControl::Detach
            }
            (LifecycleEvent::StartFailed { reason }, ServiceMode::Active) => {
                warn!(service = %service.name(), %reason, "service failed to start");
                self.fire(Err(OperationFailure::runtime_bridge(format!(
                    "Service {} failed to start: {reason}",
                    service.name()
                ))));
                ListenerControl::Detach
            }
            _ => ListenerControl::Retain,
        }
    }
}

/// Runtime effect that moves a named service to `mode`.
#[derive(Debug, Clone)]
pub struct ServiceModeChange {
    pub service: ServiceName,
    pub mode: ServiceMode,
}

impl ServiceModeChange {
    #[must_use]
    pub fn new(service: ServiceName, mode: ServiceMode) -> Self {
        Self { service, mode }
    }
}

impl RuntimeEffect for ServiceModeChange {
    fn execute(
        self: Box<Self>,
        runtime: &RuntimeServices,
        completion: StepCompletion,
    ) -> Result<(), OperationFailure> {
        let handle = runtime.require(&self.service)?;
        handle.add_listener(Arc::new(OneShotListener::new(self.mode, completion)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::lifecycle::{ListenerSet, ServiceState};

    /// Service whose transitions happen synchronously inside `set_mode`,
    /// emitting events before control returns to the caller.
    struct SyncService {
        name: ServiceName,
        state: Mutex<ServiceState>,
        mode: Mutex<ServiceMode>,
        listeners: ListenerSet,
        fail_start: bool,
    }

    impl SyncService {
        fn new(state: ServiceState, fail_start: bool) -> Self {
            Self {
                name: ServiceName::new("sync"),
                state: Mutex::new(state),
                mode: Mutex::new(ServiceMode::Active),
                listeners: ListenerSet::new(),
                fail_start,
            }
        }
    }

    impl ServiceHandle for SyncService {
        fn name(&self) -> &ServiceName {
            &self.name
        }
        fn state(&self) -> ServiceState {
            *self.state.lock()
        }
        fn mode(&self) -> ServiceMode {
            *self.mode.lock()
        }
        fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
            self.listeners.add(self, listener);
        }
        fn set_mode(&self, mode: ServiceMode) {
            *self.mode.lock() = mode;
            let event = match (mode, self.fail_start) {
                (ServiceMode::Never, _) => {
                    *self.state.lock() = ServiceState::Down;
                    LifecycleEvent::Stopped
                }
                (ServiceMode::Active, false) => {
                    *self.state.lock() = ServiceState::Up;
                    LifecycleEvent::Started
                }
                (ServiceMode::Active, true) => {
                    *self.state.lock() = ServiceState::StartFailed;
                    LifecycleEvent::StartFailed {
                        reason: "bad descriptor".to_string(),
                    }
                }
            };
            self.listeners.notify(self, &event);
        }
    }

    /// Installs a one-shot listener and waits for its completion.
    async fn drive(service: &SyncService, target: ServiceMode) -> (Result<(), OperationFailure>, usize) {
        let (completion, rx) = StepCompletion::channel();
        let listener: Arc<dyn LifecycleListener> = Arc::new(OneShotListener::new(target, completion));
        service.add_listener(listener);
        let result = rx.await.expect("completion signalled");
        (result, service.listeners.len())
    }

    #[tokio::test]
    async fn synchronous_stop_inside_listener_added_completes_once() {
        let service = SyncService::new(ServiceState::Up, false);
        let (result, remaining) = drive(&service, ServiceMode::Never).await;
        assert!(result.is_ok());
        assert_eq!(remaining, 0);
        assert_eq!(service.state(), ServiceState::Down);
    }

    #[tokio::test]
    async fn already_in_target_state_completes_immediately() {
        let service = SyncService::new(ServiceState::Down, false);
        *service.mode.lock() = ServiceMode::Never;
        let (result, remaining) = drive(&service, ServiceMode::Never).await;
        assert!(result.is_ok());
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn start_failure_completes_with_runtime_failure() {
        let service = SyncService::new(ServiceState::Down, true);
        let (result, _) = drive(&service, ServiceMode::Active).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.to_string(), "Service sync failed to start: bad descriptor");
    }

    #[test]
    fn fire_is_one_shot() {
        let (completion, mut rx) = StepCompletion::channel();
        let listener = OneShotListener::new(ServiceMode::Never, completion);
        listener.fire(Ok(()));
        listener.fire(Err(OperationFailure::runtime_bridge("late")));
        assert!(rx.try_recv().expect("first signal delivered").is_ok());
        assert!(listener.completion.lock().is_none());
    }
}
