//! Service controllers: the state machine that runs a [`ManagedService`]
//! through start/stop transitions on its own tokio task.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::lifecycle::{
    LifecycleEvent, LifecycleListener, ListenerSet, ServiceHandle, ServiceMode, ServiceName,
    ServiceState,
};
use super::listener::OneShotListener;
use crate::controller::{OperationFailure, StepCompletion};

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// A long-lived runtime service. Its controller calls `start` when the mode
/// becomes `Active` and `stop` when it becomes `Never`.
#[async_trait]
pub trait ManagedService: Send + Sync + 'static {
    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceController
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    SetMode(ServiceMode),
    Shutdown(oneshot::Sender<()>),
}

/// Owns one service's state machine.
///
/// `set_mode` only enqueues a command; transitions run one at a time on the
/// controller task, which is also where listeners are notified.
pub struct ServiceController {
    name: ServiceName,
    state: ArcSwap<ServiceState>,
    mode: ArcSwap<ServiceMode>,
    listeners: ListenerSet,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ServiceController {
    /// Spawns the controller task for `service`, initially `Down` in mode
    /// `Never`.
    pub fn spawn(name: ServiceName, service: Arc<dyn ManagedService>) -> Arc<Self> {
        let (commands, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            name,
            state: ArcSwap::from_pointee(ServiceState::Down),
            mode: ArcSwap::from_pointee(ServiceMode::Never),
            listeners: ListenerSet::new(),
            commands,
        });
        tokio::spawn(Self::run(Arc::downgrade(&controller), service, rx));
        controller
    }

    /// Moves the service to `mode` and waits until the transition finishes.
    ///
    /// # Errors
    ///
    /// Returns a runtime bridge failure if the service fails to start or the
    /// controller goes away first.
    pub async fn transition_to(&self, mode: ServiceMode) -> Result<(), OperationFailure> {
        let (completion, rx) = StepCompletion::channel();
        self.add_listener(Arc::new(OneShotListener::new(mode, completion)));
        rx.await.unwrap_or_else(|_| {
            Err(OperationFailure::runtime_bridge(format!(
                "Service {} stopped before reaching {mode:?}",
                self.name
            )))
        })
    }

    /// Stops the service if it is up and ends the controller task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_err() {
            return;
        }
        if rx.await.is_err() {
            debug!(service = %self.name, "controller task ended before acknowledging shutdown");
        }
    }

    async fn run(
        controller: Weak<Self>,
        service: Arc<dyn ManagedService>,
        mut rx: mpsc::UnboundedReceiver<Command>,
    ) {
        while let Some(command) = rx.recv().await {
            let Some(this) = controller.upgrade() else {
                break;
            };
            match command {
                Command::SetMode(mode) => this.apply(service.as_ref(), mode).await,
                Command::Shutdown(done) => {
                    this.apply(service.as_ref(), ServiceMode::Never).await;
                    let _ = done.send(());
                    break;
                }
            }
        }
    }

    async fn apply(&self, service: &dyn ManagedService, mode: ServiceMode) {
        match (mode, self.state()) {
            (ServiceMode::Active, ServiceState::Down | ServiceState::StartFailed) => {
                self.transition(ServiceState::Starting, &LifecycleEvent::Starting);
                match service.start().await {
                    Ok(()) => {
                        info!(service = %self.name, "service started");
                        self.transition(ServiceState::Up, &LifecycleEvent::Started);
                    }
                    Err(err) => {
                        warn!(service = %self.name, error = %err, "service start failed");
                        self.transition(
                            ServiceState::StartFailed,
                            &LifecycleEvent::StartFailed {
                                reason: err.to_string(),
                            },
                        );
                    }
                }
            }
            (ServiceMode::Never, ServiceState::Up) => {
                self.transition(ServiceState::Stopping, &LifecycleEvent::Stopping);
                if let Err(err) = service.stop().await {
                    warn!(service = %self.name, error = %err, "service stop reported an error");
                }
                info!(service = %self.name, "service stopped");
                self.transition(ServiceState::Down, &LifecycleEvent::Stopped);
            }
            (ServiceMode::Never, ServiceState::StartFailed) => {
                self.transition(ServiceState::Down, &LifecycleEvent::Stopped);
            }
            _ => {}
        }
    }

    fn transition(&self, state: ServiceState, event: &LifecycleEvent) {
        self.state.store(Arc::new(state));
        self.listeners.notify(self, event);
    }
}

impl ServiceHandle for ServiceController {
    fn name(&self) -> &ServiceName {
        &self.name
    }

    fn state(&self) -> ServiceState {
        **self.state.load()
    }

    fn mode(&self) -> ServiceMode {
        **self.mode.load()
    }

    fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.add(self, listener);
    }

    fn set_mode(&self, mode: ServiceMode) {
        self.mode.store(Arc::new(mode));
        if self.commands.send(Command::SetMode(mode)).is_err() {
            warn!(service = %self.name, ?mode, "mode change after controller shut down");
        }
    }
}
