//! Admission control for root operations.
//!
//! The controller runs one root operation at a time and every other admitted
//! operation waits for the model. [`LoadShedLayer`] bounds how many root
//! operations may be admitted at once (running plus waiting) and sheds the
//! rest with `ControllerError::Overloaded`, naming the rejected operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::{debug, warn};
use warden_core::Operation;

use crate::controller::{ControllerError, OperationResponse};

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Count of root operations admitted to the controller.
#[derive(Debug)]
pub struct Admission {
    admitted: AtomicUsize,
    limit: usize,
}

impl Admission {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            admitted: AtomicUsize::new(0),
            limit,
        }
    }

    /// Operations currently running or waiting for the model.
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admits one operation, or returns the current count when full.
    fn try_admit(self: &Arc<Self>) -> Result<AdmissionTicket, usize> {
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .map(|_| AdmissionTicket(Arc::clone(self)))
    }
}

/// Releases its admission slot on drop.
struct AdmissionTicket(Arc<Admission>);

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.0.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that sheds root operations once `limit` are admitted.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    admission: Arc<Admission>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            admission: Arc::new(Admission::new(limit as usize)),
        }
    }

    /// Shared admission counter, for observing the queue depth.
    #[must_use]
    pub fn admission(&self) -> Arc<Admission> {
        Arc::clone(&self.admission)
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            admission: Arc::clone(&self.admission),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    admission: Arc<Admission>,
}

impl<S> Service<Operation> for LoadShedService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = ControllerError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = ControllerError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, ControllerError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let ticket = match self.admission.try_admit() {
            Ok(ticket) => ticket,
            Err(admitted) => {
                warn!(
                    operation = %op.name(),
                    address = %op.address(),
                    admitted,
                    "operation shed, controller queue is full"
                );
                let operation = op.name().to_string();
                return Box::pin(async move {
                    Err(ControllerError::Overloaded {
                        operation,
                        admitted,
                    })
                });
            }
        };
        debug!(operation = %op.name(), admitted = self.admission.admitted(), "operation admitted");

        let fut = self.inner.call(op);
        Box::pin(async move {
            let _ticket = ticket;
            fut.await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
