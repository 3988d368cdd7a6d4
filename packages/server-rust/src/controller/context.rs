//! The Operation Context: per-root-operation execution state and the step
//! engine that drives handlers, deferred runtime effects and rollback.
//!
//! A context is created for exactly one root operation and consumed by
//! [`OperationContext::execute`]. It owns the model for that duration; the
//! response tree and the step arena are discarded once the response is built.
//!
//! Execution order:
//!
//! 1. The root operation is resolved and validated. Failure here produces a
//!    failed response without touching the model.
//! 2. Steps are popped from a queue. Children registered by a handler run
//!    immediately after it, before the parent's later siblings.
//! 3. After a handler returns, every runtime effect it started is awaited
//!    before the next step runs.
//! 4. On the first failure the queue is cancelled and completed steps roll
//!    back in reverse completion order.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, debug_span, info_span, warn, Instrument};
use uuid::Uuid;
use warden_core::{names, ModelNode, Operation, PathAddress};

use super::failure::OperationFailure;
use super::handler::OperationStepHandler;
use super::registry::StepResolver;
use super::response::{OperationResponse, Outcome};
use super::step::{
    CompensatingRollback, PendingEffect, RollbackHandler, RuntimeEffect, StepCompletion, StepFrame,
    StepId, StepStatus,
};
use crate::runtime::RuntimeServices;

const ROOT: StepId = 0;

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Typed key for a value attached to the context for the duration of one
/// root operation.
pub struct AttachmentKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttachmentKey<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Set by an owning execution layer (e.g. a multi-node rollout) that has
/// already explained the failure. Composite rollback then leaves the
/// description alone.
pub const EXPLAINED_FAILURE: AttachmentKey<bool> = AttachmentKey::new("explained-failure");

// ---------------------------------------------------------------------------
// ExecutionMode
// ---------------------------------------------------------------------------

/// Whether runtime effects run at all. Decided when the context is built.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Only the configuration model is touched; runtime effects complete
    /// immediately without doing anything.
    ModelOnly,
    /// Runtime effects run against these services.
    Runtime(RuntimeServices),
}

impl std::fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModelOnly => f.write_str("ModelOnly"),
            Self::Runtime(_) => f.write_str("Runtime"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Apply,
    Rollback,
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

pub struct OperationContext {
    model: ModelNode,
    mode: ExecutionMode,
    resolver: Arc<dyn StepResolver>,
    steps: Vec<StepFrame>,
    queue: VecDeque<StepId>,
    /// Children registered by the handler currently running.
    staged: Vec<StepId>,
    completed: Vec<StepId>,
    current: StepId,
    pending: Vec<PendingEffect>,
    attachments: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    phase: Phase,
}

impl OperationContext {
    #[must_use]
    pub fn new(model: ModelNode, mode: ExecutionMode, resolver: Arc<dyn StepResolver>) -> Self {
        Self {
            model,
            mode,
            resolver,
            steps: Vec::new(),
            queue: VecDeque::new(),
            staged: Vec::new(),
            completed: Vec::new(),
            current: ROOT,
            pending: Vec::new(),
            attachments: HashMap::new(),
            phase: Phase::Apply,
        }
    }

    // -- model access -----------------------------------------------------

    #[must_use]
    pub fn model(&self) -> &ModelNode {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ModelNode {
        &mut self.model
    }

    /// Returns the resource at `address`.
    ///
    /// # Errors
    ///
    /// Returns a domain failure if no resource exists there.
    pub fn resource(&self, address: &PathAddress) -> Result<&ModelNode, OperationFailure> {
        self.model
            .navigate(address)
            .filter(|node| node.is_defined())
            .ok_or_else(|| resource_not_found(address))
    }

    /// Mutable variant of [`resource`](Self::resource).
    ///
    /// # Errors
    ///
    /// Returns a domain failure if no resource exists there.
    pub fn resource_mut(&mut self, address: &PathAddress) -> Result<&mut ModelNode, OperationFailure> {
        self.model
            .navigate_mut(address)
            .filter(|node| node.is_defined())
            .ok_or_else(|| resource_not_found(address))
    }

    // -- current step -----------------------------------------------------

    /// The operation of the step currently executing or rolling back.
    #[must_use]
    pub fn current_operation(&self) -> &Operation {
        &self.steps[self.current].operation
    }

    #[must_use]
    pub fn result(&self) -> &ModelNode {
        &self.steps[self.current].result
    }

    /// The current step's result node.
    pub fn result_mut(&mut self) -> &mut ModelNode {
        &mut self.steps[self.current].result
    }

    #[must_use]
    pub fn has_failure_description(&self) -> bool {
        self.steps[self.current].failure.is_some()
    }

    #[must_use]
    pub fn failure_description(&self) -> Option<&OperationFailure> {
        self.steps[self.current].failure.as_ref()
    }

    /// Sets the current step's failure unless one is already present.
    pub fn set_failure_description(&mut self, failure: OperationFailure) {
        let frame = &mut self.steps[self.current];
        if frame.failure.is_none() {
            frame.failure = Some(failure);
        }
    }

    /// Failure description of the current step's child registered as `name`.
    #[must_use]
    pub fn child_failure_description(&self, name: &str) -> Option<&ModelNode> {
        self.steps[self.current]
            .children
            .iter()
            .map(|id| &self.steps[*id])
            .find(|child| child.parent.as_ref().is_some_and(|(_, slot)| slot == name))
            .and_then(|child| child.failure.as_ref())
            .map(OperationFailure::description)
    }

    // -- step registration -------------------------------------------------

    /// Registers a child of the current step and reserves the current step's
    /// `result[name]` slot, which the child's response fills.
    ///
    /// Ignored during rollback.
    pub fn add_step(
        &mut self,
        name: impl Into<String>,
        operation: Operation,
        handler: Arc<dyn OperationStepHandler>,
    ) {
        let name = name.into();
        if self.phase == Phase::Rollback {
            warn!(step = %name, operation = %operation.name(), "step registered during rollback ignored");
            return;
        }
        if let Err(err) = self.steps[self.current].result.get_mut(&name) {
            warn!(step = %name, %err, "result of the registering step cannot hold child slots");
        }
        let id = self.steps.len();
        self.steps
            .push(StepFrame::new(operation, handler, Some((self.current, name))));
        self.steps[self.current].children.push(id);
        self.staged.push(id);
    }

    /// Registers the current step's rollback action. Replaces any earlier
    /// registration; a step has at most one.
    ///
    /// Ignored during rollback.
    pub fn complete_step(&mut self, rollback: impl RollbackHandler + 'static) {
        if self.phase == Phase::Rollback {
            warn!(operation = %self.current_operation().name(), "rollback handler registered during rollback ignored");
            return;
        }
        self.steps[self.current].rollback = Some(Box::new(rollback));
    }

    // -- attachments -------------------------------------------------------

    /// Attaches `value`, returning the previous value under the same key.
    pub fn attach<T: Any + Send + Sync>(&mut self, key: &AttachmentKey<T>, value: T) -> Option<T> {
        self.attachments
            .insert(key.name, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    #[must_use]
    pub fn attachment<T: Any + Send + Sync>(&self, key: &AttachmentKey<T>) -> Option<&T> {
        self.attachments
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    // -- runtime -----------------------------------------------------------

    #[must_use]
    pub fn is_runtime_enabled(&self) -> bool {
        matches!(self.mode, ExecutionMode::Runtime(_))
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&RuntimeServices> {
        match &self.mode {
            ExecutionMode::Runtime(runtime) => Some(runtime),
            ExecutionMode::ModelOnly => None,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> Arc<dyn StepResolver> {
        Arc::clone(&self.resolver)
    }

    /// Starts `effect` and defers the current step's completion until the
    /// effect signals. In model-only mode the effect is skipped and the step
    /// completes as soon as its handler returns.
    pub fn run_runtime_effect(&mut self, effect: impl RuntimeEffect + 'static) {
        let ExecutionMode::Runtime(runtime) = &self.mode else {
            debug!(operation = %self.steps[self.current].operation.name(), "model-only execution, runtime effect skipped");
            return;
        };
        let (completion, rx) = StepCompletion::channel();
        match Box::new(effect).execute(runtime, completion) {
            Ok(()) => self.pending.push(PendingEffect::Waiting(rx)),
            Err(failure) => self.pending.push(PendingEffect::Failed(failure)),
        }
    }

    /// Runs a compensating operation in place of the current step during
    /// rollback. A failure is recorded against the step being rolled back.
    pub fn execute_compensation(&mut self, operation: &Operation) {
        let handler = match self
            .resolver
            .resolve(operation)
            .and_then(|handler| handler.validate(operation).map(|()| handler))
        {
            Ok(handler) => handler,
            Err(failure) => {
                self.record_rollback_failure(failure);
                return;
            }
        };
        let owner = self.current;
        let id = self.steps.len();
        let mut frame = StepFrame::new(operation.clone(), Arc::clone(&handler), None);
        frame.transient = true;
        self.steps.push(frame);

        self.current = id;
        let result = handler.execute(self, operation);
        self.current = owner;

        match result {
            Ok(_) => self.steps[id].status = StepStatus::Executed,
            Err(failure) => {
                self.steps[id].status = StepStatus::Failed;
                self.record_rollback_failure(failure);
            }
        }
    }

    /// Marks the rollback of the current step as failed.
    pub fn record_rollback_failure(&mut self, failure: OperationFailure) {
        let frame = &mut self.steps[self.current];
        if frame.rollback_failure.is_none() {
            frame.rollback_failure = Some(failure);
        }
    }

    // -- engine ------------------------------------------------------------

    /// Runs `operation` as the root step and returns the (possibly rolled
    /// back) model together with the response.
    pub async fn execute(mut self, operation: Operation) -> (ModelNode, OperationResponse) {
        let operation_id = Uuid::new_v4();
        let span = info_span!(
            "management_operation",
            %operation_id,
            operation = %operation.name(),
            address = %operation.address(),
        );

        async move {
            let handler = match self
                .resolver
                .resolve(&operation)
                .and_then(|handler| handler.validate(&operation).map(|()| handler))
            {
                Ok(handler) => handler,
                Err(failure) => {
                    debug!(%failure, "operation rejected before execution");
                    return (self.model, OperationResponse::rejected(failure));
                }
            };

            self.steps.push(StepFrame::new(operation, handler, None));
            self.queue.push_back(ROOT);

            let response = match self.run_steps().await {
                None => self.assemble(false),
                Some(failed) => {
                    let rolled_back = self.rollback(failed).await;
                    self.assemble(rolled_back)
                }
            };
            (self.model, response)
        }
        .instrument(span)
        .await
    }

    /// Runs queued steps until the queue is empty or a step fails. Returns
    /// the failing step.
    async fn run_steps(&mut self) -> Option<StepId> {
        while let Some(id) = self.queue.pop_front() {
            self.current = id;
            let operation = self.steps[id].operation.clone();
            let handler = Arc::clone(&self.steps[id].handler);

            let span = debug_span!("step", step = id, operation = %operation.name());
            let outcome = span.in_scope(|| handler.execute(self, &operation));

            let failure = match outcome {
                Ok(outcome) => {
                    let frame = &mut self.steps[id];
                    if let Some(compensating) = outcome.compensating_operation {
                        if frame.rollback.is_none() {
                            frame.rollback = Some(Box::new(CompensatingRollback::new(compensating.clone())));
                        }
                        frame.compensating = Some(compensating);
                    }
                    // Rolled back on failure even if only its effect failed.
                    self.completed.push(id);
                    self.await_pending().await.err()
                }
                Err(failure) => {
                    self.pending.clear();
                    Some(failure)
                }
            };

            if let Some(failure) = failure {
                warn!(step = id, operation = %operation.name(), %failure, "step failed");
                self.staged.clear();
                let frame = &mut self.steps[id];
                frame.status = StepStatus::Failed;
                if frame.failure.is_none() {
                    frame.failure = Some(failure);
                }
                return Some(id);
            }

            self.steps[id].status = StepStatus::Executed;
            for child in self.staged.drain(..).rev() {
                self.queue.push_front(child);
            }
        }
        None
    }

    /// Waits for every effect started by the step that just ran. All effects
    /// are awaited; the first failure is returned.
    async fn await_pending(&mut self) -> Result<(), OperationFailure> {
        let mut first = None;
        for effect in std::mem::take(&mut self.pending) {
            let result = match effect {
                PendingEffect::Failed(failure) => Err(failure),
                PendingEffect::Waiting(rx) => rx.await.unwrap_or_else(|_| {
                    Err(OperationFailure::runtime_bridge(
                        "Runtime effect was abandoned before it completed",
                    ))
                }),
            };
            if let Err(failure) = result {
                first.get_or_insert(failure);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Rolls back every completed step in reverse completion order. Returns
    /// `true` if every rollback action succeeded.
    async fn rollback(&mut self, failed: StepId) -> bool {
        self.phase = Phase::Rollback;
        self.queue.clear();

        let mut ancestor = self.steps[failed].parent.as_ref().map(|(parent, _)| *parent);
        while let Some(id) = ancestor {
            self.steps[id].status = StepStatus::Failed;
            ancestor = self.steps[id].parent.as_ref().map(|(parent, _)| *parent);
        }

        let mut clean = true;
        for id in std::mem::take(&mut self.completed).into_iter().rev() {
            let Some(handler) = self.steps[id].rollback.take() else {
                continue;
            };
            self.current = id;
            let operation = self.steps[id].operation.clone();

            let span = debug_span!("rollback", step = id, operation = %operation.name());
            span.in_scope(|| handler.handle_rollback(self, &operation));
            if let Err(failure) = self.await_pending().await {
                self.record_rollback_failure(failure);
            }

            let frame = &mut self.steps[id];
            frame.rollback = Some(handler);
            frame.rolled_back = true;
            if let Some(failure) = &frame.rollback_failure {
                warn!(step = id, operation = %operation.name(), %failure, "rollback action failed");
                clean = false;
            }
        }

        if self.steps[ROOT].failure.is_none() {
            self.steps[ROOT].failure = self.steps[failed].failure.clone();
        }
        clean
    }

    // -- response assembly -------------------------------------------------

    fn assemble(&mut self, rolled_back: bool) -> OperationResponse {
        let failed = self.steps[ROOT].status == StepStatus::Failed;
        let compensating_operation = if failed { None } else { self.compensation_for(ROOT) };
        let audit = self
            .steps
            .iter()
            .filter(|frame| !frame.transient)
            .map(StepFrame::record)
            .collect();

        for id in (ROOT + 1..self.steps.len()).rev() {
            if self.steps[id].transient {
                continue;
            }
            let node = self.step_node(id, failed);
            let Some((parent, slot)) = self.steps[id].parent.clone() else {
                continue;
            };
            match self.steps[parent].result.get_mut(&slot) {
                Ok(target) => {
                    target.set(node);
                }
                Err(err) => warn!(step = id, %slot, %err, "parent result cannot hold child response"),
            }
        }

        let root = &mut self.steps[ROOT];
        OperationResponse {
            outcome: if failed { Outcome::Failed } else { Outcome::Success },
            result: std::mem::take(&mut root.result),
            failure: root.failure.clone(),
            rolled_back: failed && rolled_back,
            compensating_operation,
            audit,
        }
    }

    fn step_node(&mut self, id: StepId, root_failed: bool) -> ModelNode {
        let frame = &mut self.steps[id];
        let outcome = match frame.status {
            StepStatus::Pending | StepStatus::Cancelled => names::CANCELLED,
            StepStatus::Failed => names::FAILED,
            StepStatus::Executed if frame.failure.is_some() => names::FAILED,
            StepStatus::Executed => names::SUCCESS,
        };
        let mut node = ModelNode::empty_object();
        if let ModelNode::Object(fields) = &mut node {
            fields.insert(names::OUTCOME.to_string(), ModelNode::from(outcome));
            let result = std::mem::take(&mut frame.result);
            if result.is_defined() {
                fields.insert(names::RESULT.to_string(), result);
            }
            if let Some(failure) = &frame.failure {
                fields.insert(names::FAILURE_DESCRIPTION.to_string(), failure.description().clone());
            }
            if root_failed && frame.rolled_back {
                fields.insert(
                    names::ROLLED_BACK.to_string(),
                    ModelNode::from(frame.rollback_failure.is_none()),
                );
            }
        }
        node
    }

    /// Operation that undoes the whole subtree rooted at `id`: the children's
    /// compensations in reverse order, then the step's own.
    fn compensation_for(&self, id: StepId) -> Option<Operation> {
        let frame = &self.steps[id];
        if frame.children.is_empty() {
            return frame.compensating.clone();
        }
        let mut steps: Vec<ModelNode> = frame
            .children
            .iter()
            .rev()
            .filter_map(|child| self.compensation_for(*child))
            .map(|op| op.to_node())
            .collect();
        if let Some(own) = &frame.compensating {
            steps.push(own.to_node());
        }
        if steps.is_empty() {
            return None;
        }
        Some(Operation::new(names::COMPOSITE, PathAddress::root()).with_param(names::STEPS, steps))
    }
}

fn resource_not_found(address: &PathAddress) -> OperationFailure {
    OperationFailure::domain(format!("Resource {address} not found"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use warden_core::ModelType;

    use super::*;
    use crate::controller::failure::FailureKind;
    use crate::controller::handler::{HandlerOutcome, HandlerResult};
    use crate::controller::registry::HandlerRegistry;

    /// Sets `model[key] = value`, compensated by restoring the old value.
    struct SetAttribute;

    impl OperationStepHandler for SetAttribute {
        fn validate(&self, operation: &Operation) -> Result<(), OperationFailure> {
            operation.require("key")?.as_str()?;
            Ok(())
        }

        fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
            let key = operation.require("key")?.as_str()?.to_string();
            let value = operation.parameters().get("value").cloned().unwrap_or_default();
            let old = ctx.model_mut().get_mut(&key)?.set(value);
            ctx.result_mut().set(old.clone());
            Ok(HandlerOutcome::compensated_by(
                Operation::new("set", PathAddress::root())
                    .with_param("key", key)
                    .with_param("value", old),
            ))
        }
    }

    struct AlwaysFails;

    impl OperationStepHandler for AlwaysFails {
        fn execute(&self, _ctx: &mut OperationContext, _operation: &Operation) -> HandlerResult {
            Err(OperationFailure::domain("boom"))
        }
    }

    /// Registers two `set` children and counts rollback invocations.
    struct Parent {
        rollbacks: Arc<AtomicUsize>,
    }

    struct CountRollback(Arc<AtomicUsize>);

    impl RollbackHandler for CountRollback {
        fn handle_rollback(&self, _ctx: &mut OperationContext, _operation: &Operation) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl OperationStepHandler for Parent {
        fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
            let resolver = ctx.resolver();
            for (name, key) in [("step-1", "a"), ("step-2", "b")] {
                let child = Operation::new("set", PathAddress::root())
                    .with_param("key", key)
                    .with_param("value", 1);
                let handler = resolver.resolve(&child)?;
                ctx.add_step(name, child, handler);
            }
            if operation.param("fail").is_some() {
                let child = Operation::new("fail", PathAddress::root());
                let handler = resolver.resolve(&child)?;
                ctx.add_step("step-3", child, handler);
            }
            ctx.complete_step(CountRollback(Arc::clone(&self.rollbacks)));
            Ok(HandlerOutcome::done())
        }
    }

    fn resolver(rollbacks: &Arc<AtomicUsize>) -> Arc<dyn StepResolver> {
        Arc::new(
            HandlerRegistry::builder()
                .register("set", Arc::new(SetAttribute))
                .register("fail", Arc::new(AlwaysFails))
                .register(
                    "parent",
                    Arc::new(Parent {
                        rollbacks: Arc::clone(rollbacks),
                    }),
                )
                .build(),
        )
    }

    fn context(rollbacks: &Arc<AtomicUsize>) -> OperationContext {
        let mut model = ModelNode::empty_object();
        model.get_mut("a").unwrap().set(0);
        OperationContext::new(model, ExecutionMode::ModelOnly, resolver(rollbacks))
    }

    #[tokio::test]
    async fn unknown_root_operation_leaves_model_untouched() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = context(&counter);
        let before = ctx.model().clone();
        let (model, response) = ctx
            .execute(Operation::new("nope", PathAddress::root()))
            .await;
        assert_eq!(model, before);
        assert_eq!(response.outcome, Outcome::Failed);
        assert_eq!(response.failure.unwrap().kind(), FailureKind::Validation);
    }

    #[tokio::test]
    async fn leaf_success_reports_compensation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let op = Operation::new("set", PathAddress::root())
            .with_param("key", "a")
            .with_param("value", 5);
        let (model, response) = context(&counter).execute(op).await;
        assert!(response.is_success());
        assert_eq!(model.get("a"), Some(&ModelNode::Int(5)));
        assert_eq!(response.result, ModelNode::Int(0));
        let compensation = response.compensating_operation.unwrap();
        assert_eq!(compensation.param("value"), Some(&ModelNode::Int(0)));
    }

    #[tokio::test]
    async fn children_fill_slots_and_compensate_as_composite() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (model, response) = context(&counter)
            .execute(Operation::new("parent", PathAddress::root()))
            .await;
        assert!(response.is_success());
        assert_eq!(model.get("b"), Some(&ModelNode::Int(1)));
        let keys: Vec<&str> = response.result.keys().collect();
        assert_eq!(keys, vec!["step-1", "step-2"]);
        assert_eq!(
            response.result.get("step-1").and_then(|s| s.get("outcome")),
            Some(&ModelNode::from("success"))
        );

        let compensation = response.compensating_operation.unwrap();
        assert_eq!(compensation.name(), "composite");
        let steps = compensation.require("steps").unwrap().as_list().unwrap();
        // Undo runs in reverse: step-2 (key b) first.
        let first = Operation::from_node(&steps[0]).unwrap();
        assert_eq!(first.param("key"), Some(&ModelNode::from("b")));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_child_rolls_back_siblings_and_parent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = context(&counter);
        let before = ctx.model().clone();
        let (model, response) = ctx
            .execute(Operation::new("parent", PathAddress::root()).with_param("fail", true))
            .await;

        assert_eq!(response.outcome, Outcome::Failed);
        assert!(response.rolled_back);
        assert_eq!(response.failure.unwrap().to_string(), "boom");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // "b" was created as undefined by get_mut and restored to undefined.
        assert_eq!(model.get("a"), before.get("a"));
        assert!(!model.has_defined("b"));

        let step3 = response.result.get("step-3").unwrap();
        assert_eq!(step3.get("outcome"), Some(&ModelNode::from("failed")));
        assert_eq!(step3.get("failure-description"), Some(&ModelNode::from("boom")));
        let step1 = response.result.get("step-1").unwrap();
        assert_eq!(step1.get("rolled-back"), Some(&ModelNode::Bool(true)));
        assert!(response.compensating_operation.is_none());
    }

    type Log = Arc<parking_lot::Mutex<Vec<String>>>;

    /// Appends its label to the shared log when rolled back.
    struct RecordRollback {
        label: String,
        log: Log,
    }

    impl RollbackHandler for RecordRollback {
        fn handle_rollback(&self, _ctx: &mut OperationContext, _operation: &Operation) {
            self.log.lock().push(self.label.clone());
        }
    }

    /// Leaf that registers a recording rollback under its `label` parameter.
    struct Recorded(Log);

    impl OperationStepHandler for Recorded {
        fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
            let label = operation.require("label")?.as_str()?.to_string();
            ctx.complete_step(RecordRollback {
                label,
                log: Arc::clone(&self.0),
            });
            Ok(HandlerOutcome::done())
        }
    }

    /// Registers two recorded children and a failing third.
    struct RecordedParent(Log);

    impl OperationStepHandler for RecordedParent {
        fn execute(&self, ctx: &mut OperationContext, _operation: &Operation) -> HandlerResult {
            let resolver = ctx.resolver();
            for name in ["step-1", "step-2"] {
                let child = Operation::new("recorded", PathAddress::root()).with_param("label", name);
                let handler = resolver.resolve(&child)?;
                ctx.add_step(name, child, handler);
            }
            let failing = Operation::new("fail", PathAddress::root());
            let handler = resolver.resolve(&failing)?;
            ctx.add_step("step-3", failing, handler);
            ctx.complete_step(RecordRollback {
                label: "parent".to_string(),
                log: Arc::clone(&self.0),
            });
            Ok(HandlerOutcome::done())
        }
    }

    #[tokio::test]
    async fn completed_steps_roll_back_in_reverse_order() {
        let log: Log = Arc::default();
        let registry = HandlerRegistry::builder()
            .register("recorded", Arc::new(Recorded(Arc::clone(&log))))
            .register("recorded-parent", Arc::new(RecordedParent(Arc::clone(&log))))
            .register("fail", Arc::new(AlwaysFails))
            .build();
        let (_, response) = OperationContext::new(
            ModelNode::empty_object(),
            ExecutionMode::ModelOnly,
            Arc::new(registry),
        )
        .execute(Operation::new("recorded-parent", PathAddress::root()))
        .await;

        assert!(response.rolled_back);
        assert_eq!(*log.lock(), vec!["step-2", "step-1", "parent"]);
    }

    #[test]
    fn attachments_are_typed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ctx = context(&counter);
        assert!(ctx.attachment(&EXPLAINED_FAILURE).is_none());
        assert_eq!(ctx.attach(&EXPLAINED_FAILURE, true), None);
        assert_eq!(ctx.attachment(&EXPLAINED_FAILURE), Some(&true));
        assert_eq!(ctx.attach(&EXPLAINED_FAILURE, false), Some(true));
    }

    #[test]
    fn missing_resource_is_a_domain_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = context(&counter);
        let address: PathAddress = "/deployment=x.war".parse().unwrap();
        let Err(failure) = ctx.resource(&address) else {
            panic!("resource should not exist");
        };
        assert_eq!(failure.kind(), FailureKind::Domain);
        assert_eq!(failure.to_string(), "Resource /deployment=x.war not found");
        assert_eq!(ctx.model().model_type(), ModelType::Object);
    }
}
