//! The approval engine.
//!
//! This module provides [`Engine`], the coordinator that owns the task
//! registry and the record store and drives flows through their
//! approve/refuse/execute lifecycle.

use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::record_store::RecordStore;
use crate::report::{FlowReport, TaskReportEntry};
use crate::{
    FlowEvent, FlowStatus, Outcome, Result, SignoffError, Task, TaskFlow, TaskRecord, TaskRegistry,
};

/// Default channel capacity for flow events.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// The coordinator for approval flows.
///
/// An engine is an explicit handle bundling the task registry and the
/// record store; there is no process-wide singleton, so multiple
/// independent engines (e.g., one per test) are trivial. All flow
/// operations go through `&mut self`, which serializes them per engine —
/// hosts sharing one store between several engines must serialize
/// per-flow operations themselves.
///
/// Every engine call runs to completion before returning: the
/// [`Outcome::AwaitingApproval`] suspension is not a paused coroutine but
/// an ordinary return value, and resuming the flow means making a wholly
/// new call (possibly from another process) once the decision is in.
///
/// # Example
///
/// ```rust,ignore
/// use signoff::{Engine, MemoryRecordStore, Outcome, TaskRegistry};
///
/// let mut registry = TaskRegistry::new();
/// registry.register_type::<Purchase>("purchase");
///
/// let mut engine = Engine::new(registry, MemoryRecordStore::new());
/// let mut flow = engine
///     .new_flow("purchase", "laptop for alice", params)
///     .await?;
///
/// match engine.start(&mut flow).await? {
///     Outcome::AwaitingApproval(task) => route_to_approver(&*task),
///     Outcome::Executed => println!("nothing to approve"),
///     other => println!("{:?}", other),
/// }
/// ```
pub struct Engine<S> {
    /// Task-type constructors for rehydration.
    registry: TaskRegistry,
    /// The persistence adapter.
    store: S,
    /// Event broadcast channel sender.
    event_tx: broadcast::Sender<FlowEvent>,
}

impl<S: RecordStore> Engine<S> {
    /// Creates an engine from a populated registry and a record store.
    pub fn new(registry: TaskRegistry, store: S) -> Self {
        let (event_tx, _) = broadcast::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            store,
            event_tx,
        }
    }

    /// Returns the task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Returns the record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribes to flow events.
    ///
    /// Returns a receiver that will receive all events broadcast by this
    /// engine. Events are not persisted; if the receiver is too slow,
    /// events may be dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.event_tx.subscribe()
    }

    /// Emits an event to all subscribers.
    ///
    /// Ignores send errors (no subscribers or channel full).
    fn emit(&self, event: FlowEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Creates and persists a new flow in `Processing` status.
    ///
    /// # Errors
    ///
    /// Returns [`SignoffError::UnknownTaskKind`] if `root_kind` is not
    /// registered, so a flow that could never be rehydrated is rejected up
    /// front.
    pub async fn new_flow(
        &mut self,
        root_kind: &str,
        annotation: impl Into<String>,
        root_params: serde_json::Value,
    ) -> Result<TaskFlow> {
        if !self.registry.contains(root_kind) {
            return Err(SignoffError::UnknownTaskKind(root_kind.to_string()));
        }
        let flow = TaskFlow::new(root_kind, annotation, root_params);
        self.store.insert_flow(&flow).await?;
        debug!(flow_id = %flow.id, root_kind, "created flow");
        Ok(flow)
    }

    /// Rehydrates a flow from storage.
    pub async fn flow(&self, id: &str) -> Result<Option<TaskFlow>> {
        self.store.flow_by_id(id).await
    }

    /// Constructs the root task of a flow from its persisted descriptor.
    pub fn root_task(&self, flow: &TaskFlow) -> Result<Box<dyn Task>> {
        self.registry
            .construct(&flow.root_kind, flow.root_params.clone())
    }

    /// Rehydrates a single task from its record id.
    pub async fn task(&self, id: &str) -> Result<Option<Box<dyn Task>>> {
        match self.store.task_by_id(id).await? {
            Some(record) => Ok(Some(self.task_from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Rehydrates a single task from its record.
    pub fn task_from_record(&self, record: &TaskRecord) -> Result<Box<dyn Task>> {
        self.registry.construct(&record.kind, record.params.clone())
    }

    /// Starts a flow: persists and approves the root task, then looks for
    /// the next task requiring approval.
    ///
    /// # Errors
    ///
    /// Returns [`SignoffError::AlreadyApproved`] if the flow was already
    /// started.
    pub async fn start(&mut self, flow: &mut TaskFlow) -> Result<Outcome> {
        let span = info_span!("start", flow_id = %flow.id);
        async {
            if flow.is_refused() {
                return Ok(Outcome::Refused);
            }
            let root = self.root_task(flow)?;
            self.submit_if_new(flow, root.as_ref()).await?;
            self.approve_record(flow, root.as_ref()).await?;
            root.on_approved().await;
            info!("flow started");
            self.emit(FlowEvent::FlowStarted {
                flow_id: flow.id.clone(),
            });
            self.retry_from(flow, root.as_ref()).await
        }
        .instrument(span)
        .await
    }

    /// Approves a task, then re-checks the flow for the next unmet task.
    ///
    /// The refusal check comes first: on a refused flow this reports
    /// [`Outcome::Refused`] without touching the task.
    ///
    /// # Errors
    ///
    /// Returns [`SignoffError::Unsubmitted`] if the resolver has never
    /// discovered this task, [`SignoffError::AlreadyApproved`] if its
    /// record is already approved.
    pub async fn approve(&mut self, flow: &mut TaskFlow, task: &dyn Task) -> Result<Outcome> {
        let span = info_span!("approve", flow_id = %flow.id, tag = %task.tag());
        async {
            if flow.is_refused() {
                debug!("flow is refused");
                return Ok(Outcome::Refused);
            }
            self.approve_record(flow, task).await?;
            task.on_approved().await;
            self.retry_from(flow, task).await
        }
        .instrument(span)
        .await
    }

    /// Refuses the flow. Terminal and irrevocable.
    ///
    /// Sets the flow's status to `Refused`, then broadcasts the refusal to
    /// the entire tree: every node's `on_refused` hook fires, with the
    /// causal flag true only for the node matching `task`'s tag.
    pub async fn refuse(&mut self, flow: &mut TaskFlow, task: &dyn Task) -> Result<()> {
        let cause_tag = task.tag();
        let span = info_span!("refuse", flow_id = %flow.id, tag = %cause_tag);
        async {
            flow.mark_refused();
            self.store.update_flow(flow).await?;
            warn!("flow refused");
            self.emit(FlowEvent::FlowRefused {
                flow_id: flow.id.clone(),
                cause_tag: cause_tag.clone(),
            });

            let root = self.root_task(flow)?;
            let mut path = HashSet::new();
            self.refuse_tree(root.as_ref(), &cause_tag, &mut path).await
        }
        .instrument(span)
        .await
    }

    /// Re-checks a flow: either surfaces the next task awaiting approval
    /// or, once nothing is unmet, executes the tree leaf-to-root.
    ///
    /// This is re-entered by every `approve`; calling it directly is
    /// useful after an execution failure has been fixed out of band.
    pub async fn retry(&mut self, flow: &mut TaskFlow) -> Result<Outcome> {
        let root = self.root_task(flow)?;
        self.retry_from(flow, root.as_ref()).await
    }

    /// Directly executes a fully approved flow.
    ///
    /// Normally execution happens inside `retry`; this entry point re-runs
    /// a flow whose previous execution failed.
    ///
    /// # Errors
    ///
    /// Returns [`SignoffError::FlowProcessing`] while approvals are still
    /// outstanding.
    pub async fn execute(&mut self, flow: &mut TaskFlow) -> Result<Outcome> {
        let span = info_span!("execute", flow_id = %flow.id);
        async {
            match flow.status {
                FlowStatus::Refused => Ok(Outcome::Refused),
                FlowStatus::Processing => Err(SignoffError::FlowProcessing),
                FlowStatus::Approved | FlowStatus::Executed => {
                    self.run_to_completion(flow).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Builds a read-only snapshot of the flow's task tree.
    pub async fn report(&self, flow: &TaskFlow) -> Result<FlowReport> {
        let root = self.root_task(flow)?;
        let mut entries = Vec::new();
        let mut path = HashSet::new();
        self.collect_report(flow, root.as_ref(), 0, &mut entries, &mut path)
            .await?;
        Ok(FlowReport::new(flow.clone(), entries))
    }

    /// Runs the resolver and either suspends on the unmet task or
    /// executes the whole tree.
    async fn retry_from(&mut self, flow: &mut TaskFlow, last_operated: &dyn Task) -> Result<Outcome> {
        if flow.is_refused() {
            debug!("flow is refused");
            return Ok(Outcome::Refused);
        }

        let root = self.root_task(flow)?;
        let mut path = HashSet::new();
        if let Some(unmet) = self.find_unmet(flow, root, &mut path).await? {
            self.submit_if_new(flow, unmet.as_ref()).await?;
            last_operated.on_delayed(unmet.as_ref()).await;
            let tag = unmet.tag();
            info!(%tag, "awaiting approval");
            self.emit(FlowEvent::AwaitingApproval {
                flow_id: flow.id.clone(),
                tag,
            });
            return Ok(Outcome::AwaitingApproval(unmet));
        }

        // Status only moves forward; a retry of an already-approved (or
        // executed) flow must not rewind it.
        if flow.status == FlowStatus::Processing {
            flow.mark_approved();
            self.store.update_flow(flow).await?;
            info!("all tasks approved");
            self.emit(FlowEvent::FlowApproved {
                flow_id: flow.id.clone(),
            });
        }

        self.run_to_completion(flow).await
    }

    /// Finds the first unmet task by pre-order, left-to-right, depth-first
    /// search. A task with no record, or an unapproved record, is unmet.
    async fn find_unmet(
        &self,
        flow: &TaskFlow,
        task: Box<dyn Task>,
        path: &mut HashSet<String>,
    ) -> Result<Option<Box<dyn Task>>> {
        let tag = task.tag();
        if !path.insert(tag.clone()) {
            return Err(SignoffError::DependencyCycle { tag });
        }

        let approved = self
            .store
            .task_by_tag(&flow.id, &tag)
            .await?
            .map(|record| record.approved)
            .unwrap_or(false);
        if !approved {
            return Ok(Some(task));
        }

        for dependency in task.dependencies() {
            if let Some(unmet) = Box::pin(self.find_unmet(flow, dependency, path)).await? {
                return Ok(Some(unmet));
            }
        }

        path.remove(&tag);
        Ok(None)
    }

    /// Executes the tree and records the final flow state.
    async fn run_to_completion(&mut self, flow: &mut TaskFlow) -> Result<Outcome> {
        let root = self.root_task(flow)?;
        let mut path = HashSet::new();
        match self.execute_task(flow, root.as_ref(), &mut path).await {
            Ok(()) => {
                flow.mark_executed();
                self.store.update_flow(flow).await?;
                info!("flow executed");
                self.emit(FlowEvent::FlowExecuted {
                    flow_id: flow.id.clone(),
                });
                Ok(Outcome::Executed)
            }
            Err(err) => {
                flow.mark_failed();
                self.store.update_flow(flow).await?;
                warn!(error = %err, "execution failed");
                match err {
                    err @ SignoffError::Execution { .. } => Ok(Outcome::Failed(err)),
                    other => Err(other),
                }
            }
        }
    }

    /// Executes one task post-order: all dependencies first, then the
    /// task's own body if it still needs to run.
    async fn execute_task(
        &mut self,
        flow: &TaskFlow,
        task: &dyn Task,
        path: &mut HashSet<String>,
    ) -> Result<()> {
        let tag = task.tag();
        if !path.insert(tag.clone()) {
            return Err(SignoffError::DependencyCycle { tag });
        }

        for dependency in task.dependencies() {
            Box::pin(self.execute_task(flow, dependency.as_ref(), path)).await?;
        }

        let record = self.store.task_by_tag(&flow.id, &tag).await?;
        let needs_run = record.as_ref().map(TaskRecord::needs_run).unwrap_or(true);
        if needs_run {
            debug!(%tag, "running task body");
            match task.run().await {
                Ok(()) => {
                    if let Some(mut record) = record {
                        record.mark_executed();
                        self.store.update_task(&record).await?;
                    }
                    task.after_run().await;
                    self.emit(FlowEvent::TaskExecuted {
                        flow_id: flow.id.clone(),
                        tag: tag.clone(),
                    });
                }
                Err(source) => {
                    if let Some(mut record) = record {
                        record.mark_failed();
                        self.store.update_task(&record).await?;
                    }
                    self.emit(FlowEvent::TaskFailed {
                        flow_id: flow.id.clone(),
                        tag: tag.clone(),
                        error: source.to_string(),
                    });
                    return Err(SignoffError::Execution { tag, source });
                }
            }
        }

        path.remove(&tag);
        Ok(())
    }

    /// Broadcasts a refusal through the tree, pre-order.
    async fn refuse_tree(
        &self,
        task: &dyn Task,
        cause_tag: &str,
        path: &mut HashSet<String>,
    ) -> Result<()> {
        let tag = task.tag();
        if !path.insert(tag.clone()) {
            return Err(SignoffError::DependencyCycle { tag });
        }

        task.on_refused(tag == cause_tag).await;
        for dependency in task.dependencies() {
            Box::pin(self.refuse_tree(dependency.as_ref(), cause_tag, path)).await?;
        }

        path.remove(&tag);
        Ok(())
    }

    /// Collects report entries pre-order.
    async fn collect_report(
        &self,
        flow: &TaskFlow,
        task: &dyn Task,
        depth: usize,
        entries: &mut Vec<TaskReportEntry>,
        path: &mut HashSet<String>,
    ) -> Result<()> {
        let tag = task.tag();
        if !path.insert(tag.clone()) {
            return Err(SignoffError::DependencyCycle { tag });
        }

        let entry = match self.store.task_by_tag(&flow.id, &tag).await? {
            Some(record) => TaskReportEntry::from_record(&record, depth),
            None => TaskReportEntry::undiscovered(tag.clone(), task.kind(), depth),
        };
        entries.push(entry);

        for dependency in task.dependencies() {
            Box::pin(self.collect_report(flow, dependency.as_ref(), depth + 1, entries, path))
                .await?;
        }

        path.remove(&tag);
        Ok(())
    }

    /// Inserts a task's first record unless one already exists.
    ///
    /// Returns true if a record was inserted (first discovery).
    async fn submit_if_new(&mut self, flow: &TaskFlow, task: &dyn Task) -> Result<bool> {
        let tag = task.tag();
        if self.store.task_by_tag(&flow.id, &tag).await?.is_some() {
            return Ok(false);
        }
        let record = TaskRecord::new(&flow.id, task);
        self.store.insert_task(&record).await?;
        debug!(%tag, "task discovered");
        self.emit(FlowEvent::TaskDiscovered {
            flow_id: flow.id.clone(),
            tag,
        });
        Ok(true)
    }

    /// Flips a task's record to approved.
    async fn approve_record(&mut self, flow: &TaskFlow, task: &dyn Task) -> Result<()> {
        let tag = task.tag();
        let mut record = self
            .store
            .task_by_tag(&flow.id, &tag)
            .await?
            .ok_or_else(|| SignoffError::Unsubmitted { tag: tag.clone() })?;
        if record.approved {
            return Err(SignoffError::AlreadyApproved { tag });
        }
        record.mark_approved();
        self.store.update_task(&record).await?;
        info!(%tag, "task approved");
        self.emit(FlowEvent::TaskApproved {
            flow_id: flow.id.clone(),
            tag,
        });
        Ok(())
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRecordStore;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashSet as StdHashSet;
    use std::sync::{Arc, Mutex};

    /// A configurable tree node for exercising the engine. The tree shape
    /// comes from the persisted parameters; the trace log and failure
    /// switches are attached by the registry constructor.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Node {
        name: String,
        #[serde(default)]
        children: Vec<Node>,
        #[serde(skip)]
        trace: Option<Arc<Mutex<Vec<String>>>>,
        #[serde(skip)]
        failing: Option<Arc<Mutex<StdHashSet<String>>>>,
    }

    impl Node {
        fn attach(
            mut self,
            trace: Option<Arc<Mutex<Vec<String>>>>,
            failing: Option<Arc<Mutex<StdHashSet<String>>>>,
        ) -> Self {
            self.trace = trace;
            self.failing = failing;
            self
        }

        fn record(&self, entry: String) {
            if let Some(trace) = &self.trace {
                trace.lock().unwrap().push(entry);
            }
        }

        fn should_fail(&self) -> bool {
            self.failing
                .as_ref()
                .map(|set| set.lock().unwrap().contains(&self.name))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl Task for Node {
        fn kind(&self) -> &str {
            "node"
        }

        fn tag(&self) -> String {
            self.name.clone()
        }

        fn params(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap()
        }

        fn dependencies(&self) -> Vec<Box<dyn Task>> {
            self.children
                .iter()
                .map(|child| {
                    Box::new(
                        child
                            .clone()
                            .attach(self.trace.clone(), self.failing.clone()),
                    ) as Box<dyn Task>
                })
                .collect()
        }

        async fn run(&self) -> std::result::Result<(), crate::BoxError> {
            if self.should_fail() {
                self.record(format!("fail:{}", self.name));
                return Err(format!("{} exploded", self.name).into());
            }
            self.record(format!("run:{}", self.name));
            Ok(())
        }

        async fn on_approved(&self) {
            self.record(format!("approved:{}", self.name));
        }

        async fn on_refused(&self, caused_by_me: bool) {
            self.record(format!("refused:{}:{}", self.name, caused_by_me));
        }

        async fn on_delayed(&self, awaiting: &dyn Task) {
            self.record(format!("delayed:{}->{}", self.name, awaiting.tag()));
        }

        async fn after_run(&self) {
            self.record(format!("after:{}", self.name));
        }
    }

    struct Fixture {
        engine: Engine<MemoryRecordStore>,
        store: MemoryRecordStore,
        trace: Arc<Mutex<Vec<String>>>,
        failing: Arc<Mutex<StdHashSet<String>>>,
    }

    /// Builds an engine whose "node" constructor re-attaches the shared
    /// trace and failure switches on every rehydration.
    fn fixture() -> Fixture {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let failing = Arc::new(Mutex::new(StdHashSet::new()));
        let store = MemoryRecordStore::new();

        let ctor_trace = trace.clone();
        let ctor_failing = failing.clone();
        let mut registry = TaskRegistry::new();
        registry.register("node", move |params| {
            let node: Node = serde_json::from_value(params)?;
            Ok(Box::new(node.attach(Some(ctor_trace.clone()), Some(ctor_failing.clone())))
                as Box<dyn Task>)
        });

        Fixture {
            engine: Engine::new(registry, store.clone()),
            store,
            trace,
            failing,
        }
    }

    /// Root A depending on [B, C], C depending on [D] — the canonical
    /// tree: approvals surface as B, C, D; bodies run as B, D, C, A.
    fn diamond_params() -> serde_json::Value {
        json!({
            "name": "A",
            "children": [
                { "name": "B" },
                { "name": "C", "children": [{ "name": "D" }] },
            ],
        })
    }

    fn node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            children: Vec::new(),
            trace: None,
            failing: None,
        }
    }

    fn drain(trace: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *trace.lock().unwrap())
    }

    fn runs(entries: &[String]) -> Vec<&str> {
        entries
            .iter()
            .filter(|e| e.starts_with("run:"))
            .map(|e| e.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_single_task_flow_executes_on_start() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "solo", json!({ "name": "A" }))
            .await
            .unwrap();

        let outcome = fx.engine.start(&mut flow).await.unwrap();
        assert!(outcome.is_executed());
        assert_eq!(flow.status, FlowStatus::Executed);

        let record = fx.store.task_by_tag(&flow.id, "A").await.unwrap().unwrap();
        assert!(record.approved);
        assert!(record.executed_at.is_some());
        assert!(!record.failed);
    }

    #[tokio::test]
    async fn test_new_flow_unknown_kind() {
        let mut fx = fixture();
        let err = fx
            .engine
            .new_flow("missing", "", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, SignoffError::UnknownTaskKind(_)));
    }

    #[tokio::test]
    async fn test_approval_chain_surfaces_tasks_in_dfs_order() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();

        let outcome = fx.engine.start(&mut flow).await.unwrap();
        let b = match outcome {
            Outcome::AwaitingApproval(task) => task,
            other => panic!("expected suspension, got {:?}", other),
        };
        assert_eq!(b.tag(), "B");
        assert_eq!(flow.status, FlowStatus::Processing);

        let outcome = fx.engine.approve(&mut flow, b.as_ref()).await.unwrap();
        let c = outcome.awaiting().map(|t| t.tag());
        assert_eq!(c.as_deref(), Some("C"));

        let outcome = fx.engine.approve(&mut flow, &node("C")).await.unwrap();
        assert_eq!(outcome.awaiting().map(|t| t.tag()).as_deref(), Some("D"));

        let outcome = fx.engine.approve(&mut flow, &node("D")).await.unwrap();
        assert!(outcome.is_executed());
        assert_eq!(flow.status, FlowStatus::Executed);

        let entries = drain(&fx.trace);
        assert_eq!(runs(&entries), vec!["run:B", "run:D", "run:C", "run:A"]);
    }

    #[tokio::test]
    async fn test_on_delayed_fires_on_last_operated_task() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();

        fx.engine.start(&mut flow).await.unwrap();
        let entries = drain(&fx.trace);
        // The root is the last-operated task when start suspends on B.
        assert!(entries.contains(&"delayed:A->B".to_string()));
    }

    #[tokio::test]
    async fn test_approve_unsubmitted_task() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        // D has not been surfaced by the resolver yet.
        let err = fx.engine.approve(&mut flow, &node("D")).await.unwrap_err();
        match err {
            SignoffError::Unsubmitted { tag } => assert_eq!(tag, "D"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approve_twice_is_rejected() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "solo", json!({ "name": "A" }))
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        let err = fx.engine.approve(&mut flow, &node("A")).await.unwrap_err();
        match err {
            SignoffError::AlreadyApproved { tag } => assert_eq!(tag, "A"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refusal_broadcasts_to_whole_tree() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        drain(&fx.trace);

        fx.engine.refuse(&mut flow, &node("B")).await.unwrap();
        assert!(flow.is_refused());

        let entries = drain(&fx.trace);
        let refusals: Vec<&str> = entries
            .iter()
            .filter(|e| e.starts_with("refused:"))
            .map(|e| e.as_str())
            .collect();
        assert_eq!(
            refusals,
            vec![
                "refused:A:false",
                "refused:B:true",
                "refused:C:false",
                "refused:D:false",
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_flow_rejects_all_operations() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        fx.engine.refuse(&mut flow, &node("B")).await.unwrap();

        // Even a task that was never discovered reports the refusal, not
        // Unsubmitted.
        let outcome = fx.engine.approve(&mut flow, &node("D")).await.unwrap();
        assert!(matches!(outcome, Outcome::Refused));

        let outcome = fx.engine.retry(&mut flow).await.unwrap();
        assert!(matches!(outcome, Outcome::Refused));

        let outcome = fx.engine.execute(&mut flow).await.unwrap();
        assert!(matches!(outcome, Outcome::Refused));

        let outcome = fx.engine.start(&mut flow).await.unwrap();
        assert!(matches!(outcome, Outcome::Refused));
    }

    #[tokio::test]
    async fn test_refusal_survives_rehydration() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        fx.engine.refuse(&mut flow, &node("B")).await.unwrap();

        let mut reloaded = fx.engine.flow(&flow.id).await.unwrap().unwrap();
        assert!(reloaded.is_refused());
        let outcome = fx.engine.approve(&mut reloaded, &node("B")).await.unwrap();
        assert!(matches!(outcome, Outcome::Refused));
    }

    #[tokio::test]
    async fn test_body_failure_marks_task_and_flow() {
        let mut fx = fixture();
        fx.failing.lock().unwrap().insert("A".to_string());

        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        fx.engine.approve(&mut flow, &node("B")).await.unwrap();
        fx.engine.approve(&mut flow, &node("C")).await.unwrap();
        let outcome = fx.engine.approve(&mut flow, &node("D")).await.unwrap();

        match outcome {
            Outcome::Failed(SignoffError::Execution { tag, .. }) => assert_eq!(tag, "A"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(flow.status, FlowStatus::Approved);
        assert!(flow.failed);

        let record = fx.store.task_by_tag(&flow.id, "A").await.unwrap().unwrap();
        assert!(record.failed);

        // B, D, C succeeded before A failed.
        let record = fx.store.task_by_tag(&flow.id, "B").await.unwrap().unwrap();
        assert!(!record.failed);
        assert!(record.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_retry_after_failure_reruns_only_failed_task() {
        let mut fx = fixture();
        fx.failing.lock().unwrap().insert("A".to_string());

        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        fx.engine.approve(&mut flow, &node("B")).await.unwrap();
        fx.engine.approve(&mut flow, &node("C")).await.unwrap();
        fx.engine.approve(&mut flow, &node("D")).await.unwrap();
        drain(&fx.trace);

        // Fix the condition and retry: already-succeeded dependencies are
        // skipped, only the failed root re-runs.
        fx.failing.lock().unwrap().clear();
        let outcome = fx.engine.retry(&mut flow).await.unwrap();
        assert!(outcome.is_executed());
        assert_eq!(flow.status, FlowStatus::Executed);
        assert!(!flow.failed);

        let entries = drain(&fx.trace);
        assert_eq!(runs(&entries), vec!["run:A"]);
    }

    #[tokio::test]
    async fn test_mid_tree_failure_reruns_failed_task_and_ancestors() {
        let mut fx = fixture();
        fx.failing.lock().unwrap().insert("D".to_string());

        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        fx.engine.approve(&mut flow, &node("B")).await.unwrap();
        fx.engine.approve(&mut flow, &node("C")).await.unwrap();
        let outcome = fx.engine.approve(&mut flow, &node("D")).await.unwrap();
        match outcome {
            Outcome::Failed(SignoffError::Execution { tag, .. }) => assert_eq!(tag, "D"),
            other => panic!("expected failure, got {:?}", other),
        }
        drain(&fx.trace);

        fx.failing.lock().unwrap().clear();
        let outcome = fx.engine.retry(&mut flow).await.unwrap();
        assert!(outcome.is_executed());

        // B already succeeded; D, C, A still had to run.
        let entries = drain(&fx.trace);
        assert_eq!(runs(&entries), vec!["run:D", "run:C", "run:A"]);
    }

    #[tokio::test]
    async fn test_execute_while_processing() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        let err = fx.engine.execute(&mut flow).await.unwrap_err();
        assert!(matches!(err, SignoffError::FlowProcessing));
    }

    #[tokio::test]
    async fn test_execute_on_executed_flow_runs_nothing() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "solo", json!({ "name": "A" }))
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();
        drain(&fx.trace);

        let outcome = fx.engine.execute(&mut flow).await.unwrap();
        assert!(outcome.is_executed());
        assert!(runs(&drain(&fx.trace)).is_empty());
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_reported() {
        /// A task whose single dependency is itself.
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Ouroboros;

        #[async_trait]
        impl Task for Ouroboros {
            fn kind(&self) -> &str {
                "ouroboros"
            }

            fn tag(&self) -> String {
                "tail".to_string()
            }

            fn dependencies(&self) -> Vec<Box<dyn Task>> {
                vec![Box::new(Ouroboros)]
            }
        }

        let mut registry = TaskRegistry::new();
        registry.register("ouroboros", |_| Ok(Box::new(Ouroboros) as Box<dyn Task>));
        let mut engine = Engine::new(registry, MemoryRecordStore::new());

        let mut flow = engine.new_flow("ouroboros", "", json!(null)).await.unwrap();
        let err = engine.start(&mut flow).await.unwrap_err();
        match err {
            SignoffError::DependencyCycle { tag } => assert_eq!(tag, "tail"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rehydrate_task_by_record_id() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        let record = fx.store.task_by_tag(&flow.id, "B").await.unwrap().unwrap();
        let task = fx.engine.task(&record.id).await.unwrap().unwrap();
        assert_eq!(task.tag(), "B");
        assert_eq!(task.kind(), "node");

        assert!(fx.engine.task("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flow_rehydration_round_trip() {
        let mut fx = fixture();
        let flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();

        let reloaded = fx.engine.flow(&flow.id).await.unwrap().unwrap();
        assert_eq!(reloaded, flow);
        assert!(fx.engine.flow("no-such-flow").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_from_reloaded_flow() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        // Simulate a fresh request handler picking the flow back up.
        let mut reloaded = fx.engine.flow(&flow.id).await.unwrap().unwrap();
        let outcome = fx.engine.approve(&mut reloaded, &node("B")).await.unwrap();
        assert_eq!(outcome.awaiting().map(|t| t.tag()).as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let mut fx = fixture();
        let mut events = fx.engine.subscribe();

        let mut flow = fx
            .engine
            .new_flow("node", "solo", json!({ "name": "A" }))
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.flow_id(), flow.id);
            kinds.push(match event {
                FlowEvent::TaskDiscovered { .. } => "discovered",
                FlowEvent::TaskApproved { .. } => "approved",
                FlowEvent::FlowStarted { .. } => "started",
                FlowEvent::FlowApproved { .. } => "flow_approved",
                FlowEvent::TaskExecuted { .. } => "executed",
                FlowEvent::FlowExecuted { .. } => "flow_executed",
                _ => "other",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "discovered",
                "approved",
                "started",
                "flow_approved",
                "executed",
                "flow_executed",
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_inserts_record_once() {
        let mut fx = fixture();
        let mut flow = fx
            .engine
            .new_flow("node", "chain", diamond_params())
            .await
            .unwrap();
        fx.engine.start(&mut flow).await.unwrap();

        let first = fx.store.task_by_tag(&flow.id, "B").await.unwrap().unwrap();

        // A redundant retry surfaces B again but must not insert a second
        // record.
        let outcome = fx.engine.retry(&mut flow).await.unwrap();
        assert_eq!(outcome.awaiting().map(|t| t.tag()).as_deref(), Some("B"));
        let second = fx.store.task_by_tag(&flow.id, "B").await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(fx.store.task_count().await, 2); // root + B
    }
}
