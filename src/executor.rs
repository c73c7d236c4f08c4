// src/executor.rs
//
// =============================================================================
// FLOWRT: FLOW EXECUTOR (C6)
// =============================================================================
//
// Owns one run end to end: validates, resolves inputs into a fresh
// `RootRegistry`, walks the topologically-sorted node list, and fires
// lifecycle hooks around every node. Control-flow nodes (CONDITION,
// FOR_EACH) recurse back into `run_node` for their nested bodies instead of
// going through the leaf `NodeExecutor` dispatch.
//
// Global concurrency is bounded by one `Arc<Semaphore>` sized at
// construction, acquired for the lifetime of a run and released on drop.
// Admission is a blocking queue, not a fail-fast try-acquire — a `run` call
// waits its turn instead of being rejected.

use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{ConditionPayload, Flow, ForEachPayload, Node, NodeKind};
use crate::nodes::{condition, for_each, NodeExecutorFactory};
use crate::registry::{Registry, RootRegistry, ScopedRegistry};
use crate::resolver::resolve_value;
use crate::validator::validate;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// What a hook wants to happen next. `Stop` from `beforeNode`/`afterNode`
/// short-circuits the rest of the flow (or loop body / branch) cooperatively
/// and still ends in a successful result computed from outputs so far
/// (§6.9); `Stop` from `onError` instead propagates the triggering error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSignal {
    Continue,
    Stop,
}

/// Lifecycle hooks (§5). A hook that returns `Err` is logged and treated as
/// `Continue` — a misbehaving hook must never be able to wedge a run.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn before_node(&self, _node: &Node) -> anyhow::Result<HookSignal> {
        Ok(HookSignal::Continue)
    }
    async fn after_node(&self, _node: &Node, _output: &Value) -> anyhow::Result<HookSignal> {
        Ok(HookSignal::Continue)
    }
    async fn on_error(&self, _node: &Node, _error: &FlowError) -> anyhow::Result<HookSignal> {
        Ok(HookSignal::Continue)
    }
    async fn on_complete(&self, _outputs: &HashMap<String, Value>) {}
}

pub struct NoopHooks;

#[async_trait]
impl LifecycleHooks for NoopHooks {}

/// The admission-queue / execution-result contract (§6): `success` is
/// always `true` here since a run that can't produce one at all — failed
/// validation, or a propagated handler error — comes back as `Err` instead
/// of a "rejection" value, the idiomatic Rust rendering of that same
/// distinction. `error` stays for shape-compatibility with callers that
/// serialize this alongside the taxonomy in `FlowError`, but is always
/// `None` coming out of `run_flow`.
pub struct FlowRunResult {
    pub flow_id: String,
    pub success: bool,
    pub execution_time_ms: u128,
    pub outputs: HashMap<String, Value>,
    pub error: Option<String>,
}

pub struct FlowExecutor {
    task_limiter: Arc<Semaphore>,
    capacity: usize,
    collaborators: Arc<Collaborators>,
    hooks: Arc<dyn LifecycleHooks>,
    next_flow_seq: AtomicU64,
}

impl FlowExecutor {
    pub fn new(capacity: usize, collaborators: Collaborators, hooks: Arc<dyn LifecycleHooks>) -> Self {
        let capacity = capacity.max(1);
        Self {
            task_limiter: Arc::new(Semaphore::new(capacity)),
            capacity,
            collaborators: Arc::new(collaborators),
            hooks,
            next_flow_seq: AtomicU64::new(0),
        }
    }

    /// Unique per-run identifier: a monotonic in-process counter paired with
    /// a wall-clock timestamp (§6's admission bullet), so ids stay ordered
    /// within a process and distinguishable across process restarts.
    fn next_flow_id(&self, flow: &Flow) -> String {
        let seq = self.next_flow_seq.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("{}-{millis}-{seq}", flow.name)
    }

    /// Blocks until a concurrency slot is available, then runs the flow to
    /// completion. The validator runs first (unconditionally) — an invalid
    /// flow never occupies a slot.
    pub async fn run_flow(
        &self,
        flow: &Flow,
        inputs: HashMap<String, Value>,
    ) -> Result<FlowRunResult, FlowError> {
        let report = validate(flow, None);
        if !report.ok {
            let first = report
                .errors
                .first()
                .map(|e| format!("{} ({}): {}", e.path, e.code, e.message))
                .unwrap_or_default();
            log::error!("flow '{}' rejected at admission: {first}", flow.name);
            return Err(FlowError::Validation {
                errors: report.errors,
                first,
            });
        }

        let _permit = self
            .task_limiter
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let flow_id = self.next_flow_id(flow);
        let started = Instant::now();

        let mut initial_vars = HashMap::new();
        let mut var_types = HashMap::new();
        for decl in &flow.variables {
            if let Some(t) = decl.var_type {
                var_types.insert(decl.id.clone(), t);
            }
            if let Some(default) = &decl.default {
                initial_vars.insert(decl.id.clone(), default.clone());
            }
        }

        let registry: Arc<dyn Registry> = Arc::new(RootRegistry::new(
            initial_vars,
            var_types,
            Arc::clone(&self.collaborators.files),
        ));

        for required in &flow.input {
            if !inputs.contains_key(required) {
                let err = FlowError::Runtime {
                    node_id: "<inputs>".to_string(),
                    cause: anyhow::anyhow!("missing required input variable '{required}'"),
                };
                log::error!("flow '{flow_id}' failed: {}", err.user_message());
                return Err(err);
            }
        }
        for (id, value) in inputs {
            if let Err(e) = registry.set_variable(&id, value) {
                log::error!("flow '{flow_id}' failed: {}", e.user_message());
                return Err(e);
            }
        }

        let by_id: HashMap<&str, &Node> = flow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut stopped = false;
        for node_id in &report.execution_order {
            let Some(node) = by_id.get(node_id.as_str()) else {
                continue;
            };
            match self.run_node(node, Arc::clone(&registry), &flow_id).await {
                Ok(HookOutcome::Ran) => {}
                Ok(HookOutcome::Stopped) => {
                    stopped = true;
                    break;
                }
                Err(e) => {
                    log::error!("flow '{flow_id}' failed: {}", e.user_message());
                    return Err(e);
                }
            }
        }

        let mut outputs = HashMap::new();
        for id in &flow.output {
            if let Some(v) = registry.get_variable(id) {
                outputs.insert(id.clone(), v);
            }
        }
        self.hooks.on_complete(&outputs).await;

        if stopped {
            log::info!("flow '{}' stopped cooperatively via lifecycle hook", flow.name);
        }
        Ok(FlowRunResult {
            flow_id,
            success: true,
            execution_time_ms: started.elapsed().as_millis(),
            outputs,
            error: None,
        })
    }

    /// Runs one node (and, for CONDITION/FOR_EACH, its nested subtree)
    /// against the given registry view. Boxed because control-flow nodes
    /// recurse into this same function for their bodies.
    fn run_node<'a>(
        &'a self,
        node: &'a Node,
        registry: Arc<dyn Registry>,
        flow_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HookOutcome, FlowError>> + Send + 'a>> {
        Box::pin(async move {
            log::info!("flow '{flow_id}': node '{}' ({:?}) started", node.id, node.kind);
            let node_started = Instant::now();

            match self.hooks.before_node(node).await {
                Ok(HookSignal::Stop) => return Ok(HookOutcome::Stopped),
                Ok(HookSignal::Continue) => {}
                Err(e) => log::warn!("beforeNode hook for '{}' failed: {e}", node.id),
            }

            let resolved_payload = resolve_value(&node.payload, registry.as_ref());
            let resolved_node = Node {
                id: node.id.clone(),
                kind: node.kind.clone(),
                name: node.name.clone(),
                payload: resolved_payload,
            };

            let result = self.execute_one(&resolved_node, Arc::clone(&registry), flow_id).await;

            let (output, nested_stop) = match result {
                Ok((output, nested_stop)) => (output, nested_stop),
                Err(e) => {
                    let signal = match self.hooks.on_error(node, &e).await {
                        Ok(s) => s,
                        Err(hook_err) => {
                            log::warn!("onError hook for '{}' failed: {hook_err}", node.id);
                            HookSignal::Continue
                        }
                    };
                    if signal == HookSignal::Stop {
                        return Err(e);
                    }
                    log::warn!("node '{}' failed, continuing per onError hook: {}", node.id, e.user_message());
                    (Value::Null, false)
                }
            };

            registry.set_node_output(&node.id, serde_json::json!({ "output": output.clone() }));
            log::info!(
                "flow '{flow_id}': node '{}' completed in {}ms",
                node.id,
                node_started.elapsed().as_millis()
            );

            let after_signal = match self.hooks.after_node(node, &output).await {
                Ok(signal) => signal,
                Err(e) => {
                    log::warn!("afterNode hook for '{}' failed: {e}", node.id);
                    HookSignal::Continue
                }
            };

            // A stop raised by a node nested inside this CONDITION/FOR_EACH
            // body must halt the whole run just as surely as this node's own
            // afterNode hook returning stop would.
            if nested_stop || after_signal == HookSignal::Stop {
                Ok(HookOutcome::Stopped)
            } else {
                Ok(HookOutcome::Ran)
            }
        })
    }

    /// Dispatches one already variable-resolved node: leaf kinds go through
    /// `NodeExecutorFactory`, CONDITION/FOR_EACH recurse into their bodies.
    /// The `bool` in the return value is "a nested node signalled stop" —
    /// always `false` for leaf kinds, which have no bodies to recurse into.
    fn execute_one<'a>(
        &'a self,
        node: &'a Node,
        registry: Arc<dyn Registry>,
        flow_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(Value, bool), FlowError>> + Send + 'a>> {
        Box::pin(async move {
            match node.kind {
                NodeKind::Condition => self.execute_condition(node, registry, flow_id).await,
                NodeKind::ForEach => self.execute_for_each(node, registry, flow_id).await,
                _ => {
                    let executor = NodeExecutorFactory::get(&node.kind)
                        .expect("leaf node kinds always have a registered executor");
                    let output = executor.execute(node, registry.as_ref(), &self.collaborators, flow_id).await?;
                    Ok((output, false))
                }
            }
        })
    }

    async fn execute_condition(
        &self,
        node: &Node,
        registry: Arc<dyn Registry>,
        flow_id: &str,
    ) -> Result<(Value, bool), FlowError> {
        let payload: ConditionPayload = serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
            node_id: node.id.clone(),
            cause: anyhow::anyhow!("invalid CONDITION payload: {e}"),
        })?;

        let Some((branch_name, branch)) = condition::select_branch(&node.id, &payload)? else {
            return Ok((serde_json::json!({ "matched_branch": Value::Null, "results": {} }), false));
        };

        let mut results = serde_json::Map::new();
        let mut stopped = false;
        for child in condition::selected_nodes(branch) {
            match self.run_node(child, Arc::clone(&registry), flow_id).await? {
                HookOutcome::Stopped => stopped = true,
                HookOutcome::Ran => {}
            }
            if let Some(out) = registry.get_node_output(&child.id) {
                results.insert(child.id.clone(), out);
            }
            if stopped {
                break;
            }
        }

        Ok((
            serde_json::json!({ "matched_branch": branch_name, "results": Value::Object(results) }),
            stopped,
        ))
    }

    async fn execute_for_each(
        &self,
        node: &Node,
        registry: Arc<dyn Registry>,
        flow_id: &str,
    ) -> Result<(Value, bool), FlowError> {
        let payload: ForEachPayload = serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
            node_id: node.id.clone(),
            cause: anyhow::anyhow!("invalid FOR_EACH payload: {e}"),
        })?;

        let items = for_each::iteration_items(&node.id, &payload)?;
        let total_items = items.len();
        let mut results = Vec::with_capacity(total_items);
        let mut stopped = false;

        for (index, item) in items.into_iter().enumerate() {
            let scoped: Arc<dyn Registry> = Arc::new(ScopedRegistry::new(
                Arc::clone(&registry),
                &payload.config.each_key,
                item.clone(),
                index,
            ));

            for child in &payload.each_nodes {
                match self.run_node(child, Arc::clone(&scoped), flow_id).await? {
                    HookOutcome::Stopped => stopped = true,
                    HookOutcome::Ran => {}
                }
                if stopped {
                    break;
                }
            }

            let mut iteration_result = HashMap::new();
            for child in &payload.each_nodes {
                if let Some(out) = scoped.get_node_output(&child.id) {
                    iteration_result.insert(child.id.clone(), out);
                }
            }
            results.push(serde_json::json!({
                "item": item,
                "index": index,
                "results": Value::Object(iteration_result.into_iter().collect()),
            }));

            if stopped {
                break;
            }

            if payload.config.delay_between > 0 && index + 1 < total_items {
                tokio::time::sleep(Duration::from_millis(payload.config.delay_between)).await;
            }
        }

        let processed_items = results.len();
        Ok((
            serde_json::json!({
                "total_items": total_items,
                "processed_items": processed_items,
                "results": results,
            }),
            stopped,
        ))
    }

    /// Waits (up to `timeout`) for every in-flight run to finish, by
    /// acquiring and immediately releasing all concurrency permits.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.task_limiter.acquire_many(self.capacity as u32))
            .await
            .is_ok()
    }
}

enum HookOutcome {
    Ran,
    Stopped,
}
