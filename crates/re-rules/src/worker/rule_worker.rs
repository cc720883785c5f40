//! Per-rule cooperative task (spec §4.C).
//!
//! `Idle -> Running` on [`RuleWorker::start`] (idempotent via
//! compare-and-swap), `Running -> Stopping` on [`RuleWorker::stop`] or
//! the shared stop signal, `Stopping -> Idle` once the processing loop
//! drains and exits. The inbound message queue is bounded; a full queue
//! or a non-running worker makes [`RuleWorker::send`] return `false`
//! rather than block ingress. The update channel is single-slot: a
//! `tokio::sync::watch` keeps only the newest rule snapshot.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use re_core::message::{Message, RunInfo};
use re_core::ports::{Emailer, PubSub, RuleRepository};
use re_core::rule::{ExecutionStatus, LogicType, Rule};
use re_core::session::Session;

use crate::dispatch::OutputDispatcher;
use crate::runtime::{RunContext, ScriptRuntime};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// Collaborators a rule worker needs to execute and dispatch a message,
/// shared across every worker the manager owns.
#[derive(Clone)]
pub struct WorkerDeps {
    pub lua_runtime: Arc<dyn ScriptRuntime>,
    pub native_runtime: Arc<dyn ScriptRuntime>,
    pub dispatcher: Arc<OutputDispatcher>,
    pub emailer: Arc<dyn Emailer>,
    pub pubsub: Arc<dyn PubSub>,
    pub repository: Arc<dyn RuleRepository>,
    pub run_info_tx: mpsc::Sender<RunInfo>,
}

pub struct RuleWorker {
    id: Uuid,
    state: Arc<AtomicU8>,
    message_tx: mpsc::Sender<Message>,
    update_tx: watch::Sender<Rule>,
    stop_notify: Arc<Notify>,
    spawned: Mutex<Option<SpawnParts>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

struct SpawnParts {
    message_rx: mpsc::Receiver<Message>,
    update_rx: watch::Receiver<Rule>,
}

impl RuleWorker {
    pub fn new(rule: Rule, queue_capacity: usize) -> Arc<Self> {
        let id = rule.id;
        let (message_tx, message_rx) = mpsc::channel(queue_capacity.max(1));
        let (update_tx, update_rx) = watch::channel(rule);
        Arc::new(Self {
            id,
            state: Arc::new(AtomicU8::new(IDLE)),
            message_tx,
            update_tx,
            stop_notify: Arc::new(Notify::new()),
            spawned: Mutex::new(Some(SpawnParts { message_rx, update_rx })),
            join: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// `Idle -> Running`. A second call while already running or
    /// stopping is a no-op.
    pub fn start(self: &Arc<Self>, deps: WorkerDeps) {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let parts = match self.spawned.lock().unwrap().take() {
            Some(parts) => parts,
            None => return, // already consumed by a prior start
        };

        let id = self.id;
        let state = self.state.clone();
        let stop_notify = self.stop_notify.clone();
        let handle = tokio::spawn(async move {
            run_loop(id, deps, parts.message_rx, parts.update_rx, stop_notify).await;
            state.store(IDLE, Ordering::SeqCst);
        });
        *self.join.lock().unwrap() = Some(handle);
    }

    /// `Running -> Stopping`. Idempotent: stopping a non-running worker
    /// is a no-op.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.stop_notify.notify_one();
        }
    }

    pub async fn join(&self) {
        let handle = self.join.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Non-blocking enqueue. Returns `false` if the worker isn't
    /// running or its bounded queue is full.
    pub fn send(&self, message: Message) -> bool {
        if !self.is_running() {
            return false;
        }
        self.message_tx.try_send(message).is_ok()
    }

    /// Single-slot coalescing update: the newest snapshot displaces
    /// whatever was previously pending.
    pub fn update(&self, rule: Rule) {
        let _ = self.update_tx.send(rule);
    }
}

async fn run_loop(
    worker_id: Uuid,
    deps: WorkerDeps,
    mut message_rx: mpsc::Receiver<Message>,
    mut update_rx: watch::Receiver<Rule>,
    stop_notify: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = stop_notify.notified() => break,
            changed = update_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            received = message_rx.recv() => {
                match received {
                    Some(message) => {
                        let rule = update_rx.borrow().clone();
                        if !rule.is_enabled() {
                            continue;
                        }
                        process_message(worker_id, &rule, &message, &deps).await;
                    }
                    None => break,
                }
            }
        }
    }
}

async fn process_message(worker_id: Uuid, rule: &Rule, message: &Message, deps: &WorkerDeps) {
    let runtime: &Arc<dyn ScriptRuntime> = match rule.logic.logic_type {
        LogicType::Lua => &deps.lua_runtime,
        LogicType::Native => &deps.native_runtime,
    };
    let ctx = RunContext {
        rule,
        message,
        emailer: &deps.emailer,
        pubsub: &deps.pubsub,
    };

    let started = std::time::Instant::now();
    let (result, mut info) = runtime.run(&ctx).await;

    let status = if info.level == re_core::message::RunLevel::Error {
        ExecutionStatus::Failure
    } else if result.triggers_outputs() {
        match deps.dispatcher.dispatch_all(rule, message, &result).await {
            Ok(()) => ExecutionStatus::Success,
            Err(re_core::error::ExecutionError::Dispatch { failed, total, detail }) => {
                info = RunInfo::error(format!("dispatch failed ({failed}/{total}): {detail}"), info.details);
                if failed >= total {
                    ExecutionStatus::Failure
                } else {
                    ExecutionStatus::PartialSuccess
                }
            }
            Err(other) => {
                info = RunInfo::error(other.to_string(), info.details);
                ExecutionStatus::Failure
            }
        }
    } else {
        ExecutionStatus::Success
    };

    if let Some(obj) = info.details.as_object_mut() {
        obj.insert(
            "execution_time_ms".to_string(),
            serde_json::json!(started.elapsed().as_millis()),
        );
    }

    if deps.run_info_tx.try_send(info).is_err() {
        warn!(worker_id = %worker_id, rule_id = %rule.id, "run info channel full, dropping record");
    }

    let mut persisted = rule.clone();
    persisted.last_run_status = status;
    let session = Session::new("re-engine", rule.domain_id.clone(), true);
    if let Err(e) = deps.repository.update_rule(&session, persisted).await {
        warn!(rule_id = %rule.id, error = %e, "failed to persist execution status");
    }
}
