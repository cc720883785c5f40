//! Worker registry (spec §4.D): every mutation is serialized through a
//! single command-processing task, so `Add`/`Remove`/`Update`/`Send`
//! never race each other over the same rule id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use re_core::message::Message;
use re_core::rule::{Rule, RuleStatus};

use super::rule_worker::{RuleWorker, WorkerDeps};

enum Command {
    Add(Rule),
    Remove(Uuid),
    Update(Rule),
    Send(Uuid, Message, oneshot::Sender<bool>),
    StopAll(oneshot::Sender<bool>),
    Count(oneshot::Sender<usize>),
    List(oneshot::Sender<Vec<Uuid>>),
}

/// Handle to the command-processing task. Cloning shares the same
/// underlying registry.
#[derive(Clone)]
pub struct WorkerManager {
    command_tx: mpsc::Sender<Command>,
}

impl WorkerManager {
    pub fn start(deps: WorkerDeps, queue_capacity: usize) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        tokio::spawn(run_command_loop(command_rx, deps, queue_capacity));
        Self { command_tx }
    }

    /// Create (and start, if enabled) a worker for `rule`, stopping any
    /// existing worker with the same id first.
    pub async fn add(&self, rule: Rule) {
        let _ = self.command_tx.send(Command::Add(rule)).await;
    }

    pub async fn remove(&self, id: Uuid) {
        let _ = self.command_tx.send(Command::Remove(id)).await;
    }

    /// If `status != Enabled`, behaves as `remove`. Otherwise pushes the
    /// snapshot onto the worker's update channel, or adds it if absent.
    pub async fn update(&self, rule: Rule) {
        let _ = self.command_tx.send(Command::Update(rule)).await;
    }

    /// `false` if the manager has shut down, the worker is absent, or
    /// not running.
    pub async fn send(&self, id: Uuid, message: Message) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::Send(id, message, reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn stop_all(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::StopAll(reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::Count(reply_tx)).await.is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    pub async fn list(&self) -> Vec<Uuid> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::List(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

async fn run_command_loop(mut command_rx: mpsc::Receiver<Command>, deps: WorkerDeps, queue_capacity: usize) {
    let mut registry: HashMap<Uuid, Arc<RuleWorker>> = HashMap::new();

    while let Some(command) = command_rx.recv().await {
        match command {
            Command::Add(rule) => {
                if let Some(existing) = registry.remove(&rule.id) {
                    existing.stop();
                    existing.join().await;
                }
                if rule.status != RuleStatus::Enabled {
                    continue;
                }
                let worker = RuleWorker::new(rule, queue_capacity);
                worker.start(deps.clone());
                registry.insert(worker.id(), worker);
            }
            Command::Remove(id) => {
                if let Some(worker) = registry.remove(&id) {
                    worker.stop();
                    worker.join().await;
                }
            }
            Command::Update(rule) => {
                if rule.status != RuleStatus::Enabled {
                    if let Some(worker) = registry.remove(&rule.id) {
                        worker.stop();
                        worker.join().await;
                    }
                    continue;
                }
                match registry.get(&rule.id) {
                    Some(worker) => worker.update(rule),
                    None => {
                        let worker = RuleWorker::new(rule, queue_capacity);
                        worker.start(deps.clone());
                        registry.insert(worker.id(), worker);
                    }
                }
            }
            Command::Send(id, message, reply_tx) => {
                let sent = match registry.get(&id) {
                    Some(worker) => worker.send(message),
                    None => false,
                };
                let _ = reply_tx.send(sent);
            }
            Command::StopAll(reply_tx) => {
                for (_, worker) in registry.drain() {
                    worker.stop();
                    worker.join().await;
                }
                let _ = reply_tx.send(true);
            }
            Command::Count(reply_tx) => {
                let _ = reply_tx.send(registry.len());
            }
            Command::List(reply_tx) => {
                let _ = reply_tx.send(registry.keys().copied().collect());
            }
        }
    }

    // Command channel closed: the manager was dropped. Stop whatever is
    // still running before the task exits.
    for (_, worker) in registry.drain() {
        worker.stop();
        worker.join().await;
    }
}
