//! The scheduler's tick loop (spec §4.F): a single long-lived task that
//! lists due rules, advances+persists each one's `next_due` before it
//! runs (so a slow execution can never block future scheduling), then
//! runs the same Script Runtime + Output Dispatcher pipeline the Rule
//! Worker uses, and finally hands due report configurations to the
//! Report Engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tracing::warn;

use re_core::error::RulesError;
use re_core::message::{Message, RunInfo};
use re_core::ports::{Emailer, PubSub, RuleFilter, RuleRepository, Ticker};
use re_core::rule::{ExecutionStatus, LogicType, Rule, RuleStatus};
use re_core::session::Session;

use crate::dispatch::OutputDispatcher;
use crate::runtime::{RunContext, ScriptRuntime};

use super::nextdue;

/// Collaborators the scheduler needs to run a due rule. Mirrors
/// [`crate::worker::WorkerDeps`]: the same pipeline, a different
/// trigger.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub repository: Arc<dyn RuleRepository>,
    pub lua_runtime: Arc<dyn ScriptRuntime>,
    pub native_runtime: Arc<dyn ScriptRuntime>,
    pub dispatcher: Arc<OutputDispatcher>,
    pub emailer: Arc<dyn Emailer>,
    pub pubsub: Arc<dyn PubSub>,
    pub run_info_tx: mpsc::Sender<RunInfo>,
}

/// Hook invoked once per tick to run due report configurations. Kept
/// separate from [`SchedulerDeps`] so the scheduler compiles and tests
/// without a report engine wired up.
#[async_trait]
pub trait ReportScheduler: Send + Sync {
    async fn run_due(&self, due: DateTime<Utc>);
}

pub struct Scheduler {
    ticker: Arc<dyn Ticker>,
    deps: SchedulerDeps,
    reports: Option<Arc<dyn ReportScheduler>>,
    stop_notify: Arc<Notify>,
}

impl Scheduler {
    pub fn new(ticker: Arc<dyn Ticker>, deps: SchedulerDeps, reports: Option<Arc<dyn ReportScheduler>>) -> Self {
        Self {
            ticker,
            deps,
            reports,
            stop_notify: Arc::new(Notify::new()),
        }
    }

    /// Signal the run loop to stop. The ticker is stopped regardless of
    /// how the loop exits.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop_notify.clone()
    }

    /// Runs until stopped. Always returns `Err` — there is no
    /// successful exit short of cancellation (spec §4.F).
    pub async fn run(&self) -> Result<(), RulesError> {
        loop {
            tokio::select! {
                _ = self.stop_notify.notified() => {
                    self.ticker.stop();
                    return Err(RulesError::Other("scheduler cancelled".to_string()));
                }
                due = self.ticker.tick() => {
                    self.run_tick(due).await;
                }
            }
        }
    }

    async fn run_tick(&self, due: DateTime<Utc>) {
        let session = Session::new("re-scheduler", String::new(), true);
        let filter = RuleFilter {
            status: Some(RuleStatus::Enabled),
            scheduled: Some(true),
            scheduled_before: Some(due),
            ..Default::default()
        };
        let rules = match self.deps.repository.list_rules(&session, filter).await {
            Ok(page) => page.items,
            Err(e) => {
                warn!(error = %e, "scheduler failed to list due rules");
                Vec::new()
            }
        };

        for rule in rules {
            let deps = self.deps.clone();
            tokio::spawn(async move {
                run_due_rule(rule, due, &deps).await;
            });
        }

        if let Some(reports) = &self.reports {
            reports.run_due(due).await;
        }
    }
}

async fn run_due_rule(rule: Rule, due: DateTime<Utc>, deps: &SchedulerDeps) {
    let Some(schedule) = rule.schedule.clone() else {
        return;
    };

    let next_due = nextdue::advance(&schedule, due);
    let rule = match deps.repository.update_rule_due(rule.id, next_due.unwrap_or(due)).await {
        Ok(mut persisted) => {
            persisted.schedule = persisted.schedule.map(|mut s| {
                s.next_due = next_due;
                s
            });
            persisted
        }
        Err(e) => {
            warn!(rule_id = %rule.id, error = %e, "failed to advance next_due before running");
            rule
        }
    };

    let message = Message::synthetic(&rule.domain_id, &rule.input_channel, &rule.input_topic, due);

    let runtime: &Arc<dyn ScriptRuntime> = match rule.logic.logic_type {
        LogicType::Lua => &deps.lua_runtime,
        LogicType::Native => &deps.native_runtime,
    };
    let ctx = RunContext {
        rule: &rule,
        message: &message,
        emailer: &deps.emailer,
        pubsub: &deps.pubsub,
    };

    let started = std::time::Instant::now();
    let (result, mut info) = runtime.run(&ctx).await;

    let status = if info.level == re_core::message::RunLevel::Error {
        ExecutionStatus::Failure
    } else if result.triggers_outputs() {
        match deps.dispatcher.dispatch_all(&rule, &message, &result).await {
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
        obj.insert("execution_time_ms".to_string(), serde_json::json!(started.elapsed().as_millis()));
    }

    if deps.run_info_tx.try_send(info).is_err() {
        warn!(rule_id = %rule.id, "run info channel full, dropping scheduled record");
    }

    let mut persisted = rule.clone();
    persisted.last_run_status = status;
    let session = Session::new("re-scheduler", rule.domain_id.clone(), true);
    if let Err(e) = deps.repository.update_rule(&session, persisted).await {
        warn!(rule_id = %rule.id, error = %e, "failed to persist scheduled execution status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use re_core::ports::{MessageHandler, Page};
    use re_core::rule::{Logic, Output, Recurring, Schedule};
    use re_core::value::Value;

    use crate::scheduler::ticker::ManualTicker;

    struct NoopEmailer;
    #[async_trait]
    impl Emailer for NoopEmailer {
        async fn send_email_notification(
            &self,
            _to: &[String],
            _from: &str,
            _subject: &str,
            _header: &str,
            _user: &str,
            _content: &str,
            _footer: &str,
            _attachments: &HashMap<String, Vec<u8>>,
        ) -> Result<(), RulesError> {
            Ok(())
        }
    }

    struct NoopPubSub;
    #[async_trait]
    impl PubSub for NoopPubSub {
        async fn publish(&self, _topic: &str, _message: Message) -> Result<(), RulesError> {
            Ok(())
        }
        async fn subscribe(&self, _topic: &str, _handler: MessageHandler) -> Result<(), RulesError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), RulesError> {
            Ok(())
        }
    }

    struct AlwaysTrueRuntime;
    #[async_trait]
    impl ScriptRuntime for AlwaysTrueRuntime {
        async fn run(&self, ctx: &RunContext<'_>) -> (Value, RunInfo) {
            let _ = ctx;
            (Value::Bool(true), RunInfo::info("ok", serde_json::json!({})))
        }
    }

    struct StubRepository {
        rules: Mutex<Vec<Rule>>,
        due_calls: AtomicUsize,
    }

    #[async_trait]
    impl RuleRepository for StubRepository {
        async fn add_rule(&self, _s: &Session, rule: Rule) -> Result<Rule, RulesError> {
            Ok(rule)
        }
        async fn view_rule(&self, _s: &Session, _id: Uuid) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn update_rule(&self, _s: &Session, rule: Rule) -> Result<Rule, RulesError> {
            Ok(rule)
        }
        async fn update_rule_tags(&self, _s: &Session, _id: Uuid, _tags: Vec<String>) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn update_rule_schedule(
            &self,
            _s: &Session,
            _id: Uuid,
            _schedule: Option<Schedule>,
        ) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn update_rule_status(&self, _s: &Session, _id: Uuid, _status: RuleStatus) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn remove_rule(&self, _s: &Session, _id: Uuid) -> Result<(), RulesError> {
            Ok(())
        }
        async fn update_rule_due(&self, id: Uuid, _due: DateTime<Utc>) -> Result<Rule, RulesError> {
            self.due_calls.fetch_add(1, Ordering::SeqCst);
            self.rules
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| RulesError::not_found("n/a"))
        }
        async fn list_rules(&self, _s: &Session, filter: RuleFilter) -> Result<Page<Rule>, RulesError> {
            let due = filter.scheduled_before.unwrap();
            let items: Vec<Rule> = self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.schedule.as_ref().and_then(|s| s.next_due).is_some_and(|d| d <= due))
                .cloned()
                .collect();
            let total = items.len() as u64;
            Ok(Page { items, total, offset: 0, limit: 0 })
        }
    }

    fn scheduled_rule(next_due: DateTime<Utc>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "report".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "reports".into(),
            input_topic: "".into(),
            logic: Logic { logic_type: LogicType::Lua, source: "return true".into() },
            outputs: vec![Output::ChannelPublish { channel: "alerts".into(), subtopic: "".into() }],
            schedule: Some(Schedule {
                start: next_due,
                time_of_day: next_due,
                recurring: Recurring::None,
                recurring_period: 0,
                next_due: Some(next_due),
            }),
            status: RuleStatus::Enabled,
            created_at: next_due,
            created_by: "u".into(),
            updated_at: next_due,
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    fn deps(repository: Arc<dyn RuleRepository>, run_info_tx: mpsc::Sender<RunInfo>) -> SchedulerDeps {
        SchedulerDeps {
            repository,
            lua_runtime: Arc::new(AlwaysTrueRuntime),
            native_runtime: Arc::new(AlwaysTrueRuntime),
            dispatcher: Arc::new(OutputDispatcher::new(Arc::new(NoopPubSub), Arc::new(NoopEmailer))),
            emailer: Arc::new(NoopEmailer),
            pubsub: Arc::new(NoopPubSub),
            run_info_tx,
        }
    }

    #[tokio::test]
    async fn due_rule_advances_next_due_before_running() {
        let due = Utc::now();
        let rule = scheduled_rule(due);
        let repository = Arc::new(StubRepository {
            rules: Mutex::new(vec![rule]),
            due_calls: AtomicUsize::new(0),
        });
        let (run_info_tx, mut run_info_rx) = mpsc::channel(16);
        let scheduler_deps = deps(repository.clone(), run_info_tx);

        let ticker: Arc<dyn Ticker> = Arc::new(ManualTicker::new(vec![due]));
        let scheduler = Scheduler::new(ticker, scheduler_deps, None);
        let stop = scheduler.stop_handle();

        let run = tokio::spawn(async move { scheduler.run().await });
        let info = tokio::time::timeout(Duration::from_secs(1), run_info_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.text, "ok");
        assert_eq!(repository.due_calls.load(Ordering::SeqCst), 1);

        stop.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stop_halts_the_loop_with_a_cancellation_error() {
        let repository = Arc::new(StubRepository {
            rules: Mutex::new(vec![]),
            due_calls: AtomicUsize::new(0),
        });
        let (run_info_tx, _run_info_rx) = mpsc::channel(16);
        let scheduler_deps = deps(repository, run_info_tx);

        let ticker: Arc<dyn Ticker> = Arc::new(ManualTicker::new(vec![]));
        let scheduler = Scheduler::new(ticker, scheduler_deps, None);
        let stop = scheduler.stop_handle();
        stop.notify_one();

        let result = tokio::time::timeout(Duration::from_secs(1), scheduler.run()).await.unwrap();
        assert!(matches!(result, Err(RulesError::Other(_))));
    }
}
