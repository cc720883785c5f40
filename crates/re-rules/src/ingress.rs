//! Ingress Handler (spec §4.E): payload size cap, throttle/loop guard,
//! repository lookup, subtopic matching, hand-off to the Worker Manager.

pub mod throttle;

use std::sync::Arc;

use tracing::warn;

use re_core::error::RulesError;
use re_core::message::Message;
use re_core::ports::{RuleFilter, RuleRepository};
use re_core::rule::RuleStatus;
use re_core::session::Session;
use re_core::topic::subtopic_matches;

use crate::worker::WorkerManager;
use throttle::{ThrottleGuard, Verdict};

pub struct IngressHandler {
    repository: Arc<dyn RuleRepository>,
    manager: WorkerManager,
    throttle: Arc<ThrottleGuard>,
    max_payload_bytes: usize,
}

impl IngressHandler {
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        manager: WorkerManager,
        throttle: Arc<ThrottleGuard>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            repository,
            manager,
            throttle,
            max_payload_bytes,
        }
    }

    pub async fn handle(&self, message: Message) -> Result<(), RulesError> {
        if message.payload.len() > self.max_payload_bytes {
            return Err(RulesError::Oversize(message.payload.len(), self.max_payload_bytes));
        }

        match self.throttle.check(&message.domain, &message.channel, &message.subtopic) {
            Verdict::Allow => {}
            Verdict::RateLimited => {
                warn!(domain = %message.domain, channel = %message.channel, "message dropped: rate limited");
                return Ok(());
            }
            Verdict::LoopDetected => {
                warn!(domain = %message.domain, channel = %message.channel, subtopic = %message.subtopic, "message dropped: loop detected");
                return Ok(());
            }
        }

        let session = Session::new("re-ingress", message.domain.clone(), true);
        let filter = RuleFilter {
            domain_id: Some(message.domain.clone()),
            input_channel: Some(message.channel.clone()),
            status: Some(RuleStatus::Enabled),
            scheduled: Some(false),
            ..Default::default()
        };
        let page = self.repository.list_rules(&session, filter).await?;

        for rule in page.items {
            if subtopic_matches(&message.subtopic, &rule.input_topic) {
                self.manager.send(rule.id, message.clone()).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use re_core::config::ThrottleConfig;
    use re_core::message::RunInfo;
    use re_core::ports::{Emailer, MessageHandler, Page, PubSub};
    use re_core::rule::{Logic, LogicType, Output, Rule};
    use re_core::value::Value;

    use crate::dispatch::OutputDispatcher;
    use crate::runtime::{RunContext, ScriptRuntime};
    use crate::worker::WorkerDeps;

    struct StubRepository {
        rules: Vec<Rule>,
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
            _schedule: Option<re_core::rule::Schedule>,
        ) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn update_rule_status(&self, _s: &Session, _id: Uuid, _status: RuleStatus) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn remove_rule(&self, _s: &Session, _id: Uuid) -> Result<(), RulesError> {
            Ok(())
        }
        async fn update_rule_due(&self, _id: Uuid, _due: chrono::DateTime<Utc>) -> Result<Rule, RulesError> {
            Err(RulesError::not_found("n/a"))
        }
        async fn list_rules(&self, _s: &Session, filter: RuleFilter) -> Result<Page<Rule>, RulesError> {
            let items: Vec<Rule> = self
                .rules
                .iter()
                .filter(|r| filter.input_channel.as_deref() == Some(&r.input_channel))
                .cloned()
                .collect();
            let total = items.len() as u64;
            Ok(Page { items, total, offset: 0, limit: 0 })
        }
    }

    fn rule(input_topic: &str) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "r".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: input_topic.into(),
            logic: Logic { logic_type: LogicType::Lua, source: "return true".into() },
            outputs: vec![Output::ChannelPublish { channel: "alerts".into(), subtopic: "".into() }],
            schedule: None,
            status: RuleStatus::Enabled,
            created_at: Utc::now(),
            created_by: "u".into(),
            updated_at: Utc::now(),
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    fn message(subtopic: &str, payload: Vec<u8>) -> Message {
        Message {
            domain: "d1".into(),
            channel: "sensors".into(),
            subtopic: subtopic.into(),
            publisher: "dev1".into(),
            protocol: "mqtt".into(),
            created: 0,
            payload,
        }
    }

    fn generous_throttle() -> Arc<ThrottleGuard> {
        ThrottleGuard::new(ThrottleConfig {
            rate_per_second: 1_000_000,
            loop_threshold: 1_000_000,
            loop_window: Duration::from_secs(3600),
        })
    }

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

    fn deps(run_info_tx: mpsc::Sender<RunInfo>, repository: Arc<dyn RuleRepository>) -> WorkerDeps {
        WorkerDeps {
            lua_runtime: Arc::new(AlwaysTrueRuntime),
            native_runtime: Arc::new(AlwaysTrueRuntime),
            dispatcher: Arc::new(OutputDispatcher::new(Arc::new(NoopPubSub), Arc::new(NoopEmailer))),
            emailer: Arc::new(NoopEmailer),
            pubsub: Arc::new(NoopPubSub),
            repository,
            run_info_tx,
        }
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let repository = Arc::new(StubRepository { rules: vec![] });
        let (run_info_tx, _rx) = mpsc::channel(16);
        let manager = WorkerManager::start(deps(run_info_tx, repository.clone()), 100);
        let handler = IngressHandler::new(repository, manager, generous_throttle(), 10);

        let result = handler.handle(message("t", vec![0u8; 20])).await;
        assert!(matches!(result, Err(RulesError::Oversize(20, 10))));
    }

    #[tokio::test]
    async fn matching_rule_receives_the_message_and_runs() {
        let matching = rule("temperature");
        let repository = Arc::new(StubRepository { rules: vec![matching.clone()] });
        let (run_info_tx, mut run_info_rx) = mpsc::channel(16);
        let manager = WorkerManager::start(deps(run_info_tx, repository.clone()), 100);
        manager.add(matching).await;
        let handler = IngressHandler::new(repository, manager, generous_throttle(), 1024);

        handler.handle(message("temperature", b"{}".to_vec())).await.unwrap();

        let info = tokio::time::timeout(Duration::from_secs(1), run_info_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.text, "ok");
    }

    #[tokio::test]
    async fn non_matching_subtopic_is_not_dispatched() {
        let matching = rule("humidity");
        let repository = Arc::new(StubRepository { rules: vec![matching.clone()] });
        let (run_info_tx, mut run_info_rx) = mpsc::channel(16);
        let manager = WorkerManager::start(deps(run_info_tx, repository.clone()), 100);
        manager.add(matching).await;
        let handler = IngressHandler::new(repository, manager, generous_throttle(), 1024);

        handler.handle(message("temperature", b"{}".to_vec())).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(200), run_info_rx.recv()).await;
        assert!(outcome.is_err());
    }
}
