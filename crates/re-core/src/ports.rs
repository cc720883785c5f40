//! External interfaces the engine consumes (spec §6), expressed as
//! traits. Concrete implementations live in other crates
//! (`re-transport::ZmqPubSub`, `re-notify::SmtpEmailer`,
//! `re-rules::repository::{InMemoryRuleRepository, FileRuleRepository}`,
//! `re-rules::scheduler::IntervalTicker`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RulesError;
use crate::message::Message;
use crate::rule::{Rule, RuleStatus, Schedule};
use crate::session::Session;

// ── Rule repository ──────────────────────────────────────────────────

/// Filter for `ListRules`. Deterministic ordering (by `created_at` then
/// `id`) is a contract requirement, not an implementation detail — it is
/// what makes pagination and tests stable (spec §6).
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub domain_id: Option<String>,
    pub input_channel: Option<String>,
    pub status: Option<RuleStatus>,
    pub scheduled: Option<bool>,
    pub scheduled_before: Option<DateTime<Utc>>,
    pub scheduled_after: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn add_rule(&self, session: &Session, rule: Rule) -> Result<Rule, RulesError>;
    async fn view_rule(&self, session: &Session, id: Uuid) -> Result<Rule, RulesError>;
    async fn update_rule(&self, session: &Session, rule: Rule) -> Result<Rule, RulesError>;
    async fn update_rule_tags(
        &self,
        session: &Session,
        id: Uuid,
        tags: Vec<String>,
    ) -> Result<Rule, RulesError>;
    async fn update_rule_schedule(
        &self,
        session: &Session,
        id: Uuid,
        schedule: Option<Schedule>,
    ) -> Result<Rule, RulesError>;
    async fn update_rule_status(
        &self,
        session: &Session,
        id: Uuid,
        status: RuleStatus,
    ) -> Result<Rule, RulesError>;
    async fn remove_rule(&self, session: &Session, id: Uuid) -> Result<(), RulesError>;
    /// Advance a scheduled rule's `next_due` (spec §4.F.2.a). Not
    /// session-scoped: called internally by the scheduler, not by a user.
    async fn update_rule_due(&self, id: Uuid, due: DateTime<Utc>) -> Result<Rule, RulesError>;
    async fn list_rules(
        &self,
        session: &Session,
        filter: RuleFilter,
    ) -> Result<Page<Rule>, RulesError>;
}

// ── PubSub ────────────────────────────────────────────────────────────

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed async handler invoked once per message received on a
/// subscription (spec §6 "Subscribe(ctx, topic, handler)").
pub type MessageHandler = Box<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), RulesError>;
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), RulesError>;
    async fn close(&self) -> Result<(), RulesError>;
}

// ── Emailer ───────────────────────────────────────────────────────────

#[async_trait]
pub trait Emailer: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn send_email_notification(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        header: &str,
        user: &str,
        content: &str,
        footer: &str,
        attachments: &HashMap<String, Vec<u8>>,
    ) -> Result<(), RulesError>;
}

// ── Historical readings reader (Report Engine) ───────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Max,
    Min,
    Avg,
    Sum,
    Count,
}

#[derive(Debug, Clone)]
pub struct ReadingsQuery {
    pub channel: String,
    pub client: String,
    pub subtopic: String,
    pub protocol: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub aggregation: Option<Aggregation>,
    pub interval: Option<chrono::Duration>,
}

/// A single SenML record (spec GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenmlRecord {
    pub base_name: Option<String>,
    pub name: String,
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub bool_value: Option<bool>,
    pub sum: Option<f64>,
    pub time: f64,
}

#[async_trait]
pub trait ReadingsReader: Send + Sync {
    async fn query(&self, query: ReadingsQuery) -> Result<Vec<SenmlRecord>, RulesError>;
}

// ── Ticker ────────────────────────────────────────────────────────────

/// Abstracts the scheduler's time source. `tick()` suspends until the
/// next tick and returns its timestamp; `stop()` is advisory and lets
/// implementations release OS timer resources (spec §6 "Ticker").
#[async_trait]
pub trait Ticker: Send + Sync {
    async fn tick(&self) -> DateTime<Utc>;
    fn stop(&self);
}

// ── ID provider ───────────────────────────────────────────────────────

pub trait IdProvider: Send + Sync {
    fn id(&self) -> Result<String, RulesError>;
}

/// Reference `IdProvider` backed by UUIDv4, used by the in-memory
/// repository and tests.
#[derive(Debug, Default)]
pub struct UuidIdProvider;

impl IdProvider for UuidIdProvider {
    fn id(&self) -> Result<String, RulesError> {
        Ok(Uuid::new_v4().to_string())
    }
}
