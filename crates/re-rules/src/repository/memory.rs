//! In-memory reference [`RuleRepository`]. Deterministic ordering — by
//! `created_at` then `id` — is a contract requirement (spec §6), not an
//! implementation detail: it is what makes pagination and tests stable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use re_core::error::RulesError;
use re_core::ports::{Page, RuleFilter, RuleRepository};
use re_core::rule::{Rule, RuleStatus, Schedule};
use re_core::session::Session;

use crate::scheduler::nextdue;

#[derive(Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<HashMap<Uuid, Rule>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a rule outside the `RuleRepository` contract.
    /// Used by [`super::file::FileRuleRepository`] to seed from disk and
    /// from its synchronous filesystem-watcher callback, so this blocks
    /// the calling thread rather than awaiting.
    pub fn seed(&self, rule: Rule) {
        self.rules.blocking_write().insert(rule.id, rule);
    }

    pub fn drop_rule(&self, id: Uuid) {
        self.rules.blocking_write().remove(&id);
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn add_rule(&self, _session: &Session, mut rule: Rule) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(RulesError::validation(format!("rule {} already exists", rule.id)));
        }
        rule.created_at = Utc::now();
        rule.updated_at = rule.created_at;
        if let Some(schedule) = rule.schedule.as_mut() {
            schedule.next_due = nextdue::initial_due(schedule);
        }
        rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn view_rule(&self, _session: &Session, id: Uuid) -> Result<Rule, RulesError> {
        self.rules
            .read()
            .await
            .get(&id)
            .filter(|r| r.status != RuleStatus::Deleted)
            .cloned()
            .ok_or_else(|| RulesError::not_found(format!("rule {id}")))
    }

    async fn update_rule(&self, _session: &Session, mut rule: Rule) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        if !rules.contains_key(&rule.id) {
            return Err(RulesError::not_found(format!("rule {}", rule.id)));
        }
        rule.updated_at = Utc::now();
        rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_rule_tags(&self, _session: &Session, id: Uuid, tags: Vec<String>) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        let rule = rules.get_mut(&id).ok_or_else(|| RulesError::not_found(format!("rule {id}")))?;
        rule.tags = tags;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn update_rule_schedule(
        &self,
        _session: &Session,
        id: Uuid,
        mut schedule: Option<Schedule>,
    ) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        let rule = rules.get_mut(&id).ok_or_else(|| RulesError::not_found(format!("rule {id}")))?;
        if let Some(schedule) = schedule.as_mut() {
            schedule.next_due = nextdue::initial_due(schedule);
        }
        rule.schedule = schedule;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn update_rule_status(&self, _session: &Session, id: Uuid, status: RuleStatus) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        let rule = rules.get_mut(&id).ok_or_else(|| RulesError::not_found(format!("rule {id}")))?;
        rule.status = status;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn remove_rule(&self, _session: &Session, id: Uuid) -> Result<(), RulesError> {
        let mut rules = self.rules.write().await;
        let rule = rules.get_mut(&id).ok_or_else(|| RulesError::not_found(format!("rule {id}")))?;
        rule.status = RuleStatus::Deleted;
        rule.updated_at = Utc::now();
        Ok(())
    }

    async fn update_rule_due(&self, id: Uuid, due: DateTime<Utc>) -> Result<Rule, RulesError> {
        let mut rules = self.rules.write().await;
        let rule = rules.get_mut(&id).ok_or_else(|| RulesError::not_found(format!("rule {id}")))?;
        if let Some(schedule) = rule.schedule.as_mut() {
            schedule.next_due = Some(due);
        }
        Ok(rule.clone())
    }

    async fn list_rules(&self, _session: &Session, filter: RuleFilter) -> Result<Page<Rule>, RulesError> {
        let rules = self.rules.read().await;
        let mut items: Vec<Rule> = rules
            .values()
            .filter(|r| r.status != RuleStatus::Deleted)
            .filter(|r| filter.domain_id.as_deref().map_or(true, |d| d == r.domain_id))
            .filter(|r| filter.input_channel.as_deref().map_or(true, |c| c == r.input_channel))
            .filter(|r| filter.status.map_or(true, |s| s == r.status))
            .filter(|r| filter.scheduled.map_or(true, |want| want == r.is_scheduled()))
            .filter(|r| {
                filter.scheduled_before.map_or(true, |before| {
                    r.schedule.as_ref().and_then(|s| s.next_due).is_some_and(|d| d <= before)
                })
            })
            .filter(|r| {
                filter.scheduled_after.map_or(true, |after| {
                    r.schedule.as_ref().and_then(|s| s.next_due).is_some_and(|d| d >= after)
                })
            })
            .filter(|r| filter.name.as_deref().map_or(true, |n| n == r.name))
            .filter(|r| filter.tag.as_deref().map_or(true, |t| r.tags.iter().any(|tag| tag == t)))
            .cloned()
            .collect();

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let total = items.len() as u64;

        let offset = filter.offset as usize;
        let limit = if filter.limit == 0 { items.len() } else { filter.limit as usize };
        let page = items.into_iter().skip(offset).take(limit).collect();

        Ok(Page {
            items: page,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }
}
