//! Owned, `'static` capture of what the Lua helper bindings need from a
//! [`super::RunContext`], so the registered Lua closures never borrow
//! across the VM boundary (spec §9: helper calls cannot outlive the
//! worker task — here they simply own everything they touch).

use std::collections::HashMap;
use std::sync::Arc;

use re_core::ports::{Emailer, PubSub};
use uuid::Uuid;

use super::RunContext;

#[derive(Clone)]
pub struct HelperContext {
    pub rule_id: Uuid,
    pub domain: String,
    pub channel: String,
    pub subtopic: String,
    pub publisher: String,
    pub emailer: Arc<dyn Emailer>,
    pub pubsub: Arc<dyn PubSub>,
}

impl HelperContext {
    pub fn capture(ctx: &RunContext<'_>) -> Self {
        Self {
            rule_id: ctx.rule.id,
            domain: ctx.message.domain.clone(),
            channel: ctx.message.channel.clone(),
            subtopic: ctx.message.subtopic.clone(),
            publisher: ctx.message.publisher.clone(),
            emailer: ctx.emailer.clone(),
            pubsub: ctx.pubsub.clone(),
        }
    }

    /// `send_email(recipients, subject, content)`. Truthy on success.
    pub async fn send_email(&self, recipients: Vec<String>, subject: String, content: String) -> bool {
        self.emailer
            .send_email_notification(
                &recipients,
                "rules-engine@localhost",
                &subject,
                "",
                "",
                &content,
                "",
                &HashMap::new(),
            )
            .await
            .is_ok()
    }

    /// `send_alarm(record)`: the record is coerced into an Alarm and
    /// published on the alarms topic derived from the originating message.
    pub async fn send_alarm(&self, record: serde_json::Value) -> bool {
        let alarm = crate::dispatch::alarm::AlarmRecord {
            rule_id: self.rule_id,
            domain: self.domain.clone(),
            channel: self.channel.clone(),
            publisher: self.publisher.clone(),
            subtopic: self.subtopic.clone(),
            detail: record,
        };
        crate::dispatch::alarm::publish_alarm(&*self.pubsub, &alarm)
            .await
            .is_ok()
    }

    /// Topic an Alarm output would publish on for this message, reused by
    /// the `send_alarm` helper and the Output Dispatcher's Alarm variant.
    pub fn alarm_topic(&self) -> String {
        re_core::topic::compose_topic(&self.domain, &self.channel, &self.subtopic)
    }
}
