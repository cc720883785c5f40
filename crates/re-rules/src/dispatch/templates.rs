//! Builds a [`re_notify::templating::TemplateContext`] from a rule,
//! message, and script result for the Email and RemoteSQL dispatchers.

use re_core::message::Message;
use re_core::rule::Rule;
use re_core::value::Value;
use re_notify::templating::{MessageContext, RuleContext, TemplateContext};

pub fn build_context(rule: &Rule, message: &Message, result: &Value) -> TemplateContext {
    TemplateContext::new(
        RuleContext {
            id: rule.id.to_string(),
            name: rule.name.clone(),
            domain_id: rule.domain_id.clone(),
            tags: rule.tags.clone(),
        },
        MessageContext {
            domain: message.domain.clone(),
            channel: message.channel.clone(),
            subtopic: message.subtopic.clone(),
            publisher: message.publisher.clone(),
            protocol: message.protocol.clone(),
            created: message.created,
            result: result.to_json(),
            now: chrono::Utc::now().to_rfc3339(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn build_context_exposes_rule_and_result() {
        let rule = Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "High Temp".into(),
            tags: vec!["hvac".into()],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "temperature".into(),
            logic: re_core::rule::Logic {
                logic_type: re_core::rule::LogicType::Lua,
                source: "return true".into(),
            },
            outputs: vec![],
            schedule: None,
            status: re_core::rule::RuleStatus::Enabled,
            created_at: Utc::now(),
            created_by: "u1".into(),
            updated_at: Utc::now(),
            updated_by: "u1".into(),
            last_run_status: Default::default(),
        };
        let message = Message {
            domain: "d1".into(),
            channel: "sensors".into(),
            subtopic: "temperature".into(),
            publisher: "dev1".into(),
            protocol: "mqtt".into(),
            created: 0,
            payload: vec![],
        };
        let result = Value::Number(32.0);

        let ctx = build_context(&rule, &message, &result);
        assert_eq!(ctx.rule.name, "High Temp");
        assert_eq!(ctx.message.result, serde_json::json!(32.0));
    }
}
