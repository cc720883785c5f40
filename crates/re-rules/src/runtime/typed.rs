//! Native comparison language: a minimal typed alternative to Lua for
//! rules that only need to compare fields of the inbound message
//! against constants. No helper bindings are exposed here — callers
//! that need AES, email, or alarm helpers use [`super::lua::LuaRuntime`].
//!
//! The composition tree (AND/OR/NOT over leaf comparisons) is the same
//! shape the teacher uses to combine boolean signal checks; a leaf here
//! compares a dotted field path against a constant instead of a signal
//! score against a threshold.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;

use re_core::message::RunInfo;
use re_core::value::Value;

use super::{RunContext, ScriptRuntime};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Compare {
        field: String,
        operator: CompareOperator,
        value: Json,
    },
    Nested(Composition),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Composition {
    pub operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptRuntime for NativeRuntime {
    async fn run(&self, ctx: &RunContext<'_>) -> (Value, RunInfo) {
        let domain_id = ctx.rule.domain_id.clone();
        let rule_id = ctx.rule.id;
        let rule_name = ctx.rule.name.clone();
        let details = serde_json::json!({
            "domain_id": domain_id,
            "rule_id": rule_id,
            "rule_name": rule_name,
        });

        let composition: Composition = match serde_json::from_str(&ctx.rule.logic.source) {
            Ok(c) => c,
            Err(e) => {
                let mut details = details;
                details["error"] = serde_json::Value::String(e.to_string());
                return (
                    Value::Nil,
                    RunInfo::error(format!("native logic is not a valid composition: {e}"), details),
                );
            }
        };

        let projected = super::project_message(ctx.message);
        let matched = evaluate_node(&composition, &projected);
        let value = Value::Bool(matched);
        if matched {
            (value, RunInfo::info("composition matched", details))
        } else {
            (value, RunInfo::info("composition did not match", details))
        }
    }
}

fn evaluate_node(composition: &Composition, message: &Json) -> bool {
    match composition.operator {
        LogicalOperator::And => composition.conditions.iter().all(|c| evaluate_condition(c, message)),
        LogicalOperator::Or => composition.conditions.iter().any(|c| evaluate_condition(c, message)),
        LogicalOperator::Not => composition
            .conditions
            .first()
            .map(|c| !evaluate_condition(c, message))
            .unwrap_or(true),
    }
}

fn evaluate_condition(condition: &Condition, message: &Json) -> bool {
    match condition {
        Condition::Compare { field, operator, value } => {
            resolve_field(message, field)
                .map(|actual| compare(&actual, operator, value))
                .unwrap_or(false)
        }
        Condition::Nested(inner) => evaluate_node(inner, message),
    }
}

fn resolve_field<'a>(message: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(message, |node, segment| node.get(segment))
}

fn compare(actual: &Json, operator: &CompareOperator, expected: &Json) -> bool {
    match operator {
        CompareOperator::Eq => actual == expected,
        CompareOperator::Ne => actual != expected,
        CompareOperator::Gt | CompareOperator::Gte | CompareOperator::Lt | CompareOperator::Lte => {
            match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => match operator {
                    CompareOperator::Gt => a > b,
                    CompareOperator::Gte => a >= b,
                    CompareOperator::Lt => a < b,
                    CompareOperator::Lte => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use re_core::error::RulesError;
    use re_core::message::Message;
    use re_core::ports::{Emailer, MessageHandler, PubSub};
    use re_core::rule::{Logic, LogicType, Rule, RuleStatus};
    use std::collections::HashMap;

    struct NoopEmailer;
    #[async_trait::async_trait]
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
    #[async_trait::async_trait]
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

    fn rule(source: &str) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "native".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "temperature".into(),
            logic: Logic { logic_type: LogicType::Native, source: source.to_string() },
            outputs: vec![],
            schedule: None,
            status: RuleStatus::Enabled,
            created_at: Utc::now(),
            created_by: "u".into(),
            updated_at: Utc::now(),
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    fn message(payload: serde_json::Value) -> Message {
        Message {
            domain: "d1".into(),
            channel: "sensors".into(),
            subtopic: "temperature".into(),
            publisher: "dev1".into(),
            protocol: "mqtt".into(),
            created: 0,
            payload: serde_json::to_vec(&payload).unwrap(),
        }
    }

    async fn run(source: &str, payload: serde_json::Value) -> (Value, RunInfo) {
        let rule = rule(source);
        let message = message(payload);
        let pubsub: Arc<dyn PubSub> = Arc::new(NoopPubSub);
        let emailer: Arc<dyn Emailer> = Arc::new(NoopEmailer);
        let ctx = RunContext { rule: &rule, message: &message, emailer: &emailer, pubsub: &pubsub };
        NativeRuntime::new().run(&ctx).await
    }

    #[tokio::test]
    async fn and_composition_matches_when_all_conditions_pass() {
        let source = serde_json::json!({
            "operator": "and",
            "conditions": [
                {"field": "payload.t", "operator": "gt", "value": 30},
                {"field": "payload.unit", "operator": "eq", "value": "C"},
            ],
        })
        .to_string();
        let (value, _) = run(&source, serde_json::json!({"t": 32, "unit": "C"})).await;
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn or_with_nested_not_composition() {
        let source = serde_json::json!({
            "operator": "or",
            "conditions": [
                {"field": "payload.t", "operator": "gt", "value": 100},
                {
                    "operator": "not",
                    "conditions": [
                        {"field": "payload.ok", "operator": "eq", "value": true}
                    ]
                },
            ],
        })
        .to_string();
        let (value, _) = run(&source, serde_json::json!({"t": 10, "ok": false})).await;
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn missing_field_is_treated_as_non_matching() {
        let source = serde_json::json!({
            "operator": "and",
            "conditions": [{"field": "payload.missing", "operator": "gt", "value": 1}],
        })
        .to_string();
        let (value, _) = run(&source, serde_json::json!({"t": 32})).await;
        assert_eq!(value, Value::Bool(false));
    }

    #[tokio::test]
    async fn invalid_source_produces_error_runinfo() {
        let (value, info) = run("not json", serde_json::json!({})).await;
        assert!(value.is_nil());
        assert_eq!(info.level, re_core::message::RunLevel::Error);
    }
}
