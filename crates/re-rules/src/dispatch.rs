//! Output Dispatcher (spec §4.B): fans a script result out to a rule's
//! configured outputs. Best-effort per output — one failure does not
//! prevent the remaining outputs from running; failures are aggregated
//! into a single [`re_core::error::ExecutionError::Dispatch`].

pub mod alarm;
pub mod senml;
pub mod sql;
pub mod templates;

use std::sync::Arc;

use re_core::error::ExecutionError;
use re_core::message::Message;
use re_core::ports::{Emailer, PubSub};
use re_core::rule::{Output, Rule};
use re_core::value::Value;
use re_notify::templating::TemplateRenderer;

pub struct OutputDispatcher {
    pubsub: Arc<dyn PubSub>,
    emailer: Arc<dyn Emailer>,
    renderer: TemplateRenderer,
}

impl OutputDispatcher {
    pub fn new(pubsub: Arc<dyn PubSub>, emailer: Arc<dyn Emailer>) -> Self {
        Self {
            pubsub,
            emailer,
            renderer: TemplateRenderer::new(),
        }
    }

    /// Dispatch `result` to every output on `rule`, in declaration order.
    pub async fn dispatch_all(
        &self,
        rule: &Rule,
        message: &Message,
        result: &Value,
    ) -> Result<(), ExecutionError> {
        let total = rule.outputs.len();
        let mut failures = Vec::new();

        for (index, output) in rule.outputs.iter().enumerate() {
            if let Err(detail) = self.dispatch_one(rule, message, result, output).await {
                failures.push(format!("output[{index}] ({}): {detail}", output_kind(output)));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExecutionError::Dispatch {
                failed: failures.len(),
                total,
                detail: failures.join("; "),
            })
        }
    }

    async fn dispatch_one(
        &self,
        rule: &Rule,
        message: &Message,
        result: &Value,
        output: &Output,
    ) -> Result<(), String> {
        match output {
            Output::ChannelPublish { channel, subtopic } => {
                let topic = re_core::topic::compose_topic(&message.domain, channel, subtopic);
                let payload = serde_json::to_vec(&result.to_json())
                    .map_err(|e| format!("channel publish encode failed: {e}"))?;
                let out_message = Message {
                    domain: message.domain.clone(),
                    channel: channel.clone(),
                    subtopic: subtopic.clone(),
                    publisher: message.publisher.clone(),
                    protocol: message.protocol.clone(),
                    created: message.created,
                    payload,
                };
                self.pubsub
                    .publish(&topic, out_message)
                    .await
                    .map_err(|e| e.to_string())
            }
            Output::SenmlSave => {
                let payload = senml::validate_and_encode(result)?;
                let topic = re_core::topic::compose_topic(&message.domain, "writers", "");
                let out_message = Message {
                    domain: message.domain.clone(),
                    channel: "writers".to_string(),
                    subtopic: String::new(),
                    publisher: message.publisher.clone(),
                    protocol: message.protocol.clone(),
                    created: message.created,
                    payload,
                };
                self.pubsub
                    .publish(&topic, out_message)
                    .await
                    .map_err(|e| e.to_string())
            }
            Output::Alarm => {
                let record = alarm::AlarmRecord {
                    rule_id: rule.id,
                    domain: message.domain.clone(),
                    channel: message.channel.clone(),
                    publisher: message.publisher.clone(),
                    subtopic: message.subtopic.clone(),
                    detail: result.to_json(),
                };
                alarm::publish_alarm(&*self.pubsub, &record)
                    .await
                    .map_err(|e| e.to_string())
            }
            Output::Email {
                recipients,
                subject,
                content,
            } => {
                let ctx = templates::build_context(rule, message, result);
                let subject_rendered = self.renderer.render(subject, &ctx).map_err(|e| e.to_string())?;
                let content_rendered = self.renderer.render(content, &ctx).map_err(|e| e.to_string())?;
                self.emailer
                    .send_email_notification(
                        recipients,
                        "rules-engine@localhost",
                        &subject_rendered,
                        "",
                        "",
                        &content_rendered,
                        "",
                        &Default::default(),
                    )
                    .await
                    .map_err(|e| e.to_string())
            }
            Output::RemoteSql { mapping, .. } => {
                let ctx = templates::build_context(rule, message, result);
                let expanded = self
                    .renderer
                    .render_mapping(mapping, &ctx)
                    .map_err(|e| e.to_string())?;
                sql::dispatch(output, &expanded).await
            }
        }
    }
}

fn output_kind(output: &Output) -> &'static str {
    match output {
        Output::ChannelPublish { .. } => "channel_publish",
        Output::SenmlSave => "senml_save",
        Output::Alarm => "alarm",
        Output::Email { .. } => "email",
        Output::RemoteSql { .. } => "remote_sql",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingPubSub {
        published: Mutex<Vec<(String, Message)>>,
    }

    #[async_trait::async_trait]
    impl PubSub for RecordingPubSub {
        async fn publish(&self, topic: &str, message: Message) -> Result<(), re_core::error::RulesError> {
            self.published.lock().unwrap().push((topic.to_string(), message));
            Ok(())
        }
        async fn subscribe(
            &self,
            _topic: &str,
            _handler: re_core::ports::MessageHandler,
        ) -> Result<(), re_core::error::RulesError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), re_core::error::RulesError> {
            Ok(())
        }
    }

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
        ) -> Result<(), re_core::error::RulesError> {
            Ok(())
        }
    }

    fn sample_rule(outputs: Vec<Output>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "High Temperature".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "temperature".into(),
            logic: re_core::rule::Logic {
                logic_type: re_core::rule::LogicType::Lua,
                source: String::new(),
            },
            outputs,
            schedule: None,
            status: re_core::rule::RuleStatus::Enabled,
            created_at: Utc::now(),
            created_by: "u1".into(),
            updated_at: Utc::now(),
            updated_by: "u1".into(),
            last_run_status: Default::default(),
        }
    }

    fn sample_message() -> Message {
        Message {
            domain: "d1".into(),
            channel: "sensors".into(),
            subtopic: "temperature".into(),
            publisher: "dev1".into(),
            protocol: "mqtt".into(),
            created: 0,
            payload: vec![],
        }
    }

    #[tokio::test]
    async fn channel_publish_uses_composed_topic_and_json_body() {
        let pubsub = Arc::new(RecordingPubSub {
            published: Mutex::new(Vec::new()),
        });
        let dispatcher = OutputDispatcher::new(pubsub.clone(), Arc::new(NoopEmailer));
        let rule = sample_rule(vec![Output::ChannelPublish {
            channel: "alerts".into(),
            subtopic: "temperature".into(),
        }]);
        let message = sample_message();
        let result = Value::from_json(&serde_json::json!({"level": "high"}));

        dispatcher
            .dispatch_all(&rule, &message, &result)
            .await
            .unwrap();

        let published = pubsub.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "d1.c.alerts.temperature");
        let body: serde_json::Value = serde_json::from_slice(&published[0].1.payload).unwrap();
        assert_eq!(body, serde_json::json!({"level": "high"}));
    }

    #[tokio::test]
    async fn one_failing_output_does_not_prevent_the_others() {
        let pubsub = Arc::new(RecordingPubSub {
            published: Mutex::new(Vec::new()),
        });
        let dispatcher = OutputDispatcher::new(pubsub.clone(), Arc::new(NoopEmailer));
        let rule = sample_rule(vec![
            Output::SenmlSave,
            Output::ChannelPublish {
                channel: "alerts".into(),
                subtopic: "temperature".into(),
            },
        ]);
        let message = sample_message();
        // An empty mapping makes SenmlSave fail (no record to validate),
        // the ChannelPublish after it must still run.
        let result = Value::List(vec![]);

        let outcome = dispatcher.dispatch_all(&rule, &message, &result).await;
        assert!(outcome.is_err());
        assert_eq!(pubsub.published.lock().unwrap().len(), 1);
    }
}
