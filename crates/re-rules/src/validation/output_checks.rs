//! Required-field and template-syntax checks for a rule's outputs
//! (spec §4.B–§4.D).

use re_core::rule::{Output, Rule};
use re_notify::templating::TemplateRenderer;

use super::ValidationResult;

pub(super) fn validate(rule: &Rule, result: &mut ValidationResult) {
    if rule.name.trim().is_empty() {
        result.error("name", "rule name must not be empty");
    }
    if rule.input_channel.trim().is_empty() {
        result.error("input_channel", "input_channel must not be empty");
    }
    if rule.outputs.is_empty() {
        result.error("outputs", "a rule must configure at least one output");
        return;
    }

    let renderer = TemplateRenderer::new();
    for (i, output) in rule.outputs.iter().enumerate() {
        let path = format!("outputs[{i}]");
        match output {
            Output::ChannelPublish { channel, .. } => {
                if channel.trim().is_empty() {
                    result.error(format!("{path}.channel"), "channel must not be empty");
                }
            }
            Output::SenmlSave | Output::Alarm => {}
            Output::Email { recipients, subject, content } => {
                if recipients.is_empty() {
                    result.error(format!("{path}.recipients"), "email output requires at least one recipient");
                }
                for (j, to) in recipients.iter().enumerate() {
                    if !to.contains('@') {
                        result.error(format!("{path}.recipients[{j}]"), format!("'{to}' is not a valid email address"));
                    }
                }
                if let Err(e) = renderer.validate(subject) {
                    result.error(format!("{path}.subject"), format!("malformed template: {e}"));
                }
                if let Err(e) = renderer.validate(content) {
                    result.error(format!("{path}.content"), format!("malformed template: {e}"));
                }
            }
            Output::RemoteSql { host, port, database, table, mapping, .. } => {
                if host.trim().is_empty() {
                    result.error(format!("{path}.host"), "host must not be empty");
                }
                if *port == 0 {
                    result.error(format!("{path}.port"), "port must not be 0");
                }
                if database.trim().is_empty() {
                    result.error(format!("{path}.database"), "database must not be empty");
                }
                if table.trim().is_empty() {
                    result.error(format!("{path}.table"), "table must not be empty");
                }
                if let Err(e) = renderer.validate(mapping) {
                    result.error(format!("{path}.mapping"), format!("malformed template: {e}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_rule;
    use re_core::rule::{Logic, LogicType, RuleStatus};
    use uuid::Uuid;

    fn rule_with(outputs: Vec<Output>) -> Rule {
        let now = chrono::Utc::now();
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "r".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "".into(),
            logic: Logic { logic_type: LogicType::Lua, source: "return true".into() },
            outputs,
            schedule: None,
            status: RuleStatus::Enabled,
            created_at: now,
            created_by: "u".into(),
            updated_at: now,
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    #[test]
    fn email_without_recipients_is_rejected() {
        let rule = rule_with(vec![Output::Email {
            recipients: vec![],
            subject: "alert".into(),
            content: "{{ rule.name }}".into(),
        }]);
        assert!(!validate_rule(&rule).valid);
    }

    #[test]
    fn email_with_malformed_address_is_rejected() {
        let rule = rule_with(vec![Output::Email {
            recipients: vec!["not-an-address".into()],
            subject: "alert".into(),
            content: "body".into(),
        }]);
        assert!(!validate_rule(&rule).valid);
    }

    #[test]
    fn email_with_malformed_template_is_rejected() {
        let rule = rule_with(vec![Output::Email {
            recipients: vec!["ops@example.com".into()],
            subject: "{{ unclosed".into(),
            content: "body".into(),
        }]);
        assert!(!validate_rule(&rule).valid);
    }

    #[test]
    fn remote_sql_requires_host_and_port() {
        let rule = rule_with(vec![Output::RemoteSql {
            host: "".into(),
            port: 0,
            user: "u".into(),
            password: "p".into(),
            database: "db".into(),
            table: "tbl".into(),
            mapping: "{}".into(),
        }]);
        let result = validate_rule(&rule);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path.contains("host")));
        assert!(result.errors.iter().any(|e| e.path.contains("port")));
    }

    #[test]
    fn remote_sql_with_well_formed_mapping_passes() {
        let rule = rule_with(vec![Output::RemoteSql {
            host: "db.internal".into(),
            port: 5432,
            user: "u".into(),
            password: "p".into(),
            database: "telemetry".into(),
            table: "readings".into(),
            mapping: r#"{"value": {{ message.result.value }}}"#.into(),
        }]);
        assert!(validate_rule(&rule).valid);
    }
}
