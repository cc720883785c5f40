//! The `Rule` aggregate and its nested types (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a rule. A `Deleted` rule never executes and never
/// appears in results returned to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Enabled,
    Disabled,
    Deleted,
}

impl RuleStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, RuleStatus::Enabled)
    }
}

/// Bookkeeping for the most recent execution of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    NeverRun,
    Queued,
    InProgress,
    Success,
    Failure,
    PartialSuccess,
    Aborted,
}

/// Which interpreter evaluates `Logic::source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicType {
    Lua,
    /// A minimal statically-typed comparison/composition language,
    /// standing in for spec's "Go-interpreted" flavor.
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logic {
    #[serde(rename = "type")]
    pub logic_type: LogicType,
    pub source: String,
}

/// A single dispatch target. Unknown `type` tags must fail rule load,
/// never be silently dropped (spec §9 "Output variant handling").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    ChannelPublish {
        channel: String,
        subtopic: String,
    },
    SenmlSave,
    Alarm,
    Email {
        recipients: Vec<String>,
        subject: String,
        content: String,
    },
    RemoteSql {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        table: String,
        /// JSON-template string that expands to a column->value mapping.
        mapping: String,
    },
}

/// How often a scheduled rule recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurring {
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Time-driven trigger for a rule (spec §3 "Schedule").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    /// Time-of-day, UTC, minute resolution. Only the hour/minute
    /// components are meaningful; seconds/nanoseconds are ignored.
    pub time_of_day: DateTime<Utc>,
    pub recurring: Recurring,
    /// Intervals between executions; 1 = every interval. Must be > 0
    /// when `recurring != None` — validated at rule creation, not here.
    pub recurring_period: u32,
    /// Derived next-due instant, UTC. `None` once a one-shot rule has
    /// fired, or before the schedule has ever been evaluated.
    pub next_due: Option<DateTime<Utc>>,
}

/// The full rule aggregate (spec §3 "Rule").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub domain_id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub input_channel: String,
    /// Dot-segmented subtopic pattern; empty matches any subtopic.
    #[serde(default)]
    pub input_topic: String,
    pub logic: Logic,
    pub outputs: Vec<Output>,
    pub schedule: Option<Schedule>,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    #[serde(default)]
    pub last_run_status: ExecutionStatus,
}

impl Rule {
    /// True when the rule is time-driven rather than message-driven.
    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_rule_is_not_enabled() {
        let status = RuleStatus::Deleted;
        assert!(!status.is_enabled());
    }

    #[test]
    fn execution_status_default_is_never_run() {
        assert_eq!(ExecutionStatus::default(), ExecutionStatus::NeverRun);
    }

    #[test]
    fn unknown_output_type_fails_to_deserialize() {
        let json = r#"{"type": "webhook", "url": "http://example.com"}"#;
        let result: Result<Output, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn channel_publish_output_roundtrips() {
        let out = Output::ChannelPublish {
            channel: "alerts".into(),
            subtopic: "temperature".into(),
        };
        let json = serde_json::to_string(&out).unwrap();
        let back: Output = serde_json::from_str(&json).unwrap();
        match back {
            Output::ChannelPublish { channel, subtopic } => {
                assert_eq!(channel, "alerts");
                assert_eq!(subtopic, "temperature");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
