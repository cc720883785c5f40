//! Transport-wire [`Message`] and the engine's [`RunInfo`] observable
//! stream (spec §3, §6 "Observable surface").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Maximum payload size accepted at ingress (spec §3, §4.E): 100 KiB.
pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024;

/// A device telemetry message as it arrives at (or is synthesized for)
/// the engine. Not owned by the engine: references flow through worker
/// queues and are discarded after processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub domain: String,
    pub channel: String,
    pub subtopic: String,
    pub publisher: String,
    pub protocol: String,
    /// Nanoseconds since epoch.
    pub created: i64,
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a self-describing topic string `domain.c.channel.subtopic`
    /// (spec §6 "Topic format").
    pub fn topic(&self) -> String {
        crate::topic::compose_topic(&self.domain, &self.channel, &self.subtopic)
    }

    /// Synthesize a message for a scheduled rule firing (spec §4.F.2.b):
    /// empty payload, protocol `"re"`, `created` taken from the tick.
    pub fn synthetic(domain: &str, channel: &str, topic: &str, due: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_string(),
            channel: channel.to_string(),
            subtopic: topic.to_string(),
            publisher: "re-scheduler".to_string(),
            protocol: "re".to_string(),
            created: due.timestamp_nanos_opt().unwrap_or_else(|| due.timestamp() * 1_000_000_000),
            payload: Vec::new(),
        }
    }
}

/// Severity of a [`RunInfo`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLevel {
    Info,
    Warn,
    Error,
}

/// One observable record per processed event (spec §6 "RunInfo stream").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub level: RunLevel,
    pub text: String,
    /// Structured details: `domain_id`, `rule_id`, `rule_name`,
    /// `execution_time_ms`, and dispatcher-specific fields on error.
    pub details: Json,
}

impl RunInfo {
    pub fn new(level: RunLevel, text: impl Into<String>, details: Json) -> Self {
        Self {
            level,
            text: text.into(),
            details,
        }
    }

    pub fn info(text: impl Into<String>, details: Json) -> Self {
        Self::new(RunLevel::Info, text, details)
    }

    pub fn warn(text: impl Into<String>, details: Json) -> Self {
        Self::new(RunLevel::Warn, text, details)
    }

    pub fn error(text: impl Into<String>, details: Json) -> Self {
        Self::new(RunLevel::Error, text, details)
    }
}
