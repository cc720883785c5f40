//! Control-plane event payloads carried by [`crate::Message`] envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker liveness as reported in a health ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Emitted periodically by a running rule worker or the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub cpu_pct: f64,
    pub mem_bytes: u64,
}

/// Emitted when a rule's definition, schedule, or status changes, so that
/// a running worker manager can re-sync its in-memory registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChanged {
    pub rule_id: Uuid,
    pub domain_id: String,
    pub reason: RuleChangeReason,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChangeReason {
    Added,
    Updated,
    StatusChanged,
    ScheduleChanged,
    Removed,
}
