//! Topic constants for transport-internal PUB/SUB routing.
//!
//! Device telemetry topics are composed dynamically by
//! [`re_core::topic::compose_topic`] — `domain.c.channel.subtopic`. These
//! constants are for the engine's own control-plane events.

/// Fired when a rule is created, updated, scheduled, or deleted.
pub const RULE_CHANGED: &str = "re.rule.changed";

/// Periodic rule-worker health heartbeat.
pub const WORKER_HEALTH: &str = "re.worker.health";

/// Fired when an alarm output is dispatched.
pub const ALARM_RAISED: &str = "re.alarm.raised";
