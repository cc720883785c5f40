//! Alarm output: marshal a value into an `AlarmRecord`, encode it with a
//! self-describing binary encoding (MessagePack, matching the transport
//! layer's envelope convention), and publish on the alarms topic (spec
//! §4.B.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use re_core::error::RulesError;
use re_core::message::Message;
use re_core::ports::PubSub;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub rule_id: Uuid,
    pub domain: String,
    pub channel: String,
    pub publisher: String,
    pub subtopic: String,
    pub detail: serde_json::Value,
}

/// Publish an [`AlarmRecord`] on `domain.c.channel.subtopic`, derived from
/// the record's own fields (spec §4.B.3: "topic derived from the
/// originating message").
pub async fn publish_alarm(pubsub: &dyn PubSub, record: &AlarmRecord) -> Result<(), RulesError> {
    let topic = re_core::topic::compose_topic(&record.domain, &record.channel, &record.subtopic);
    let payload = rmp_serde::to_vec_named(record)
        .map_err(|e| RulesError::Other(format!("alarm encode failed: {e}")))?;

    let message = Message {
        domain: record.domain.clone(),
        channel: record.channel.clone(),
        subtopic: record.subtopic.clone(),
        publisher: record.publisher.clone(),
        protocol: "re-alarm".to_string(),
        created: now_nanos(),
        payload,
    };

    pubsub.publish(&topic, message).await
}

fn now_nanos() -> i64 {
    let now: DateTime<Utc> = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp() * 1_000_000_000)
}
