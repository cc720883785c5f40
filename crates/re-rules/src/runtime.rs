//! Sandboxed script execution behind a single [`ScriptRuntime`] contract.
//!
//! Two interchangeable flavors, selected by `rule.logic.logic_type`:
//! [`lua::LuaRuntime`] (dynamic, default) and [`typed::NativeRuntime`]
//! (a minimal typed comparison language). Both produce a [`re_core::value::Value`]
//! and never panic outward: any failure becomes a `RunInfo{Error}`.

pub mod aes;
pub mod helpers;
pub mod lua;
pub mod typed;

use async_trait::async_trait;
use serde_json::Value as Json;

use re_core::message::{Message, RunInfo};
use re_core::ports::Emailer;
use re_core::rule::Rule;
use re_core::value::Value;

use std::sync::Arc;

/// Everything a runtime invocation needs beyond the rule and message: the
/// collaborators behind the Lua `send_email`/`send_alarm` helper bindings.
/// Passed by reference so a runtime never outlives the call that created it
/// (spec §9: "helper-function calls cannot outlive the worker task").
pub struct RunContext<'a> {
    pub rule: &'a Rule,
    pub message: &'a Message,
    pub emailer: &'a Arc<dyn Emailer>,
    pub pubsub: &'a Arc<dyn re_core::ports::PubSub>,
}

/// One execution of a rule's `logic.source` against a message projection.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Evaluate the script and return its result value plus the RunInfo
    /// record describing the outcome. Never returns an `Err` outward —
    /// script failures are folded into `RunInfo{Error}` with
    /// `Value::Nil` as the paired result.
    async fn run(&self, ctx: &RunContext<'_>) -> (Value, RunInfo);
}

/// Project a [`Message`] into the field set scripts see: domain/channel/
/// subtopic/publisher/protocol/created as scalars, payload as a parsed
/// JSON tree (or a 1-indexed byte sequence when it isn't JSON) (spec §4.A
/// "Message projection").
pub fn project_message(message: &Message) -> Json {
    let payload = match serde_json::from_slice::<Json>(&message.payload) {
        Ok(json) => json,
        Err(_) => Json::Array(
            message
                .payload
                .iter()
                .map(|b| Json::Number((*b).into()))
                .collect(),
        ),
    };

    serde_json::json!({
        "domain": message.domain,
        "channel": message.channel,
        "subtopic": message.subtopic,
        "publisher": message.publisher,
        "protocol": message.protocol,
        "created": message.created,
        "payload": payload,
    })
}
