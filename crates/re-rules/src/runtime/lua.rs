//! `mlua`-backed [`ScriptRuntime`]: a fresh sandboxed VM per invocation.
//!
//! The VM dies with the invocation — no Lua state survives across
//! messages, which is what makes the "helper calls cannot outlive the
//! worker task" invariant trivially true here. `os`/`io`/`package`/
//! `require`/`load`/`loadstring`/`dofile` are stripped from the global
//! table before the user's source runs.

use async_trait::async_trait;
use mlua::{Lua, Value as LuaValue};

use re_core::message::RunInfo;
use re_core::value::Value;

use super::helpers::HelperContext;
use super::{RunContext, ScriptRuntime};

#[derive(Debug, Default)]
pub struct LuaRuntime;

impl LuaRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptRuntime for LuaRuntime {
    async fn run(&self, ctx: &RunContext<'_>) -> (Value, RunInfo) {
        let domain_id = ctx.rule.domain_id.clone();
        let rule_id = ctx.rule.id;
        let rule_name = ctx.rule.name.clone();
        let source = ctx.rule.logic.source.clone();
        let projected = super::project_message(ctx.message);
        let helpers = HelperContext::capture(ctx);

        let base_details = serde_json::json!({
            "domain_id": domain_id,
            "rule_id": rule_id,
            "rule_name": rule_name,
        });

        match execute(source, projected, helpers).await {
            Ok(value) if value.is_nil() => {
                (value, RunInfo::warn("nil script result", base_details))
            }
            Ok(value) if value.is_strict_false() => {
                (value, RunInfo::info("logic returned false", base_details))
            }
            Ok(value) => (value, RunInfo::info("script executed", base_details)),
            Err(e) => {
                let mut details = base_details;
                details["error"] = serde_json::Value::String(e.clone());
                (Value::Nil, RunInfo::error(format!("script error: {e}"), details))
            }
        }
    }
}

async fn execute(
    source: String,
    message: serde_json::Value,
    helpers: HelperContext,
) -> Result<Value, String> {
    let lua = Lua::new();
    sandbox(&lua).map_err(|e| e.to_string())?;

    let globals = lua.globals();
    let message_table = json_to_lua(&lua, &message).map_err(|e| e.to_string())?;
    globals.set("message", message_table).map_err(|e| e.to_string())?;
    register_helpers(&lua, helpers).map_err(|e| e.to_string())?;

    let value: LuaValue = lua
        .load(&source)
        .eval_async()
        .await
        .map_err(|e| e.to_string())?;

    let json = lua_to_json(&value).map_err(|e| e.to_string())?;
    Ok(Value::from_json(&json))
}

/// Strip filesystem/process/module-loading capability from the globals
/// table before the user's script runs.
fn sandbox(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in ["os", "io", "package", "require", "load", "loadstring", "dofile"] {
        globals.set(name, mlua::Nil)?;
    }
    Ok(())
}

fn register_helpers(lua: &Lua, helpers: HelperContext) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "aes_encrypt",
        lua.create_function(|lua, (key, iv, data): (String, String, String)| {
            match super::aes::aes_encrypt(&key, &iv, &data) {
                Ok(hex) => Ok((Some(hex), mlua::Value::Nil)),
                Err(reason) => Ok((None, mlua::Value::String(lua.create_string(&reason)?))),
            }
        })?,
    )?;

    globals.set(
        "aes_decrypt",
        lua.create_function(|lua, (key, iv, data): (String, String, String)| {
            match super::aes::aes_decrypt(&key, &iv, &data) {
                Ok(hex) => Ok((Some(hex), mlua::Value::Nil)),
                Err(reason) => Ok((None, mlua::Value::String(lua.create_string(&reason)?))),
            }
        })?,
    )?;

    let email_helpers = helpers.clone();
    globals.set(
        "send_email",
        lua.create_async_function(
            move |_, (recipients, subject, content): (Vec<String>, String, String)| {
                let helpers = email_helpers.clone();
                async move { Ok(helpers.send_email(recipients, subject, content).await) }
            },
        )?,
    )?;

    let alarm_helpers = helpers.clone();
    globals.set(
        "send_alarm",
        lua.create_async_function(move |_, record: LuaValue| {
            let helpers = alarm_helpers.clone();
            let json = lua_to_json(&record);
            async move {
                match json {
                    Ok(json) => Ok(helpers.send_alarm(json).await),
                    Err(_) => Ok(false),
                }
            }
        })?,
    )?;

    Ok(())
}

fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        serde_json::Value::Null => LuaValue::Nil,
        serde_json::Value::Bool(b) => LuaValue::Boolean(*b),
        serde_json::Value::Number(n) => LuaValue::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => LuaValue::String(lua.create_string(s)?),
        serde_json::Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

fn lua_to_json(value: &LuaValue) -> mlua::Result<serde_json::Value> {
    Ok(match value {
        LuaValue::Nil => serde_json::Value::Null,
        LuaValue::Boolean(b) => serde_json::Value::Bool(*b),
        LuaValue::Integer(i) => serde_json::json!(*i),
        LuaValue::Number(n) => serde_json::json!(*n),
        LuaValue::String(s) => serde_json::Value::String(s.to_str()?.to_string()),
        LuaValue::Table(table) => {
            let array_len = table.raw_len();
            if array_len > 0 {
                let mut items = Vec::with_capacity(array_len);
                for i in 1..=array_len {
                    let item: LuaValue = table.get(i)?;
                    items.push(lua_to_json(&item)?);
                }
                serde_json::Value::Array(items)
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.clone().pairs::<String, LuaValue>() {
                    let (key, item) = pair?;
                    map.insert(key, lua_to_json(&item)?);
                }
                serde_json::Value::Object(map)
            }
        }
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "unsupported lua value in result: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use re_core::error::RulesError;
    use re_core::message::Message;
    use re_core::ports::{Emailer, MessageHandler, PubSub};
    use re_core::rule::{Logic, LogicType, Rule, RuleStatus};
    use chrono::Utc;
    use uuid::Uuid;

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
            name: "test".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "temperature".into(),
            logic: Logic {
                logic_type: LogicType::Lua,
                source: source.to_string(),
            },
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

    fn message_with_payload(json: serde_json::Value) -> Message {
        Message {
            domain: "d1".into(),
            channel: "sensors".into(),
            subtopic: "temperature".into(),
            publisher: "dev1".into(),
            protocol: "mqtt".into(),
            created: 0,
            payload: serde_json::to_vec(&json).unwrap(),
        }
    }

    #[tokio::test]
    async fn high_temperature_rule_returns_expected_result() {
        let rule = rule("if message.payload.t > 30 then return {level='high'} end");
        let message = message_with_payload(serde_json::json!({"t": 32}));
        let pubsub: Arc<dyn PubSub> = Arc::new(NoopPubSub);
        let emailer: Arc<dyn Emailer> = Arc::new(NoopEmailer);
        let ctx = RunContext {
            rule: &rule,
            message: &message,
            emailer: &emailer,
            pubsub: &pubsub,
        };

        let (value, info) = LuaRuntime::new().run(&ctx).await;
        assert_eq!(value.to_json(), serde_json::json!({"level": "high"}));
        assert_eq!(info.level, re_core::message::RunLevel::Info);
    }

    #[tokio::test]
    async fn nil_result_produces_warn_runinfo() {
        let rule = rule("if false then return 1 end");
        let message = message_with_payload(serde_json::json!({}));
        let pubsub: Arc<dyn PubSub> = Arc::new(NoopPubSub);
        let emailer: Arc<dyn Emailer> = Arc::new(NoopEmailer);
        let ctx = RunContext {
            rule: &rule,
            message: &message,
            emailer: &emailer,
            pubsub: &pubsub,
        };

        let (value, info) = LuaRuntime::new().run(&ctx).await;
        assert!(value.is_nil());
        assert_eq!(info.level, re_core::message::RunLevel::Warn);
    }

    #[tokio::test]
    async fn sandboxed_globals_are_unavailable() {
        let rule = rule("return os == nil and io == nil and require == nil");
        let message = message_with_payload(serde_json::json!({}));
        let pubsub: Arc<dyn PubSub> = Arc::new(NoopPubSub);
        let emailer: Arc<dyn Emailer> = Arc::new(NoopEmailer);
        let ctx = RunContext {
            rule: &rule,
            message: &message,
            emailer: &emailer,
            pubsub: &pubsub,
        };

        let (value, _info) = LuaRuntime::new().run(&ctx).await;
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn script_error_becomes_error_runinfo() {
        let rule = rule("error('boom')");
        let message = message_with_payload(serde_json::json!({}));
        let pubsub: Arc<dyn PubSub> = Arc::new(NoopPubSub);
        let emailer: Arc<dyn Emailer> = Arc::new(NoopEmailer);
        let ctx = RunContext {
            rule: &rule,
            message: &message,
            emailer: &emailer,
            pubsub: &pubsub,
        };

        let (value, info) = LuaRuntime::new().run(&ctx).await;
        assert!(value.is_nil());
        assert_eq!(info.level, re_core::message::RunLevel::Error);
    }
}
