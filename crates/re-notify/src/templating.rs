//! Minijinja template rendering for Email content and RemoteSQL column
//! mapping templates (spec §4.B).
//!
//! Templates are arbitrary strings stored on the rule (not pre-registered
//! files), so a fresh [`minijinja::Environment`] is built per render call.

use std::collections::BTreeMap;

use re_core::value::Value;

use crate::error::NotifyError;

/// Rule metadata exposed to templates as `rule.*`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleContext {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub tags: Vec<String>,
}

/// The triggering message and script result, exposed as `message.*` and
/// `result`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageContext {
    pub domain: String,
    pub channel: String,
    pub subtopic: String,
    pub publisher: String,
    pub protocol: String,
    pub created: i64,
    pub result: serde_json::Value,
    pub now: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub rule: RuleContext,
    pub message: MessageContext,
}

impl TemplateContext {
    pub fn new(rule: RuleContext, message: MessageContext) -> Self {
        Self { rule, message }
    }
}

/// Renders notification and mapping templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env.add_function("env", env_function);
        env
    }

    /// Render a template string against a [`TemplateContext`].
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render a RemoteSQL mapping template into a column→value mapping.
    /// The template must render to a JSON object (spec §4.B RemoteSql).
    pub fn render_mapping(
        &self,
        template_str: &str,
        ctx: &TemplateContext,
    ) -> Result<BTreeMap<String, Value>, NotifyError> {
        let rendered = self.render(template_str, ctx)?;
        let json: serde_json::Value = serde_json::from_str(&rendered)
            .map_err(|e| NotifyError::Template(format!("mapping did not render to JSON: {e}")))?;
        match Value::from_json(&json) {
            Value::Mapping(map) => Ok(map),
            _ => Err(NotifyError::Template(
                "mapping template must render to a JSON object".into(),
            )),
        }
    }

    /// Parse-only check, used at rule validation time.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "template referenced unset environment variable");
            String::new()
        }
    }
}
