//! Errors from email delivery and template rendering.

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<NotifyError> for re_core::RulesError {
    fn from(err: NotifyError) -> Self {
        re_core::RulesError::Other(err.to_string())
    }
}
