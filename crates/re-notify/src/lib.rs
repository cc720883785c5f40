//! Email output delivery and message templating for the rules engine.
//!
//! This crate provides:
//! - [`SmtpEmailer`], a [`re_core::ports::Emailer`] implementation over `lettre`
//! - [`templating::TemplateRenderer`], minijinja rendering for Email and
//!   RemoteSQL mapping templates

pub mod email;
pub mod error;
pub mod templating;

pub use email::SmtpEmailer;
pub use error::NotifyError;
pub use templating::{MessageContext, RuleContext, TemplateRenderer};
