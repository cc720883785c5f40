//! Domain model and external port traits for the real-time rules engine.
//!
//! This crate has no knowledge of ZeroMQ, SMTP, Lua, or Postgres — it
//! defines the shapes (`Rule`, `Message`, `Value`, `RunInfo`) and the
//! traits (`RuleRepository`, `PubSub`, `Emailer`, `ReadingsReader`,
//! `Ticker`, `IdProvider`) that the rest of the workspace implements and
//! consumes.

pub mod config;
pub mod error;
pub mod message;
pub mod ports;
pub mod rule;
pub mod session;
pub mod topic;
pub mod value;

pub use config::Config;
pub use error::RulesError;
pub use message::{Message, RunInfo, RunLevel};
pub use rule::{ExecutionStatus, Logic, LogicType, Output, Recurring, Rule, RuleStatus, Schedule};
pub use session::Session;
pub use value::Value;
