//! Reference [`re_core::ports::RuleRepository`] implementations (spec
//! §6): an in-memory store, and a YAML-file-backed store with
//! `notify`-driven hot reload built on top of it.

pub mod file;
pub mod memory;

pub use file::FileRuleRepository;
pub use memory::InMemoryRuleRepository;
