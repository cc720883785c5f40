//! Opaque credential carrier (spec §6 "Session").

/// The engine never interprets credentials; it forwards a `Session`
/// into repository calls unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub domain_id: String,
    pub admin: bool,
}

impl Session {
    pub fn new(user_id: impl Into<String>, domain_id: impl Into<String>, admin: bool) -> Self {
        Self {
            user_id: user_id.into(),
            domain_id: domain_id.into(),
            admin,
        }
    }
}
