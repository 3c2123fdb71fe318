use std::fmt;

use serde::{Deserialize, Serialize};

use super::role::Role;

/// Municipality identifier. `0` is the "not provided" id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommuneId(pub u64);

impl CommuneId {
    pub fn is_provided(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for CommuneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CommuneId {
    fn from(v: u64) -> Self { CommuneId(v) }
}

/// The part of an authenticated user the authorization layer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub commune_id: Option<CommuneId>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role, commune_id: Option<CommuneId>) -> Self {
        Self { user_id: user_id.into(), role, commune_id }
    }
}
