use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fixed role assigned to every user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Global operator; bypasses commune scoping.
    SuperAdmin,
    Admin,
    /// Municipality staff, scoped to their own commune.
    AgentCommune,
    Citoyen,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::AgentCommune, Role::Citoyen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::AgentCommune => "agent_commune",
            Role::Citoyen => "citoyen",
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == key)
            .ok_or_else(|| AppError::user("unknown_role".to_string(), format!("unknown role '{}'", s.trim())))
    }
}

/// Parse a comma separated role list (`"admin, agent_commune"`), keeping order and dropping blanks.
pub fn parse_role_list(s: &str) -> Result<Vec<Role>, AppError> {
    let mut out = Vec::new();
    for part in s.split(',') {
        if part.trim().is_empty() { continue; }
        let r: Role = part.parse()?;
        if !out.contains(&r) { out.push(r); }
    }
    Ok(out)
}
