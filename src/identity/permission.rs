//! Permission vocabulary and the role → permission table.
//!
//! The table is fixed for the lifetime of the process. It comes either from the built-in
//! defaults or from a JSON file read once at startup; nothing mutates it afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::role::Role;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageSignalements,
    ManageArretes,
    ManageAgents,
    ManageBadges,
    ViewStatistics,
    CreateSignalement,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ManageSignalements,
        Permission::ManageArretes,
        Permission::ManageAgents,
        Permission::ManageBadges,
        Permission::ViewStatistics,
        Permission::CreateSignalement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageSignalements => "manage_signalements",
            Permission::ManageArretes => "manage_arretes",
            Permission::ManageAgents => "manage_agents",
            Permission::ManageBadges => "manage_badges",
            Permission::ViewStatistics => "view_statistics",
            Permission::CreateSignalement => "create_signalement",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| AppError::user("unknown_permission".to_string(), format!("unknown permission '{}'", s.trim())))
    }
}

static EMPTY: BTreeSet<Permission> = BTreeSet::new();

static BUILTIN: Lazy<RolePermissionTable> = Lazy::new(|| {
    use Permission::*;
    RolePermissionTable::from_entries([
        (Role::SuperAdmin, Permission::ALL.to_vec()),
        (Role::Admin, vec![ManageSignalements, ManageArretes, ManageAgents, ManageBadges, ViewStatistics]),
        (Role::AgentCommune, vec![ManageSignalements, ViewStatistics]),
        (Role::Citoyen, vec![CreateSignalement]),
    ])
});

/// Immutable mapping from every role to the permissions it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RolePermissionTable {
    entries: BTreeMap<Role, BTreeSet<Permission>>,
}

impl RolePermissionTable {
    /// Default deployment table.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Build a table from (role, permissions) pairs. Roles that are not listed get an empty set.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Role, P)>,
        P: IntoIterator<Item = Permission>,
    {
        let mut map: BTreeMap<Role, BTreeSet<Permission>> = Role::ALL.iter().map(|r| (*r, BTreeSet::new())).collect();
        for (role, perms) in entries {
            map.entry(role).or_default().extend(perms);
        }
        Self { entries: map }
    }

    /// Parse `{ "<role>": ["<permission>", ...] }`. Unknown names are rejected.
    pub fn from_json_str(text: &str) -> AppResult<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(text)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (role_name, perm_names) in raw {
            let role: Role = role_name.parse()?;
            let perms = perm_names
                .iter()
                .map(|p| p.parse::<Permission>())
                .collect::<AppResult<Vec<_>>>()?;
            entries.push((role, perms));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::io("permissions_file".to_string(), format!("{}: {}", path.display(), e)))?;
        let table = Self::from_json_str(&text)?;
        tracing::info!(target: "civiq::authz", path = %path.display(), "loaded role permission table");
        Ok(table)
    }

    /// Permissions granted to `role`; a role without an entry grants nothing.
    pub fn permissions_for(&self, role: Role) -> &BTreeSet<Permission> {
        self.entries.get(&role).unwrap_or(&EMPTY)
    }

    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        self.permissions_for(role).contains(&permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &BTreeSet<Permission>)> {
        self.entries.iter().map(|(r, p)| (*r, p))
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_entry_for_every_role() {
        let t = RolePermissionTable::builtin();
        let roles: Vec<Role> = t.iter().map(|(r, _)| r).collect();
        assert_eq!(roles, Role::ALL.to_vec());
    }

    #[test]
    fn builtin_grants() {
        let t = RolePermissionTable::builtin();
        for p in Permission::ALL {
            assert!(t.grants(Role::SuperAdmin, p));
        }
        assert!(t.grants(Role::Admin, Permission::ManageAgents));
        assert!(!t.grants(Role::Admin, Permission::CreateSignalement));
        assert!(t.grants(Role::AgentCommune, Permission::ManageSignalements));
        assert!(!t.grants(Role::AgentCommune, Permission::ManageArretes));
        assert_eq!(t.permissions_for(Role::Citoyen).len(), 1);
    }

    #[test]
    fn missing_roles_are_filled_with_empty_sets() {
        let t = RolePermissionTable::from_entries([(Role::Admin, vec![Permission::ManageArretes])]);
        assert!(t.permissions_for(Role::Citoyen).is_empty());
        assert!(t.permissions_for(Role::SuperAdmin).is_empty());
        assert_eq!(t.iter().count(), Role::ALL.len());
    }

    #[test]
    fn parses_json_table() {
        let t = RolePermissionTable::from_json_str(
            r#"{ "agent_commune": ["manage_signalements", "manage_arretes"], "citoyen": [] }"#,
        )
        .unwrap();
        assert!(t.grants(Role::AgentCommune, Permission::ManageArretes));
        assert!(t.permissions_for(Role::Citoyen).is_empty());
        assert!(t.permissions_for(Role::Admin).is_empty());
    }

    #[test]
    fn json_rejects_unknown_names() {
        let e = RolePermissionTable::from_json_str(r#"{ "maire": [] }"#).unwrap_err();
        assert_eq!(e.code_str(), "unknown_role");
        let e = RolePermissionTable::from_json_str(r#"{ "admin": ["fly"] }"#).unwrap_err();
        assert_eq!(e.code_str(), "unknown_permission");
        let e = RolePermissionTable::from_json_str("[1,2]").unwrap_err();
        assert_eq!(e.code_str(), "invalid_json");
    }

    #[test]
    fn load_reports_missing_file() {
        let e = RolePermissionTable::load(Path::new("/nonexistent/civiq/permissions.json")).unwrap_err();
        assert_eq!(e.http_status(), 503);
    }
}
