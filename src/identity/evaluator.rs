use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::permission::{Permission, RolePermissionTable};
use super::principal::{CommuneId, UserContext};

/// How a scope id of `0` is treated.
///
/// By default `0` counts as "no scope requested" and skips the commune comparison, which
/// lets a commune-scoped user through for any commune. `strict_zero` makes `0` an ordinary
/// id that has to match the user's commune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePolicy {
    #[serde(default)]
    pub strict_zero: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Unauthenticated,
    PermissionNotGranted,
    SuperAdminBypass,
    CommuneMismatch,
    Granted,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Unauthenticated => "unauthenticated",
            DecisionReason::PermissionNotGranted => "permission_not_granted",
            DecisionReason::SuperAdminBypass => "super_admin_bypass",
            DecisionReason::CommuneMismatch => "commune_mismatch",
            DecisionReason::Granted => "granted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn allow(reason: DecisionReason) -> Self { Self { allowed: true, reason } }
    pub fn deny(reason: DecisionReason) -> Self { Self { allowed: false, reason } }
}

/// Answers "may this user exercise this permission, optionally within this commune?".
///
/// Cheap to clone; the table is shared.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    table: Arc<RolePermissionTable>,
    policy: ScopePolicy,
}

impl Default for PermissionEvaluator {
    fn default() -> Self {
        Self::new(RolePermissionTable::builtin())
    }
}

impl PermissionEvaluator {
    pub fn new(table: RolePermissionTable) -> Self {
        Self { table: Arc::new(table), policy: ScopePolicy::default() }
    }

    pub fn with_policy(mut self, policy: ScopePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn table(&self) -> &RolePermissionTable {
        &self.table
    }

    pub fn policy(&self) -> ScopePolicy {
        self.policy
    }

    pub fn is_authenticated(&self, user: Option<&UserContext>) -> bool {
        user.is_some()
    }

    pub fn check_permission(&self, user: Option<&UserContext>, required: Permission, scope: Option<CommuneId>) -> bool {
        self.decide(user, required, scope).allowed
    }

    pub fn decide(&self, user: Option<&UserContext>, required: Permission, scope: Option<CommuneId>) -> Decision {
        let Some(user) = user else {
            debug!(target: "civiq::authz", permission = %required, "denied: no user");
            return Decision::deny(DecisionReason::Unauthenticated);
        };
        if !self.table.grants(user.role, required) {
            debug!(target: "civiq::authz", user = %user.user_id, role = %user.role, permission = %required, "denied: permission not granted");
            return Decision::deny(DecisionReason::PermissionNotGranted);
        }
        if user.role.is_super_admin() {
            return Decision::allow(DecisionReason::SuperAdminBypass);
        }
        if self.scope_mismatch(user, scope) {
            debug!(
                target: "civiq::authz",
                user = %user.user_id,
                permission = %required,
                requested = ?scope.map(|c| c.0),
                own = ?user.commune_id.map(|c| c.0),
                "denied: commune mismatch"
            );
            return Decision::deny(DecisionReason::CommuneMismatch);
        }
        Decision::allow(DecisionReason::Granted)
    }

    fn scope_mismatch(&self, user: &UserContext, scope: Option<CommuneId>) -> bool {
        match scope {
            None => false,
            Some(requested) if !requested.is_provided() && !self.policy.strict_zero => {
                warn!(target: "civiq::authz", user = %user.user_id, "scope commune id 0 treated as unscoped");
                false
            }
            Some(requested) => user.commune_id != Some(requested),
        }
    }
}
