use uuid::Uuid;

use super::evaluator::PermissionEvaluator;
use super::permission::Permission;
use super::principal::{CommuneId, UserContext};

/// Per-request view of the caller, built once by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<UserContext>,
    pub request_id: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { user: None, request_id: Uuid::new_v4().to_string() }
    }
}

impl RequestContext {
    pub fn for_user(user: Option<UserContext>) -> Self {
        Self { user, ..Default::default() }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn check_permission(&self, evaluator: &PermissionEvaluator, permission: Permission, commune: Option<CommuneId>) -> bool {
        evaluator.check_permission(self.user.as_ref(), permission, commune)
    }
}
