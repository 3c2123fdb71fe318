//! Roles, permissions and the checks built on them.
//! Keep the public surface thin and split implementation across sub-modules.

mod role;
mod permission;
mod principal;
mod evaluator;
mod gate;
mod directory;
mod session;
mod request_context;

pub use role::{Role, parse_role_list};
pub use permission::{Permission, RolePermissionTable};
pub use principal::{CommuneId, UserContext};
pub use evaluator::{Decision, DecisionReason, PermissionEvaluator, ScopePolicy};
pub use gate::{GateOutcome, GateWatcher, Rendered, RoleGate, SessionState};
pub use directory::{DirectoryUser, UserDirectory, hash_password, verify_password};
pub use session::{Session, SessionManager, SessionSource, SessionToken};
pub use request_context::RequestContext;
