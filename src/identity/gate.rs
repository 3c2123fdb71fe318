//! Page-level role gate.
//!
//! The gate only decides what a view shows. It does not stop a privileged action from
//! being sent to the API; enforcement lives behind the API.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::principal::UserContext;
use super::role::Role;

/// Where the session lookup currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Resolved(Option<UserContext>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Pending,
    Granted,
    Denied { redirect_to: String },
}

impl GateOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, GateOutcome::Granted)
    }
}

/// What the guarded view should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Checking,
    Fallback(T),
    Children(T),
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    allowed_roles: Vec<Role>,
    redirect_to: String,
}

impl RoleGate {
    pub fn new(allowed_roles: impl IntoIterator<Item = Role>) -> Self {
        let mut roles = Vec::new();
        for r in allowed_roles {
            if !roles.contains(&r) { roles.push(r); }
        }
        Self { allowed_roles: roles, redirect_to: "/".to_string() }
    }

    pub fn redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = url.into();
        self
    }

    pub fn allowed_roles(&self) -> &[Role] {
        &self.allowed_roles
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    pub fn evaluate(&self, state: &SessionState) -> GateOutcome {
        match state {
            SessionState::Pending => GateOutcome::Pending,
            SessionState::Resolved(Some(user)) if self.allows(user.role) => GateOutcome::Granted,
            SessionState::Resolved(Some(user)) => {
                debug!(target: "civiq::gate", user = %user.user_id, role = %user.role, "role not allowed");
                self.denied()
            }
            SessionState::Resolved(None) => self.denied(),
            SessionState::Failed(err) => {
                warn!(target: "civiq::gate", error = %err, "session lookup failed; denying");
                self.denied()
            }
        }
    }

    /// Decide what to show. `children` is only invoked once access is granted.
    pub fn render<T, C, F>(&self, state: &SessionState, children: C, fallback: Option<F>) -> Rendered<T>
    where
        C: FnOnce() -> T,
        F: FnOnce() -> T,
    {
        match self.evaluate(state) {
            GateOutcome::Pending => match fallback {
                Some(f) => Rendered::Fallback(f()),
                None => Rendered::Checking,
            },
            GateOutcome::Granted => Rendered::Children(children()),
            GateOutcome::Denied { redirect_to } => Rendered::Redirect(redirect_to),
        }
    }

    /// Wait for the session lookup to settle and return the first terminal outcome.
    /// A closed channel while still pending is treated as a failed lookup.
    pub async fn resolve(&self, mut rx: watch::Receiver<SessionState>) -> GateOutcome {
        loop {
            let current = (*rx.borrow_and_update()).clone();
            if current != SessionState::Pending {
                return self.evaluate(&current);
            }
            if rx.changed().await.is_err() {
                return self.evaluate(&SessionState::Failed("session source closed".into()));
            }
        }
    }

    fn denied(&self) -> GateOutcome {
        GateOutcome::Denied { redirect_to: self.redirect_to.clone() }
    }
}

/// Re-evaluates a gate as the session changes and reports only changed outcomes.
#[derive(Debug)]
pub struct GateWatcher {
    gate: RoleGate,
    last: Option<GateOutcome>,
}

impl GateWatcher {
    pub fn new(gate: RoleGate) -> Self {
        Self { gate, last: None }
    }

    pub fn current(&self) -> Option<&GateOutcome> {
        self.last.as_ref()
    }

    pub fn observe(&mut self, state: &SessionState) -> Option<GateOutcome> {
        let next = self.gate.evaluate(state);
        if self.last.as_ref() == Some(&next) {
            return None;
        }
        self.last = Some(next.clone());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::principal::CommuneId;

    fn user(role: Role) -> SessionState {
        SessionState::Resolved(Some(UserContext::new("u", role, Some(CommuneId(5)))))
    }

    fn staff_gate() -> RoleGate {
        RoleGate::new([Role::Admin, Role::AgentCommune])
    }

    #[test]
    fn citizen_is_redirected_and_children_never_built() {
        let gate = staff_gate();
        let mut built = false;
        let out = gate.render(&user(Role::Citoyen), || { built = true; "page" }, None::<fn() -> &'static str>);
        assert_eq!(out, Rendered::Redirect("/".into()));
        assert!(!built);
    }

    #[test]
    fn allowed_role_renders_children() {
        let out = staff_gate().render(&user(Role::AgentCommune), || "page", Some(|| "loading"));
        assert_eq!(out, Rendered::Children("page"));
    }

    #[test]
    fn pending_shows_fallback_or_checking() {
        let gate = staff_gate();
        assert_eq!(gate.render(&SessionState::Pending, || "page", Some(|| "loading")), Rendered::Fallback("loading"));
        assert_eq!(gate.render(&SessionState::Pending, || "page", None::<fn() -> &'static str>), Rendered::Checking);
        assert_eq!(gate.evaluate(&SessionState::Pending), GateOutcome::Pending);
    }

    #[test]
    fn anonymous_and_failure_use_configured_redirect() {
        let gate = staff_gate().redirect_to("/connexion");
        let denied = GateOutcome::Denied { redirect_to: "/connexion".into() };
        assert_eq!(gate.evaluate(&SessionState::Resolved(None)), denied);
        assert_eq!(gate.evaluate(&SessionState::Failed("timeout".into())), denied);
    }

    #[test]
    fn super_admin_is_not_implicitly_allowed() {
        assert!(!staff_gate().evaluate(&user(Role::SuperAdmin)).is_authorized());
    }

    #[test]
    fn watcher_reports_only_changes() {
        let mut w = GateWatcher::new(staff_gate());
        assert_eq!(w.observe(&SessionState::Pending), Some(GateOutcome::Pending));
        assert_eq!(w.observe(&SessionState::Pending), None);
        assert_eq!(w.observe(&user(Role::Admin)), Some(GateOutcome::Granted));
        assert_eq!(w.observe(&user(Role::AgentCommune)), None);
        assert!(matches!(w.observe(&user(Role::Citoyen)), Some(GateOutcome::Denied { .. })));
        assert!(matches!(w.current(), Some(GateOutcome::Denied { .. })));
    }

    #[tokio::test]
    async fn resolve_waits_for_session() {
        let (tx, rx) = watch::channel(SessionState::Pending);
        let gate = staff_gate();
        let handle = tokio::spawn(async move { gate.resolve(rx).await });
        tx.send(user(Role::Admin)).unwrap();
        assert_eq!(handle.await.unwrap(), GateOutcome::Granted);
    }

    #[tokio::test]
    async fn resolve_denies_when_source_closes() {
        let (tx, rx) = watch::channel(SessionState::Pending);
        drop(tx);
        let out = staff_gate().resolve(rx).await;
        assert_eq!(out, GateOutcome::Denied { redirect_to: "/".into() });
    }
}
