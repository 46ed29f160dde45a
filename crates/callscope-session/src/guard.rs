//! Route guard
//!
//! Decides whether a navigation may proceed given the session state, and
//! remembers where an unauthenticated user was headed so sign-in can send
//! them back there.

use crate::state::SessionState;
use crate::store::SessionSnapshot;
use callscope_core::RouteConfig;
use parking_lot::Mutex;
use serde::Serialize;

/// Guard decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "to")]
pub enum Navigation {
    /// Render the target
    Allow,
    /// Session is still being established; hold rendering
    Pending,
    /// Go elsewhere
    Redirect(String),
}

/// Guard over protected routes
#[derive(Debug)]
pub struct RouteGuard {
    routes: RouteConfig,
    return_path: Mutex<Option<String>>,
}

fn path_only(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

impl RouteGuard {
    #[must_use]
    pub fn new(routes: RouteConfig) -> Self {
        Self {
            routes,
            return_path: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    /// Decide a navigation to `target` (path plus optional query string)
    pub fn check(&self, target: &str, state: SessionState) -> Navigation {
        let path = path_only(target);

        if state.is_signed_in() {
            if path == self.routes.sign_in {
                return Navigation::Redirect(self.routes.landing.clone());
            }
            return Navigation::Allow;
        }

        if !self.routes.is_protected(target) {
            return Navigation::Allow;
        }
        if state == SessionState::Authenticating {
            return Navigation::Pending;
        }

        self.preserve(target);
        tracing::debug!(target, %state, "protected route requires sign-in");
        Navigation::Redirect(self.routes.sign_in.clone())
    }

    /// React to a session change while `current` is displayed
    ///
    /// A lost session on a protected route redirects to sign-in and keeps
    /// the route for later; an explicit sign-out does not.
    pub fn on_session_change(&self, snapshot: &SessionSnapshot, current: &str) -> Navigation {
        if snapshot.state.is_signed_in()
            || snapshot.state == SessionState::Authenticating
            || !self.routes.is_protected(current)
        {
            return Navigation::Allow;
        }
        if snapshot.expired {
            self.preserve(current);
        }
        Navigation::Redirect(self.routes.sign_in.clone())
    }

    /// Where to go after a successful sign-in
    pub fn after_sign_in(&self) -> Navigation {
        Navigation::Redirect(self.take_return_path())
    }

    /// Preserved path, handed out once; the landing route otherwise
    pub fn take_return_path(&self) -> String {
        self.return_path
            .lock()
            .take()
            .unwrap_or_else(|| self.routes.landing.clone())
    }

    #[must_use]
    pub fn peek_return_path(&self) -> Option<String> {
        self.return_path.lock().clone()
    }

    fn preserve(&self, target: &str) {
        let path = path_only(target);
        if path == self.routes.sign_in || path == self.routes.landing {
            return;
        }
        *self.return_path.lock() = Some(target.to_string());
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(RouteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unauthenticated_protected_navigation_preserves_query() {
        let guard = RouteGuard::default();

        let nav = guard.check("/calls?agent=ana&page=2", SessionState::Unauthenticated);
        assert_eq!(nav, Navigation::Redirect("/login".into()));

        assert_eq!(guard.take_return_path(), "/calls?agent=ana&page=2");
        // handed out once
        assert_eq!(guard.take_return_path(), "/");
    }

    #[test]
    fn public_routes_are_allowed() {
        let guard = RouteGuard::default();
        assert_eq!(guard.check("/login", SessionState::Unauthenticated), Navigation::Allow);
        assert_eq!(guard.check("/", SessionState::Expired), Navigation::Allow);
        assert_eq!(guard.peek_return_path(), None);
    }

    #[test]
    fn signed_in_user_is_bounced_from_sign_in() {
        let guard = RouteGuard::default();
        assert_eq!(
            guard.check("/login?next=x", SessionState::Authenticated),
            Navigation::Redirect("/".into())
        );
        assert_eq!(guard.check("/dashboard", SessionState::Refreshing), Navigation::Allow);
    }

    #[test]
    fn sign_in_and_landing_are_never_preserved() {
        let routes = RouteConfig {
            landing: "/dashboard".into(),
            ..RouteConfig::default()
        };
        let guard = RouteGuard::new(routes);

        guard.check("/dashboard", SessionState::Unauthenticated);
        assert_eq!(guard.peek_return_path(), None);
        assert_eq!(guard.take_return_path(), "/dashboard");
    }

    #[test]
    fn pending_while_authenticating() {
        let guard = RouteGuard::default();
        assert_eq!(guard.check("/chat", SessionState::Authenticating), Navigation::Pending);
    }

    #[test]
    fn expiry_preserves_current_route_but_sign_out_does_not() {
        let guard = RouteGuard::default();
        let expired = SessionSnapshot {
            expired: true,
            ..SessionSnapshot::default()
        };
        assert_eq!(
            guard.on_session_change(&expired, "/behaviors?tab=active"),
            Navigation::Redirect("/login".into())
        );
        assert_eq!(guard.after_sign_in(), Navigation::Redirect("/behaviors?tab=active".into()));

        let signed_out = SessionSnapshot::default();
        assert_eq!(
            guard.on_session_change(&signed_out, "/calls"),
            Navigation::Redirect("/login".into())
        );
        assert_eq!(guard.peek_return_path(), None);
    }
}
