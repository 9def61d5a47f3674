//! Route access gate.
//!
//! [`evaluate`] is the whole policy: authentication first, then onboarding,
//! then the admin role check. It never fails; every request ends in
//! [`GateDecision::Allow`], a redirect, or a 403.

use std::collections::BTreeSet;

use shared::domain::{Role, UserId};

pub const LOGIN_ROUTE: &str = "/login";
pub const LOGOUT_ROUTE: &str = "/logout";
pub const ONBOARDING_ROUTE: &str = "/onboarding";
pub const DASHBOARD_ROUTE: &str = "/dashboard";
pub const OVERVIEW_ROUTE: &str = "/assessments/overview";

const PUBLIC_ROUTES: &[&str] = &["/healthz"];
const GUEST_ROUTES: &[&str] = &[LOGIN_ROUTE, "/forgot-password", "/reset-password"];
const ADMIN_ROUTES: &[&str] = &["/admin"];

/// The authenticated user as seen by the gate and handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub roles: BTreeSet<Role>,
    pub onboarding_completed: bool,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role.is_admin())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Guest,
    Onboarding,
    Logout,
    Admin,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(&'static str),
    Forbidden,
}

pub fn classify(path: &str) -> RouteClass {
    let path = normalize(path);
    if PUBLIC_ROUTES.iter().any(|base| under(path, base)) {
        RouteClass::Public
    } else if GUEST_ROUTES.iter().any(|base| under(path, base)) {
        RouteClass::Guest
    } else if under(path, ONBOARDING_ROUTE) {
        RouteClass::Onboarding
    } else if under(path, LOGOUT_ROUTE) {
        RouteClass::Logout
    } else if ADMIN_ROUTES.iter().any(|base| under(path, base)) {
        RouteClass::Admin
    } else {
        RouteClass::Protected
    }
}

pub fn evaluate(principal: Option<&Principal>, path: &str) -> GateDecision {
    let class = classify(path);
    if class == RouteClass::Public {
        return GateDecision::Allow;
    }

    let Some(principal) = principal else {
        return match class {
            RouteClass::Guest => GateDecision::Allow,
            _ => GateDecision::Redirect(LOGIN_ROUTE),
        };
    };

    if !principal.onboarding_completed {
        return match class {
            RouteClass::Onboarding | RouteClass::Logout => GateDecision::Allow,
            _ => GateDecision::Redirect(ONBOARDING_ROUTE),
        };
    }

    match class {
        RouteClass::Onboarding | RouteClass::Guest => GateDecision::Redirect(DASHBOARD_ROUTE),
        RouteClass::Admin if !principal.is_admin() => GateDecision::Forbidden,
        _ => GateDecision::Allow,
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn under(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
#[path = "tests/access_tests.rs"]
mod tests;
