use serde::{Deserialize, Serialize};

/// A role carried by a request's bearer token.
///
/// `Admin` and `InternalService` are the two privileged roles from spec
/// §4.4: either bypasses per-account ownership checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A regular account holder; subject to ownership checks.
    Owner,
    /// Operations/support role; bypasses ownership checks.
    Admin,
    /// Another trusted backend service (e.g. transaction-service calling
    /// account-service); bypasses ownership checks.
    InternalService,
}

/// The authenticated caller of a core operation.
///
/// Constructed once by the HTTP facade from the bearer token's subject and
/// roles claim, then threaded through as a plain parameter — never read
/// from request-scoped globals or thread-locals (spec §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    /// The token subject; for non-privileged principals, expected to equal
    /// an account's `owner_id`.
    pub name: String,
    /// Roles carried by the token.
    pub roles: Vec<Role>,
}

impl Principal {
    /// Builds a principal with no privileged roles.
    #[must_use]
    pub fn owner(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: vec![Role::Owner],
        }
    }

    /// Builds a principal carrying the `ADMIN` role.
    #[must_use]
    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: vec![Role::Admin],
        }
    }

    /// Builds a principal carrying the `INTERNAL_SERVICE` role.
    #[must_use]
    pub fn internal_service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: vec![Role::InternalService],
        }
    }

    /// Whether this principal bypasses ownership checks (spec §4.4).
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.roles
            .iter()
            .any(|r| matches!(r, Role::Admin | Role::InternalService))
    }

    /// Whether this principal may act on behalf of `owner_id`: either it is
    /// privileged, or its name matches the owner exactly.
    #[must_use]
    pub fn may_act_as(&self, owner_id: &str) -> bool {
        self.is_privileged() || self.name == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_may_only_act_as_self() {
        let p = Principal::owner("alice");
        assert!(p.may_act_as("alice"));
        assert!(!p.may_act_as("bob"));
    }

    #[test]
    fn privileged_roles_bypass_ownership() {
        assert!(Principal::admin("ops").may_act_as("anyone"));
        assert!(Principal::internal_service("txn-svc").may_act_as("anyone"));
    }
}
