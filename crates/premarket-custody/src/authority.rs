//! Authorization seam: operator and admin capabilities.
//!
//! Capabilities are checked through an injected [`Authority`] rather than
//! baked into the exchange, so role storage stays an external concern.

use std::collections::HashSet;

use premarket_types::{AccountId, PremarketError, Result};

/// Capabilities the exchange checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Token lifecycle, force-cancel, two-step settlement, unwind on behalf of buyers.
    Operator,
    /// Fee configuration and accepted-asset allow-listing.
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "OPERATOR",
            Self::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers "does this account hold this role?".
pub trait Authority {
    fn has_role(&self, account: AccountId, role: Role) -> bool;

    /// Fail with an authorization error unless `account` holds `role`.
    fn require(&self, account: AccountId, role: Role) -> Result<()> {
        if self.has_role(account, role) {
            Ok(())
        } else {
            Err(PremarketError::MissingCapability {
                account,
                role: role.as_str(),
            })
        }
    }
}

/// Fixed role table.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    operators: HashSet<AccountId>,
    admins: HashSet<AccountId>,
}

impl StaticRoles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with(mut self, account: AccountId, role: Role) -> Self {
        self.grant(account, role);
        self
    }

    pub fn grant(&mut self, account: AccountId, role: Role) {
        match role {
            Role::Operator => self.operators.insert(account),
            Role::Admin => self.admins.insert(account),
        };
    }

    pub fn revoke(&mut self, account: AccountId, role: Role) {
        match role {
            Role::Operator => self.operators.remove(&account),
            Role::Admin => self.admins.remove(&account),
        };
    }
}

impl Authority for StaticRoles {
    fn has_role(&self, account: AccountId, role: Role) -> bool {
        match role {
            Role::Operator => self.operators.contains(&account),
            Role::Admin => self.admins.contains(&account),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use premarket_types::ErrorKind;

    #[test]
    fn granted_roles_pass() {
        let op = AccountId::new();
        let roles = StaticRoles::new().with(op, Role::Operator);
        assert!(roles.require(op, Role::Operator).is_ok());
        assert!(!roles.has_role(op, Role::Admin));
    }

    #[test]
    fn missing_role_is_authorization_error() {
        let roles = StaticRoles::new();
        let err = roles.require(AccountId::new(), Role::Admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(format!("{err}").contains("ADMIN"));
    }

    #[test]
    fn revoke_removes_role() {
        let op = AccountId::new();
        let mut roles = StaticRoles::new().with(op, Role::Operator);
        roles.revoke(op, Role::Operator);
        assert!(!roles.has_role(op, Role::Operator));
    }
}
