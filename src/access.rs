use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::{LendingError, Result};
use crate::types::Address;

/// administrative roles, checked at every gated entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// protocol configuration and collaborator rewiring
    Admin,
    /// funds destination; gates treasury changes only
    Treasury,
}

/// enum-keyed permission matrix of authorized principals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    members: HashMap<Role, HashSet<Address>>,
}

impl AccessControl {
    /// create a matrix with an initial admin holding both roles
    pub fn new(admin: Address) -> Self {
        let mut members: HashMap<Role, HashSet<Address>> = HashMap::new();
        members
            .entry(Role::Admin)
            .or_default()
            .insert(admin.clone());
        members.entry(Role::Treasury).or_default().insert(admin);
        Self { members }
    }

    pub fn has_role(&self, role: Role, who: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(who))
            .unwrap_or(false)
    }

    pub fn require_role(&self, role: Role, caller: &Address) -> Result<()> {
        if !self.has_role(role, caller) {
            return Err(LendingError::MissingRole {
                caller: caller.clone(),
                role,
            });
        }
        Ok(())
    }

    pub fn grant(&mut self, role: Role, who: Address) {
        self.members.entry(role).or_default().insert(who);
    }

    pub fn revoke(&mut self, role: Role, who: &Address) {
        if let Some(set) = self.members.get_mut(&role) {
            set.remove(who);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_admin_holds_both_roles() {
        let ac = AccessControl::new(Address::from("root"));
        assert!(ac.has_role(Role::Admin, &Address::from("root")));
        assert!(ac.has_role(Role::Treasury, &Address::from("root")));
        assert!(!ac.has_role(Role::Admin, &Address::from("mallory")));
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut ac = AccessControl::new(Address::from("root"));
        let ops = Address::from("ops");

        ac.grant(Role::Treasury, ops.clone());
        assert!(ac.has_role(Role::Treasury, &ops));
        assert!(!ac.has_role(Role::Admin, &ops));

        ac.revoke(Role::Treasury, &ops);
        assert!(!ac.has_role(Role::Treasury, &ops));
    }

    #[test]
    fn test_require_role_error_carries_caller() {
        let ac = AccessControl::new(Address::from("root"));
        let err = ac
            .require_role(Role::Admin, &Address::from("mallory"))
            .unwrap_err();
        assert!(matches!(err, LendingError::MissingRole { role: Role::Admin, .. }));
    }
}
