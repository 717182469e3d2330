//! Role-based access control.
//!
//! A principal may hold any subset of [`Role`]s; every check is a set
//! membership test. Carriers are not a role: the carrier of a shipment is
//! whoever the sender named at creation.

use std::collections::{BTreeMap, BTreeSet};

use coldchain_kernel::{Principal, Role};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Set of `(principal, role)` grants.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControl {
    grants: BTreeMap<Principal, BTreeSet<Role>>,
}

impl AccessControl {
    /// Bootstrap with one admin, who is also the first operator.
    pub fn new(admin: Principal) -> Self {
        let mut access = Self::default();
        access.insert(admin, Role::Admin);
        access.insert(admin, Role::Operator);
        access
    }

    /// Whether `principal` holds `role`.
    pub fn has_role(&self, principal: Principal, role: Role) -> bool {
        self.grants
            .get(&principal)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// Fail with [`Error::MissingRole`] unless `caller` holds `role`.
    pub fn require(&self, caller: Principal, role: Role) -> Result<()> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            Err(Error::MissingRole { caller, role })
        }
    }

    /// Admin-only grant. Returns `false` if the grant already existed.
    pub fn grant(&mut self, caller: Principal, role: Role, principal: Principal) -> Result<bool> {
        self.require(caller, Role::Admin)?;
        Ok(self.insert(principal, role))
    }

    /// Admin-only revoke. Returns `false` if there was nothing to revoke.
    pub fn revoke(&mut self, caller: Principal, role: Role, principal: Principal) -> Result<bool> {
        self.require(caller, Role::Admin)?;
        Self::check_revoke(caller, role, principal)?;
        Ok(self.remove(principal, role))
    }

    /// An admin cannot revoke its own admin role.
    pub fn check_revoke(caller: Principal, role: Role, principal: Principal) -> Result<()> {
        if role == Role::Admin && principal == caller {
            return Err(Error::SelfRevoke { caller });
        }
        Ok(())
    }

    /// Add a grant without checking the caller. Returns `false` if it
    /// already existed.
    pub fn insert(&mut self, principal: Principal, role: Role) -> bool {
        self.grants.entry(principal).or_default().insert(role)
    }

    /// Drop a grant without checking the caller. Returns `false` if there
    /// was nothing to drop.
    pub fn remove(&mut self, principal: Principal, role: Role) -> bool {
        let Some(roles) = self.grants.get_mut(&principal) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.grants.remove(&principal);
        }
        removed
    }

    /// Principals holding `role`, ascending.
    pub fn members(&self, role: Role) -> Vec<Principal> {
        self.grants
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(principal, _)| *principal)
            .collect()
    }

    /// Roles held by `principal`, in declaration order.
    pub fn roles_of(&self, principal: Principal) -> Vec<Role> {
        self.grants
            .get(&principal)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}
