//! Balances of principals outside escrow.
//!
//! The engine withdraws a sender's escrow at creation and deposits it into
//! the carrier on settlement. Anything that can hold balances implements
//! [`FundsLedger`]; [`InMemoryFunds`] is the default.

use std::collections::BTreeMap;

use coldchain_kernel::{Amount, Principal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Account balances the engine moves escrow between.
pub trait FundsLedger {
    /// Spendable balance of `principal`.
    fn balance(&self, principal: Principal) -> Amount;

    /// Debit `amount`; fails without effect if the balance is short.
    fn withdraw(&mut self, principal: Principal, amount: Amount) -> Result<()>;

    /// Credit `amount`; fails without effect on overflow.
    fn deposit(&mut self, principal: Principal, amount: Amount) -> Result<()>;
}

/// Sorted in-memory balances.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryFunds {
    balances: BTreeMap<Principal, Amount>,
}

impl InMemoryFunds {
    /// No balances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund an account from outside the system. Returns the new balance.
    pub fn credit(&mut self, principal: Principal, amount: Amount) -> Result<Amount> {
        self.deposit(principal, amount)?;
        Ok(self.balance(principal))
    }

    /// Sum of all balances.
    pub fn total(&self) -> Result<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, v| acc.checked_add(*v))
            .ok_or(Error::Overflow {
                context: "summing balances",
            })
    }

    /// Non-zero balances, ascending by principal.
    pub fn iter(&self) -> impl Iterator<Item = (Principal, Amount)> + '_ {
        self.balances.iter().map(|(p, a)| (*p, *a))
    }
}

impl FundsLedger for InMemoryFunds {
    fn balance(&self, principal: Principal) -> Amount {
        self.balances
            .get(&principal)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn withdraw(&mut self, principal: Principal, amount: Amount) -> Result<()> {
        let available = self.balance(principal);
        let remaining = available
            .checked_sub(amount)
            .ok_or(Error::InsufficientFunds {
                principal,
                available,
                required: amount,
            })?;
        if remaining.is_zero() {
            self.balances.remove(&principal);
        } else {
            self.balances.insert(principal, remaining);
        }
        Ok(())
    }

    fn deposit(&mut self, principal: Principal, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let updated = self
            .balance(principal)
            .checked_add(amount)
            .ok_or(Error::Overflow {
                context: "crediting a balance",
            })?;
        self.balances.insert(principal, updated);
        Ok(())
    }
}
