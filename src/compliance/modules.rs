//! Concrete compliance rule modules

use crate::compliance::engine::ComplianceModule;
use crate::crypto::Address;
use std::collections::HashMap;

/// Caps any single holder's balance. Tracks balances in module-private
/// state, fed exclusively by the post-commit hooks, so the cap holds even
/// though the module never reads the ledger.
pub struct MaxBalanceModule {
    limit: u64,
    balances: HashMap<Address, u64>,
}

impl MaxBalanceModule {
    pub fn new(limit: u64) -> Self {
        MaxBalanceModule {
            limit,
            balances: HashMap::new(),
        }
    }

    fn tracked(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn would_exceed(&self, to: &Address, amount: u64) -> bool {
        match self.tracked(to).checked_add(amount) {
            Some(next) => next > self.limit,
            None => true,
        }
    }
}

impl ComplianceModule for MaxBalanceModule {
    fn name(&self) -> &str {
        "max-balance"
    }

    fn can_transfer(&self, _spender: &Address, _from: &Address, to: &Address, amount: u64) -> bool {
        !self.would_exceed(to, amount)
    }

    fn can_create(&self, to: &Address, amount: u64) -> bool {
        !self.would_exceed(to, amount)
    }

    fn transferred(&mut self, from: &Address, to: &Address, amount: u64) {
        let sender = self.tracked(from).saturating_sub(amount);
        self.balances.insert(*from, sender);
        *self.balances.entry(*to).or_insert(0) += amount;
    }

    fn created(&mut self, to: &Address, amount: u64) {
        *self.balances.entry(*to).or_insert(0) += amount;
    }

    fn destroyed(&mut self, from: &Address, amount: u64) {
        let remaining = self.tracked(from).saturating_sub(amount);
        self.balances.insert(*from, remaining);
    }
}

/// Permits transfers only when the configured trading venue executes them,
/// so holders cannot move the asset directly between each other. The venue
/// appears as the spender on every leg it pulls or sends. Mint and burn are
/// unaffected.
pub struct VenueRoutingModule {
    venue: Address,
}

impl VenueRoutingModule {
    pub fn new(venue: Address) -> Self {
        VenueRoutingModule { venue }
    }
}

impl ComplianceModule for VenueRoutingModule {
    fn name(&self) -> &str {
        "venue-routing"
    }

    fn can_transfer(&self, spender: &Address, _from: &Address, _to: &Address, _amount: u64) -> bool {
        *spender == self.venue
    }
}
