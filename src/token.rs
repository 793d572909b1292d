//! Permissioned token ledger
//!
//! Holds balances and total supply. Every external mutation runs the full
//! check sequence (pause, freeze, funding, identity verification, compliance
//! pre-check) before any state is touched; balances commit only after all
//! checks pass, and the compliance post-commit hook fires last. A failed
//! operation leaves no observable effect.

use crate::access::Roles;
use crate::compliance::ModularCompliance;
use crate::crypto::{address_to_hex, Address, IdentityId};
use crate::error::{LedgerError, Result};
use crate::identity::{BalanceSource, IdentityRegistry};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Shared token handle. Operations are expected to be externally
/// serialized; the crate takes token and registry locks in both orders
/// (transfers lock token then registry, `delete_identity` locks registry
/// then token), so concurrent callers must not interleave them.
pub type SharedToken = Arc<RwLock<Token>>;

pub struct Token {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    onchain_id: IdentityId,
    registry: Arc<RwLock<IdentityRegistry>>,
    compliance: Arc<RwLock<ModularCompliance>>,
    balances: HashMap<Address, u64>,
    total_supply: u64,
    /// (owner, spender) -> remaining authorization
    allowances: HashMap<(Address, Address), u64>,
    frozen: HashSet<Address>,
    frozen_amounts: HashMap<Address, u64>,
    paused: bool,
    roles: Roles,
    /// Whether agents may mint/burn while the token is paused
    supply_ops_while_paused: bool,
}

impl Token {
    /// Wires registry, compliance, and token metadata exactly once. The
    /// token starts paused; an agent must `unpause` before holders can
    /// transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: Address,
        address: Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        onchain_id: IdentityId,
        registry: Arc<RwLock<IdentityRegistry>>,
        compliance: Arc<RwLock<ModularCompliance>>,
    ) -> Self {
        Token {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            onchain_id,
            registry,
            compliance,
            balances: HashMap::new(),
            total_supply: 0,
            allowances: HashMap::new(),
            frozen: HashSet::new(),
            frozen_amounts: HashMap::new(),
            paused: true,
            roles: Roles::new(owner),
            supply_ops_while_paused: true,
        }
    }

    pub fn with_supply_ops_while_paused(mut self, allowed: bool) -> Self {
        self.supply_ops_while_paused = allowed;
        self
    }

    // ------------------------------------------------------------------
    // Metadata & views
    // ------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn onchain_id(&self) -> IdentityId {
        self.onchain_id
    }

    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_frozen(&self, holder: &Address) -> bool {
        self.frozen.contains(holder)
    }

    pub fn frozen_tokens(&self, holder: &Address) -> u64 {
        self.frozen_amounts.get(holder).copied().unwrap_or(0)
    }

    pub fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    // ------------------------------------------------------------------
    // Owner wiring
    // ------------------------------------------------------------------

    pub fn set_compliance(
        &mut self,
        caller: &Address,
        compliance: Arc<RwLock<ModularCompliance>>,
    ) -> Result<()> {
        self.roles.require_owner(caller)?;
        self.compliance = compliance;
        tracing::debug!(token = %address_to_hex(&self.address), "compliance rewired");
        Ok(())
    }

    pub fn set_identity_registry(
        &mut self,
        caller: &Address,
        registry: Arc<RwLock<IdentityRegistry>>,
    ) -> Result<()> {
        self.roles.require_owner(caller)?;
        self.registry = registry;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Agent controls
    // ------------------------------------------------------------------

    pub fn pause(&mut self, caller: &Address) -> Result<()> {
        self.roles.require_agent(caller)?;
        if self.paused {
            return Err(LedgerError::InvalidState("Already paused".to_string()));
        }
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<()> {
        self.roles.require_agent(caller)?;
        if !self.paused {
            return Err(LedgerError::InvalidState("Not paused".to_string()));
        }
        self.paused = false;
        Ok(())
    }

    pub fn set_address_frozen(
        &mut self,
        caller: &Address,
        holder: Address,
        frozen: bool,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        if frozen {
            self.frozen.insert(holder);
        } else {
            self.frozen.remove(&holder);
        }
        Ok(())
    }

    /// Lock part of a holder's balance. The frozen amount never exceeds the
    /// balance.
    pub fn freeze_partial_tokens(
        &mut self,
        caller: &Address,
        holder: &Address,
        amount: u64,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        let frozen = self.frozen_tokens(holder);
        let next = frozen
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount("Frozen amount overflow".to_string()))?;
        if next > self.balance_of(holder) {
            return Err(LedgerError::InvalidAmount(
                "Cannot freeze more than the balance".to_string(),
            ));
        }
        self.frozen_amounts.insert(*holder, next);
        Ok(())
    }

    pub fn unfreeze_partial_tokens(
        &mut self,
        caller: &Address,
        holder: &Address,
        amount: u64,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        let frozen = self.frozen_tokens(holder);
        if amount > frozen {
            return Err(LedgerError::InvalidAmount(
                "Cannot unfreeze more than is frozen".to_string(),
            ));
        }
        self.frozen_amounts.insert(*holder, frozen - amount);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Allowances
    // ------------------------------------------------------------------

    pub fn approve(&mut self, caller: &Address, spender: Address, amount: u64) -> Result<()> {
        self.allowances.insert((*caller, spender), amount);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Full pre-commit check sequence for a holder-to-holder transfer.
    /// `spender` is the executing party handed to compliance. Pure: mutates
    /// nothing, so it doubles as the venue's settlement probe.
    fn check_transfer(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<()> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        if self.frozen.contains(from) {
            return Err(LedgerError::Frozen(address_to_hex(from)));
        }
        if self.frozen.contains(to) {
            return Err(LedgerError::Frozen(address_to_hex(to)));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Transfer amount must be greater than zero".to_string(),
            ));
        }
        let free = self.balance_of(from).saturating_sub(self.frozen_tokens(from));
        if amount > free {
            return Err(LedgerError::InsufficientBalance);
        }
        let registry = self.registry.read();
        if !registry.is_verified(from) {
            return Err(LedgerError::NotVerified(address_to_hex(from)));
        }
        if !registry.is_verified(to) {
            return Err(LedgerError::NotVerified(address_to_hex(to)));
        }
        drop(registry);
        self.compliance
            .read()
            .can_transfer(spender, from, to, amount)
            .map_err(LedgerError::ComplianceRejected)?;
        Ok(())
    }

    /// Commit a checked transfer and fire the post-commit hook. The hook
    /// observes an already-final mutation and cannot roll it back.
    fn commit_transfer(&mut self, from: &Address, to: &Address, amount: u64) {
        let sender = self.balance_of(from) - amount;
        self.balances.insert(*from, sender);
        *self.balances.entry(*to).or_insert(0) += amount;
        self.compliance.write().transferred(from, to, amount);
        tracing::debug!(
            from = %address_to_hex(from),
            to = %address_to_hex(to),
            amount,
            "transfer committed"
        );
    }

    pub fn transfer(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<()> {
        self.check_transfer(caller, caller, to, amount)?;
        self.commit_transfer(caller, to, amount);
        Ok(())
    }

    /// Precondition probe for an allowance-pulled transfer; no mutation.
    pub fn can_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<()> {
        if amount > self.allowance(from, spender) {
            return Err(LedgerError::InsufficientAllowance);
        }
        self.check_transfer(spender, from, to, amount)
    }

    /// Pull `amount` from `from` under the caller's allowance and push it to
    /// `to` through the compliant transfer path. The allowance is consumed
    /// on commit, never exceeded.
    pub fn transfer_from(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<()> {
        self.can_transfer_from(caller, from, to, amount)?;
        let remaining = self.allowance(from, caller) - amount;
        self.allowances.insert((*from, *caller), remaining);
        self.commit_transfer(from, to, amount);
        Ok(())
    }

    /// Agent-only recovery path: bypasses pause and frozen flags but not
    /// receiver verification. Dips into the frozen window if the free
    /// balance does not cover the amount, clamping the frozen amount.
    pub fn forced_transfer(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Transfer amount must be greater than zero".to_string(),
            ));
        }
        let balance = self.balance_of(from);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance);
        }
        if !self.registry.read().is_verified(to) {
            return Err(LedgerError::NotVerified(address_to_hex(to)));
        }
        let remaining = balance - amount;
        let frozen = self.frozen_tokens(from);
        if frozen > remaining {
            self.frozen_amounts.insert(*from, remaining);
        }
        self.commit_transfer(from, to, amount);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Supply
    // ------------------------------------------------------------------

    fn check_supply_op_allowed(&self) -> Result<()> {
        if self.paused && !self.supply_ops_while_paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    pub fn mint(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<()> {
        self.roles.require_agent(caller)?;
        self.check_supply_op_allowed()?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Mint amount must be greater than zero".to_string(),
            ));
        }
        if !self.registry.read().is_verified(to) {
            return Err(LedgerError::NotVerified(address_to_hex(to)));
        }
        self.compliance
            .read()
            .can_create(to, amount)
            .map_err(LedgerError::ComplianceRejected)?;
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount("Total supply overflow".to_string()))?;

        self.total_supply = supply;
        *self.balances.entry(*to).or_insert(0) += amount;
        self.compliance.write().created(to, amount);
        tracing::debug!(to = %address_to_hex(to), amount, "mint committed");
        Ok(())
    }

    /// Burn dips into the frozen window (recovery semantics), clamping the
    /// frozen amount to the remaining balance.
    pub fn burn(&mut self, caller: &Address, from: &Address, amount: u64) -> Result<()> {
        self.roles.require_agent(caller)?;
        self.check_supply_op_allowed()?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Burn amount must be greater than zero".to_string(),
            ));
        }
        let balance = self.balance_of(from);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance);
        }
        if !self.registry.read().is_verified(from) {
            return Err(LedgerError::NotVerified(address_to_hex(from)));
        }
        self.compliance
            .read()
            .can_destroy(from, amount)
            .map_err(LedgerError::ComplianceRejected)?;

        let remaining = balance - amount;
        self.balances.insert(*from, remaining);
        self.total_supply -= amount;
        let frozen = self.frozen_tokens(from);
        if frozen > remaining {
            self.frozen_amounts.insert(*from, remaining);
        }
        self.compliance.write().destroyed(from, amount);
        tracing::debug!(from = %address_to_hex(from), amount, "burn committed");
        Ok(())
    }
}

/// Weak balance probe handed to the identity registry so identity deletion
/// can see this token's balances without a reference cycle.
pub struct TokenBalanceSource {
    address: Address,
    token: Weak<RwLock<Token>>,
}

impl TokenBalanceSource {
    pub fn new(token: &SharedToken) -> Self {
        let address = token.read().address();
        TokenBalanceSource {
            address,
            token: Arc::downgrade(token),
        }
    }
}

impl BalanceSource for TokenBalanceSource {
    fn asset_address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, holder: &Address) -> u64 {
        self.token
            .upgrade()
            .map(|token| token.read().balance_of(holder))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimVerifier;
    use crate::crypto::address_from_string;
    use crate::identity::Identity;

    struct Fixture {
        owner: Address,
        agent: Address,
        alice: Address,
        bob: Address,
        registry: Arc<RwLock<IdentityRegistry>>,
        token: Token,
    }

    /// Suite with no required claim topics: registered holders are verified.
    fn fixture() -> Fixture {
        let owner = address_from_string("owner");
        let agent = address_from_string("agent");
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");

        let verifier = Arc::new(RwLock::new(ClaimVerifier::new(owner)));
        let registry = Arc::new(RwLock::new(IdentityRegistry::new(owner, verifier)));
        {
            let mut r = registry.write();
            r.roles_mut().add_agent(&owner, agent).unwrap();
            r.register_identity(
                &agent,
                alice,
                Identity::new(address_from_string("alice-id"), alice, 42),
            )
            .unwrap();
            r.register_identity(
                &agent,
                bob,
                Identity::new(address_from_string("bob-id"), bob, 250),
            )
            .unwrap();
        }
        let compliance = Arc::new(RwLock::new(ModularCompliance::new(owner)));
        let mut token = Token::new(
            owner,
            address_from_string("token"),
            "Test Asset",
            "TST",
            8,
            address_from_string("token-id"),
            registry.clone(),
            compliance,
        );
        token.roles_mut().add_agent(&owner, agent).unwrap();
        token.mint(&agent, &alice, 1_000).unwrap();
        token.unpause(&agent).unwrap();

        Fixture {
            owner,
            agent,
            alice,
            bob,
            registry,
            token,
        }
    }

    fn assert_conservation(token: &Token, holders: &[Address]) {
        let sum: u64 = holders.iter().map(|h| token.balance_of(h)).sum();
        assert_eq!(sum, token.total_supply());
    }

    #[test]
    fn mint_and_transfer_conserve_supply() {
        let mut f = fixture();
        f.token.transfer(&f.alice, &f.bob, 100).unwrap();
        assert_eq!(f.token.balance_of(&f.alice), 900);
        assert_eq!(f.token.balance_of(&f.bob), 100);
        assert_conservation(&f.token, &[f.alice, f.bob]);

        f.token.burn(&f.agent, &f.bob, 50).unwrap();
        assert_eq!(f.token.total_supply(), 950);
        assert_conservation(&f.token, &[f.alice, f.bob]);
    }

    #[test]
    fn identical_transfer_is_not_deduplicated() {
        let mut f = fixture();
        f.token.transfer(&f.alice, &f.bob, 100).unwrap();
        f.token.transfer(&f.alice, &f.bob, 100).unwrap();
        assert_eq!(f.token.balance_of(&f.alice), 800);
        assert_eq!(f.token.balance_of(&f.bob), 200);
    }

    #[test]
    fn transfer_to_unverified_holder_fails() {
        let mut f = fixture();
        let mallory = address_from_string("mallory");
        let result = f.token.transfer(&f.alice, &mallory, 100);
        assert!(matches!(result, Err(LedgerError::NotVerified(_))));
        assert_eq!(f.token.balance_of(&f.alice), 1_000);
    }

    #[test]
    fn paused_token_blocks_transfers_not_supply() {
        let mut f = fixture();
        f.token.pause(&f.agent).unwrap();
        assert_eq!(
            f.token.transfer(&f.alice, &f.bob, 1),
            Err(LedgerError::Paused)
        );
        // Default policy lets agents mint while paused
        f.token.mint(&f.agent, &f.alice, 10).unwrap();
        assert_eq!(f.token.balance_of(&f.alice), 1_010);
    }

    #[test]
    fn strict_pause_policy_blocks_supply_ops() {
        let f = fixture();
        let compliance = Arc::new(RwLock::new(ModularCompliance::new(f.owner)));
        let mut token = Token::new(
            f.owner,
            address_from_string("strict"),
            "Strict",
            "STR",
            8,
            address_from_string("strict-id"),
            f.registry.clone(),
            compliance,
        )
        .with_supply_ops_while_paused(false);
        token.roles_mut().add_agent(&f.owner, f.agent).unwrap();
        assert_eq!(token.mint(&f.agent, &f.alice, 10), Err(LedgerError::Paused));
    }

    #[test]
    fn frozen_flag_and_frozen_amount_block_transfers() {
        let mut f = fixture();
        f.token.set_address_frozen(&f.agent, f.alice, true).unwrap();
        assert!(matches!(
            f.token.transfer(&f.alice, &f.bob, 1),
            Err(LedgerError::Frozen(_))
        ));
        f.token.set_address_frozen(&f.agent, f.alice, false).unwrap();

        f.token.freeze_partial_tokens(&f.agent, &f.alice, 950).unwrap();
        assert_eq!(
            f.token.transfer(&f.alice, &f.bob, 100),
            Err(LedgerError::InsufficientBalance)
        );
        f.token.transfer(&f.alice, &f.bob, 50).unwrap();

        // Cannot freeze past the balance
        let result = f.token.freeze_partial_tokens(&f.agent, &f.alice, 1);
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn forced_transfer_bypasses_pause_and_freeze() {
        let mut f = fixture();
        f.token.pause(&f.agent).unwrap();
        f.token.set_address_frozen(&f.agent, f.alice, true).unwrap();
        f.token.forced_transfer(&f.agent, &f.alice, &f.bob, 100).unwrap();
        assert_eq!(f.token.balance_of(&f.bob), 100);

        // Ordinary callers cannot use the recovery path
        assert_eq!(
            f.token.forced_transfer(&f.alice, &f.alice, &f.bob, 1),
            Err(LedgerError::Unauthorized)
        );
    }

    #[test]
    fn forced_transfer_clamps_frozen_window() {
        let mut f = fixture();
        f.token.freeze_partial_tokens(&f.agent, &f.alice, 1_000).unwrap();
        f.token.forced_transfer(&f.agent, &f.alice, &f.bob, 400).unwrap();
        assert_eq!(f.token.frozen_tokens(&f.alice), 600);
        assert_eq!(f.token.balance_of(&f.alice), 600);
    }

    #[test]
    fn allowance_is_consumed_never_exceeded() {
        let mut f = fixture();
        let platform = address_from_string("platform");
        f.registry
            .write()
            .register_identity(
                &f.agent,
                platform,
                Identity::new(address_from_string("platform-id"), platform, 1),
            )
            .unwrap();

        f.token.approve(&f.alice, platform, 100).unwrap();
        f.token.transfer_from(&platform, &f.alice, &f.bob, 100).unwrap();
        assert_eq!(f.token.allowance(&f.alice, &platform), 0);

        let result = f.token.transfer_from(&platform, &f.alice, &f.bob, 100);
        assert_eq!(result, Err(LedgerError::InsufficientAllowance));
        assert_eq!(f.token.balance_of(&f.bob), 100);
    }

    #[test]
    fn burn_clamps_frozen_amount() {
        let mut f = fixture();
        f.token.freeze_partial_tokens(&f.agent, &f.alice, 900).unwrap();
        f.token.burn(&f.agent, &f.alice, 500).unwrap();
        assert_eq!(f.token.balance_of(&f.alice), 500);
        assert_eq!(f.token.frozen_tokens(&f.alice), 500);
    }

    #[test]
    fn balance_source_reflects_token_balances() {
        let f = fixture();
        let alice = f.alice;
        let shared: SharedToken = Arc::new(RwLock::new(f.token));
        let source = TokenBalanceSource::new(&shared);
        assert_eq!(source.balance_of(&alice), 1_000);
        assert_eq!(source.asset_address(), address_from_string("token"));

        drop(shared);
        // A dropped token reports zero rather than erroring
        assert_eq!(source.balance_of(&alice), 0);
    }
}
