//! Identity registry: holder bindings, identity records, verification
//!
//! Maps holder addresses to identity records and delegates eligibility
//! checks to the claim verifier. A holder is "verified" when it is bound to
//! an identity carrying at least one currently-valid claim for every
//! required topic.

use crate::access::Roles;
use crate::claims::{Claim, ClaimTopic, ClaimVerifier};
use crate::crypto::{address_to_hex, Address, IdentityId};
use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Numeric country code from the external numeric standard
pub type Country = u16;

/// Atomicity policy for batch registration. The single-entry contract is the
/// same either way; the policies differ in what a mid-batch failure leaves
/// behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Pre-validate every entry; commit all or none.
    Atomic,
    /// Plain loop; a failure on entry i leaves entries 0..i-1 committed.
    BestEffort,
}

/// Durable record representing a participant: a handle, the key that may
/// manage its claims, a country code, and the claims themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub management_key: Address,
    pub country: Country,
    claims: HashMap<ClaimTopic, Vec<Claim>>,
}

impl Identity {
    pub fn new(id: IdentityId, management_key: Address, country: Country) -> Self {
        Identity {
            id,
            management_key,
            country,
            claims: HashMap::new(),
        }
    }

    /// Attach a claim. One claim per (topic, issuer); re-adding replaces.
    fn add_claim(&mut self, claim: Claim) -> Result<()> {
        claim.validate_size()?;
        let slot = self.claims.entry(claim.topic).or_default();
        slot.retain(|c| c.issuer != claim.issuer);
        slot.push(claim);
        Ok(())
    }

    fn remove_claim(&mut self, topic: &ClaimTopic, issuer: &Address) -> Result<()> {
        let slot = self.claims.get_mut(topic).ok_or_else(|| {
            LedgerError::InvalidClaim("No claim for this topic".to_string())
        })?;
        let before = slot.len();
        slot.retain(|c| c.issuer != *issuer);
        if slot.len() == before {
            return Err(LedgerError::InvalidClaim(
                "No claim from this issuer".to_string(),
            ));
        }
        Ok(())
    }

    pub fn claims_for(&self, topic: &ClaimTopic) -> &[Claim] {
        self.claims.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Read-only balance probe a ledger exposes to the registry so identity
/// deletion can refuse to orphan compliant balances.
pub trait BalanceSource: Send + Sync {
    fn asset_address(&self) -> Address;
    fn balance_of(&self, holder: &Address) -> u64;
}

/// Maps holder addresses to identities and answers `is_verified`.
pub struct IdentityRegistry {
    roles: Roles,
    verifier: Arc<RwLock<ClaimVerifier>>,
    identities: HashMap<IdentityId, Identity>,
    bindings: HashMap<Address, IdentityId>,
    bound_tokens: Vec<Box<dyn BalanceSource>>,
    batch_policy: BatchPolicy,
}

impl IdentityRegistry {
    pub fn new(owner: Address, verifier: Arc<RwLock<ClaimVerifier>>) -> Self {
        IdentityRegistry {
            roles: Roles::new(owner),
            verifier,
            identities: HashMap::new(),
            bindings: HashMap::new(),
            bound_tokens: Vec::new(),
            batch_policy: BatchPolicy::BestEffort,
        }
    }

    pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }

    pub fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch_policy
    }

    /// Register a ledger whose balances guard identity deletion.
    pub fn bind_token(&mut self, caller: &Address, source: Box<dyn BalanceSource>) -> Result<()> {
        self.roles.require_owner(caller)?;
        self.bound_tokens.push(source);
        Ok(())
    }

    /// Bind a holder address to an identity. The identity record is stored
    /// on first sight; binding a second holder to the same identity handle
    /// reuses the existing record.
    pub fn register_identity(
        &mut self,
        caller: &Address,
        holder: Address,
        identity: Identity,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        if self.bindings.contains_key(&holder) {
            return Err(LedgerError::AlreadyBound(address_to_hex(&holder)));
        }
        let id = identity.id;
        self.identities.entry(id).or_insert(identity);
        self.bindings.insert(holder, id);
        tracing::debug!(holder = %address_to_hex(&holder), "identity registered");
        Ok(())
    }

    /// Apply the single-registration contract per entry, honoring the
    /// configured batch policy.
    pub fn batch_register_identity(
        &mut self,
        caller: &Address,
        entries: Vec<(Address, Identity)>,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        if self.batch_policy == BatchPolicy::Atomic {
            let mut seen: Vec<Address> = Vec::with_capacity(entries.len());
            for (holder, _) in &entries {
                if self.bindings.contains_key(holder) || seen.contains(holder) {
                    return Err(LedgerError::AlreadyBound(address_to_hex(holder)));
                }
                seen.push(*holder);
            }
        }
        for (holder, identity) in entries {
            self.register_identity(caller, holder, identity)?;
        }
        Ok(())
    }

    /// Rebinding replaces both the binding and the stored identity record;
    /// it never merges history.
    pub fn update_identity(
        &mut self,
        caller: &Address,
        holder: &Address,
        identity: Identity,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        if !self.bindings.contains_key(holder) {
            return Err(LedgerError::NotBound(address_to_hex(holder)));
        }
        let id = identity.id;
        self.identities.insert(id, identity);
        self.bindings.insert(*holder, id);
        Ok(())
    }

    pub fn update_country(
        &mut self,
        caller: &Address,
        holder: &Address,
        country: Country,
    ) -> Result<()> {
        self.roles.require_agent(caller)?;
        let id = self
            .bindings
            .get(holder)
            .copied()
            .ok_or_else(|| LedgerError::NotBound(address_to_hex(holder)))?;
        if let Some(identity) = self.identities.get_mut(&id) {
            identity.country = country;
        }
        Ok(())
    }

    /// Remove a holder's binding. Refused while the holder still carries a
    /// nonzero balance on any bound ledger, so no compliant balance is ever
    /// orphaned. The identity record is dropped once nothing binds to it.
    /// Takes read locks on the bound tokens; callers must not hold a token
    /// lock across this call.
    pub fn delete_identity(&mut self, caller: &Address, holder: &Address) -> Result<()> {
        self.roles.require_agent(caller)?;
        let id = self
            .bindings
            .get(holder)
            .copied()
            .ok_or_else(|| LedgerError::NotBound(address_to_hex(holder)))?;
        for token in &self.bound_tokens {
            if token.balance_of(holder) > 0 {
                return Err(LedgerError::NonzeroBalance(format!(
                    "{} holds a balance on asset {}",
                    address_to_hex(holder),
                    address_to_hex(&token.asset_address())
                )));
            }
        }
        self.bindings.remove(holder);
        if !self.bindings.values().any(|bound| *bound == id) {
            self.identities.remove(&id);
        }
        tracing::debug!(holder = %address_to_hex(holder), "identity deleted");
        Ok(())
    }

    pub fn contains(&self, holder: &Address) -> bool {
        self.bindings.contains_key(holder)
    }

    pub fn identity_of(&self, holder: &Address) -> Option<&Identity> {
        self.bindings
            .get(holder)
            .and_then(|id| self.identities.get(id))
    }

    pub fn investor_country(&self, holder: &Address) -> Option<Country> {
        self.identity_of(holder).map(|identity| identity.country)
    }

    /// Claim mutations are gated on the identity's management key.
    pub fn add_claim(&mut self, caller: &Address, id: &IdentityId, claim: Claim) -> Result<()> {
        let identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotBound(address_to_hex(id)))?;
        if identity.management_key != *caller {
            return Err(LedgerError::Unauthorized);
        }
        identity.add_claim(claim)
    }

    pub fn remove_claim(
        &mut self,
        caller: &Address,
        id: &IdentityId,
        topic: &ClaimTopic,
        issuer: &Address,
    ) -> Result<()> {
        let identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotBound(address_to_hex(id)))?;
        if identity.management_key != *caller {
            return Err(LedgerError::Unauthorized);
        }
        identity.remove_claim(topic, issuer)
    }

    /// True iff the holder is bound and every required topic has at least
    /// one claim that is valid right now. Claim validity is re-checked on
    /// every call; trust revoked upstream takes effect immediately.
    pub fn is_verified(&self, holder: &Address) -> bool {
        let identity = match self.identity_of(holder) {
            Some(identity) => identity,
            None => return false,
        };
        let verifier = self.verifier.read();
        verifier
            .topics
            .required_topics()
            .iter()
            .all(|topic| {
                identity
                    .claims_for(topic)
                    .iter()
                    .any(|claim| verifier.is_claim_valid(&identity.id, claim))
            })
    }
}
