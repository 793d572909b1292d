//! Claim verification: topics, trusted issuers, signed attestations
//!
//! A claim is a signed attestation that an identity satisfies some topic
//! (e.g. "accredited investor"). Validity is re-checked at use time against
//! the trusted-issuer set and the issuer's keyring; nothing is cached, so
//! removing an issuer or revoking a claim takes effect immediately.

use crate::access::Roles;
use crate::crypto::{signing_key_hash, verify_signature, Address, IdentityId, KeyPair};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

/// 256-bit claim topic identifier
pub type ClaimTopic = [u8; 32];

/// Maximum serialized claim size in bytes to prevent oversized payloads
pub const MAX_CLAIM_SIZE: usize = 8_192;

/// Derive a claim topic from a human-readable label.
pub fn claim_topic(label: &str) -> ClaimTopic {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.finalize().into()
}

/// A signed attestation by a trusted issuer over (subject identity, topic, data).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub topic: ClaimTopic,
    pub issuer: Address,
    /// Opaque payload attested to by the issuer
    pub data: Vec<u8>,
    /// Compact ECDSA signature over the canonical claim message
    pub signature: Vec<u8>,
    /// Compressed public key of the signing key; must be registered on the
    /// issuer's keyring for the claim to be valid
    pub public_key: Vec<u8>,
}

impl Claim {
    /// Canonical byte message the issuer signs.
    pub fn signable_message(identity: &IdentityId, topic: &ClaimTopic, data: &[u8]) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("CLAIM:".as_bytes());
        message.extend_from_slice(identity);
        message.extend_from_slice(topic);
        message.extend_from_slice(data);
        message
    }

    /// Canonical digest identifying a claim, used for revocation.
    pub fn digest(identity: &IdentityId, topic: &ClaimTopic, data: &[u8]) -> [u8; 32] {
        Sha256::digest(Self::signable_message(identity, topic, data)).into()
    }

    /// Sign a new claim for `identity` with the issuer's signing key.
    pub fn issue(
        signing_key: &KeyPair,
        issuer: Address,
        identity: &IdentityId,
        topic: ClaimTopic,
        data: Vec<u8>,
    ) -> Result<Self> {
        let message = Self::signable_message(identity, &topic, &data);
        let signature = signing_key.sign(&message)?;
        let claim = Claim {
            topic,
            issuer,
            data,
            signature: signature.to_vec(),
            public_key: signing_key.public_key_bytes().to_vec(),
        };
        claim.validate_size()?;
        Ok(claim)
    }

    /// Reject oversized claim payloads before they enter any registry.
    pub fn validate_size(&self) -> Result<()> {
        let serialized = bincode::serialize(self)
            .map_err(|e| LedgerError::InvalidClaim(format!("Serialization failed: {}", e)))?;
        if serialized.len() > MAX_CLAIM_SIZE {
            return Err(LedgerError::InvalidClaim(format!(
                "Claim too large: {} bytes (max: {})",
                serialized.len(),
                MAX_CLAIM_SIZE
            )));
        }
        Ok(())
    }
}

/// Per-issuer key material and revocations. Signing keys are stored as
/// hashes of the compressed public key, never as key material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimIssuer {
    signing_keys: HashSet<[u8; 32]>,
    revoked: HashSet<[u8; 32]>,
}

impl ClaimIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signing_key(&mut self, key_hash: [u8; 32]) {
        self.signing_keys.insert(key_hash);
    }

    pub fn remove_signing_key(&mut self, key_hash: &[u8; 32]) -> bool {
        self.signing_keys.remove(key_hash)
    }

    pub fn has_signing_key(&self, key_hash: &[u8; 32]) -> bool {
        self.signing_keys.contains(key_hash)
    }

    /// Revoke a claim by its canonical digest. A revoked claim stays
    /// invalid even if its signature still verifies.
    pub fn revoke_claim(&mut self, claim_digest: [u8; 32]) {
        self.revoked.insert(claim_digest);
    }

    pub fn is_revoked(&self, claim_digest: &[u8; 32]) -> bool {
        self.revoked.contains(claim_digest)
    }
}

/// Ordered set of topics a holder must have valid claims for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTopicsRegistry {
    roles: Roles,
    topics: Vec<ClaimTopic>,
}

impl ClaimTopicsRegistry {
    pub fn new(owner: Address) -> Self {
        ClaimTopicsRegistry {
            roles: Roles::new(owner),
            topics: Vec::new(),
        }
    }

    pub fn add_claim_topic(&mut self, caller: &Address, topic: ClaimTopic) -> Result<()> {
        self.roles.require_owner(caller)?;
        if self.topics.contains(&topic) {
            return Err(LedgerError::InvalidState(
                "Claim topic already required".to_string(),
            ));
        }
        self.topics.push(topic);
        Ok(())
    }

    pub fn remove_claim_topic(&mut self, caller: &Address, topic: &ClaimTopic) -> Result<()> {
        self.roles.require_owner(caller)?;
        let before = self.topics.len();
        self.topics.retain(|t| t != topic);
        if self.topics.len() == before {
            return Err(LedgerError::InvalidState(
                "Claim topic not required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn required_topics(&self) -> &[ClaimTopic] {
        &self.topics
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrustedIssuer {
    topics: BTreeSet<ClaimTopic>,
    keyring: ClaimIssuer,
}

/// Maps issuer addresses to the topics they may attest, plus their keyrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedIssuersRegistry {
    roles: Roles,
    issuers: HashMap<Address, TrustedIssuer>,
}

impl TrustedIssuersRegistry {
    pub fn new(owner: Address) -> Self {
        TrustedIssuersRegistry {
            roles: Roles::new(owner),
            issuers: HashMap::new(),
        }
    }

    /// Trust an issuer for a set of topics. An issuer with no topics is not
    /// trusted for anything, so an empty set is rejected outright.
    pub fn add_trusted_issuer(
        &mut self,
        caller: &Address,
        issuer: Address,
        topics: Vec<ClaimTopic>,
    ) -> Result<()> {
        self.roles.require_owner(caller)?;
        if topics.is_empty() {
            return Err(LedgerError::InvalidState(
                "Trusted issuer must have at least one topic".to_string(),
            ));
        }
        if self.issuers.contains_key(&issuer) {
            return Err(LedgerError::InvalidState(
                "Issuer already trusted".to_string(),
            ));
        }
        self.issuers.insert(
            issuer,
            TrustedIssuer {
                topics: topics.into_iter().collect(),
                keyring: ClaimIssuer::new(),
            },
        );
        Ok(())
    }

    pub fn remove_trusted_issuer(&mut self, caller: &Address, issuer: &Address) -> Result<()> {
        self.roles.require_owner(caller)?;
        if self.issuers.remove(issuer).is_none() {
            return Err(LedgerError::InvalidState("Issuer not trusted".to_string()));
        }
        Ok(())
    }

    pub fn update_issuer_topics(
        &mut self,
        caller: &Address,
        issuer: &Address,
        topics: Vec<ClaimTopic>,
    ) -> Result<()> {
        self.roles.require_owner(caller)?;
        if topics.is_empty() {
            return Err(LedgerError::InvalidState(
                "Trusted issuer must have at least one topic".to_string(),
            ));
        }
        let entry = self
            .issuers
            .get_mut(issuer)
            .ok_or_else(|| LedgerError::InvalidState("Issuer not trusted".to_string()))?;
        entry.topics = topics.into_iter().collect();
        Ok(())
    }

    pub fn is_trusted_for(&self, issuer: &Address, topic: &ClaimTopic) -> bool {
        self.issuers
            .get(issuer)
            .map(|e| e.topics.contains(topic))
            .unwrap_or(false)
    }

    /// Keyring mutations are gated on the issuer itself, not the registry owner.
    pub fn add_signing_key(
        &mut self,
        caller: &Address,
        issuer: &Address,
        key_hash: [u8; 32],
    ) -> Result<()> {
        if caller != issuer {
            return Err(LedgerError::Unauthorized);
        }
        let entry = self
            .issuers
            .get_mut(issuer)
            .ok_or_else(|| LedgerError::InvalidState("Issuer not trusted".to_string()))?;
        entry.keyring.add_signing_key(key_hash);
        Ok(())
    }

    pub fn remove_signing_key(
        &mut self,
        caller: &Address,
        issuer: &Address,
        key_hash: &[u8; 32],
    ) -> Result<()> {
        if caller != issuer {
            return Err(LedgerError::Unauthorized);
        }
        let entry = self
            .issuers
            .get_mut(issuer)
            .ok_or_else(|| LedgerError::InvalidState("Issuer not trusted".to_string()))?;
        if !entry.keyring.remove_signing_key(key_hash) {
            return Err(LedgerError::InvalidState(
                "Signing key not registered".to_string(),
            ));
        }
        Ok(())
    }

    pub fn revoke_claim(
        &mut self,
        caller: &Address,
        issuer: &Address,
        claim_digest: [u8; 32],
    ) -> Result<()> {
        if caller != issuer {
            return Err(LedgerError::Unauthorized);
        }
        let entry = self
            .issuers
            .get_mut(issuer)
            .ok_or_else(|| LedgerError::InvalidState("Issuer not trusted".to_string()))?;
        entry.keyring.revoke_claim(claim_digest);
        Ok(())
    }

    fn keyring(&self, issuer: &Address) -> Option<&ClaimIssuer> {
        self.issuers.get(issuer).map(|e| &e.keyring)
    }
}

/// Validates claims against the required-topic and trusted-issuer sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVerifier {
    pub topics: ClaimTopicsRegistry,
    pub issuers: TrustedIssuersRegistry,
}

impl ClaimVerifier {
    pub fn new(owner: Address) -> Self {
        ClaimVerifier {
            topics: ClaimTopicsRegistry::new(owner),
            issuers: TrustedIssuersRegistry::new(owner),
        }
    }

    /// Point-in-time validity check. Fails closed: any malformed signature,
    /// untrusted issuer, unregistered signing key, revoked digest, or topic
    /// mismatch yields `false`, never an error that a caller could swallow.
    pub fn is_claim_valid(&self, identity: &IdentityId, claim: &Claim) -> bool {
        if claim.validate_size().is_err() {
            return false;
        }
        if !self.issuers.is_trusted_for(&claim.issuer, &claim.topic) {
            return false;
        }
        let keyring = match self.issuers.keyring(&claim.issuer) {
            Some(keyring) => keyring,
            None => return false,
        };
        if !keyring.has_signing_key(&signing_key_hash(&claim.public_key)) {
            return false;
        }
        if keyring.is_revoked(&Claim::digest(identity, &claim.topic, &claim.data)) {
            return false;
        }
        let message = Claim::signable_message(identity, &claim.topic, &claim.data);
        verify_signature(&claim.public_key, &message, &claim.signature).is_ok()
    }
}
