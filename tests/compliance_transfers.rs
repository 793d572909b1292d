//! Integration tests for identity-gated, compliance-gated transfers

use parking_lot::RwLock;
use std::sync::Arc;
use trustmint::claims::{claim_topic, Claim, ClaimTopic, ClaimVerifier};
use trustmint::compliance::modules::MaxBalanceModule;
use trustmint::compliance::{ComplianceModule, ModularCompliance};
use trustmint::crypto::{address_from_string, signing_key_hash, Address, KeyPair};
use trustmint::error::LedgerError;
use trustmint::identity::{Identity, IdentityRegistry};
use trustmint::token::{SharedToken, Token, TokenBalanceSource};

struct Suite {
    owner: Address,
    agent: Address,
    issuer: Address,
    issuer_signing_key: KeyPair,
    topic: ClaimTopic,
    verifier: Arc<RwLock<ClaimVerifier>>,
    registry: Arc<RwLock<IdentityRegistry>>,
    compliance: Arc<RwLock<ModularCompliance>>,
    token: SharedToken,
}

impl Suite {
    /// Onboard a holder with a fresh identity and a valid claim for the
    /// required topic.
    fn onboard(&self, holder: Address) -> Result<(), Box<dyn std::error::Error>> {
        let id = address_from_string(&format!("id-{}", hex::encode(&holder[..8])));
        self.registry
            .write()
            .register_identity(&self.agent, holder, Identity::new(id, holder, 42))?;
        let claim = Claim::issue(
            &self.issuer_signing_key,
            self.issuer,
            &id,
            self.topic,
            b"kyc passed".to_vec(),
        )?;
        self.registry.write().add_claim(&holder, &id, claim)?;
        Ok(())
    }
}

/// Deploy a full suite: one required topic, one trusted issuer, an empty
/// compliance engine, and an unpaused token.
fn deploy_suite() -> Result<Suite, Box<dyn std::error::Error>> {
    let owner = address_from_string("owner");
    let agent = address_from_string("agent");
    let issuer = address_from_string("issuer");
    let issuer_signing_key = KeyPair::generate()?;
    let topic = claim_topic("CLAIM_TOPIC");

    let verifier = Arc::new(RwLock::new(ClaimVerifier::new(owner)));
    {
        let mut v = verifier.write();
        v.topics.add_claim_topic(&owner, topic)?;
        v.issuers.add_trusted_issuer(&owner, issuer, vec![topic])?;
        v.issuers.add_signing_key(
            &issuer,
            &issuer,
            signing_key_hash(&issuer_signing_key.public_key_bytes()),
        )?;
    }

    let registry = Arc::new(RwLock::new(IdentityRegistry::new(owner, verifier.clone())));
    registry.write().roles_mut().add_agent(&owner, agent)?;

    let compliance = Arc::new(RwLock::new(ModularCompliance::new(owner)));
    let token = Arc::new(RwLock::new(Token::new(
        owner,
        address_from_string("token"),
        "Test Asset",
        "TST",
        8,
        address_from_string("token-id"),
        registry.clone(),
        compliance.clone(),
    )));
    token.write().roles_mut().add_agent(&owner, agent)?;
    registry
        .write()
        .bind_token(&owner, Box::new(TokenBalanceSource::new(&token)))?;
    token.write().unpause(&agent)?;

    Ok(Suite {
        owner,
        agent,
        issuer,
        issuer_signing_key,
        topic,
        verifier,
        registry,
        compliance,
        token,
    })
}

#[test]
fn transfer_succeeds_only_after_receiver_verification() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");

    suite.onboard(alice)?;
    suite.token.write().mint(&suite.agent, &alice, 1_000)?;

    // Bob is unregistered: the transfer must fail with NotVerified and
    // leave both balances untouched
    let result = suite.token.write().transfer(&alice, &bob, 100);
    assert!(matches!(result, Err(LedgerError::NotVerified(_))));
    assert_eq!(suite.token.read().balance_of(&alice), 1_000);
    assert_eq!(suite.token.read().balance_of(&bob), 0);

    // After registration plus a valid claim, the identical transfer succeeds
    suite.onboard(bob)?;
    suite.token.write().transfer(&alice, &bob, 100)?;
    assert_eq!(suite.token.read().balance_of(&alice), 900);
    assert_eq!(suite.token.read().balance_of(&bob), 100);
    Ok(())
}

#[test]
fn balances_always_sum_to_total_supply() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;

    suite.token.write().mint(&suite.agent, &alice, 1_000)?;
    suite.token.write().mint(&suite.agent, &bob, 500)?;
    suite.token.write().transfer(&alice, &bob, 250)?;
    suite.token.write().burn(&suite.agent, &bob, 100)?;
    suite.token.write().transfer(&bob, &alice, 50)?;

    let token = suite.token.read();
    let sum = token.balance_of(&alice) + token.balance_of(&bob);
    assert_eq!(sum, token.total_supply());
    assert_eq!(token.total_supply(), 1_400);
    Ok(())
}

#[test]
fn resubmitted_transfer_executes_again() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;
    suite.token.write().mint(&suite.agent, &alice, 1_000)?;

    // No dedup: both submissions deduct
    suite.token.write().transfer(&alice, &bob, 300)?;
    suite.token.write().transfer(&alice, &bob, 300)?;
    assert_eq!(suite.token.read().balance_of(&alice), 400);
    assert_eq!(suite.token.read().balance_of(&bob), 600);
    Ok(())
}

struct RejectAll;
impl ComplianceModule for RejectAll {
    fn name(&self) -> &str {
        "reject-all"
    }
    fn can_transfer(
        &self,
        _spender: &Address,
        _from: &Address,
        _to: &Address,
        _amount: u64,
    ) -> bool {
        false
    }
}

#[test]
fn reject_all_module_vetoes_every_transfer() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;
    suite.token.write().mint(&suite.agent, &alice, 1_000)?;

    suite
        .compliance
        .write()
        .add_module(&suite.owner, Box::new(RejectAll))?;

    // Verified, funded, unpaused -- still rejected by compliance
    let result = suite.token.write().transfer(&alice, &bob, 1);
    assert_eq!(
        result,
        Err(LedgerError::ComplianceRejected("reject-all".to_string()))
    );

    // Detaching the module restores transfers
    suite
        .compliance
        .write()
        .remove_module(&suite.owner, "reject-all")?;
    suite.token.write().transfer(&alice, &bob, 1)?;
    Ok(())
}

#[test]
fn max_balance_module_tracks_state_across_operations(
) -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;

    suite
        .compliance
        .write()
        .add_module(&suite.owner, Box::new(MaxBalanceModule::new(500)))?;

    suite.token.write().mint(&suite.agent, &alice, 500)?;
    // Alice is at the cap; minting more is vetoed
    let result = suite.token.write().mint(&suite.agent, &alice, 1);
    assert_eq!(
        result,
        Err(LedgerError::ComplianceRejected("max-balance".to_string()))
    );

    // Moving some away frees room, observed via the post-commit hooks
    suite.token.write().transfer(&alice, &bob, 200)?;
    suite.token.write().mint(&suite.agent, &alice, 200)?;
    assert_eq!(suite.token.read().balance_of(&alice), 500);
    Ok(())
}

#[test]
fn untrusting_the_issuer_unverifies_holders_at_use_time(
) -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;
    suite.token.write().mint(&suite.agent, &alice, 1_000)?;
    suite.token.write().transfer(&alice, &bob, 100)?;

    suite
        .verifier
        .write()
        .issuers
        .remove_trusted_issuer(&suite.owner, &suite.issuer)?;

    // Claims from the removed issuer no longer verify anyone
    let result = suite.token.write().transfer(&alice, &bob, 100);
    assert!(matches!(result, Err(LedgerError::NotVerified(_))));
    Ok(())
}

#[test]
fn revoked_claim_blocks_future_transfers() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    let bob = address_from_string("bob");
    suite.onboard(alice)?;
    suite.onboard(bob)?;
    suite.token.write().mint(&suite.agent, &alice, 1_000)?;

    let bob_id = suite
        .registry
        .read()
        .identity_of(&bob)
        .map(|identity| identity.id)
        .expect("bob is registered");
    let digest = Claim::digest(&bob_id, &suite.topic, b"kyc passed");
    suite
        .verifier
        .write()
        .issuers
        .revoke_claim(&suite.issuer, &suite.issuer, digest)?;

    let result = suite.token.write().transfer(&alice, &bob, 100);
    assert!(matches!(result, Err(LedgerError::NotVerified(_))));
    assert_eq!(suite.token.read().balance_of(&alice), 1_000);
    Ok(())
}

#[test]
fn identity_deletion_blocked_while_balance_remains() -> Result<(), Box<dyn std::error::Error>> {
    let suite = deploy_suite()?;
    let alice = address_from_string("alice");
    suite.onboard(alice)?;
    suite.token.write().mint(&suite.agent, &alice, 10)?;

    let result = suite.registry.write().delete_identity(&suite.agent, &alice);
    assert!(matches!(result, Err(LedgerError::NonzeroBalance(_))));

    suite.token.write().burn(&suite.agent, &alice, 10)?;
    suite.registry.write().delete_identity(&suite.agent, &alice)?;
    assert!(!suite.registry.read().contains(&alice));
    Ok(())
}
