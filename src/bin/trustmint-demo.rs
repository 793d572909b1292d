#![forbid(unsafe_code)]
//! Wires a complete trustmint suite (claim topics, trusted issuer, identity
//! registry, compliance, token, platform), onboards a few holders, and runs
//! an allowance-pulled platform transfer end to end.

use clap::Parser;
use colored::Colorize;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use trustmint::claims::{claim_topic, Claim, ClaimVerifier};
use trustmint::compliance::modules::VenueRoutingModule;
use trustmint::compliance::ModularCompliance;
use trustmint::config::load_config_from;
use trustmint::crypto::{address_from_hex, address_to_hex, signing_key_hash, KeyPair};
use trustmint::identity::{Identity, IdentityRegistry};
use trustmint::platform::Platform;
use trustmint::token::{Token, TokenBalanceSource};

#[derive(Parser, Debug)]
#[command(name = "trustmint-demo", about = "Deploy a full trustmint suite and run a demo trade")]
struct Args {
    /// Path to the policy config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Where to write the suite manifest
    #[arg(long, default_value = "deployed.json")]
    manifest: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config = load_config_from(&args.config)?;

    // Participants
    let deployer = KeyPair::generate()?.address();
    let token_agent = KeyPair::generate()?.address();
    let issuer = KeyPair::generate()?.address();
    let issuer_signing_key = KeyPair::generate()?;
    let alice = KeyPair::generate()?.address();
    let charlie = KeyPair::generate()?.address();
    let fee_sink = match config.platform.fee_sink {
        Some(ref hex) => address_from_hex(hex)?,
        None => KeyPair::generate()?.address(),
    };

    println!("{}", "Deploying claim registries...".bold());
    let topic = claim_topic("CLAIM_TOPIC");
    let verifier = Arc::new(RwLock::new(ClaimVerifier::new(deployer)));
    {
        let mut v = verifier.write();
        v.topics.add_claim_topic(&deployer, topic)?;
        v.issuers.add_trusted_issuer(&deployer, issuer, vec![topic])?;
        v.issuers.add_signing_key(
            &issuer,
            &issuer,
            signing_key_hash(&issuer_signing_key.public_key_bytes()),
        )?;
    }

    println!("{}", "Deploying identity registry and compliance...".bold());
    let registry = Arc::new(RwLock::new(
        IdentityRegistry::new(deployer, verifier).with_batch_policy(config.registry.batch_policy),
    ));
    registry.write().roles_mut().add_agent(&deployer, token_agent)?;
    let compliance = Arc::new(RwLock::new(ModularCompliance::new(deployer)));

    println!("{}", "Deploying token...".bold());
    let token_address = KeyPair::generate()?.address();
    let token_onchain_id = KeyPair::generate()?.address();
    let token = Arc::new(RwLock::new(
        Token::new(
            deployer,
            token_address,
            "Token name",
            "SYM",
            8,
            token_onchain_id,
            registry.clone(),
            compliance.clone(),
        )
        .with_supply_ops_while_paused(config.token.supply_ops_while_paused),
    ));
    token.write().roles_mut().add_agent(&deployer, token_agent)?;
    registry
        .write()
        .bind_token(&deployer, Box::new(TokenBalanceSource::new(&token)))?;

    println!("{}", "Onboarding holders...".bold());
    let entries = vec![
        (alice, Identity::new(KeyPair::generate()?.address(), alice, 42)),
        (charlie, Identity::new(KeyPair::generate()?.address(), charlie, 666)),
    ];
    registry.write().batch_register_identity(&token_agent, entries)?;
    for holder in [alice, charlie] {
        let id = registry
            .read()
            .identity_of(&holder)
            .map(|identity| identity.id)
            .ok_or("holder missing after registration")?;
        let claim = Claim::issue(
            &issuer_signing_key,
            issuer,
            &id,
            topic,
            b"verified participant".to_vec(),
        )?;
        registry.write().add_claim(&holder, &id, claim)?;
    }

    println!("{}", "Deploying platform and its identity...".bold());
    let platform_address = KeyPair::generate()?.address();
    let mut platform = Platform::new(deployer, platform_address, fee_sink);
    platform.register_asset(&deployer, token.clone())?;
    // Trades in this asset must be executed by the platform
    compliance.write().add_module(
        &deployer,
        Box::new(VenueRoutingModule::new(platform_address)),
    )?;
    for holder in [platform_address, fee_sink] {
        let id = KeyPair::generate()?.address();
        registry
            .write()
            .register_identity(&token_agent, holder, Identity::new(id, holder, 666))?;
        let claim = Claim::issue(
            &issuer_signing_key,
            issuer,
            &id,
            topic,
            b"venue participant".to_vec(),
        )?;
        registry.write().add_claim(&holder, &id, claim)?;
    }

    println!("{}", "Minting and unpausing...".bold());
    token.write().mint(&token_agent, &alice, 1_000)?;
    token.write().mint(&token_agent, &platform_address, 1_000)?;
    token.write().unpause(&token_agent)?;

    println!("{}", "Running platform transfer alice -> charlie...".bold());
    println!(
        "  charlie balance before: {}",
        token.read().balance_of(&charlie)
    );
    token.write().approve(&alice, platform_address, 100)?;
    platform.transfer_to(&alice, &token_address, &charlie, 100)?;
    println!(
        "  charlie balance after:  {}",
        token.read().balance_of(&charlie)
    );

    let manifest = serde_json::json!({
        "token": {
            "address": address_to_hex(&token_address),
            "name": token.read().name(),
            "symbol": token.read().symbol(),
            "decimals": token.read().decimals(),
        },
        "platform": {
            "address": address_to_hex(&platform_address),
            "fee_sink": address_to_hex(&fee_sink),
        },
        "accounts": {
            "deployer": address_to_hex(&deployer),
            "token_agent": address_to_hex(&token_agent),
            "claim_issuer": address_to_hex(&issuer),
            "alice": address_to_hex(&alice),
            "charlie": address_to_hex(&charlie),
        },
    });
    std::fs::write(&args.manifest, serde_json::to_string_pretty(&manifest)?)?;
    println!(
        "{} {}",
        "Suite manifest written to".green(),
        args.manifest.display()
    );
    println!("{}", "Finished".green().bold());
    Ok(())
}
