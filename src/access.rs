//! Owner/agent role sets
//!
//! Every privileged surface in the crate (registries, compliance engine,
//! token, platform) is gated by an explicit role set: a single owner
//! capability plus a list of agent addresses the owner manages.

use crate::crypto::{address_to_hex, Address};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Owner capability plus agent list. Agents get operational privilege
/// (mint/burn/freeze/register); only the owner may change wiring or the
/// agent list itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roles {
    owner: Address,
    agents: BTreeSet<Address>,
}

impl Roles {
    pub fn new(owner: Address) -> Self {
        Roles {
            owner,
            agents: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, caller: &Address) -> bool {
        *caller == self.owner
    }

    pub fn is_agent(&self, caller: &Address) -> bool {
        self.agents.contains(caller)
    }

    /// Privilege check used before any state read so a failed call leaks
    /// nothing beyond the `Unauthorized` kind itself.
    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    pub fn require_agent(&self, caller: &Address) -> Result<()> {
        if self.is_agent(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    pub fn add_agent(&mut self, caller: &Address, agent: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.agents.insert(agent);
        tracing::debug!(agent = %address_to_hex(&agent), "agent added");
        Ok(())
    }

    pub fn remove_agent(&mut self, caller: &Address, agent: &Address) -> Result<()> {
        self.require_owner(caller)?;
        if !self.agents.remove(agent) {
            return Err(LedgerError::InvalidState(format!(
                "{} is not an agent",
                address_to_hex(agent)
            )));
        }
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.owner = new_owner;
        Ok(())
    }
}
