//! Modular compliance engine
//!
//! An ordered collection of pluggable rule modules consulted before every
//! balance mutation and notified after every commit. Pre-checks can veto a
//! mutation; post-commit hooks only observe and may never roll one back.

use crate::access::Roles;
use crate::crypto::Address;
use crate::error::{LedgerError, Result};

/// A pluggable compliance rule. Modules keep their own private state, fed by
/// the post-commit hooks; detaching a module discards that state.
pub trait ComplianceModule: Send + Sync {
    /// Stable name used for attachment bookkeeping and diagnostics.
    fn name(&self) -> &str;

    /// Pre-check for a transfer. `spender` is the executing party: the
    /// holder itself for a direct transfer, the allowance spender for a
    /// pulled one. `false` vetoes the whole operation.
    fn can_transfer(&self, spender: &Address, from: &Address, to: &Address, amount: u64) -> bool;

    /// Pre-check for a mint.
    fn can_create(&self, _to: &Address, _amount: u64) -> bool {
        true
    }

    /// Pre-check for a burn.
    fn can_destroy(&self, _from: &Address, _amount: u64) -> bool {
        true
    }

    /// Post-commit notification of an executed transfer.
    fn transferred(&mut self, _from: &Address, _to: &Address, _amount: u64) {}

    /// Post-commit notification of an executed mint.
    fn created(&mut self, _to: &Address, _amount: u64) {}

    /// Post-commit notification of an executed burn.
    fn destroyed(&mut self, _from: &Address, _amount: u64) {}
}

/// Ordered module list with owner-gated attachment.
pub struct ModularCompliance {
    roles: Roles,
    modules: Vec<Box<dyn ComplianceModule>>,
}

impl ModularCompliance {
    pub fn new(owner: Address) -> Self {
        ModularCompliance {
            roles: Roles::new(owner),
            modules: Vec::new(),
        }
    }

    pub fn add_module(&mut self, caller: &Address, module: Box<dyn ComplianceModule>) -> Result<()> {
        self.roles.require_owner(caller)?;
        if self.modules.iter().any(|m| m.name() == module.name()) {
            return Err(LedgerError::InvalidState(format!(
                "Module {} already attached",
                module.name()
            )));
        }
        tracing::debug!(module = module.name(), "compliance module attached");
        self.modules.push(module);
        Ok(())
    }

    /// Detach a module by name. Its private state is gone for good.
    pub fn remove_module(&mut self, caller: &Address, name: &str) -> Result<()> {
        self.roles.require_owner(caller)?;
        let before = self.modules.len();
        self.modules.retain(|m| m.name() != name);
        if self.modules.len() == before {
            return Err(LedgerError::InvalidState(format!(
                "Module {} not attached",
                name
            )));
        }
        Ok(())
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Logical AND across every module, short-circuiting on the first veto.
    /// Returns the name of the vetoing module so the caller can surface a
    /// specific `ComplianceRejected`.
    pub fn can_transfer(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> std::result::Result<(), String> {
        for module in &self.modules {
            if !module.can_transfer(spender, from, to, amount) {
                return Err(module.name().to_string());
            }
        }
        Ok(())
    }

    pub fn can_create(&self, to: &Address, amount: u64) -> std::result::Result<(), String> {
        for module in &self.modules {
            if !module.can_create(to, amount) {
                return Err(module.name().to_string());
            }
        }
        Ok(())
    }

    pub fn can_destroy(&self, from: &Address, amount: u64) -> std::result::Result<(), String> {
        for module in &self.modules {
            if !module.can_destroy(from, amount) {
                return Err(module.name().to_string());
            }
        }
        Ok(())
    }

    /// Post-commit hooks fire for every module in attachment order,
    /// unconditionally; the ledger mutation is already final.
    pub fn transferred(&mut self, from: &Address, to: &Address, amount: u64) {
        for module in &mut self.modules {
            module.transferred(from, to, amount);
        }
    }

    pub fn created(&mut self, to: &Address, amount: u64) {
        for module in &mut self.modules {
            module.created(to, amount);
        }
    }

    pub fn destroyed(&mut self, from: &Address, amount: u64) {
        for module in &mut self.modules {
            module.destroyed(from, amount);
        }
    }
}
