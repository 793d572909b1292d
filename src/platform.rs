//! Trading venue: escrow intermediary and order book
//!
//! The platform moves ledger balances between verified parties on behalf of
//! users under pre-granted allowances (allowance-pull, no up-front escrow
//! lock) and charges a per-order fee into a fee sink. The platform's own
//! address must itself be onboarded as a verified holder, since the ledger
//! enforces identity checks on both legs of every movement.

use crate::access::Roles;
use crate::crypto::{address_to_hex, Address};
use crate::error::{LedgerError, Result};
use crate::token::SharedToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

/// A two-party trade intent. Mutated only by fill/cancel; `Filled` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub maker: Address,
    pub base_asset: Address,
    pub quote_asset: Address,
    pub amount: u64,
    pub fee_amount: u64,
    pub status: OrderStatus,
    /// RFC3339 timestamp of order placement
    pub created_at: String,
}

pub struct Platform {
    /// The platform's own holder address; the spender on every pulled leg
    address: Address,
    fee_sink: Address,
    roles: Roles,
    assets: HashMap<Address, SharedToken>,
    orders: HashMap<u64, Order>,
    next_order_id: u64,
}

impl Platform {
    pub fn new(operator: Address, address: Address, fee_sink: Address) -> Self {
        Platform {
            address,
            fee_sink,
            roles: Roles::new(operator),
            assets: HashMap::new(),
            orders: HashMap::new(),
            next_order_id: 1,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn fee_sink(&self) -> Address {
        self.fee_sink
    }

    pub fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    pub fn order(&self, order_id: u64) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Make an asset tradable on this venue.
    pub fn register_asset(&mut self, caller: &Address, token: SharedToken) -> Result<()> {
        self.roles.require_owner(caller)?;
        let address = token.read().address();
        if self.assets.contains_key(&address) {
            return Err(LedgerError::InvalidState(format!(
                "Asset {} already registered",
                address_to_hex(&address)
            )));
        }
        self.assets.insert(address, token);
        Ok(())
    }

    fn asset(&self, address: &Address) -> Result<SharedToken> {
        self.assets
            .get(address)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownAsset(address_to_hex(address)))
    }

    /// Pull `amount` of `asset` from the caller's allowance and push it to
    /// `recipient` through the ledger's compliant transfer path.
    pub fn transfer_to(
        &self,
        caller: &Address,
        asset: &Address,
        recipient: &Address,
        amount: u64,
    ) -> Result<()> {
        let token = self.asset(asset)?;
        let result = token
            .write()
            .transfer_from(&self.address, caller, recipient, amount);
        if result.is_ok() {
            tracing::info!(
                asset = %address_to_hex(asset),
                from = %address_to_hex(caller),
                to = %address_to_hex(recipient),
                amount,
                "platform transfer executed"
            );
        }
        result
    }

    /// Create an Open order owned by the caller. Requires the caller to have
    /// already granted the platform an allowance covering the order amount
    /// on the base asset; fills re-check it, since allowances are live.
    pub fn place_order(
        &mut self,
        caller: &Address,
        base_asset: Address,
        quote_asset: Address,
        amount: u64,
        fee_amount: u64,
    ) -> Result<u64> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Order amount must be greater than zero".to_string(),
            ));
        }
        let base = self.asset(&base_asset)?;
        if fee_amount > 0 {
            // Fee leg settles on the quote asset, so it must be tradable here
            self.asset(&quote_asset)?;
        }
        if base.read().allowance(caller, &self.address) < amount {
            return Err(LedgerError::InsufficientAllowance);
        }

        let id = self.next_order_id;
        self.next_order_id += 1;
        let order = Order {
            id,
            maker: *caller,
            base_asset,
            quote_asset,
            amount,
            fee_amount,
            status: OrderStatus::Open,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.orders.insert(id, order);
        tracing::info!(order_id = id, maker = %address_to_hex(caller), "order placed");
        Ok(id)
    }

    /// Settle an Open order against the caller as taker: principal leg
    /// maker -> taker on the base asset, fee leg taker -> fee sink on the
    /// quote asset. Both legs are probed before either commits; if either
    /// would fail, neither balance changes.
    pub fn fill_order(&mut self, caller: &Address, order_id: u64) -> Result<()> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or_else(|| LedgerError::InvalidState(format!("Unknown order {}", order_id)))?
            .clone();
        if order.status != OrderStatus::Open {
            return Err(LedgerError::InvalidState(format!(
                "Order {} is not open",
                order_id
            )));
        }

        let base = self.asset(&order.base_asset)?;
        base.read()
            .can_transfer_from(&self.address, &order.maker, caller, order.amount)?;
        if order.fee_amount > 0 {
            let quote = self.asset(&order.quote_asset)?;
            quote.read().can_transfer_from(
                &self.address,
                caller,
                &self.fee_sink,
                order.fee_amount,
            )?;
        }
        if order.fee_amount > 0 && order.maker == *caller && order.base_asset == order.quote_asset
        {
            // Both legs draw on the same allowance entry; the per-leg probes
            // each see the pre-commit value, so check the combined demand.
            let total = order
                .amount
                .checked_add(order.fee_amount)
                .ok_or_else(|| LedgerError::InvalidAmount("Order total overflow".to_string()))?;
            if base.read().allowance(caller, &self.address) < total {
                return Err(LedgerError::InsufficientAllowance);
            }
        }

        // Both probes passed; execution is serialized, so the commits below
        // observe exactly the probed state.
        base.write()
            .transfer_from(&self.address, &order.maker, caller, order.amount)?;
        if order.fee_amount > 0 {
            let quote = self.asset(&order.quote_asset)?;
            quote.write().transfer_from(
                &self.address,
                caller,
                &self.fee_sink,
                order.fee_amount,
            )?;
        }

        if let Some(stored) = self.orders.get_mut(&order_id) {
            stored.status = OrderStatus::Filled;
        }
        tracing::info!(order_id, taker = %address_to_hex(caller), "order filled");
        Ok(())
    }

    /// Only the maker or a venue operator may cancel, and only while Open.
    /// Nothing to release: the allowance-pull design never locks funds at
    /// placement.
    pub fn cancel_order(&mut self, caller: &Address, order_id: u64) -> Result<()> {
        let is_operator = self.roles.is_owner(caller) || self.roles.is_agent(caller);
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LedgerError::InvalidState(format!("Unknown order {}", order_id)))?;
        if order.maker != *caller && !is_operator {
            return Err(LedgerError::Unauthorized);
        }
        if order.status != OrderStatus::Open {
            return Err(LedgerError::InvalidState(format!(
                "Order {} is not open",
                order_id
            )));
        }
        order.status = OrderStatus::Cancelled;
        tracing::info!(order_id, "order cancelled");
        Ok(())
    }
}
