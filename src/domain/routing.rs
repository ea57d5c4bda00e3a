use super::network::{Network, Representation};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fee schedule for one (network, representation) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCost {
    pub network: Network,
    pub representation: Representation,
    pub fixed_fee: Decimal,
    /// Fraction of the amount, e.g. `0.015` for 1.5%.
    pub percentage_fee: Decimal,
    /// Probability in `[0, 1]` that the network approves the authorization.
    pub authorization_rate: Decimal,
}

impl RoutingCost {
    pub fn new(
        network: Network,
        representation: Representation,
        fixed_fee: Decimal,
        percentage_fee: Decimal,
        authorization_rate: Decimal,
    ) -> Result<Self> {
        let cost = Self {
            network,
            representation,
            fixed_fee,
            percentage_fee,
            authorization_rate,
        };
        cost.validate()?;
        Ok(cost)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fixed_fee.is_sign_negative() || self.percentage_fee.is_sign_negative() {
            return Err(PaymentError::ValidationError(format!(
                "Fees for {} {} must not be negative",
                self.network, self.representation
            )));
        }
        if self.authorization_rate < Decimal::ZERO || self.authorization_rate > Decimal::ONE {
            return Err(PaymentError::ValidationError(format!(
                "Authorization rate for {} {} must be within [0, 1]",
                self.network, self.representation
            )));
        }
        Ok(())
    }

    /// Fee charged for a single successful attempt.
    pub fn nominal_cost(&self, amount: Decimal) -> Result<Decimal> {
        amount
            .checked_mul(self.percentage_fee)
            .and_then(|variable| variable.checked_add(self.fixed_fee))
            .ok_or_else(|| self.overflow(amount))
    }

    /// Nominal cost scaled by the expected number of attempts.
    pub fn expected_cost(&self, amount: Decimal, min_rate: Decimal) -> Result<Decimal> {
        self.nominal_cost(amount)?
            .checked_div(self.authorization_rate.max(min_rate))
            .ok_or_else(|| self.overflow(amount))
    }

    fn overflow(&self, amount: Decimal) -> PaymentError {
        PaymentError::ValidationError(format!(
            "Fee for {} {} overflows at amount {}",
            self.network, self.representation, amount
        ))
    }
}

/// Fee entries keyed by network and representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeTable {
    entries: HashMap<(Network, Representation), RoutingCost>,
}

impl FeeTable {
    /// Later entries for the same key replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = RoutingCost>) -> Result<Self> {
        let mut table = Self::default();
        for entry in entries {
            entry.validate()?;
            table
                .entries
                .insert((entry.network, entry.representation), entry);
        }
        Ok(table)
    }

    pub fn get(&self, network: Network, representation: Representation) -> Option<&RoutingCost> {
        self.entries.get(&(network, representation))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RoutingCost> {
        self.entries.values()
    }
}

/// Unchecked insertion for built-in tables; use [`FeeTable::new`] for
/// anything read from configuration.
impl Extend<RoutingCost> for FeeTable {
    fn extend<I: IntoIterator<Item = RoutingCost>>(&mut self, iter: I) {
        for entry in iter {
            self.entries
                .insert((entry.network, entry.representation), entry);
        }
    }
}

/// The cheapest option found for a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResult {
    pub network: Network,
    pub representation: Representation,
    pub expected_cost: Decimal,
    /// Best expected cost per candidate network across representations.
    pub all_options: BTreeMap<Network, Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    Routed(RoutingResult),
    NoRoute,
}
