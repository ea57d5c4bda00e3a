use crate::domain::money::Currency;
use crate::domain::network::{Network, Representation};
use crate::domain::routing::{FeeTable, RoutingCost, RoutingOutcome, RoutingResult};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Least-cost network selection over a read-only fee table.
#[derive(Debug, Clone)]
pub struct RoutingOptimizer {
    fees: Arc<FeeTable>,
    min_authorization_rate: Decimal,
}

impl RoutingOptimizer {
    pub const DEFAULT_MIN_AUTHORIZATION_RATE: Decimal = dec!(0.01);

    pub fn new(fees: FeeTable, min_authorization_rate: Decimal) -> Result<Self> {
        if min_authorization_rate <= Decimal::ZERO || min_authorization_rate > Decimal::ONE {
            return Err(PaymentError::ValidationError(format!(
                "Minimum authorization rate must be within (0, 1], got {}",
                min_authorization_rate
            )));
        }
        Ok(Self {
            fees: Arc::new(fees),
            min_authorization_rate,
        })
    }

    pub fn with_default_fees() -> Self {
        Self {
            fees: Arc::new(default_fee_table()),
            min_authorization_rate: Self::DEFAULT_MIN_AUTHORIZATION_RATE,
        }
    }

    pub fn fee_table(&self) -> &FeeTable {
        &self.fees
    }

    /// Picks the (network, representation) pair with the lowest expected cost.
    ///
    /// Candidates without a fee entry are skipped; `NoRoute` is returned only
    /// when nothing at all could be priced. Token prices are considered only
    /// when `token_available` is set. Ties go to the earliest candidate.
    pub fn select_network(
        &self,
        amount: Decimal,
        currency: &Currency,
        candidates: &[Network],
        token_available: bool,
    ) -> Result<RoutingOutcome> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "Routing amount must be positive, got {}",
                amount
            )));
        }

        let representations: &[Representation] = if token_available {
            &[Representation::Pan, Representation::Token]
        } else {
            &[Representation::Pan]
        };

        let mut best: Option<(Network, Representation, Decimal)> = None;
        let mut all_options = BTreeMap::new();

        for &network in candidates {
            for &representation in representations {
                let Some(entry) = self.fees.get(network, representation) else {
                    debug!(%network, %representation, "no fee entry, skipping option");
                    continue;
                };
                let cost = entry.expected_cost(amount, self.min_authorization_rate)?;
                all_options
                    .entry(network)
                    .and_modify(|known: &mut Decimal| *known = (*known).min(cost))
                    .or_insert(cost);
                if best.is_none_or(|(_, _, lowest)| cost < lowest) {
                    best = Some((network, representation, cost));
                }
            }
        }

        match best {
            Some((network, representation, expected_cost)) => {
                info!(
                    %network,
                    %representation,
                    cost = %expected_cost.round_dp(4),
                    %currency,
                    options = all_options.len(),
                    "route selected"
                );
                Ok(RoutingOutcome::Routed(RoutingResult {
                    network,
                    representation,
                    expected_cost,
                    all_options,
                }))
            }
            None => {
                info!(candidates = candidates.len(), "no priced routing option");
                Ok(RoutingOutcome::NoRoute)
            }
        }
    }

    /// Nominal PAN fee for one attempt on `network`.
    pub fn network_cost(&self, network: Network, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "Amount must be positive, got {}",
                amount
            )));
        }
        self.fees
            .get(network, Representation::Pan)
            .ok_or_else(|| {
                PaymentError::ValidationError(format!("No fee schedule for network {}", network))
            })?
            .nominal_cost(amount)
    }
}

impl Default for RoutingOptimizer {
    fn default() -> Self {
        Self::with_default_fees()
    }
}

/// Reference fee schedule: PAN and token pricing for every network.
pub fn default_fee_table_entries() -> Vec<RoutingCost> {
    use Network::*;
    use Representation::{Pan, Token};
    let entry = |network, representation, fixed_fee, percentage_fee, authorization_rate| RoutingCost {
        network,
        representation,
        fixed_fee,
        percentage_fee,
        authorization_rate,
    };
    vec![
        entry(Visa, Pan, dec!(0.10), dec!(0.015), dec!(0.82)),
        entry(Visa, Token, dec!(0.09), dec!(0.014), dec!(0.85)),
        entry(Mastercard, Pan, dec!(0.12), dec!(0.014), dec!(0.83)),
        entry(Mastercard, Token, dec!(0.11), dec!(0.013), dec!(0.86)),
        entry(Amex, Pan, dec!(0.15), dec!(0.022), dec!(0.80)),
        entry(Amex, Token, dec!(0.14), dec!(0.021), dec!(0.83)),
        entry(Discover, Pan, dec!(0.10), dec!(0.016), dec!(0.85)),
        entry(Discover, Token, dec!(0.09), dec!(0.015), dec!(0.87)),
        entry(Accel, Pan, dec!(0.05), dec!(0.005), dec!(0.80)),
        entry(Accel, Token, dec!(0.04), dec!(0.0045), dec!(0.82)),
        entry(Star, Pan, dec!(0.04), dec!(0.004), dec!(0.79)),
        entry(Star, Token, dec!(0.03), dec!(0.0035), dec!(0.81)),
        entry(Nyce, Pan, dec!(0.03), dec!(0.003), dec!(0.77)),
        entry(Nyce, Token, dec!(0.025), dec!(0.0025), dec!(0.79)),
        entry(Pulse, Pan, dec!(0.03), dec!(0.0035), dec!(0.84)),
        entry(Pulse, Token, dec!(0.025), dec!(0.003), dec!(0.86)),
        entry(Maestro, Pan, dec!(0.08), dec!(0.01), dec!(0.83)),
        entry(Maestro, Token, dec!(0.07), dec!(0.009), dec!(0.85)),
    ]
}

pub fn default_fee_table() -> FeeTable {
    let mut table = FeeTable::default();
    table.extend(default_fee_table_entries());
    table
}
