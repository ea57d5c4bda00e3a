use crate::application::bin_resolver::{default_bin_ranges, BinResolver};
use crate::application::orchestrator::PaymentOrchestrator;
use crate::application::risk::RiskScorer;
use crate::application::routing::{default_fee_table_entries, RoutingOptimizer};
use crate::application::token_vault::{
    default_token_bin_ranges, TokenVault, DEFAULT_TOKEN_VALIDITY_MONTHS,
};
use crate::domain::bin::BinRange;
use crate::domain::network::Network;
use crate::domain::ports::{
    SharedCardProcessor, SharedPanCodec, SharedPaymentStore, SharedRiskSignals, SharedTokenStore,
};
use crate::domain::routing::{FeeTable, RoutingCost};
use crate::domain::token::TokenBinRange;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// The adapters a gateway is assembled from.
pub struct Adapters {
    pub payments: SharedPaymentStore,
    pub tokens: SharedTokenStore,
    pub processor: SharedCardProcessor,
    pub signals: SharedRiskSignals,
    pub codec: SharedPanCodec,
}

/// Gateway tables and tunables. Every field falls back to the built-in
/// reference data when absent from the JSON document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub token_validity_months: u32,
    pub fallback_token_network: Network,
    /// Floor applied to authorization rates when computing expected cost.
    pub min_authorization_rate: Decimal,
    pub bin_ranges: Vec<BinRange>,
    pub token_bin_ranges: Vec<TokenBinRange>,
    pub fee_table: Vec<RoutingCost>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token_validity_months: DEFAULT_TOKEN_VALIDITY_MONTHS,
            fallback_token_network: Network::Visa,
            min_authorization_rate: RoutingOptimizer::DEFAULT_MIN_AUTHORIZATION_RATE,
            bin_ranges: default_bin_ranges(),
            token_bin_ranges: default_token_bin_ranges(),
            fee_table: default_fee_table_entries(),
        }
    }
}

impl GatewayConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn bin_resolver(&self) -> Result<BinResolver> {
        BinResolver::new(self.bin_ranges.clone())
    }

    pub fn routing_optimizer(&self) -> Result<RoutingOptimizer> {
        let fees = FeeTable::new(self.fee_table.iter().cloned())?;
        RoutingOptimizer::new(fees, self.min_authorization_rate)
    }

    pub fn token_vault(&self, store: SharedTokenStore, codec: SharedPanCodec) -> Result<TokenVault> {
        TokenVault::new(
            store,
            codec,
            self.token_bin_ranges.clone(),
            self.token_validity_months,
            self.fallback_token_network,
        )
    }

    /// Wires the application services over `adapters`. `seed` makes token
    /// value generation reproducible.
    pub fn orchestrator(&self, adapters: Adapters, seed: Option<u64>) -> Result<PaymentOrchestrator> {
        let mut vault = self.token_vault(adapters.tokens, adapters.codec)?;
        if let Some(seed) = seed {
            vault = vault.with_seed(seed);
        }
        Ok(PaymentOrchestrator::new(
            adapters.payments,
            adapters.processor,
            Arc::new(self.bin_resolver()?),
            Arc::new(vault),
            Arc::new(self.routing_optimizer()?),
            Arc::new(RiskScorer::new(adapters.signals)),
        ))
    }
}
