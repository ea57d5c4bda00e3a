//! Application services.
//!
//! `PaymentOrchestrator` is the entry point: it resolves the card's networks
//! through the `BinResolver` or the `TokenVault`, gates on the `RiskScorer`,
//! asks the `RoutingOptimizer` for the cheapest route and drives the card
//! processor. All services are `Send + Sync` and meant to be shared behind
//! `Arc`.

pub mod bin_resolver;
pub mod locks;
pub mod orchestrator;
pub mod risk;
pub mod routing;
pub mod token_vault;
