use super::card::CardDetails;
use super::money::Currency;
use super::network::Network;
use super::payment::{Payment, PaymentId};
use super::risk::RiskTransaction;
use super::token::CardToken;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Persistence for payment records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists the payment, assigning an id when it has none.
    async fn save(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>>;
    async fn find_by_id_and_merchant(
        &self,
        id: &PaymentId,
        merchant_id: &str,
    ) -> Result<Option<Payment>>;
    async fn exists_by_merchant_reference(
        &self,
        merchant_reference: &str,
        merchant_id: &str,
    ) -> Result<bool>;
    async fn find_all(&self) -> Result<Vec<Payment>>;
    async fn delete_by_id(&self, id: &PaymentId) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
}

/// Backing store for the token vault. Implementations must update the
/// reference and value indexes together.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, token: CardToken) -> Result<CardToken>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<CardToken>>;
    async fn find_by_value(&self, value: &str) -> Result<Option<CardToken>>;
    async fn exists_by_reference(&self, reference: &str) -> Result<bool>;
    async fn exists_by_value(&self, value: &str) -> Result<bool>;
    /// Returns false when nothing was stored under `reference`.
    async fn delete_by_reference(&self, reference: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorAuthorization {
    Approved {
        auth_code: String,
        retrieval_reference: String,
        transaction_id: String,
    },
    Declined {
        message: String,
    },
}

/// The card network backend. Calls may block for an unknown time; callers
/// own deadlines and retries.
#[async_trait]
pub trait CardProcessor: Send + Sync {
    async fn authorize(
        &self,
        card: &CardDetails,
        amount: Decimal,
        currency: &Currency,
        network: Network,
    ) -> Result<ProcessorAuthorization>;
    async fn capture(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<bool>;
    async fn void(&self, transaction_id: &str) -> Result<bool>;
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<bool>;
}

/// Pluggable fraud oracles feeding the device/location risk component.
pub trait RiskSignals: Send + Sync {
    fn is_suspicious_ip(&self, ip_address: Option<&str>) -> bool;
    fn is_new_or_risky_device(&self, device_id: Option<&str>) -> bool;
    fn has_location_mismatch(&self, transaction: &RiskTransaction) -> bool;
}

/// Protects PANs at rest inside the vault.
pub trait PanCodec: Send + Sync {
    fn protect(&self, pan: &str) -> String;
    /// Recovers a usable PAN, or `None` if the protected form cannot be
    /// reversed.
    fn reveal(&self, protected: &str) -> Option<String>;
}

pub type SharedPaymentStore = Arc<dyn PaymentStore>;
pub type SharedTokenStore = Arc<dyn TokenStore>;
pub type SharedCardProcessor = Arc<dyn CardProcessor>;
pub type SharedRiskSignals = Arc<dyn RiskSignals>;
pub type SharedPanCodec = Arc<dyn PanCodec>;
