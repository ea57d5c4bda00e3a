use crate::domain::card::CardDetails;
use crate::domain::money::Currency;
use crate::domain::network::Network;
use crate::domain::ports::{CardProcessor, ProcessorAuthorization};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Builder;

pub const DEFAULT_FAILURE_RATE: f64 = 0.05;
pub const DEFAULT_DECLINE_RATE: f64 = 0.10;

const RRN_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RRN_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerStatus {
    Authorized,
    Captured,
    Voided,
    PartiallyRefunded,
    Refunded,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    network: Network,
    currency: Currency,
    captured: Decimal,
    refunded: Decimal,
    status: LedgerStatus,
}

/// A stand-in card network backend with random network failures and issuer
/// declines. Seed it for reproducible runs.
pub struct EmulatedCardProcessor {
    failure_rate: f64,
    decline_rate: f64,
    latency: Option<(Duration, Duration)>,
    rng: Mutex<StdRng>,
    ledger: AsyncMutex<HashMap<String, LedgerEntry>>,
}

impl EmulatedCardProcessor {
    pub fn new(failure_rate: f64, decline_rate: f64) -> Result<Self> {
        for (name, rate) in [("failure", failure_rate), ("decline", decline_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(PaymentError::ValidationError(format!(
                    "Emulator {} rate must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }
        Ok(Self {
            failure_rate,
            decline_rate,
            latency: None,
            rng: Mutex::new(StdRng::from_entropy()),
            ledger: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Never fails and never declines.
    pub fn reliable() -> Self {
        Self {
            failure_rate: 0.0,
            decline_rate: 0.0,
            latency: None,
            rng: Mutex::new(StdRng::from_entropy()),
            ledger: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Sleeps for a random duration in `[min, max]` before every call.
    pub fn with_latency(self, min: Duration, max: Duration) -> Self {
        Self {
            latency: Some((min, max.max(min))),
            ..self
        }
    }

    fn roll(&self, rate: f64) -> bool {
        rate > 0.0 && self.rng().gen_bool(rate)
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some((min, max)) = self.latency {
            let delay = self.rng().gen_range(min..=max);
            tokio::time::sleep(delay).await;
        }
    }

    fn approval(&self) -> (String, String, String) {
        let mut rng = self.rng();
        let auth_code = format!("{:06}", rng.gen_range(0..1_000_000u32));
        let rrn: String = (0..RRN_LENGTH)
            .map(|_| char::from(RRN_ALPHABET[rng.gen_range(0..RRN_ALPHABET.len())]))
            .collect();
        let transaction_id = Builder::from_random_bytes(rng.r#gen()).into_uuid().to_string();
        (auth_code, rrn, transaction_id)
    }
}

impl Default for EmulatedCardProcessor {
    fn default() -> Self {
        Self {
            failure_rate: DEFAULT_FAILURE_RATE,
            decline_rate: DEFAULT_DECLINE_RATE,
            ..Self::reliable()
        }
    }
}

#[async_trait]
impl CardProcessor for EmulatedCardProcessor {
    async fn authorize(
        &self,
        card: &CardDetails,
        amount: Decimal,
        currency: &Currency,
        network: Network,
    ) -> Result<ProcessorAuthorization> {
        self.simulate_latency().await;

        if self.roll(self.failure_rate) {
            warn!(%network, bin = card.bin(), "emulated network error");
            return Err(PaymentError::ProcessorError(
                "Network error processing transaction".to_string(),
            ));
        }
        if self.roll(self.decline_rate) {
            info!(%network, bin = card.bin(), "emulated issuer decline");
            return Ok(ProcessorAuthorization::Declined {
                message: "Authorization declined by issuer".to_string(),
            });
        }

        let (auth_code, retrieval_reference, transaction_id) = self.approval();
        self.ledger.lock().await.insert(
            transaction_id.clone(),
            LedgerEntry {
                network,
                currency: currency.clone(),
                captured: Decimal::ZERO,
                refunded: Decimal::ZERO,
                status: LedgerStatus::Authorized,
            },
        );
        debug!(%transaction_id, %network, %amount, %currency, "emulated authorization");
        Ok(ProcessorAuthorization::Approved {
            auth_code,
            retrieval_reference,
            transaction_id,
        })
    }

    async fn capture(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<bool> {
        self.simulate_latency().await;
        let mut ledger = self.ledger.lock().await;
        let Some(entry) = ledger.get_mut(transaction_id) else {
            warn!(%transaction_id, "capture for unknown transaction");
            return Ok(false);
        };
        // The gateway may modify the amount after authorization, so the
        // capture amount is not checked against the original.
        if entry.status != LedgerStatus::Authorized || *currency != entry.currency {
            warn!(%transaction_id, status = ?entry.status, "capture rejected by ledger");
            return Ok(false);
        }
        if self.roll(self.failure_rate) {
            warn!(%transaction_id, "emulated capture failure");
            return Ok(false);
        }
        entry.status = LedgerStatus::Captured;
        entry.captured = amount;
        debug!(%transaction_id, network = %entry.network, %amount, "emulated capture");
        Ok(true)
    }

    async fn void(&self, transaction_id: &str) -> Result<bool> {
        self.simulate_latency().await;
        let mut ledger = self.ledger.lock().await;
        let Some(entry) = ledger.get_mut(transaction_id) else {
            warn!(%transaction_id, "void for unknown transaction");
            return Ok(false);
        };
        if entry.status != LedgerStatus::Authorized {
            warn!(%transaction_id, status = ?entry.status, "void rejected by ledger");
            return Ok(false);
        }
        if self.roll(self.failure_rate) {
            warn!(%transaction_id, "emulated void failure");
            return Ok(false);
        }
        entry.status = LedgerStatus::Voided;
        debug!(%transaction_id, "emulated void");
        Ok(true)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<bool> {
        self.simulate_latency().await;
        let mut ledger = self.ledger.lock().await;
        let Some(entry) = ledger.get_mut(transaction_id) else {
            warn!(%transaction_id, "refund for unknown transaction");
            return Ok(false);
        };
        let refundable = matches!(
            entry.status,
            LedgerStatus::Captured | LedgerStatus::PartiallyRefunded
        );
        if !refundable
            || amount > entry.captured - entry.refunded
            || *currency != entry.currency
        {
            warn!(%transaction_id, status = ?entry.status, "refund rejected by ledger");
            return Ok(false);
        }
        if self.roll(self.failure_rate) {
            warn!(%transaction_id, "emulated refund failure");
            return Ok(false);
        }
        entry.refunded += amount;
        entry.status = if entry.refunded == entry.captured {
            LedgerStatus::Refunded
        } else {
            LedgerStatus::PartiallyRefunded
        };
        debug!(%transaction_id, %amount, "emulated refund");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    async fn approved(processor: &EmulatedCardProcessor, amount: Decimal) -> String {
        let card = CardDetails::new("4000001234567899", 12, 2030);
        match processor
            .authorize(&card, amount, &usd(), Network::Visa)
            .await
            .unwrap()
        {
            ProcessorAuthorization::Approved {
                auth_code,
                retrieval_reference,
                transaction_id,
            } => {
                assert_eq!(auth_code.len(), 6);
                assert!(auth_code.bytes().all(|b| b.is_ascii_digit()));
                assert_eq!(retrieval_reference.len(), 12);
                assert!(retrieval_reference.bytes().all(|b| RRN_ALPHABET.contains(&b)));
                transaction_id
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ledger_enforces_lifecycle() {
        let processor = EmulatedCardProcessor::reliable().with_seed(9);
        let txn = approved(&processor, dec!(100)).await;

        assert!(!processor.refund(&txn, dec!(10), &usd()).await.unwrap());
        let eur = Currency::new("EUR").unwrap();
        assert!(!processor.capture(&txn, dec!(80), &eur).await.unwrap());
        assert!(processor.capture(&txn, dec!(80), &usd()).await.unwrap());
        assert!(!processor.void(&txn).await.unwrap());
        assert!(processor.refund(&txn, dec!(30), &usd()).await.unwrap());
        assert!(!processor.refund(&txn, dec!(50.01), &usd()).await.unwrap());
        assert!(processor.refund(&txn, dec!(50), &usd()).await.unwrap());
        assert!(!processor.refund(&txn, dec!(0.01), &usd()).await.unwrap());
        assert!(!processor.capture("missing", dec!(1), &usd()).await.unwrap());
    }

    #[tokio::test]
    async fn test_capture_may_exceed_original_authorization() {
        let processor = EmulatedCardProcessor::reliable().with_seed(4);
        let txn = approved(&processor, dec!(10)).await;
        assert!(processor.capture(&txn, dec!(12.50), &usd()).await.unwrap());
        assert!(processor.refund(&txn, dec!(12.50), &usd()).await.unwrap());
    }

    #[tokio::test]
    async fn test_void_only_once() {
        let processor = EmulatedCardProcessor::reliable();
        let txn = approved(&processor, dec!(5)).await;
        assert!(processor.void(&txn).await.unwrap());
        assert!(!processor.void(&txn).await.unwrap());
        assert!(!processor.capture(&txn, dec!(5), &usd()).await.unwrap());
    }

    #[tokio::test]
    async fn test_certain_failure_and_decline() {
        let card = CardDetails::new("4000001234567899", 12, 2030);
        let failing = EmulatedCardProcessor::new(1.0, 0.0).unwrap();
        assert!(matches!(
            failing.authorize(&card, dec!(1), &usd(), Network::Visa).await,
            Err(PaymentError::ProcessorError(_))
        ));

        let declining = EmulatedCardProcessor::new(0.0, 1.0).unwrap();
        assert!(matches!(
            declining
                .authorize(&card, dec!(1), &usd(), Network::Visa)
                .await
                .unwrap(),
            ProcessorAuthorization::Declined { .. }
        ));
    }

    #[tokio::test]
    async fn test_seeded_runs_repeat() {
        let a = approved(&EmulatedCardProcessor::reliable().with_seed(5), dec!(1)).await;
        let b = approved(&EmulatedCardProcessor::reliable().with_seed(5), dec!(1)).await;
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_invalid_rates() {
        assert!(EmulatedCardProcessor::new(1.5, 0.0).is_err());
        assert!(EmulatedCardProcessor::new(0.0, -0.1).is_err());
    }
}
