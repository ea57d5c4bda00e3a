#![allow(dead_code)]

use async_trait::async_trait;
use cardroute::application::orchestrator::{AuthorizationRequest, PaymentOrchestrator};
use cardroute::config::{Adapters, GatewayConfig};
use cardroute::domain::card::CardDetails;
use cardroute::domain::money::Currency;
use cardroute::domain::network::Network;
use cardroute::domain::ports::{CardProcessor, ProcessorAuthorization};
use cardroute::domain::risk::RiskContext;
use cardroute::error::Result;
use cardroute::infrastructure::codec::MaskingPanCodec;
use cardroute::infrastructure::emulator::EmulatedCardProcessor;
use cardroute::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryTokenStore};
use cardroute::infrastructure::signals::NoRiskSignals;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Card processor double that counts calls and records which networks and
/// card numbers it was asked to authorize on.
pub struct RecordingProcessor {
    inner: EmulatedCardProcessor,
    delay: Option<Duration>,
    refuse_settlement: bool,
    pub authorizations: AtomicUsize,
    pub captures: AtomicUsize,
    pub voids: AtomicUsize,
    pub refunds: AtomicUsize,
    pub routed: Mutex<Vec<(Network, String)>>,
}

impl RecordingProcessor {
    pub fn new(inner: EmulatedCardProcessor) -> Self {
        Self {
            inner,
            delay: None,
            refuse_settlement: false,
            authorizations: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
            voids: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            routed: Mutex::new(Vec::new()),
        }
    }

    pub fn reliable() -> Self {
        Self::new(EmulatedCardProcessor::reliable().with_seed(42))
    }

    /// Sleeps before every call so concurrent callers overlap.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    /// Approves authorizations but answers `false` to capture, void and
    /// refund.
    pub fn refusing_settlement(self) -> Self {
        Self {
            refuse_settlement: true,
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
            + self.captures.load(Ordering::SeqCst)
            + self.voids.load(Ordering::SeqCst)
            + self.refunds.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CardProcessor for RecordingProcessor {
    async fn authorize(
        &self,
        card: &CardDetails,
        amount: Decimal,
        currency: &Currency,
        network: Network,
    ) -> Result<ProcessorAuthorization> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        self.routed
            .lock()
            .unwrap()
            .push((network, card.number.clone()));
        self.pause().await;
        self.inner.authorize(card, amount, currency, network).await
    }

    async fn capture(&self, transaction_id: &str, amount: Decimal, currency: &Currency) -> Result<bool> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.refuse_settlement {
            return Ok(false);
        }
        self.inner.capture(transaction_id, amount, currency).await
    }

    async fn void(&self, transaction_id: &str) -> Result<bool> {
        self.voids.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.refuse_settlement {
            return Ok(false);
        }
        self.inner.void(transaction_id).await
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal, currency: &Currency) -> Result<bool> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.refuse_settlement {
            return Ok(false);
        }
        self.inner.refund(transaction_id, amount, currency).await
    }
}

pub struct Gateway {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub processor: Arc<RecordingProcessor>,
    pub payments: InMemoryPaymentStore,
}

pub fn gateway() -> Gateway {
    gateway_with(RecordingProcessor::reliable())
}

pub fn gateway_with(processor: RecordingProcessor) -> Gateway {
    let processor = Arc::new(processor);
    let payments = InMemoryPaymentStore::new();
    let adapters = Adapters {
        payments: Arc::new(payments.clone()),
        tokens: Arc::new(InMemoryTokenStore::new()),
        processor: processor.clone(),
        signals: Arc::new(NoRiskSignals),
        codec: Arc::new(MaskingPanCodec::with_seed(42)),
    };
    let orchestrator = GatewayConfig::default()
        .orchestrator(adapters, Some(42))
        .unwrap();
    Gateway {
        orchestrator: Arc::new(orchestrator),
        processor,
        payments,
    }
}

/// A low-risk grocery purchase from an established customer.
pub fn low_risk() -> RiskContext {
    RiskContext {
        merchant_category_code: Some("5411".to_string()),
        previous_successful: 20,
        ..RiskContext::default()
    }
}

pub fn card_request(merchant: &str, reference: &str, amount: Decimal, number: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        merchant_id: merchant.to_string(),
        merchant_reference: reference.to_string(),
        amount,
        currency: "USD".to_string(),
        card: Some(CardDetails::new(number, 12, 2099)),
        token_reference: None,
        risk: low_risk(),
    }
}

pub fn token_request(merchant: &str, reference: &str, amount: Decimal, token: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        card: None,
        token_reference: Some(token.to_string()),
        ..card_request(merchant, reference, amount, "")
    }
}

pub const BATCH_HEADER: [&str; 12] = [
    "op",
    "merchant",
    "reference",
    "amount",
    "currency",
    "card_number",
    "expiry_month",
    "expiry_year",
    "token",
    "networks",
    "mcc",
    "prior_success",
];

/// Writes `rows` authorize-then-capture pairs for distinct references.
pub fn generate_batch_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);
    wtr.write_record(BATCH_HEADER)?;

    for i in 1..=rows {
        let reference = format!("order-{}", i);
        wtr.write_record([
            "authorize",
            "m-1",
            &reference,
            "25.00",
            "USD",
            "4000001234567899",
            "12",
            "2099",
            "",
            "",
            "5411",
            "20",
        ])?;
        wtr.write_record(["capture", "m-1", &reference])?;
    }

    wtr.flush()?;
    Ok(())
}
