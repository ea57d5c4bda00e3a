use crate::application::bin_resolver::BinResolver;
use crate::application::locks::KeyedLocks;
use crate::application::risk::RiskScorer;
use crate::application::routing::RoutingOptimizer;
use crate::application::token_vault::TokenVault;
use crate::domain::bin::CardType;
use crate::domain::card::CardDetails;
use crate::domain::money::{Currency, Money};
use crate::domain::network::{Network, Representation};
use crate::domain::payment::{CardSummary, Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{ProcessorAuthorization, SharedCardProcessor, SharedPaymentStore};
use crate::domain::risk::{RiskContext, RiskTransaction};
use crate::domain::routing::RoutingOutcome;
use crate::domain::token::CardToken;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A merchant's request to authorize a payment with either raw card data or
/// a vault token reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub merchant_id: String,
    pub merchant_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub card: Option<CardDetails>,
    pub token_reference: Option<String>,
    #[serde(default)]
    pub risk: RiskContext,
}

/// Outcome of an authorization attempt. Business failures are reported here
/// with status `Failed`; `payment_id` is `None` when the request was rejected
/// before a record was created.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResponse {
    pub payment_id: Option<PaymentId>,
    pub merchant_reference: String,
    pub status: PaymentStatus,
    pub message: String,
    pub payment: Option<Payment>,
}

impl AuthorizationResponse {
    fn rejected(merchant_reference: &str, reason: String) -> Self {
        Self {
            payment_id: None,
            merchant_reference: merchant_reference.to_string(),
            status: PaymentStatus::Failed,
            message: reason,
            payment: None,
        }
    }

    fn from_payment(payment: Payment) -> Self {
        let message = match payment.status {
            PaymentStatus::Authorized => "Payment authorized successfully".to_string(),
            _ => payment
                .failure_reason
                .clone()
                .unwrap_or_else(|| payment.status.to_string()),
        };
        Self {
            payment_id: payment.id.clone(),
            merchant_reference: payment.merchant_reference.clone(),
            status: payment.status,
            message,
            payment: Some(payment),
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.status == PaymentStatus::Authorized
    }
}

/// Card identity resolved from the request: what to charge and on which
/// networks.
struct Identity {
    card: CardDetails,
    token: Option<CardToken>,
    candidates: Vec<Network>,
    card_type: Option<CardType>,
}

/// Sequences identity resolution, risk, routing and the card processor for
/// each payment, and owns the payment lifecycle.
///
/// Mutations of one payment are serialized by payment id; authorizations are
/// serialized by merchant reference so a duplicate cannot slip past the
/// existence check.
pub struct PaymentOrchestrator {
    store: SharedPaymentStore,
    processor: SharedCardProcessor,
    bins: Arc<BinResolver>,
    vault: Arc<TokenVault>,
    router: Arc<RoutingOptimizer>,
    scorer: Arc<RiskScorer>,
    payment_locks: KeyedLocks,
    reference_locks: KeyedLocks,
}

impl PaymentOrchestrator {
    pub fn new(
        store: SharedPaymentStore,
        processor: SharedCardProcessor,
        bins: Arc<BinResolver>,
        vault: Arc<TokenVault>,
        router: Arc<RoutingOptimizer>,
        scorer: Arc<RiskScorer>,
    ) -> Self {
        Self {
            store,
            processor,
            bins,
            vault,
            router,
            scorer,
            payment_locks: KeyedLocks::new(),
            reference_locks: KeyedLocks::new(),
        }
    }

    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    /// Authorizes a new payment.
    ///
    /// Returns `Err` only when the payment store itself fails; every other
    /// failure is a `Failed` response, persisted whenever a record exists.
    pub async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationResponse> {
        let amount = match validate_request(&request) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(merchant_reference = %request.merchant_reference, reason = %e, "authorization request rejected");
                return Ok(AuthorizationResponse::rejected(
                    &request.merchant_reference,
                    e.reason(),
                ));
            }
        };

        let reference_key = format!("{}\u{1f}{}", request.merchant_id, request.merchant_reference);
        let _reference_guard = self.reference_locks.lock(&reference_key).await;

        if self
            .store
            .exists_by_merchant_reference(&request.merchant_reference, &request.merchant_id)
            .await?
        {
            warn!(
                merchant_id = %request.merchant_id,
                merchant_reference = %request.merchant_reference,
                "duplicate merchant reference"
            );
            return Ok(AuthorizationResponse::rejected(
                &request.merchant_reference,
                format!("Duplicate merchant reference: {}", request.merchant_reference),
            ));
        }

        let payment = Payment::new(
            &request.merchant_id,
            &request.merchant_reference,
            amount,
            Utc::now(),
        );
        let mut payment = self.store.save(payment).await?;
        let _payment_guard = self.payment_locks.lock(payment.id_str()).await;
        info!(payment_id = payment.id_str(), merchant_id = %payment.merchant_id, "payment created");

        match self.run_authorization(&mut payment, &request).await {
            Ok(()) => {}
            Err(e) if is_infrastructure(&e) => {
                error!(payment_id = payment.id_str(), error = %e, "authorization aborted");
                if payment.fail(e.reason(), Utc::now()).is_ok()
                    && let Err(save_error) = self.store.save(payment.clone()).await
                {
                    error!(payment_id = payment.id_str(), error = %save_error, "could not persist failed payment");
                }
                return Err(e);
            }
            Err(e) => {
                warn!(payment_id = payment.id_str(), reason = %e, "payment failed");
                payment.fail(e.reason(), Utc::now())?;
            }
        }

        let payment = self.store.save(payment).await?;
        Ok(AuthorizationResponse::from_payment(payment))
    }

    /// Every step after the CREATED record exists. Business failures come
    /// back as `Err` for the caller to record.
    async fn run_authorization(
        &self,
        payment: &mut Payment,
        request: &AuthorizationRequest,
    ) -> Result<()> {
        let identity = self.resolve_identity(request).await?;
        payment.token_reference = identity.token.as_ref().map(|t| t.reference.clone());
        payment.card = Some(CardSummary {
            bin: identity.card.bin().to_string(),
            last_four: identity.card.last_four().to_string(),
            card_type: identity.card_type,
        });

        let assessment = self.scorer.assess(&RiskTransaction {
            reference: request.merchant_reference.clone(),
            merchant_id: request.merchant_id.clone(),
            amount: payment.amount.value(),
            currency: payment.amount.currency().to_string(),
            card_bin: identity.card.bin().to_string(),
            context: request.risk.clone(),
        });
        payment.risk = Some(assessment);
        if assessment.band.blocks_payment() {
            warn!(payment_id = payment.id_str(), score = assessment.score, "risk gate rejected payment");
            return Err(PaymentError::RiskRejected {
                score: assessment.score,
                band: assessment.band,
            });
        }

        let routed = match self.router.select_network(
            payment.amount.value(),
            payment.amount.currency(),
            &identity.candidates,
            identity.token.is_some(),
        )? {
            RoutingOutcome::Routed(result) => result,
            RoutingOutcome::NoRoute => {
                return Err(PaymentError::NoRoute(
                    "No routing option available for this transaction".to_string(),
                ));
            }
        };
        payment.selected_network = Some(routed.network);
        payment.representation = Some(routed.representation);
        payment.routing_cost = Some(routed.expected_cost.round_dp(4));
        payment.updated_at = Utc::now();
        *payment = self.store.save(payment.clone()).await?;

        let charged = match (&identity.token, routed.representation) {
            (Some(token), Representation::Token) => {
                CardDetails::new(token.value.clone(), token.expiry_month, token.expiry_year)
            }
            _ => identity.card,
        };

        let outcome = self
            .processor
            .authorize(
                &charged,
                payment.amount.value(),
                payment.amount.currency(),
                routed.network,
            )
            .await;
        match outcome {
            Ok(ProcessorAuthorization::Approved {
                auth_code,
                retrieval_reference,
                transaction_id,
            }) => {
                payment.authorize(auth_code, retrieval_reference, transaction_id, Utc::now())?;
                info!(
                    payment_id = payment.id_str(),
                    network = %routed.network,
                    representation = %routed.representation,
                    cost = ?payment.routing_cost,
                    "payment authorized"
                );
                Ok(())
            }
            Ok(ProcessorAuthorization::Declined { message }) => {
                Err(PaymentError::ProcessorError(message))
            }
            Err(e) => Err(PaymentError::ProcessorError(format!(
                "Authorization failed: {}",
                e.reason()
            ))),
        }
    }

    async fn resolve_identity(&self, request: &AuthorizationRequest) -> Result<Identity> {
        if let Some(reference) = &request.token_reference {
            let token = self.vault.get_by_reference(reference).await?.ok_or_else(|| {
                PaymentError::TokenError(format!("Invalid token reference: {}", reference))
            })?;
            if !self.vault.is_active(reference).await? {
                return Err(PaymentError::TokenError(format!(
                    "Token is not active: {}",
                    reference
                )));
            }
            let card = self.vault.detokenize(reference).await?.ok_or_else(|| {
                PaymentError::TokenError(format!("Failed to detokenize card: {}", reference))
            })?;
            info!(token_reference = %reference, "paying with vault token");
            return Ok(Identity {
                card,
                candidates: token.networks.iter().collect(),
                token: Some(token),
                card_type: None,
            });
        }

        let card = request
            .card
            .clone()
            .ok_or_else(|| PaymentError::ValidationError("Card details are required".to_string()))?;
        card.validate(Utc::now().date_naive())?;

        let matches = self.bins.lookup(card.bin());
        if matches.is_empty() {
            warn!(bin = card.bin(), "no BIN information for card");
            return Err(PaymentError::ValidationError(
                "Invalid card number: no BIN information found".to_string(),
            ));
        }
        let mut candidates = Vec::new();
        for info in &matches {
            if !candidates.contains(&info.network) {
                candidates.push(info.network);
            }
        }
        Ok(Identity {
            card_type: matches.first().map(|info| info.profile.card_type),
            card,
            token: None,
            candidates,
        })
    }

    /// Captures an authorized payment, by default for the full amount.
    ///
    /// A processor failure leaves the payment `Authorized`.
    pub async fn capture(
        &self,
        payment_id: &PaymentId,
        merchant_id: &str,
        amount: Option<Decimal>,
    ) -> Result<Payment> {
        let _guard = self.payment_locks.lock(payment_id.as_str()).await;
        let mut payment = self.load(payment_id, merchant_id).await?;

        let amount = payment.check_capture(amount)?;
        let transaction_id = payment.processor_transaction()?.to_string();
        let captured = self
            .processor
            .capture(&transaction_id, amount.value(), payment.amount.currency())
            .await;
        ensure_processed(captured, "Capture", payment_id)?;

        payment.apply_capture(amount, Utc::now())?;
        let payment = self.store.save(payment).await?;
        info!(payment_id = %payment_id, amount = %amount.value(), status = %payment.status, "payment captured");
        Ok(payment)
    }

    /// Voids an authorized payment.
    pub async fn cancel(&self, payment_id: &PaymentId, merchant_id: &str) -> Result<Payment> {
        let _guard = self.payment_locks.lock(payment_id.as_str()).await;
        let mut payment = self.load(payment_id, merchant_id).await?;

        if payment.status != PaymentStatus::Authorized {
            return Err(PaymentError::ValidationError(format!(
                "Only authorized payments can be cancelled (status {})",
                payment.status
            )));
        }
        let transaction_id = payment.processor_transaction()?.to_string();
        let voided = self.processor.void(&transaction_id).await;
        ensure_processed(voided, "Void", payment_id)?;

        payment.transition(PaymentStatus::Cancelled, Utc::now())?;
        let payment = self.store.save(payment).await?;
        info!(payment_id = %payment_id, "payment cancelled");
        Ok(payment)
    }

    /// Refunds a captured payment, by default the whole remaining balance.
    pub async fn refund(
        &self,
        payment_id: &PaymentId,
        merchant_id: &str,
        amount: Option<Decimal>,
    ) -> Result<Payment> {
        let _guard = self.payment_locks.lock(payment_id.as_str()).await;
        let mut payment = self.load(payment_id, merchant_id).await?;

        let amount = payment.check_refund(amount)?;
        let transaction_id = payment.processor_transaction()?.to_string();
        let refunded = self
            .processor
            .refund(&transaction_id, amount.value(), payment.amount.currency())
            .await;
        ensure_processed(refunded, "Refund", payment_id)?;

        payment.apply_refund(amount, Utc::now())?;
        let payment = self.store.save(payment).await?;
        info!(payment_id = %payment_id, amount = %amount.value(), status = %payment.status, "payment refunded");
        Ok(payment)
    }

    /// Changes the amount of an authorized payment in place.
    pub async fn modify(
        &self,
        payment_id: &PaymentId,
        merchant_id: &str,
        new_amount: Decimal,
    ) -> Result<Payment> {
        let _guard = self.payment_locks.lock(payment_id.as_str()).await;
        let mut payment = self.load(payment_id, merchant_id).await?;
        let previous = payment.amount.value();
        payment.modify_amount(new_amount, Utc::now())?;
        let payment = self.store.save(payment).await?;
        info!(payment_id = %payment_id, %previous, amount = %new_amount, "payment amount modified");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: &PaymentId, merchant_id: &str) -> Result<Payment> {
        self.load(payment_id, merchant_id).await
    }

    pub async fn payment_status(
        &self,
        payment_id: &PaymentId,
        merchant_id: &str,
    ) -> Result<PaymentStatus> {
        Ok(self.load(payment_id, merchant_id).await?.status)
    }

    pub async fn payments_for_merchant(&self, merchant_id: &str) -> Result<Vec<Payment>> {
        Ok(self
            .store
            .find_all()
            .await?
            .into_iter()
            .filter(|payment| payment.merchant_id == merchant_id)
            .collect())
    }

    pub async fn all_payments(&self) -> Result<Vec<Payment>> {
        self.store.find_all().await
    }

    async fn load(&self, payment_id: &PaymentId, merchant_id: &str) -> Result<Payment> {
        self.store
            .find_by_id_and_merchant(payment_id, merchant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Payment not found: {}", payment_id)))
    }
}

fn validate_request(request: &AuthorizationRequest) -> Result<Money> {
    if request.merchant_id.trim().is_empty() || request.merchant_reference.trim().is_empty() {
        return Err(PaymentError::ValidationError(
            "Merchant id and merchant reference are required".to_string(),
        ));
    }
    match (&request.card, &request.token_reference) {
        (Some(_), None) | (None, Some(_)) => {}
        _ => {
            return Err(PaymentError::ValidationError(
                "Request must contain either card details or token reference, but not both"
                    .to_string(),
            ));
        }
    }
    let currency = Currency::new(&request.currency)?;
    Money::new(request.amount, currency.as_str())
}

fn is_infrastructure(error: &PaymentError) -> bool {
    matches!(
        error,
        PaymentError::InternalError(_) | PaymentError::IoError(_) | PaymentError::CsvError(_)
    )
}

/// Collapses a boolean processor call into the error taxonomy. Explicit
/// `false` and transport errors are treated alike.
fn ensure_processed(outcome: Result<bool>, operation: &str, payment_id: &PaymentId) -> Result<()> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(payment_id = %payment_id, operation, "processor refused operation");
            Err(PaymentError::ProcessorError(format!(
                "{} failed for payment: {}",
                operation, payment_id
            )))
        }
        Err(e) => {
            warn!(payment_id = %payment_id, operation, error = %e, "processor call failed");
            Err(PaymentError::ProcessorError(format!(
                "{} failed for payment {}: {}",
                operation,
                payment_id,
                e.reason()
            )))
        }
    }
}
