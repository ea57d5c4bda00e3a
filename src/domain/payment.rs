use super::bin::CardType;
use super::money::{Amount, Money};
use super::network::{Network, Representation};
use super::risk::RiskAssessment;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PaymentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    PartiallyCaptured,
    Refunded,
    PartiallyRefunded,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }

    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured
                | PaymentStatus::PartiallyCaptured
                | PaymentStatus::PartiallyRefunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::PartiallyCaptured => "PARTIALLY_CAPTURED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The payment lifecycle transition table.
pub fn transition_allowed(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Created, Authorized)
            | (Created, Failed)
            | (Authorized, Captured)
            | (Authorized, PartiallyCaptured)
            | (Authorized, Cancelled)
            | (Captured, Refunded)
            | (Captured, PartiallyRefunded)
            | (PartiallyCaptured, Refunded)
            | (PartiallyCaptured, PartiallyRefunded)
            | (PartiallyRefunded, Refunded)
            | (PartiallyRefunded, PartiallyRefunded)
    )
}

/// Non-sensitive card data kept on the payment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub bin: String,
    pub last_four: String,
    pub card_type: Option<CardType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Assigned by the store on first save.
    pub id: Option<PaymentId>,
    pub merchant_id: String,
    pub merchant_reference: String,
    pub amount: Money,
    pub captured_amount: Decimal,
    pub refunded_amount: Decimal,
    pub status: PaymentStatus,
    pub auth_code: Option<String>,
    pub retrieval_reference: Option<String>,
    pub processor_transaction_id: Option<String>,
    pub selected_network: Option<Network>,
    pub representation: Option<Representation>,
    pub routing_cost: Option<Decimal>,
    pub risk: Option<RiskAssessment>,
    pub token_reference: Option<String>,
    pub card: Option<CardSummary>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(merchant_id: &str, merchant_reference: &str, amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            merchant_id: merchant_id.to_string(),
            merchant_reference: merchant_reference.to_string(),
            amount,
            captured_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            status: PaymentStatus::Created,
            auth_code: None,
            retrieval_reference: None,
            processor_transaction_id: None,
            selected_network: None,
            representation: None,
            routing_cost: None,
            risk: None,
            token_reference: None,
            card: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id_str(&self) -> &str {
        self.id.as_ref().map(PaymentId::as_str).unwrap_or("")
    }

    pub fn transition(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        if !transition_allowed(self.status, to) {
            return Err(PaymentError::ValidationError(format!(
                "Payment cannot move from {} to {}",
                self.status, to
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(PaymentStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn authorize(
        &mut self,
        auth_code: String,
        retrieval_reference: String,
        transaction_id: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.transition(PaymentStatus::Authorized, now)?;
        self.auth_code = Some(auth_code);
        self.retrieval_reference = Some(retrieval_reference);
        self.processor_transaction_id = Some(transaction_id);
        Ok(())
    }

    pub fn processor_transaction(&self) -> Result<&str> {
        self.processor_transaction_id.as_deref().ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "No processor transaction for payment {}",
                self.id_str()
            ))
        })
    }

    /// Validates a capture request without mutating; `None` means the full
    /// authorized amount.
    pub fn check_capture(&self, requested: Option<Decimal>) -> Result<Amount> {
        if self.status != PaymentStatus::Authorized {
            return Err(PaymentError::ValidationError(format!(
                "Only authorized payments can be captured (status {})",
                self.status
            )));
        }
        let amount = Amount::new(requested.unwrap_or(self.amount.value())).map_err(|_| {
            PaymentError::ValidationError("Capture amount must be positive".to_string())
        })?;
        if amount.value() > self.amount.value() {
            return Err(PaymentError::ValidationError(format!(
                "Capture amount cannot exceed the authorized amount: {}",
                self.amount.value()
            )));
        }
        Ok(amount)
    }

    pub fn apply_capture(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let next = if amount.value() == self.amount.value() {
            PaymentStatus::Captured
        } else {
            PaymentStatus::PartiallyCaptured
        };
        self.transition(next, now)?;
        self.captured_amount = amount.value();
        Ok(())
    }

    pub fn refundable_amount(&self) -> Decimal {
        self.captured_amount - self.refunded_amount
    }

    /// Validates a refund request; `None` means the whole remaining balance.
    pub fn check_refund(&self, requested: Option<Decimal>) -> Result<Amount> {
        if !self.status.is_refundable() {
            return Err(PaymentError::ValidationError(format!(
                "Only captured payments can be refunded (status {})",
                self.status
            )));
        }
        let remaining = self.refundable_amount();
        let amount = Amount::new(requested.unwrap_or(remaining)).map_err(|_| {
            PaymentError::ValidationError("Refund amount must be positive".to_string())
        })?;
        if amount.value() > remaining {
            return Err(PaymentError::ValidationError(format!(
                "Refund amount cannot exceed the refundable amount: {}",
                remaining
            )));
        }
        Ok(amount)
    }

    pub fn apply_refund(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let refunded = self.refunded_amount + amount.value();
        let next = if refunded == self.captured_amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        self.transition(next, now)?;
        self.refunded_amount = refunded;
        Ok(())
    }

    pub fn modify_amount(&mut self, new_amount: Decimal, now: DateTime<Utc>) -> Result<()> {
        if self.status != PaymentStatus::Authorized {
            return Err(PaymentError::ValidationError(format!(
                "Only authorized payments can be modified (status {})",
                self.status
            )));
        }
        let amount = Amount::new(new_amount).map_err(|_| {
            PaymentError::ValidationError("New amount must be positive".to_string())
        })?;
        self.amount.set_value(amount);
        self.updated_at = now;
        Ok(())
    }
}
