use crate::domain::payment::Payment;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Flat projection of a payment for reporting. Only BIN and last four of
/// the card are ever written.
#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    payment_id: &'a str,
    merchant: &'a str,
    reference: &'a str,
    status: String,
    amount: Decimal,
    currency: &'a str,
    captured: Decimal,
    refunded: Decimal,
    network: Option<String>,
    representation: Option<String>,
    routing_cost: Option<Decimal>,
    risk_score: Option<String>,
    risk_band: Option<String>,
    auth_code: Option<&'a str>,
    token_reference: Option<&'a str>,
    card_bin: Option<&'a str>,
    card_last_four: Option<&'a str>,
    failure_reason: Option<&'a str>,
}

impl<'a> From<&'a Payment> for PaymentRow<'a> {
    fn from(payment: &'a Payment) -> Self {
        Self {
            payment_id: payment.id_str(),
            merchant: &payment.merchant_id,
            reference: &payment.merchant_reference,
            status: payment.status.to_string(),
            amount: payment.amount.value(),
            currency: payment.amount.currency().as_str(),
            captured: payment.captured_amount,
            refunded: payment.refunded_amount,
            network: payment.selected_network.map(|n| n.to_string()),
            representation: payment.representation.map(|r| r.to_string()),
            routing_cost: payment.routing_cost,
            risk_score: payment.risk.map(|r| format!("{:.2}", r.score)),
            risk_band: payment.risk.map(|r| r.band.to_string()),
            auth_code: payment.auth_code.as_deref(),
            token_reference: payment.token_reference.as_deref(),
            card_bin: payment.card.as_ref().map(|c| c.bin.as_str()),
            card_last_four: payment.card.as_ref().map(|c| c.last_four.as_str()),
            failure_reason: payment.failure_reason.as_deref(),
        }
    }
}

pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes a header followed by one row per payment, then flushes.
    pub fn write_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
        let mut wrote_any = false;
        for payment in payments {
            self.writer.serialize(PaymentRow::from(payment))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record(HEADER)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

const HEADER: [&str; 18] = [
    "payment_id",
    "merchant",
    "reference",
    "status",
    "amount",
    "currency",
    "captured",
    "refunded",
    "network",
    "representation",
    "routing_cost",
    "risk_score",
    "risk_band",
    "auth_code",
    "token_reference",
    "card_bin",
    "card_last_four",
    "failure_reason",
];
