use crate::domain::card::CardDetails;
use crate::domain::network::Network;
use crate::domain::risk::RiskContext;
use crate::domain::token::NetworkSet;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Authorize,
    Capture,
    Cancel,
    Refund,
    Modify,
    Tokenize,
    SuspendToken,
    ReactivateToken,
}

/// One row of a batch file.
///
/// Payment operations address a payment by `(merchant, reference)`. Token
/// operations use `reference` as the token's alias within the merchant, and
/// an `authorize` row may name that alias in `token`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: CommandType,
    pub merchant: String,
    pub reference: String,
    /// Parsed from the literal text so scale and precision survive.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub card_number: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<i32>,
    pub token: Option<String>,
    /// `|`-separated, for `tokenize`.
    pub networks: Option<String>,
    pub mcc: Option<String>,
    pub prior_success: Option<u32>,
    pub prior_failed: Option<u32>,
    pub prior_chargebacks: Option<u32>,
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
    pub billing_country: Option<String>,
    pub ip_country: Option<String>,
}

impl Command {
    pub fn card(&self) -> Result<Option<CardDetails>> {
        let Some(number) = &self.card_number else {
            return Ok(None);
        };
        match (self.expiry_month, self.expiry_year) {
            (Some(month), Some(year)) => Ok(Some(CardDetails::new(number.clone(), month, year))),
            _ => Err(self.missing("expiry_month and expiry_year")),
        }
    }

    pub fn required_card(&self) -> Result<CardDetails> {
        self.card()?.ok_or_else(|| self.missing("card_number"))
    }

    pub fn required_amount(&self) -> Result<Decimal> {
        self.amount.ok_or_else(|| self.missing("amount"))
    }

    pub fn network_set(&self) -> Result<NetworkSet> {
        let raw = self.networks.as_deref().ok_or_else(|| self.missing("networks"))?;
        let networks = raw
            .split('|')
            .filter(|part| !part.trim().is_empty())
            .map(|part| part.parse::<Network>().map_err(PaymentError::ValidationError))
            .collect::<Result<Vec<_>>>()?;
        NetworkSet::new(networks)
    }

    pub fn risk_context(&self) -> RiskContext {
        RiskContext {
            merchant_category_code: self.mcc.clone(),
            previous_successful: self.prior_success.unwrap_or(0),
            previous_failed: self.prior_failed.unwrap_or(0),
            previous_chargebacks: self.prior_chargebacks.unwrap_or(0),
            ip_address: self.ip_address.clone(),
            device_id: self.device_id.clone(),
            billing_country: self.billing_country.clone(),
            ip_country: self.ip_country.clone(),
        }
    }

    fn missing(&self, field: &str) -> PaymentError {
        PaymentError::ValidationError(format!(
            "{:?} for {}/{} requires {}",
            self.op, self.merchant, self.reference, field
        ))
    }
}

/// Streams batch commands from a CSV source.
///
/// Whitespace is trimmed and rows may omit trailing columns.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
