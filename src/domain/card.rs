use crate::error::{PaymentError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw card data as submitted by a merchant or recovered from the vault.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub holder_name: Option<String>,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: Option<String>,
}

impl CardDetails {
    pub fn new(number: impl Into<String>, expiry_month: u32, expiry_year: i32) -> Self {
        Self {
            number: number.into(),
            holder_name: None,
            expiry_month,
            expiry_year,
            cvv: None,
        }
    }

    /// First six digits, or an empty string for implausibly short numbers.
    pub fn bin(&self) -> &str {
        self.number.get(..6).unwrap_or("")
    }

    pub fn last_four(&self) -> &str {
        self.number
            .len()
            .checked_sub(4)
            .and_then(|start| self.number.get(start..))
            .unwrap_or("")
    }

    /// A card is usable through the last day of its expiry month.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        (self.expiry_year, self.expiry_month) < (today.year(), today.month())
    }

    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        let len = self.number.len();
        if !(12..=19).contains(&len) || !self.number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::ValidationError(
                "Card number must be 12-19 digits".to_string(),
            ));
        }
        if !(1..=12).contains(&self.expiry_month) {
            return Err(PaymentError::ValidationError(format!(
                "Invalid expiry month: {}",
                self.expiry_month
            )));
        }
        if self.is_expired_on(today) {
            return Err(PaymentError::ValidationError(
                "Card has expired".to_string(),
            ));
        }
        Ok(())
    }
}

// Never print the full PAN.
impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("bin", &self.bin())
            .field("last_four", &self.last_four())
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}
