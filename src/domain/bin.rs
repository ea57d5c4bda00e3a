use super::network::Network;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardType {
    #[default]
    Credit,
    Debit,
    Prepaid,
}

/// Descriptive issuer attributes attached to a BIN range.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerProfile {
    pub card_type: CardType,
    pub issuer: String,
    pub issuer_name: String,
    pub country_code: String,
    pub product_type: Option<String>,
    pub prepaid: bool,
    pub corporate: bool,
    pub commercial: bool,
}

impl IssuerProfile {
    pub fn new(card_type: CardType, issuer: &str, issuer_name: &str, country_code: &str) -> Self {
        Self {
            card_type,
            issuer: issuer.to_string(),
            issuer_name: issuer_name.to_string(),
            country_code: country_code.to_string(),
            ..Self::default()
        }
    }
}

/// An inclusive range of fixed-width card prefixes owned by one network.
///
/// Ranges for different networks may overlap (co-badged debit cards).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: String,
    pub end: String,
    pub network: Network,
    #[serde(default)]
    pub profile: IssuerProfile,
}

impl BinRange {
    pub fn new(start: &str, end: &str, network: Network, profile: IssuerProfile) -> Result<Self> {
        let range = Self {
            start: start.to_string(),
            end: end.to_string(),
            network,
            profile,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !numeric(&self.start) || !numeric(&self.end) {
            return Err(PaymentError::ValidationError(format!(
                "BIN range bounds must be numeric: {}-{}",
                self.start, self.end
            )));
        }
        if self.start.len() != self.end.len() {
            return Err(PaymentError::ValidationError(format!(
                "BIN range bounds must have the same width: {}-{}",
                self.start, self.end
            )));
        }
        if self.start > self.end {
            return Err(PaymentError::ValidationError(format!(
                "BIN range start is after its end: {}-{}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.start.len()
    }

    /// Normalizes `prefix` to this range's width and tests containment.
    pub fn contains(&self, prefix: &str) -> bool {
        let width = self.width();
        let normalized = if prefix.len() >= width {
            match prefix.get(..width) {
                Some(head) => head.to_string(),
                None => return false,
            }
        } else {
            format!("{:0<width$}", prefix, width = width)
        };
        normalized.as_str() >= self.start.as_str() && normalized.as_str() <= self.end.as_str()
    }

    pub fn same_bounds(&self, other: &BinRange) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// One BIN match: the network and issuer data a card prefix resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardBinInfo {
    pub bin: String,
    pub network: Network,
    pub profile: IssuerProfile,
}
