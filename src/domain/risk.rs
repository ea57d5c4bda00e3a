use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    /// Half-open bands: [0, .3), [.3, .7), [.7, .9), [.9, 1].
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            RiskBand::Low
        } else if score < 0.7 {
            RiskBand::Medium
        } else if score < 0.9 {
            RiskBand::High
        } else {
            RiskBand::Critical
        }
    }

    pub fn blocks_payment(&self) -> bool {
        *self == RiskBand::Critical
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::Low => "LOW",
            RiskBand::Medium => "MEDIUM",
            RiskBand::High => "HIGH",
            RiskBand::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub band: RiskBand,
}

impl RiskAssessment {
    pub fn from_score(score: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            band: RiskBand::from_score(score),
        }
    }
}

/// Customer and channel context a merchant may attach to an authorization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskContext {
    pub merchant_category_code: Option<String>,
    pub previous_successful: u32,
    pub previous_failed: u32,
    pub previous_chargebacks: u32,
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
    pub billing_country: Option<String>,
    pub ip_country: Option<String>,
}

/// Everything the scorer looks at for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskTransaction {
    pub reference: String,
    pub merchant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub card_bin: String,
    pub context: RiskContext,
}
