use super::network::Network;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenStatus {
    Active,
    Suspended,
    Expired,
    Deleted,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenStatus::Active => "ACTIVE",
            TokenStatus::Suspended => "SUSPENDED",
            TokenStatus::Expired => "EXPIRED",
            TokenStatus::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Whether an explicit status change is legal.
///
/// Refresh is the only way back from `Expired` and is not covered here.
pub fn token_transition_allowed(from: TokenStatus, to: TokenStatus) -> bool {
    use TokenStatus::*;
    match (from, to) {
        (Deleted, _) => false,
        (_, Deleted) => true,
        (Active, Suspended) | (Suspended, Active) => true,
        (Active, Expired) | (Suspended, Expired) => true,
        (a, b) => a == b,
    }
}

/// Non-empty, duplicate-free, insertion-ordered set of networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Network>", into = "Vec<Network>")]
pub struct NetworkSet(Vec<Network>);

impl NetworkSet {
    pub fn new(networks: impl IntoIterator<Item = Network>) -> Result<Self> {
        let mut set = Vec::new();
        for network in networks {
            if !set.contains(&network) {
                set.push(network);
            }
        }
        if set.is_empty() {
            return Err(PaymentError::ValidationError(
                "At least one network must be specified".to_string(),
            ));
        }
        Ok(Self(set))
    }

    pub fn single(network: Network) -> Self {
        Self(vec![network])
    }

    /// The network whose token BIN ranges back the surrogate number.
    pub fn primary(&self) -> Network {
        self.0[0]
    }

    pub fn contains(&self, network: Network) -> bool {
        self.0.contains(&network)
    }

    /// Returns false if the network was already present.
    pub fn insert(&mut self, network: Network) -> bool {
        if self.contains(network) {
            false
        } else {
            self.0.push(network);
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Network> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Network] {
        &self.0
    }
}

impl TryFrom<Vec<Network>> for NetworkSet {
    type Error = PaymentError;

    fn try_from(value: Vec<Network>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NetworkSet> for Vec<Network> {
    fn from(set: NetworkSet) -> Self {
        set.0
    }
}

/// A surrogate card identifier issued by the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardToken {
    pub reference: String,
    /// 16-digit surrogate PAN; its first six digits sit in a token BIN range
    /// of one of `networks`.
    pub value: String,
    pub networks: NetworkSet,
    pub last_four: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    /// Protected form of the real PAN, as produced by the vault's codec.
    pub protected_pan: String,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CardToken {
    pub fn bin(&self) -> &str {
        self.value.get(..6).unwrap_or("")
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Active && self.expires_at.is_none_or(|at| at > now)
    }

    pub fn supports(&self, network: Network) -> bool {
        self.networks.contains(network)
    }
}

/// Token BIN block reserved for one network's surrogate numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBinRange {
    pub start: u32,
    pub end: u32,
    pub network: Network,
}

impl TokenBinRange {
    pub fn new(start: u32, end: u32, network: Network) -> Result<Self> {
        if start > end || end > 999_999 {
            return Err(PaymentError::ValidationError(format!(
                "Invalid token BIN range {}-{}",
                start, end
            )));
        }
        Ok(Self {
            start,
            end,
            network,
        })
    }

    pub fn contains(&self, bin: u32) -> bool {
        (self.start..=self.end).contains(&bin)
    }
}
