use crate::application::locks::KeyedLocks;
use crate::domain::card::CardDetails;
use crate::domain::network::Network;
use crate::domain::ports::{SharedPanCodec, SharedTokenStore};
use crate::domain::token::{
    token_transition_allowed, CardToken, NetworkSet, TokenBinRange, TokenStatus,
};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Months, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_TOKEN_VALIDITY_MONTHS: u32 = 36;
const MAX_VALUE_ATTEMPTS: usize = 8;

/// Issues and manages surrogate card numbers.
///
/// Read-modify-write operations on one token are serialized by reference;
/// the backing store keeps its reference and value indexes consistent.
pub struct TokenVault {
    store: SharedTokenStore,
    codec: SharedPanCodec,
    ranges: Vec<TokenBinRange>,
    validity_months: u32,
    fallback_network: Network,
    rng: Mutex<StdRng>,
    locks: KeyedLocks,
}

impl TokenVault {
    /// # Arguments
    ///
    /// * `ranges` - Token BIN blocks; must not be empty.
    /// * `validity_months` - Lifetime of a freshly issued token.
    /// * `fallback_network` - Whose ranges to use when the requested network has none.
    pub fn new(
        store: SharedTokenStore,
        codec: SharedPanCodec,
        ranges: Vec<TokenBinRange>,
        validity_months: u32,
        fallback_network: Network,
    ) -> Result<Self> {
        if ranges.is_empty() {
            return Err(PaymentError::ValidationError(
                "At least one token BIN range must be configured".to_string(),
            ));
        }
        for range in &ranges {
            TokenBinRange::new(range.start, range.end, range.network)?;
        }
        if validity_months == 0 {
            return Err(PaymentError::ValidationError(
                "Token validity must be at least one month".to_string(),
            ));
        }
        Ok(Self {
            store,
            codec,
            ranges,
            validity_months,
            fallback_network,
            rng: Mutex::new(StdRng::from_entropy()),
            locks: KeyedLocks::new(),
        })
    }

    pub fn with_defaults(store: SharedTokenStore, codec: SharedPanCodec) -> Self {
        Self {
            store,
            codec,
            ranges: default_token_bin_ranges(),
            validity_months: DEFAULT_TOKEN_VALIDITY_MONTHS,
            fallback_network: Network::Visa,
            rng: Mutex::new(StdRng::from_entropy()),
            locks: KeyedLocks::new(),
        }
    }

    /// Makes token value generation reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub async fn tokenize(&self, card: &CardDetails, network: Network) -> Result<CardToken> {
        self.tokenize_multi(card, NetworkSet::single(network)).await
    }

    /// Issues one token usable on every network in `networks`; the first
    /// network owns the token's BIN.
    pub async fn tokenize_multi(&self, card: &CardDetails, networks: NetworkSet) -> Result<CardToken> {
        if card.number.is_empty() || !card.number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::ValidationError(
                "Card number must contain only digits".to_string(),
            ));
        }

        let value = self.unused_value(networks.primary()).await?;
        let now = Utc::now();
        let token = CardToken {
            reference: Uuid::new_v4().to_string(),
            value,
            networks,
            last_four: card.last_four().to_string(),
            expiry_month: card.expiry_month,
            expiry_year: card.expiry_year,
            protected_pan: self.codec.protect(&card.number),
            status: TokenStatus::Active,
            created_at: now,
            expires_at: Some(add_months(now, self.validity_months)?),
        };

        let token = self.store.save(token).await?;
        info!(
            token_reference = %token.reference,
            networks = ?token.networks.as_slice(),
            token_bin = token.bin(),
            "token issued"
        );
        Ok(token)
    }

    pub async fn get_by_reference(&self, reference: &str) -> Result<Option<CardToken>> {
        self.store.find_by_reference(reference).await
    }

    pub async fn find_by_value(&self, value: &str) -> Result<Option<CardToken>> {
        self.store.find_by_value(value).await
    }

    /// Recovers card details for an active token. Inactive, expired and
    /// unknown tokens all yield `None`.
    pub async fn detokenize(&self, reference: &str) -> Result<Option<CardDetails>> {
        let Some(token) = self.current(reference).await? else {
            return Ok(None);
        };
        if !token.is_active_at(Utc::now()) {
            warn!(token_reference = %reference, status = %token.status, "refusing to detokenize inactive token");
            return Ok(None);
        }
        let Some(number) = self.codec.reveal(&token.protected_pan) else {
            warn!(token_reference = %reference, "stored card number cannot be recovered");
            return Ok(None);
        };
        Ok(Some(CardDetails::new(
            number,
            token.expiry_month,
            token.expiry_year,
        )))
    }

    pub async fn is_active(&self, reference: &str) -> Result<bool> {
        Ok(self
            .current(reference)
            .await?
            .is_some_and(|token| token.is_active_at(Utc::now())))
    }

    pub async fn supports_network(&self, reference: &str, network: Network) -> Result<bool> {
        Ok(self
            .store
            .find_by_reference(reference)
            .await?
            .is_some_and(|token| token.supports(network)))
    }

    /// Applies an explicit status change. `Deleted` removes the token from
    /// the vault and returns its final state.
    pub async fn set_status(&self, reference: &str, status: TokenStatus) -> Result<Option<CardToken>> {
        let _guard = self.locks.lock(reference).await;
        let Some(mut token) = self.store.find_by_reference(reference).await? else {
            return Ok(None);
        };
        if !token_transition_allowed(token.status, status) {
            return Err(PaymentError::TokenError(format!(
                "Token {} cannot move from {} to {}",
                reference, token.status, status
            )));
        }

        token.status = status;
        if status == TokenStatus::Deleted {
            self.store.delete_by_reference(reference).await?;
        } else {
            token = self.store.save(token).await?;
        }
        info!(token_reference = %reference, %status, "token status updated");
        Ok(Some(token))
    }

    pub async fn suspend(&self, reference: &str) -> Result<bool> {
        Ok(self
            .set_status(reference, TokenStatus::Suspended)
            .await?
            .is_some())
    }

    pub async fn reactivate(&self, reference: &str) -> Result<bool> {
        Ok(self.set_status(reference, TokenStatus::Active).await?.is_some())
    }

    pub async fn add_network(&self, reference: &str, network: Network) -> Result<Option<CardToken>> {
        let _guard = self.locks.lock(reference).await;
        let Some(mut token) = self.store.find_by_reference(reference).await? else {
            return Ok(None);
        };
        if token.networks.insert(network) {
            token = self.store.save(token).await?;
            info!(token_reference = %reference, %network, "network added to token");
        }
        Ok(Some(token))
    }

    /// Extends the expiry by `extra_months` and forces the token back to
    /// `Active`.
    pub async fn refresh(&self, reference: &str, extra_months: u32) -> Result<Option<CardToken>> {
        let _guard = self.locks.lock(reference).await;
        let Some(mut token) = self.store.find_by_reference(reference).await? else {
            return Ok(None);
        };
        let base = token.expires_at.unwrap_or_else(Utc::now);
        token.expires_at = Some(add_months(base, extra_months)?);
        token.status = TokenStatus::Active;
        let token = self.store.save(token).await?;
        info!(
            token_reference = %reference,
            expires_at = ?token.expires_at,
            "token refreshed"
        );
        Ok(Some(token))
    }

    pub async fn delete(&self, reference: &str) -> Result<bool> {
        let _guard = self.locks.lock(reference).await;
        let deleted = self.store.delete_by_reference(reference).await?;
        if deleted {
            info!(token_reference = %reference, "token deleted");
        }
        Ok(deleted)
    }

    /// Loads the token, persisting `Expired` first if its validity ran out.
    async fn current(&self, reference: &str) -> Result<Option<CardToken>> {
        let _guard = self.locks.lock(reference).await;
        let Some(mut token) = self.store.find_by_reference(reference).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let lapsed = token.expires_at.is_some_and(|at| at <= now);
        if lapsed && matches!(token.status, TokenStatus::Active | TokenStatus::Suspended) {
            token.status = TokenStatus::Expired;
            token = self.store.save(token).await?;
            info!(token_reference = %reference, "token expired");
        }
        Ok(Some(token))
    }

    async fn unused_value(&self, network: Network) -> Result<String> {
        for _ in 0..MAX_VALUE_ATTEMPTS {
            let value = self.generate_value(network);
            if !self.store.exists_by_value(&value).await? {
                return Ok(value);
            }
            debug!(%network, "token value collision, drawing again");
        }
        Err(PaymentError::internal(format!(
            "Could not generate an unused token value for {}",
            network
        )))
    }

    fn generate_value(&self, network: Network) -> String {
        let mut candidates: Vec<&TokenBinRange> =
            self.ranges.iter().filter(|r| r.network == network).collect();
        if candidates.is_empty() {
            debug!(%network, fallback = %self.fallback_network, "no token BIN range, using fallback network");
            candidates = self
                .ranges
                .iter()
                .filter(|r| r.network == self.fallback_network)
                .collect();
        }
        if candidates.is_empty() {
            candidates = self.ranges.iter().take(1).collect();
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let (start, end) = candidates
            .choose(&mut *rng)
            .map(|range| (range.start, range.end))
            .unwrap_or((0, 999_999));
        let bin = rng.gen_range(start..=end);
        let account: String = (0..10)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        format!("{:06}{}", bin, account)
    }
}

fn add_months(at: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| PaymentError::internal("Token expiry out of range"))
}

fn range(start: u32, end: u32, network: Network) -> TokenBinRange {
    TokenBinRange {
        start,
        end,
        network,
    }
}

/// Token BIN blocks per network. Some blocks sit inside another network's
/// range on purpose.
pub fn default_token_bin_ranges() -> Vec<TokenBinRange> {
    vec![
        range(490_000, 499_999, Network::Visa),
        range(590_000, 599_999, Network::Mastercard),
        range(390_000, 399_999, Network::Amex),
        range(650_000, 659_999, Network::Discover),
        range(670_000, 670_999, Network::Accel),
        range(493_500, 493_599, Network::Accel),
        range(671_000, 671_999, Network::Star),
        range(593_000, 593_999, Network::Star),
        range(672_000, 672_999, Network::Nyce),
        range(673_000, 673_999, Network::Pulse),
        range(652_500, 652_599, Network::Pulse),
        range(674_000, 674_999, Network::Maestro),
    ]
}
