use crate::domain::bin::{BinRange, CardBinInfo, CardType, IssuerProfile};
use crate::domain::network::Network;
use crate::error::Result;
use std::cmp::Reverse;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Maps card prefixes to the networks that can carry them.
///
/// Readers take a cheap `Arc` snapshot of the range table and scan it
/// without holding the lock; writers build a new table and swap it in, so a
/// lookup never observes a half-applied update.
pub struct BinResolver {
    ranges: RwLock<Arc<Vec<BinRange>>>,
}

impl BinResolver {
    pub fn new(ranges: Vec<BinRange>) -> Result<Self> {
        for range in &ranges {
            range.validate()?;
        }
        Ok(Self {
            ranges: RwLock::new(Arc::new(by_specificity(ranges))),
        })
    }

    pub fn with_default_ranges() -> Self {
        Self {
            ranges: RwLock::new(Arc::new(by_specificity(default_bin_ranges()))),
        }
    }

    /// Current range table, most specific (widest prefix) first.
    pub fn snapshot(&self) -> Arc<Vec<BinRange>> {
        self.ranges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns every range containing `prefix`, or a single heuristic guess
    /// when none does. Malformed input yields an empty list.
    pub fn lookup(&self, prefix: &str) -> Vec<CardBinInfo> {
        if !(6..=8).contains(&prefix.len()) || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            debug!(prefix_len = prefix.len(), "rejecting malformed BIN prefix");
            return Vec::new();
        }

        let matches: Vec<CardBinInfo> = self
            .snapshot()
            .iter()
            .filter(|range| range.contains(prefix))
            .map(|range| CardBinInfo {
                bin: prefix.to_string(),
                network: range.network,
                profile: range.profile.clone(),
            })
            .collect();

        if matches.is_empty() {
            let guess = heuristic_match(prefix);
            debug!(
                bin = prefix,
                network = ?guess.as_ref().map(|info| info.network),
                "no configured BIN range matched, using issuer prefix heuristics"
            );
            return guess.into_iter().collect();
        }
        matches
    }

    /// Replaces any range with identical bounds, then re-sorts the table.
    pub fn add_or_update_range(&self, range: BinRange) -> Result<()> {
        range.validate()?;
        let mut guard = self.ranges.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<BinRange> = guard
            .iter()
            .filter(|existing| !existing.same_bounds(&range))
            .cloned()
            .collect();
        info!(
            start = %range.start,
            end = %range.end,
            network = %range.network,
            "BIN range added or updated"
        );
        next.push(range);
        *guard = Arc::new(by_specificity(next));
        Ok(())
    }
}

impl Default for BinResolver {
    fn default() -> Self {
        Self::with_default_ranges()
    }
}

fn by_specificity(mut ranges: Vec<BinRange>) -> Vec<BinRange> {
    ranges.sort_by_key(|range| Reverse(range.width()));
    ranges
}

fn heuristic_match(prefix: &str) -> Option<CardBinInfo> {
    let second = prefix.as_bytes().get(1).copied().unwrap_or(b'0');
    let (network, profile) = match prefix.as_bytes()[0] {
        b'4' => (Network::Visa, credit("VISA", "Visa")),
        b'5' if (b'1'..=b'5').contains(&second) => {
            (Network::Mastercard, credit("MASTERCARD", "Mastercard"))
        }
        b'3' if second == b'4' || second == b'7' => {
            let mut profile = credit("AMERICAN_EXPRESS", "American Express");
            profile.corporate = second == b'7';
            (Network::Amex, profile)
        }
        b'6' => (Network::Discover, credit("DISCOVER", "Discover")),
        _ => return None,
    };
    Some(CardBinInfo {
        bin: prefix.to_string(),
        network,
        profile,
    })
}

fn credit(issuer: &str, issuer_name: &str) -> IssuerProfile {
    IssuerProfile::new(CardType::Credit, issuer, issuer_name, "US")
}

fn range(start: &str, end: &str, network: Network, profile: IssuerProfile) -> BinRange {
    BinRange {
        start: start.to_string(),
        end: end.to_string(),
        network,
        profile,
    }
}

/// Reference issuer table, including co-badged debit overlaps.
pub fn default_bin_ranges() -> Vec<BinRange> {
    use CardType::{Credit, Debit};
    let p = IssuerProfile::new;
    vec![
        range("400000", "499999", Network::Visa, p(Credit, "VISA", "Visa", "US")),
        range("510000", "559999", Network::Mastercard, p(Credit, "MASTERCARD", "Mastercard", "US")),
        range("340000", "349999", Network::Amex, p(Credit, "AMERICAN_EXPRESS", "American Express", "US")),
        range("601100", "601109", Network::Discover, p(Credit, "DISCOVER", "Discover", "US")),
        range("600000", "600099", Network::Accel, p(Debit, "ACCEL", "Accel", "US")),
        range("600110", "600199", Network::Star, p(Debit, "STAR", "Star", "US")),
        range("600200", "600299", Network::Nyce, p(Debit, "NYCE", "NYCE", "US")),
        range("600300", "600399", Network::Pulse, p(Debit, "PULSE", "Pulse", "US")),
        range("500000", "509999", Network::Maestro, p(Debit, "MAESTRO", "Maestro", "GLOBAL")),
        range("453200", "453299", Network::Visa, p(Debit, "VISA", "Visa Debit", "US")),
        range("453200", "453210", Network::Accel, p(Debit, "BANK_OF_AMERICA", "Bank of America (Accel)", "US")),
        range("520000", "520099", Network::Mastercard, p(Debit, "MASTERCARD", "Mastercard Debit", "US")),
        range("520050", "520099", Network::Nyce, p(Debit, "CHASE", "Chase (NYCE)", "US")),
        range("601120", "601129", Network::Discover, p(Debit, "DISCOVER", "Discover Debit", "US")),
        range("601125", "601129", Network::Pulse, p(Debit, "WELLS_FARGO", "Wells Fargo (Pulse)", "US")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn networks(infos: &[CardBinInfo]) -> Vec<Network> {
        infos.iter().map(|info| info.network).collect()
    }

    #[test]
    fn test_malformed_prefix_returns_empty() {
        let resolver = BinResolver::with_default_ranges();
        assert!(resolver.lookup("40000").is_empty());
        assert!(resolver.lookup("400000123").is_empty());
        assert!(resolver.lookup("4000a0").is_empty());
        assert!(resolver.lookup("").is_empty());
    }

    #[test]
    fn test_overlapping_ranges_all_returned() {
        let resolver = BinResolver::with_default_ranges();
        let found = networks(&resolver.lookup("453205"));
        assert_eq!(found.len(), 3);
        assert_eq!(found.iter().filter(|n| **n == Network::Visa).count(), 2);
        assert!(found.contains(&Network::Accel));

        let found = networks(&resolver.lookup("52006012"));
        assert!(found.contains(&Network::Mastercard));
        assert!(found.contains(&Network::Nyce));
    }

    #[test]
    fn test_heuristic_fallback() {
        let resolver = BinResolver::new(Vec::new()).unwrap();
        assert_eq!(networks(&resolver.lookup("411111")), vec![Network::Visa]);
        assert_eq!(networks(&resolver.lookup("530000")), vec![Network::Mastercard]);
        assert_eq!(networks(&resolver.lookup("560000")), Vec::<Network>::new());
        assert_eq!(networks(&resolver.lookup("650000")), vec![Network::Discover]);

        let amex = resolver.lookup("371234");
        assert_eq!(networks(&amex), vec![Network::Amex]);
        assert!(amex[0].profile.corporate);
        assert!(!resolver.lookup("341234")[0].profile.corporate);
        assert!(resolver.lookup("900000").is_empty());
    }

    #[test]
    fn test_add_or_update_replaces_identical_bounds() {
        let resolver = BinResolver::new(Vec::new()).unwrap();
        let profile = IssuerProfile::new(CardType::Debit, "STAR", "Star", "US");
        resolver
            .add_or_update_range(BinRange::new("700000", "700999", Network::Star, profile.clone()).unwrap())
            .unwrap();
        resolver
            .add_or_update_range(BinRange::new("700000", "700999", Network::Pulse, profile).unwrap())
            .unwrap();

        assert_eq!(resolver.snapshot().len(), 1);
        assert_eq!(networks(&resolver.lookup("700500")), vec![Network::Pulse]);
    }

    #[test]
    fn test_more_specific_ranges_sort_first() {
        let resolver = BinResolver::with_default_ranges();
        resolver
            .add_or_update_range(
                BinRange::new("45320001", "45320099", Network::Star, IssuerProfile::default())
                    .unwrap(),
            )
            .unwrap();

        let found = resolver.lookup("45320050");
        assert_eq!(found[0].network, Network::Star);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_snapshot_survives_concurrent_update() {
        let resolver = BinResolver::with_default_ranges();
        let before = resolver.snapshot();
        resolver
            .add_or_update_range(
                BinRange::new("700000", "700999", Network::Star, IssuerProfile::default()).unwrap(),
            )
            .unwrap();
        assert_eq!(resolver.snapshot().len(), before.len() + 1);
        assert!(before.iter().all(|r| r.start != "700000"));
    }
}
