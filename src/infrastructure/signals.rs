use crate::domain::ports::RiskSignals;
use crate::domain::risk::RiskTransaction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Oracles that never flag anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRiskSignals;

impl RiskSignals for NoRiskSignals {
    fn is_suspicious_ip(&self, _ip_address: Option<&str>) -> bool {
        false
    }

    fn is_new_or_risky_device(&self, _device_id: Option<&str>) -> bool {
        false
    }

    fn has_location_mismatch(&self, _transaction: &RiskTransaction) -> bool {
        false
    }
}

/// Flags transactions at fixed base rates, standing in for IP reputation,
/// device fingerprinting and geolocation services.
pub struct SampledRiskSignals {
    suspicious_ip_rate: f64,
    risky_device_rate: f64,
    location_mismatch_rate: f64,
    rng: Mutex<StdRng>,
}

impl SampledRiskSignals {
    pub const SUSPICIOUS_IP_RATE: f64 = 0.10;
    pub const RISKY_DEVICE_RATE: f64 = 0.05;
    pub const LOCATION_MISMATCH_RATE: f64 = 0.08;

    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            suspicious_ip_rate: Self::SUSPICIOUS_IP_RATE,
            risky_device_rate: Self::RISKY_DEVICE_RATE,
            location_mismatch_rate: Self::LOCATION_MISMATCH_RATE,
            rng: Mutex::new(rng),
        }
    }

    fn sample(&self, rate: f64) -> bool {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(rate)
    }
}

impl Default for SampledRiskSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskSignals for SampledRiskSignals {
    fn is_suspicious_ip(&self, _ip_address: Option<&str>) -> bool {
        self.sample(self.suspicious_ip_rate)
    }

    fn is_new_or_risky_device(&self, _device_id: Option<&str>) -> bool {
        self.sample(self.risky_device_rate)
    }

    fn has_location_mismatch(&self, _transaction: &RiskTransaction) -> bool {
        self.sample(self.location_mismatch_rate)
    }
}
