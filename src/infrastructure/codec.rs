use crate::domain::ports::PanCodec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

const SHORT_PAN_PLACEHOLDER: &str = "************";

/// Placeholder codec: keeps the first six and last four digits and masks the
/// middle. `reveal` refills the middle with random digits, so it only stands
/// in for a real secure codec and never returns the original number.
pub struct MaskingPanCodec {
    rng: Mutex<StdRng>,
}

impl MaskingPanCodec {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MaskingPanCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PanCodec for MaskingPanCodec {
    fn protect(&self, pan: &str) -> String {
        if pan.len() < 13 || !pan.bytes().all(|b| b.is_ascii_digit()) {
            return SHORT_PAN_PLACEHOLDER.to_string();
        }
        let (head, rest) = pan.split_at(6);
        let (middle, tail) = rest.split_at(rest.len() - 4);
        format!("{}{}{}", head, "*".repeat(middle.len()), tail)
    }

    fn reveal(&self, protected: &str) -> Option<String> {
        if protected.len() < 13 || !protected.is_ascii() {
            return None;
        }
        let (head, rest) = protected.split_at(6);
        let (middle, tail) = rest.split_at(rest.len() - 4);
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !digits(head) || !digits(tail) || !middle.bytes().all(|b| b == b'*') {
            return None;
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let filler: String = (0..middle.len())
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Some(format!("{}{}{}", head, filler, tail))
    }
}
