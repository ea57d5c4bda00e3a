use crate::domain::ports::SharedRiskSignals;
use crate::domain::risk::{RiskAssessment, RiskContext, RiskTransaction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

const BEHAVIOUR_CAP: f64 = 0.3;
const DEVICE_LOCATION_CAP: f64 = 0.2;

/// Additive fraud score over amount, customer history, merchant category and
/// device/location signals.
pub struct RiskScorer {
    signals: SharedRiskSignals,
}

impl RiskScorer {
    pub fn new(signals: SharedRiskSignals) -> Self {
        Self { signals }
    }

    pub fn assess(&self, transaction: &RiskTransaction) -> RiskAssessment {
        let amount = amount_component(transaction.amount);
        let behaviour = behaviour_component(&transaction.context);
        let merchant = merchant_component(transaction.context.merchant_category_code.as_deref());
        let device = self.device_location_component(transaction);

        let assessment = RiskAssessment::from_score(amount + behaviour + merchant + device);
        debug!(
            reference = %transaction.reference,
            bin = %transaction.card_bin,
            amount,
            behaviour,
            merchant,
            device,
            score = assessment.score,
            band = %assessment.band,
            "risk assessed"
        );
        assessment
    }

    fn device_location_component(&self, transaction: &RiskTransaction) -> f64 {
        let context = &transaction.context;
        let mut score = 0.0;
        if self.signals.is_suspicious_ip(context.ip_address.as_deref()) {
            score += 0.15;
        }
        if self.signals.is_new_or_risky_device(context.device_id.as_deref()) {
            score += 0.1;
        }
        if countries_disagree(context) || self.signals.has_location_mismatch(transaction) {
            score += 0.15;
        }
        f64::min(score, DEVICE_LOCATION_CAP)
    }
}

fn amount_component(amount: Decimal) -> f64 {
    if amount < dec!(100) {
        0.1
    } else if amount < dec!(1000) {
        0.15
    } else if amount < dec!(5000) {
        0.2
    } else if amount < dec!(10000) {
        0.3
    } else {
        0.35
    }
}

fn behaviour_component(context: &RiskContext) -> f64 {
    let successful = context.previous_successful;
    if successful == 0 {
        return 0.2;
    }
    let attempts = f64::from(successful) + f64::from(context.previous_failed);
    let success_rate = f64::from(successful) / attempts;

    let mut score: f64 = 0.0;
    if success_rate < 0.7 {
        score += 0.25;
    } else if success_rate > 0.95 {
        score -= 0.05;
    }
    score += 0.1 * f64::from(context.previous_chargebacks);
    score.clamp(0.0, BEHAVIOUR_CAP)
}

fn merchant_component(mcc: Option<&str>) -> f64 {
    match mcc.map(str::trim) {
        // grocery, discount stores
        Some("5411" | "5412") => 0.05,
        // jewelry, sporting goods
        Some("5944" | "5941") => 0.15,
        // wire transfer, crypto / quasi-cash
        Some("4829" | "6051") => 0.25,
        _ => 0.1,
    }
}

fn countries_disagree(context: &RiskContext) -> bool {
    match (&context.billing_country, &context.ip_country) {
        (Some(billing), Some(ip)) => !billing.trim().eq_ignore_ascii_case(ip.trim()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RiskSignals;
    use crate::domain::risk::RiskBand;
    use std::sync::Arc;

    struct Fixed(bool);

    impl RiskSignals for Fixed {
        fn is_suspicious_ip(&self, _: Option<&str>) -> bool {
            self.0
        }
        fn is_new_or_risky_device(&self, _: Option<&str>) -> bool {
            self.0
        }
        fn has_location_mismatch(&self, _: &RiskTransaction) -> bool {
            self.0
        }
    }

    fn scorer(flagged: bool) -> RiskScorer {
        RiskScorer::new(Arc::new(Fixed(flagged)))
    }

    fn transaction(amount: Decimal, context: RiskContext) -> RiskTransaction {
        RiskTransaction {
            reference: "order-1".to_string(),
            merchant_id: "m-1".to_string(),
            amount,
            currency: "USD".to_string(),
            card_bin: "400000".to_string(),
            context,
        }
    }

    fn regular_customer() -> RiskContext {
        RiskContext {
            merchant_category_code: Some("5411".to_string()),
            previous_successful: 99,
            previous_failed: 1,
            ..RiskContext::default()
        }
    }

    #[test]
    fn test_new_customer_high_risk_merchant_is_at_least_medium() {
        let context = RiskContext {
            merchant_category_code: Some("6051".to_string()),
            ..RiskContext::default()
        };
        let assessment = scorer(false).assess(&transaction(dec!(50), context));
        assert!(assessment.band >= RiskBand::Medium);
        assert!((assessment.score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_reliable_customer_is_low() {
        let assessment = scorer(false).assess(&transaction(dec!(25), regular_customer()));
        // 0.1 amount + 0.0 behaviour + 0.05 merchant
        assert!((assessment.score - 0.15).abs() < 1e-9);
        assert_eq!(assessment.band, RiskBand::Low);
    }

    #[test]
    fn test_component_caps() {
        let context = RiskContext {
            merchant_category_code: Some("4829".to_string()),
            previous_successful: 1,
            previous_failed: 9,
            previous_chargebacks: 5,
            ..RiskContext::default()
        };
        let assessment = scorer(true).assess(&transaction(dec!(25000), context));
        // 0.35 + 0.3 + 0.25 + 0.2
        assert_eq!(assessment.score, 1.0);
        assert_eq!(assessment.band, RiskBand::Critical);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        for amount in [dec!(0.01), dec!(99.99), dec!(100), dec!(4999), dec!(10000), dec!(1000000000)] {
            for flagged in [false, true] {
                let score = scorer(flagged)
                    .assess(&transaction(amount, RiskContext::default()))
                    .score;
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn test_amount_steps() {
        assert_eq!(amount_component(dec!(99.99)), 0.1);
        assert_eq!(amount_component(dec!(100)), 0.15);
        assert_eq!(amount_component(dec!(1000)), 0.2);
        assert_eq!(amount_component(dec!(5000)), 0.3);
        assert_eq!(amount_component(dec!(10000)), 0.35);
    }

    #[test]
    fn test_behaviour_penalties() {
        let mut context = RiskContext {
            previous_successful: 6,
            previous_failed: 4,
            ..RiskContext::default()
        };
        assert_eq!(behaviour_component(&context), 0.25);
        context.previous_failed = 0;
        context.previous_chargebacks = 2;
        assert!((behaviour_component(&context) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_country_mismatch_counts_without_signals() {
        let mut context = regular_customer();
        context.billing_country = Some("US".to_string());
        context.ip_country = Some("de".to_string());
        let mismatched = scorer(false).assess(&transaction(dec!(25), context.clone()));

        context.ip_country = Some("us".to_string());
        let matched = scorer(false).assess(&transaction(dec!(25), context));
        assert!((mismatched.score - matched.score - 0.15).abs() < 1e-9);
    }
}
