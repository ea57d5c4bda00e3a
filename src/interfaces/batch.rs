use crate::application::orchestrator::{AuthorizationRequest, PaymentOrchestrator};
use crate::domain::payment::PaymentId;
use crate::error::{PaymentError, Result};
use crate::interfaces::csv::command_reader::{Command, CommandType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies batch commands to a gateway, remembering which payment and which
/// token each merchant-scoped reference stands for.
pub struct BatchRunner {
    orchestrator: Arc<PaymentOrchestrator>,
    payments: HashMap<(String, String), PaymentId>,
    tokens: HashMap<(String, String), String>,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<PaymentOrchestrator>) -> Self {
        Self {
            orchestrator,
            payments: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    pub fn orchestrator(&self) -> &PaymentOrchestrator {
        &self.orchestrator
    }

    /// Picks up payments already in the store so later commands can address
    /// them by reference. Returns how many were found.
    pub async fn resume(&mut self) -> Result<usize> {
        let payments = self.orchestrator.all_payments().await?;
        for payment in &payments {
            if let Some(id) = &payment.id {
                self.payments.insert(
                    (payment.merchant_id.clone(), payment.merchant_reference.clone()),
                    id.clone(),
                );
            }
        }
        Ok(payments.len())
    }

    /// Applies one command. A declined or failed authorization is not an
    /// error: it shows up in the payment table. An authorization rejected
    /// before any record was created is.
    pub async fn apply(&mut self, command: Command) -> Result<()> {
        debug!(op = ?command.op, merchant = %command.merchant, reference = %command.reference, "applying command");
        match command.op {
            CommandType::Authorize => self.authorize(command).await,
            CommandType::Capture => {
                let id = self.payment_id(&command)?;
                self.orchestrator
                    .capture(&id, &command.merchant, command.amount)
                    .await
                    .map(|_| ())
            }
            CommandType::Cancel => {
                let id = self.payment_id(&command)?;
                self.orchestrator.cancel(&id, &command.merchant).await.map(|_| ())
            }
            CommandType::Refund => {
                let id = self.payment_id(&command)?;
                self.orchestrator
                    .refund(&id, &command.merchant, command.amount)
                    .await
                    .map(|_| ())
            }
            CommandType::Modify => {
                let id = self.payment_id(&command)?;
                let amount = command.required_amount()?;
                self.orchestrator
                    .modify(&id, &command.merchant, amount)
                    .await
                    .map(|_| ())
            }
            CommandType::Tokenize => {
                let card = command.required_card()?;
                let networks = command.network_set()?;
                let token = self.orchestrator.vault().tokenize_multi(&card, networks).await?;
                info!(alias = %command.reference, token_reference = %token.reference, "token alias registered");
                self.tokens
                    .insert((command.merchant, command.reference), token.reference);
                Ok(())
            }
            CommandType::SuspendToken => {
                let reference = self.token_reference(&command.merchant, &command.reference);
                self.changed(self.orchestrator.vault().suspend(&reference).await?, &command)
            }
            CommandType::ReactivateToken => {
                let reference = self.token_reference(&command.merchant, &command.reference);
                self.changed(self.orchestrator.vault().reactivate(&reference).await?, &command)
            }
        }
    }

    async fn authorize(&mut self, command: Command) -> Result<()> {
        let request = AuthorizationRequest {
            card: command.card()?,
            token_reference: command
                .token
                .as_deref()
                .map(|alias| self.token_reference(&command.merchant, alias)),
            amount: command.required_amount()?,
            currency: command.currency.clone().unwrap_or_default(),
            risk: command.risk_context(),
            merchant_id: command.merchant.clone(),
            merchant_reference: command.reference.clone(),
        };

        let response = self.orchestrator.authorize(request).await?;
        match response.payment_id {
            Some(id) => {
                self.payments.insert((command.merchant, command.reference), id);
                Ok(())
            }
            None => Err(PaymentError::ValidationError(response.message)),
        }
    }

    fn payment_id(&self, command: &Command) -> Result<PaymentId> {
        self.payments
            .get(&(command.merchant.clone(), command.reference.clone()))
            .cloned()
            .ok_or_else(|| {
                PaymentError::NotFound(format!(
                    "No payment for reference {}/{}",
                    command.merchant, command.reference
                ))
            })
    }

    /// Unknown aliases are passed through as raw vault references.
    fn token_reference(&self, merchant: &str, alias: &str) -> String {
        self.tokens
            .get(&(merchant.to_string(), alias.to_string()))
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }

    fn changed(&self, changed: bool, command: &Command) -> Result<()> {
        if changed {
            Ok(())
        } else {
            Err(PaymentError::NotFound(format!(
                "No token for alias {}/{}",
                command.merchant, command.reference
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Adapters, GatewayConfig};
    use crate::domain::payment::PaymentStatus;
    use crate::infrastructure::codec::MaskingPanCodec;
    use crate::infrastructure::emulator::EmulatedCardProcessor;
    use crate::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryTokenStore};
    use crate::infrastructure::signals::NoRiskSignals;
    use crate::interfaces::csv::command_reader::CommandReader;
    use rust_decimal_macros::dec;

    fn runner() -> BatchRunner {
        let adapters = Adapters {
            payments: Arc::new(InMemoryPaymentStore::new()),
            tokens: Arc::new(InMemoryTokenStore::new()),
            processor: Arc::new(EmulatedCardProcessor::reliable().with_seed(2)),
            signals: Arc::new(NoRiskSignals),
            codec: Arc::new(MaskingPanCodec::with_seed(2)),
        };
        let orchestrator = GatewayConfig::default().orchestrator(adapters, Some(2)).unwrap();
        BatchRunner::new(Arc::new(orchestrator))
    }

    fn commands(body: &str) -> Vec<Command> {
        let data = format!(
            "op,merchant,reference,amount,currency,card_number,expiry_month,expiry_year,token,networks,mcc,prior_success\n{}",
            body
        );
        CommandReader::new(data.as_bytes())
            .commands()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_payment_operations_follow_reference() {
        let mut runner = runner();
        let mut results = Vec::new();
        for command in commands(
            "authorize,m-1,order-1,100.00,USD,4000001234567899,12,2099,,,5411,20\n\
             capture,m-1,order-1,60\n\
             refund,m-1,order-1,10\n\
             capture,m-1,order-9",
        ) {
            results.push(runner.apply(command).await);
        }
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(results[3].as_ref().unwrap_err().is_not_found());

        let payments = runner.orchestrator().payments_for_merchant("m-1").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::PartiallyRefunded);
        assert_eq!(payments[0].captured_amount, dec!(60));
    }

    #[tokio::test]
    async fn test_token_alias_flow() {
        let mut runner = runner();
        let mut results = Vec::new();
        for command in commands(
            "tokenize,m-1,card-a,,,4532051234567890,12,2099,,VISA|ACCEL\n\
             suspend_token,m-1,card-a\n\
             authorize,m-1,order-1,50,USD,,,,card-a,,5411,20\n\
             reactivate_token,m-1,card-a\n\
             authorize,m-1,order-2,50,USD,,,,card-a,,5411,20",
        ) {
            results.push(runner.apply(command).await);
        }
        assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

        let payments = runner.orchestrator().payments_for_merchant("m-1").await.unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert!(payments[0].failure_reason.as_deref().unwrap().starts_with("Token is not active"));
        assert_eq!(payments[1].status, PaymentStatus::Authorized);
        assert!(payments[1].token_reference.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_an_error() {
        let mut runner = runner();
        let mut rows = commands(
            "authorize,m-1,order-1,10,USD,4000001234567899,12,2099\n\
             authorize,m-1,order-1,10,USD,4000001234567899,12,2099",
        )
        .into_iter();
        runner.apply(rows.next().unwrap()).await.unwrap();
        let err = runner.apply(rows.next().unwrap()).await.unwrap_err();
        assert!(err.reason().starts_with("Duplicate merchant reference"));
        assert_eq!(runner.orchestrator().all_payments().await.unwrap().len(), 1);
    }
}
