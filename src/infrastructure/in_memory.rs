use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{PaymentStore, TokenStore};
use crate::domain::token::CardToken;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

const FIRST_PAYMENT_SEQUENCE: u64 = 1000;

#[derive(Default)]
struct PaymentTables {
    payments: HashMap<PaymentId, Payment>,
    /// (merchant id, merchant reference) -> payment id
    references: HashMap<(String, String), PaymentId>,
}

/// A thread-safe in-memory payment store.
///
/// Ids are assigned as `PMT1000`, `PMT1001`, ... on first save. The merchant
/// reference index lives under the same lock as the records.
#[derive(Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(PaymentTables::default())),
            sequence: Arc::new(AtomicU64::new(FIRST_PAYMENT_SEQUENCE)),
        }
    }
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn save(&self, mut payment: Payment) -> Result<Payment> {
        let id = match &payment.id {
            Some(id) => id.clone(),
            None => {
                let next = self.sequence.fetch_add(1, Ordering::SeqCst);
                let id = PaymentId::new(format!("PMT{}", next));
                payment.id = Some(id.clone());
                id
            }
        };

        let mut tables = self.tables.write().await;
        tables.references.insert(
            (
                payment.merchant_id.clone(),
                payment.merchant_reference.clone(),
            ),
            id.clone(),
        );
        tables.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(id).cloned())
    }

    async fn find_by_id_and_merchant(
        &self,
        id: &PaymentId,
        merchant_id: &str,
    ) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .get(id)
            .filter(|payment| payment.merchant_id == merchant_id)
            .cloned())
    }

    async fn exists_by_merchant_reference(
        &self,
        merchant_reference: &str,
        merchant_id: &str,
    ) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .contains_key(&(merchant_id.to_string(), merchant_reference.to_string())))
    }

    async fn find_all(&self) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables.payments.values().cloned().collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(payments)
    }

    async fn delete_by_id(&self, id: &PaymentId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(payment) = tables.payments.remove(id) {
            tables
                .references
                .remove(&(payment.merchant_id, payment.merchant_reference));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.payments.clear();
        tables.references.clear();
        Ok(())
    }
}

#[derive(Default)]
struct TokenTables {
    by_reference: HashMap<String, CardToken>,
    /// token value -> token reference
    by_value: HashMap<String, String>,
}

/// A thread-safe in-memory token store.
///
/// Both lookup indexes sit behind one lock so a save or delete is never
/// half-visible.
#[derive(Default, Clone)]
pub struct InMemoryTokenStore {
    tables: Arc<RwLock<TokenTables>>,
}

impl InMemoryTokenStore {
    /// Creates a new, empty in-memory token store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save(&self, token: CardToken) -> Result<CardToken> {
        let mut tables = self.tables.write().await;
        if let Some(previous) = tables.by_reference.get(&token.reference)
            && previous.value != token.value
        {
            let stale = previous.value.clone();
            tables.by_value.remove(&stale);
        }
        tables
            .by_value
            .insert(token.value.clone(), token.reference.clone());
        tables
            .by_reference
            .insert(token.reference.clone(), token.clone());
        Ok(token)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<CardToken>> {
        let tables = self.tables.read().await;
        Ok(tables.by_reference.get(reference).cloned())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<CardToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_value
            .get(value)
            .and_then(|reference| tables.by_reference.get(reference))
            .cloned())
    }

    async fn exists_by_reference(&self, reference: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.by_reference.contains_key(reference))
    }

    async fn exists_by_value(&self, value: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.by_value.contains_key(value))
    }

    async fn delete_by_reference(&self, reference: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.by_reference.remove(reference) {
            Some(token) => {
                tables.by_value.remove(&token.value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.by_reference.clear();
        tables.by_value.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::network::Network;
    use crate::domain::token::{NetworkSet, TokenStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn payment(merchant: &str, reference: &str) -> Payment {
        Payment::new(
            merchant,
            reference,
            Money::new(dec!(10.00), "USD").unwrap(),
            Utc::now(),
        )
    }

    fn token(reference: &str, value: &str) -> CardToken {
        CardToken {
            reference: reference.to_string(),
            value: value.to_string(),
            networks: NetworkSet::single(Network::Visa),
            last_four: "1111".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
            protected_pan: "411111******1111".to_string(),
            status: TokenStatus::Active,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_payment_ids_are_sequential() {
        let store = InMemoryPaymentStore::new();
        let first = store.save(payment("m-1", "a")).await.unwrap();
        let second = store.save(payment("m-1", "b")).await.unwrap();
        assert_eq!(first.id_str(), "PMT1000");
        assert_eq!(second.id_str(), "PMT1001");

        // re-saving keeps the id
        let again = store.save(first.clone()).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(store.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_merchant_scoped_lookups() {
        let store = InMemoryPaymentStore::new();
        let saved = store.save(payment("m-1", "order-9")).await.unwrap();
        let id = saved.id.clone().unwrap();

        assert!(store.exists_by_merchant_reference("order-9", "m-1").await.unwrap());
        assert!(!store.exists_by_merchant_reference("order-9", "m-2").await.unwrap());
        assert!(store.find_by_id_and_merchant(&id, "m-1").await.unwrap().is_some());
        assert!(store.find_by_id_and_merchant(&id, "m-2").await.unwrap().is_none());

        store.delete_by_id(&id).await.unwrap();
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(!store.exists_by_merchant_reference("order-9", "m-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_indexes_move_together() {
        let store = InMemoryTokenStore::new();
        store.save(token("tok-1", "4900001234567890")).await.unwrap();
        assert!(store.exists_by_value("4900001234567890").await.unwrap());

        store.save(token("tok-1", "4900009999999999")).await.unwrap();
        assert!(!store.exists_by_value("4900001234567890").await.unwrap());
        let found = store.find_by_value("4900009999999999").await.unwrap().unwrap();
        assert_eq!(found.reference, "tok-1");

        assert!(store.delete_by_reference("tok-1").await.unwrap());
        assert!(!store.delete_by_reference("tok-1").await.unwrap());
        assert!(!store.exists_by_value("4900009999999999").await.unwrap());
        assert!(store.find_by_reference("tok-1").await.unwrap().is_none());
    }
}
