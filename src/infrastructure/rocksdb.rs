use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{PaymentStore, TokenStore};
use crate::domain::token::CardToken;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping `merchant \x1f reference` to a payment id.
pub const CF_MERCHANT_REFS: &str = "merchant_refs";
/// Column Family for vault tokens, keyed by token reference.
pub const CF_TOKENS: &str = "tokens";
/// Column Family mapping token values to token references.
pub const CF_TOKEN_VALUES: &str = "token_values";
/// Column Family for store bookkeeping (the payment id sequence).
pub const CF_META: &str = "meta";

const SEQUENCE_KEY: &[u8] = b"payment_sequence";
const FIRST_PAYMENT_SEQUENCE: u64 = 1000;

/// A persistent payment and token store backed by RocksDB.
///
/// Each record and its secondary index entry are written in one
/// `WriteBatch`, so the indexes never disagree with the records after a
/// crash. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    /// Next payment sequence number; held while assigning and persisting it.
    sequence: Arc<Mutex<u64>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PAYMENTS, CF_MERCHANT_REFS, CF_TOKENS, CF_TOKEN_VALUES, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        let next = match db.get_cf(handle(&db, CF_META)?, SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| PaymentError::internal("Corrupt payment sequence"))?;
                u64::from_be_bytes(raw)
            }
            None => FIRST_PAYMENT_SEQUENCE,
        };

        Ok(Self {
            db: Arc::new(db),
            sequence: Arc::new(Mutex::new(next)),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        handle(&self.db, name)
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn values<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn clear_families(&self, names: &[&str]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for name in names {
            let cf = self.cf(name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _value) = item?;
                batch.delete_cf(cf, key);
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

fn handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| PaymentError::internal(format!("Column family {} not found", name)))
}

fn reference_key(merchant_id: &str, merchant_reference: &str) -> Vec<u8> {
    format!("{}\u{1f}{}", merchant_id, merchant_reference).into_bytes()
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn save(&self, mut payment: Payment) -> Result<Payment> {
        let mut batch = WriteBatch::default();
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let assigned = payment.id.is_none();
        if assigned {
            payment.id = Some(PaymentId::new(format!("PMT{}", *sequence)));
            batch.put_cf(self.cf(CF_META)?, SEQUENCE_KEY, (*sequence + 1).to_be_bytes());
        }
        let id = payment.id_str().as_bytes().to_vec();

        batch.put_cf(self.cf(CF_PAYMENTS)?, &id, serde_json::to_vec(&payment)?);
        batch.put_cf(
            self.cf(CF_MERCHANT_REFS)?,
            reference_key(&payment.merchant_id, &payment.merchant_reference),
            &id,
        );
        self.db.write(batch)?;
        if assigned {
            *sequence += 1;
        }
        Ok(payment)
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, id.as_str().as_bytes())
    }

    async fn find_by_id_and_merchant(
        &self,
        id: &PaymentId,
        merchant_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .find_by_id(id)
            .await?
            .filter(|payment| payment.merchant_id == merchant_id))
    }

    async fn exists_by_merchant_reference(
        &self,
        merchant_reference: &str,
        merchant_id: &str,
    ) -> Result<bool> {
        let key = reference_key(merchant_id, merchant_reference);
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_MERCHANT_REFS)?, key)?
            .is_some())
    }

    async fn find_all(&self) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.values(CF_PAYMENTS)?;
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(payments)
    }

    async fn delete_by_id(&self, id: &PaymentId) -> Result<()> {
        if let Some(payment) = self.find_by_id(id).await? {
            let mut batch = WriteBatch::default();
            batch.delete_cf(self.cf(CF_PAYMENTS)?, id.as_str().as_bytes());
            batch.delete_cf(
                self.cf(CF_MERCHANT_REFS)?,
                reference_key(&payment.merchant_id, &payment.merchant_reference),
            );
            self.db.write(batch)?;
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.clear_families(&[CF_PAYMENTS, CF_MERCHANT_REFS])
    }
}

#[async_trait]
impl TokenStore for RocksDbStore {
    async fn save(&self, token: CardToken) -> Result<CardToken> {
        let values = self.cf(CF_TOKEN_VALUES)?;
        let mut batch = WriteBatch::default();
        if let Some(previous) = self.get_json::<CardToken>(CF_TOKENS, token.reference.as_bytes())?
            && previous.value != token.value
        {
            batch.delete_cf(values, previous.value.as_bytes());
        }
        batch.put_cf(values, token.value.as_bytes(), token.reference.as_bytes());
        batch.put_cf(
            self.cf(CF_TOKENS)?,
            token.reference.as_bytes(),
            serde_json::to_vec(&token)?,
        );
        self.db.write(batch)?;
        Ok(token)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<CardToken>> {
        self.get_json(CF_TOKENS, reference.as_bytes())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<CardToken>> {
        match self.db.get_cf(self.cf(CF_TOKEN_VALUES)?, value.as_bytes())? {
            Some(reference) => self.get_json(CF_TOKENS, &reference),
            None => Ok(None),
        }
    }

    async fn exists_by_reference(&self, reference: &str) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_TOKENS)?, reference.as_bytes())?
            .is_some())
    }

    async fn exists_by_value(&self, value: &str) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_TOKEN_VALUES)?, value.as_bytes())?
            .is_some())
    }

    async fn delete_by_reference(&self, reference: &str) -> Result<bool> {
        let Some(token) = self.get_json::<CardToken>(CF_TOKENS, reference.as_bytes())? else {
            return Ok(false);
        };
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_TOKENS)?, reference.as_bytes());
        batch.delete_cf(self.cf(CF_TOKEN_VALUES)?, token.value.as_bytes());
        self.db.write(batch)?;
        Ok(true)
    }

    async fn clear(&self) -> Result<()> {
        self.clear_families(&[CF_TOKENS, CF_TOKEN_VALUES])
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
    use tempfile::tempdir;

    fn payment(reference: &str) -> Payment {
        Payment::new(
            "m-1",
            reference,
            Money::new(dec!(42.50), "EUR").unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_PAYMENTS, CF_MERCHANT_REFS, CF_TOKENS, CF_TOKEN_VALUES, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_payment_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let saved = PaymentStore::save(&store, payment("order-1")).await.unwrap();
        assert_eq!(saved.id_str(), "PMT1000");
        let id = saved.id.clone().unwrap();

        let loaded = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.exists_by_merchant_reference("order-1", "m-1").await.unwrap());
        assert!(store.find_by_id_and_merchant(&id, "m-2").await.unwrap().is_none());

        store.delete_by_id(&id).await.unwrap();
        assert!(!store.exists_by_merchant_reference("order-1", "m-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rocksdb_sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            PaymentStore::save(&store, payment("a")).await.unwrap();
            PaymentStore::save(&store, payment("b")).await.unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        let next = PaymentStore::save(&store, payment("c")).await.unwrap();
        assert_eq!(next.id_str(), "PMT1002");
        assert_eq!(store.find_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rocksdb_token_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let mut token = CardToken {
            reference: "tok-1".to_string(),
            value: "4900001234567890".to_string(),
            networks: NetworkSet::single(Network::Visa),
            last_four: "7899".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
            protected_pan: "400000******7899".to_string(),
            status: TokenStatus::Active,
            created_at: Utc::now(),
            expires_at: None,
        };
        TokenStore::save(&store, token.clone()).await.unwrap();

        token.value = "4900009999999999".to_string();
        TokenStore::save(&store, token.clone()).await.unwrap();
        assert!(!store.exists_by_value("4900001234567890").await.unwrap());
        assert_eq!(
            store.find_by_value("4900009999999999").await.unwrap(),
            Some(token.clone())
        );

        assert!(store.delete_by_reference("tok-1").await.unwrap());
        assert!(!store.exists_by_value(&token.value).await.unwrap());
        assert!(!store.delete_by_reference("tok-1").await.unwrap());
    }
}
