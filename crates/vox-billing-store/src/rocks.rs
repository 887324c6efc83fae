//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait. Compound operations take a striped per-account mutex for the
//! duration of their read-check-write cycle, so the balance check and the
//! batch that commits its consequences cannot interleave with another
//! writer for the same user.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    WriteBatch,
};
use tracing::debug;

use vox_billing_core::{
    Account, Invoice, InvoiceId, Transaction, TransactionId, TransactionType, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{CreditOutcome, DebitOutcome, SettlementOutcome, Store};

/// Number of account lock stripes. Concurrency is per user, so collisions
/// between unrelated users only cost a little extra waiting.
const ACCOUNT_LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<rocksdb::MultiThreaded>>,
    account_locks: Vec<Mutex<()>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: (0..ACCOUNT_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode a 16-byte identifier stored as an index value.
    fn id_value(data: &[u8]) -> Result<[u8; 16]> {
        <[u8; 16]>::try_from(data)
            .map_err(|_| StoreError::Serialization("expected 16-byte id value".into()))
    }

    /// Acquire the lock stripe guarding compound operations for a user.
    ///
    /// A poisoned stripe is recovered rather than propagated: the batch
    /// write underneath is atomic, so a panicking peer cannot have left a
    /// partial state behind.
    #[allow(clippy::cast_possible_truncation)]
    fn account_lock(&self, user_id: &UserId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        user_id.as_bytes().hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.account_locks.len();
        self.account_locks[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, account: &Account) -> Result<()> {
        let _guard = self.account_lock(&account.user_id);

        if self.get_account(&account.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);
        let end = keys::user_range_end(user_id);

        // Reverse seek from the range end lands on the newest entry, so
        // pagination walks newest to oldest without materializing the range.
        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&end, Direction::Reverse));

        let mut transactions = Vec::new();
        let mut skipped = 0;

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            if skipped < offset {
                skipped += 1;
                continue;
            }

            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward));

        let mut count: u64 = 0;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }

        Ok(count)
    }

    fn sum_unexpired_credits(&self, user_id: &UserId, as_of: DateTime<Utc>) -> Result<i64> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward));

        let mut sum: i64 = 0;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                // Expired lots drop out of the sum, and so do the
                // EXPIRATION debits that realize them; counting either
                // side alone would skew the audit.
                if tx.transaction_type == TransactionType::Expiration || tx.is_expired(as_of) {
                    continue;
                }
                sum += tx.amount_credits;
            }
        }

        Ok(sum)
    }

    fn find_transaction_by_request(
        &self,
        user_id: &UserId,
        request_id: &str,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::REQUEST_KEYS)?;
        let key = keys::request_key(user_id, request_id);

        let Some(data) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let tx_id = TransactionId::from_bytes(Self::id_value(&data)?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.get_transaction(&tx_id)
    }

    fn find_transaction_by_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::PAYMENT_INTENTS)?;
        let key = keys::payment_intent_key(payment_intent_id);

        let Some(data) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let tx_id = TransactionId::from_bytes(Self::id_value(&data)?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.get_transaction(&tx_id)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>> {
        let cf = self.cf(cf::INVOICES)?;
        let key = keys::invoice_key(invoice_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_invoices_by_user(&self, user_id: &UserId) -> Result<Vec<Invoice>> {
        let cf_by_user = self.cf(cf::INVOICES_BY_USER)?;
        let prefix = keys::user_invoices_prefix(user_id);
        let end = keys::user_range_end(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&end, Direction::Reverse));

        let mut invoices = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }

            let invoice_id = keys::extract_invoice_id_from_user_key(&key);
            if let Some(invoice) = self.get_invoice(&invoice_id)? {
                invoices.push(invoice);
            }
        }

        Ok(invoices)
    }

    fn find_invoice_by_intent(&self, payment_intent_id: &str) -> Result<Option<Invoice>> {
        let cf = self.cf(cf::INVOICE_INTENTS)?;
        let key = keys::payment_intent_key(payment_intent_id);

        let Some(data) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let invoice_id = InvoiceId::from_bytes(Self::id_value(&data)?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.get_invoice(&invoice_id)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn apply_debit(&self, mut transaction: Transaction) -> Result<DebitOutcome> {
        let user_id = transaction.user_id;
        let _guard = self.account_lock(&user_id);

        // Idempotent replay: return the prior record untouched.
        if let Some(request_id) = transaction.request_id.as_deref() {
            if let Some(prior) = self.find_transaction_by_request(&user_id, request_id)? {
                debug!(user_id = %user_id, request_id, "debit replayed");
                return Ok(DebitOutcome {
                    new_balance_credits: prior.balance_after_credits,
                    transaction: prior,
                    replayed: true,
                });
            }
        }

        let mut account = self.get_account(&user_id)?.ok_or(StoreError::NotFound)?;

        let required = -transaction.amount_credits;
        if account.balance_credits < required {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance_credits,
                required,
            });
        }

        account.balance_credits -= required;
        if transaction.transaction_type == TransactionType::Consumption {
            account.lifetime_used_credits += required;
        }
        account.updated_at = Utc::now();
        transaction.balance_after_credits = account.balance_credits;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let account_value = Self::serialize(&account)?;
        let tx_value = Self::serialize(&transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, keys::account_key(&user_id), &account_value);
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &tx_value);
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&user_id, &transaction.id),
            [],
        );
        if let Some(request_id) = transaction.request_id.as_deref() {
            let cf_requests = self.cf(cf::REQUEST_KEYS)?;
            batch.put_cf(
                &cf_requests,
                keys::request_key(&user_id, request_id),
                transaction.id.to_bytes(),
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(DebitOutcome {
            new_balance_credits: account.balance_credits,
            transaction,
            replayed: false,
        })
    }

    fn apply_credit(&self, mut transaction: Transaction) -> Result<CreditOutcome> {
        let user_id = transaction.user_id;
        let _guard = self.account_lock(&user_id);

        if let Some(request_id) = transaction.request_id.as_deref() {
            if let Some(prior) = self.find_transaction_by_request(&user_id, request_id)? {
                debug!(user_id = %user_id, request_id, "credit replayed");
                return Ok(CreditOutcome {
                    new_balance_credits: prior.balance_after_credits,
                    transaction: prior,
                    replayed: true,
                });
            }
        }
        if let Some(intent) = transaction.payment_intent_id.as_deref() {
            if let Some(prior) = self.find_transaction_by_intent(intent)? {
                debug!(user_id = %user_id, payment_intent_id = intent, "credit replayed");
                return Ok(CreditOutcome {
                    new_balance_credits: prior.balance_after_credits,
                    transaction: prior,
                    replayed: true,
                });
            }
        }

        let mut account = self.get_account(&user_id)?.ok_or(StoreError::NotFound)?;

        let amount = transaction.amount_credits;
        account.balance_credits += amount;
        match transaction.transaction_type {
            TransactionType::Purchase => {
                account.lifetime_purchased_credits += amount;
            }
            TransactionType::FreeGrant | TransactionType::Refund | TransactionType::AdminAdjust => {
                account.lifetime_granted_credits += amount;
            }
            TransactionType::Consumption | TransactionType::Expiration => {}
        }
        account.updated_at = Utc::now();
        transaction.balance_after_credits = account.balance_credits;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let account_value = Self::serialize(&account)?;
        let tx_value = Self::serialize(&transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, keys::account_key(&user_id), &account_value);
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &tx_value);
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&user_id, &transaction.id),
            [],
        );
        if let Some(request_id) = transaction.request_id.as_deref() {
            let cf_requests = self.cf(cf::REQUEST_KEYS)?;
            batch.put_cf(
                &cf_requests,
                keys::request_key(&user_id, request_id),
                transaction.id.to_bytes(),
            );
        }
        if let Some(intent) = transaction.payment_intent_id.as_deref() {
            let cf_intents = self.cf(cf::PAYMENT_INTENTS)?;
            batch.put_cf(
                &cf_intents,
                keys::payment_intent_key(intent),
                transaction.id.to_bytes(),
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(CreditOutcome {
            new_balance_credits: account.balance_credits,
            transaction,
            replayed: false,
        })
    }

    fn settle_purchase(
        &self,
        mut transaction: Transaction,
        invoice: Invoice,
    ) -> Result<SettlementOutcome> {
        let user_id = transaction.user_id;
        let intent = invoice.payment_intent_id.clone();
        let _guard = self.account_lock(&user_id);

        // An already-settled intent replays both records. The invoice key
        // is written in the same batch as the intent key, so if the first
        // lookup hits, the second must too.
        if let Some(prior_tx) = self.find_transaction_by_intent(&intent)? {
            let prior_invoice = self.find_invoice_by_intent(&intent)?.ok_or_else(|| {
                StoreError::Database(format!("intent {intent} has a transaction but no invoice"))
            })?;
            debug!(user_id = %user_id, payment_intent_id = %intent, "settlement replayed");
            return Ok(SettlementOutcome {
                new_balance_credits: prior_tx.balance_after_credits,
                transaction: prior_tx,
                invoice: prior_invoice,
                replayed: true,
            });
        }

        let mut account = self.get_account(&user_id)?.ok_or(StoreError::NotFound)?;

        let amount = transaction.amount_credits;
        account.balance_credits += amount;
        account.lifetime_purchased_credits += amount;
        account.updated_at = Utc::now();
        transaction.balance_after_credits = account.balance_credits;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_intents = self.cf(cf::PAYMENT_INTENTS)?;
        let cf_invoices = self.cf(cf::INVOICES)?;
        let cf_invoices_by_user = self.cf(cf::INVOICES_BY_USER)?;
        let cf_invoice_intents = self.cf(cf::INVOICE_INTENTS)?;

        let account_value = Self::serialize(&account)?;
        let tx_value = Self::serialize(&transaction)?;
        let invoice_value = Self::serialize(&invoice)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, keys::account_key(&user_id), &account_value);
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &tx_value);
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&user_id, &transaction.id),
            [],
        );
        batch.put_cf(
            &cf_intents,
            keys::payment_intent_key(&intent),
            transaction.id.to_bytes(),
        );
        batch.put_cf(&cf_invoices, keys::invoice_key(&invoice.id), &invoice_value);
        batch.put_cf(
            &cf_invoices_by_user,
            keys::user_invoice_key(&user_id, &invoice.id),
            [],
        );
        batch.put_cf(
            &cf_invoice_intents,
            keys::payment_intent_key(&intent),
            invoice.id.to_bytes(),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(SettlementOutcome {
            new_balance_credits: account.balance_credits,
            transaction,
            invoice,
            replayed: false,
        })
    }
}
