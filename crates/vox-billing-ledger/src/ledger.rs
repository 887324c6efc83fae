//! The credit ledger: single authority over account balances.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use vox_billing_core::{
    Account, LedgerConfig, LedgerError, PricingConfig, Result, Transaction, TransactionId, UserId,
};
use vox_billing_store::{Store, StoreError};

use crate::requests::{
    ChargeUsageRequest, ConsumeRequest, CreditKind, CreditRequest, ListTransactionsRequest,
};

/// How many times a storage call is attempted before the ledger reports
/// itself unavailable.
const MAX_STORAGE_ATTEMPTS: u32 = 3;

/// Bounded retry for storage calls.
///
/// Only infrastructure failures are retried. Logical failures such as
/// insufficient credits or a missing account are returned on first sight,
/// and idempotency keys make retried writes safe to re-apply.
pub(crate) fn run_with_retry<T>(
    op: &'static str,
    user_id: UserId,
    mut call: impl FnMut() -> std::result::Result<T, StoreError>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt >= MAX_STORAGE_ATTEMPTS {
                    warn!(
                        op,
                        user_id = %user_id,
                        attempts = attempt,
                        error = %err,
                        "storage kept failing, giving up"
                    );
                    return Err(LedgerError::Unavailable { attempts: attempt });
                }
                warn!(op, user_id = %user_id, attempt, error = %err, "storage error, retrying");
            }
            Err(err) => return Err(map_store_error(err, user_id)),
        }
    }
}

fn map_store_error(err: StoreError, user_id: UserId) -> LedgerError {
    match err {
        StoreError::NotFound => LedgerError::AccountNotFound {
            user_id: user_id.to_string(),
        },
        StoreError::AlreadyExists => LedgerError::AccountAlreadyExists {
            user_id: user_id.to_string(),
        },
        StoreError::InsufficientCredits { balance, required } => {
            LedgerError::InsufficientCredits { balance, required }
        }
        StoreError::Database(msg) | StoreError::Serialization(msg) => LedgerError::Storage(msg),
    }
}

/// Outcome of a balance-mutating ledger operation.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    /// The appended entry, or the prior entry when the call was a replay.
    pub transaction: Transaction,

    /// Balance after the entry was applied.
    pub balance_credits: i64,

    /// Whether an earlier call already applied this request.
    pub replayed: bool,
}

/// One page of a user's transaction history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    /// Entries on this page.
    pub transactions: Vec<Transaction>,

    /// Total entries across all pages.
    pub total: u64,

    /// Total number of pages at this limit.
    pub pages: u64,

    /// The 1-based page this response covers.
    pub current: u32,
}

/// Side-by-side view of the balance counter and the log-derived sum.
///
/// The two agree as long as no granted lot has lapsed unconsumed. A
/// positive drift is the portion of the balance backed by expired credits,
/// which [`CreditLedger::expire_credits`] realizes as an EXPIRATION entry.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceAudit {
    /// Denormalized balance counter on the account.
    pub balance_credits: i64,

    /// Sum of non-expired transaction amounts from the log.
    pub unexpired_sum_credits: i64,

    /// `balance_credits - unexpired_sum_credits`.
    pub drift_credits: i64,
}

/// The credit ledger.
///
/// All balance changes flow through this type. It owns no state beyond the
/// injected storage handle and configuration, so a process constructs one
/// per store and shares it freely.
pub struct CreditLedger<S> {
    store: Arc<S>,
    config: LedgerConfig,
    pricing: PricingConfig,
}

impl<S: Store> CreditLedger<S> {
    /// Create a ledger over an injected storage handle.
    pub fn new(store: Arc<S>, config: LedgerConfig, pricing: PricingConfig) -> Self {
        Self {
            store,
            config,
            pricing,
        }
    }

    /// The ledger's configuration.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The pricing rates the ledger charges usage at.
    #[must_use]
    pub const fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an account and seed its first monthly free grant.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountAlreadyExists`] when the user already has an
    /// account, [`LedgerError::Unavailable`] when storage keeps failing.
    pub fn create_account(&self, user_id: UserId) -> Result<Account> {
        let account = Account::new(user_id);
        run_with_retry("create_account", user_id, || {
            self.store.create_account(&account)
        })?;
        if self.config.free_monthly_credits > 0 {
            self.grant_free_credits(user_id)?;
        }
        self.account(user_id)
    }

    /// Fetch an account.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists for the user.
    pub fn account(&self, user_id: UserId) -> Result<Account> {
        run_with_retry("get_account", user_id, || self.store.get_account(&user_id))?.ok_or_else(
            || LedgerError::AccountNotFound {
                user_id: user_id.to_string(),
            },
        )
    }

    /// Current balance in whole credits.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists for the user.
    pub fn balance(&self, user_id: UserId) -> Result<i64> {
        Ok(self.account(user_id)?.balance_credits)
    }

    // =========================================================================
    // Debits
    // =========================================================================

    /// Deduct credits the caller has already computed.
    ///
    /// With a `request_id`, re-sending the same request deducts once and
    /// replays the first receipt afterwards.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientCredits`] when the balance cannot cover
    /// the amount; the balance is left untouched. Validation errors are
    /// returned before any storage access.
    pub fn consume(&self, request: ConsumeRequest) -> Result<LedgerReceipt> {
        request.validate()?;
        let transaction = Transaction::consumption(
            request.user_id,
            request.amount_credits,
            request.description,
            request.request_id,
            request.metadata,
        );
        self.debit(transaction)
    }

    /// Meter model usage: estimate the credit cost and deduct it.
    ///
    /// The description records the modality, input size, derived credits,
    /// the request id, and any metadata pairs, in a fixed order.
    ///
    /// # Errors
    ///
    /// Same as [`CreditLedger::consume`].
    pub fn charge_usage(&self, request: ChargeUsageRequest) -> Result<LedgerReceipt> {
        request.validate()?;
        // Validation rejected non-positive input, so this is at least 1.
        let credits = self.pricing.estimate(request.modality, request.input_size);

        let mut parts = vec![
            format!("Usage[{}]", request.modality),
            format!(
                "input={}{}",
                request.input_size,
                request.modality.input_unit()
            ),
            format!("credits={credits}"),
        ];
        if let Some(request_id) = request.request_id.as_deref() {
            parts.push(format!("req={request_id}"));
        }
        for (key, value) in &request.metadata {
            parts.push(format!("{key}={value}"));
        }

        let metadata = serde_json::json!({
            "modality": request.modality,
            "input_size": request.input_size,
            "meta": request.metadata,
        });
        let transaction = Transaction::consumption(
            request.user_id,
            credits,
            parts.join(" "),
            request.request_id,
            metadata,
        );
        self.debit(transaction)
    }

    fn debit(&self, transaction: Transaction) -> Result<LedgerReceipt> {
        let user_id = transaction.user_id;
        let outcome = run_with_retry("apply_debit", user_id, || {
            self.store.apply_debit(transaction.clone())
        })?;
        if outcome.replayed {
            debug!(
                user_id = %user_id,
                transaction_id = %outcome.transaction.id,
                "debit request replayed"
            );
        }
        Ok(LedgerReceipt {
            balance_credits: outcome.new_balance_credits,
            transaction: outcome.transaction,
            replayed: outcome.replayed,
        })
    }

    // =========================================================================
    // Credits
    // =========================================================================

    /// Add credits to an account.
    ///
    /// Purchases are deduplicated on their payment intent id; other kinds
    /// on the optional `request_id`. Purchased and granted credits carry an
    /// expiration date derived from the configured lifetime.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists. Validation
    /// errors are returned before any storage access.
    pub fn credit(&self, request: CreditRequest) -> Result<LedgerReceipt> {
        request.validate()?;
        let now = Utc::now();
        let CreditRequest {
            user_id,
            amount_credits,
            kind,
            reason,
            request_id,
            payment_intent_id,
        } = request;

        let transaction = match kind {
            CreditKind::Purchase => Transaction::purchase(
                user_id,
                amount_credits,
                // validate() guarantees presence.
                payment_intent_id.unwrap_or_default(),
                self.config.expiration_from(now),
            ),
            CreditKind::FreeGrant => Transaction::free_grant(
                user_id,
                amount_credits,
                request_id.unwrap_or_else(|| LedgerConfig::free_grant_key(now)),
                self.config.expiration_from(now),
            ),
            CreditKind::Refund => Transaction::refund(
                user_id,
                amount_credits,
                reason.unwrap_or_default(),
                request_id,
            ),
            CreditKind::AdminAdjust => Transaction::admin_adjust(
                user_id,
                amount_credits,
                reason.unwrap_or_default(),
                request_id,
            ),
        };
        self.apply_credit(transaction)
    }

    /// Grant this month's free credits.
    ///
    /// Keyed by calendar month, so a scheduler may call this repeatedly
    /// without double-granting.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists.
    pub fn grant_free_credits(&self, user_id: UserId) -> Result<LedgerReceipt> {
        let now = Utc::now();
        let transaction = Transaction::free_grant(
            user_id,
            self.config.free_monthly_credits,
            LedgerConfig::free_grant_key(now),
            self.config.expiration_from(now),
        );
        self.apply_credit(transaction)
    }

    fn apply_credit(&self, transaction: Transaction) -> Result<LedgerReceipt> {
        let user_id = transaction.user_id;
        let outcome = run_with_retry("apply_credit", user_id, || {
            self.store.apply_credit(transaction.clone())
        })?;
        if outcome.replayed {
            debug!(
                user_id = %user_id,
                transaction_id = %outcome.transaction.id,
                "credit request replayed"
            );
        }
        Ok(LedgerReceipt {
            balance_credits: outcome.new_balance_credits,
            transaction: outcome.transaction,
            replayed: outcome.replayed,
        })
    }

    // =========================================================================
    // History
    // =========================================================================

    /// List a page of the user's transaction history, newest first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for out-of-range pagination,
    /// [`LedgerError::AccountNotFound`] when no account exists.
    #[allow(clippy::cast_possible_truncation)]
    pub fn list_transactions(&self, request: ListTransactionsRequest) -> Result<TransactionPage> {
        request.validate(self.config.max_transactions_per_page)?;
        let user_id = request.user_id;
        // Listing against a missing account is a lookup failure, not an
        // empty page.
        self.account(user_id)?;

        let total = run_with_retry("count_transactions", user_id, || {
            self.store.count_transactions_by_user(&user_id)
        })?;

        let limit = request.limit as usize;
        let offset = (request.page as usize - 1) * limit;
        let transactions = run_with_retry("list_transactions", user_id, || {
            self.store.list_transactions_by_user(&user_id, limit, offset)
        })?;

        Ok(TransactionPage {
            transactions,
            total,
            pages: total.div_ceil(u64::from(request.limit)),
            current: request.page,
        })
    }

    /// Fetch a single transaction owned by the user.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] when the id does not exist or
    /// belongs to another user.
    pub fn transaction(
        &self,
        user_id: UserId,
        transaction_id: &TransactionId,
    ) -> Result<Transaction> {
        let found = run_with_retry("get_transaction", user_id, || {
            self.store.get_transaction(transaction_id)
        })?;
        match found {
            Some(transaction) if transaction.user_id == user_id => Ok(transaction),
            _ => Err(LedgerError::TransactionNotFound {
                transaction_id: transaction_id.to_string(),
            }),
        }
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Compare the balance counter with the non-expired log sum.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists.
    pub fn reconcile(&self, user_id: UserId) -> Result<BalanceAudit> {
        let account = self.account(user_id)?;
        let as_of = Utc::now();
        let sum = run_with_retry("sum_unexpired", user_id, || {
            self.store.sum_unexpired_credits(&user_id, as_of)
        })?;
        Ok(BalanceAudit {
            balance_credits: account.balance_credits,
            unexpired_sum_credits: sum,
            drift_credits: account.balance_credits - sum,
        })
    }

    /// Realize lapsed credit lots as an EXPIRATION entry.
    ///
    /// Appends a debit for the positive drift between the balance counter
    /// and the non-expired log sum, clamped so the balance never goes
    /// negative. Returns `None` when nothing has lapsed. Re-running after
    /// a realization finds nothing further to debit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] when no account exists,
    /// [`LedgerError::Unavailable`] when concurrent debits keep moving the
    /// balance out from under the computed amount.
    pub fn expire_credits(&self, user_id: UserId) -> Result<Option<LedgerReceipt>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let audit = self.reconcile(user_id)?;
            let amount = audit.drift_credits.min(audit.balance_credits);
            if amount <= 0 {
                return Ok(None);
            }

            let transaction = Transaction::expiration(user_id, amount);
            match run_with_retry("expire_credits", user_id, || {
                self.store.apply_debit(transaction.clone())
            }) {
                Ok(outcome) => {
                    debug!(user_id = %user_id, amount, "expired lapsed credits");
                    return Ok(Some(LedgerReceipt {
                        balance_credits: outcome.new_balance_credits,
                        transaction: outcome.transaction,
                        replayed: outcome.replayed,
                    }));
                }
                // A concurrent debit can shrink the balance between the
                // audit read and the append. Recompute and try again.
                Err(LedgerError::InsufficientCredits { .. }) if attempt < MAX_STORAGE_ATTEMPTS => {}
                Err(LedgerError::InsufficientCredits { .. }) => {
                    warn!(user_id = %user_id, attempts = attempt, "expiration kept losing races");
                    return Err(LedgerError::Unavailable { attempts: attempt });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use vox_billing_core::{Modality, TransactionType};
    use vox_billing_store::RocksStore;

    fn test_ledger(free_monthly: i64) -> (CreditLedger<RocksStore>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let config = LedgerConfig {
            free_monthly_credits: free_monthly,
            ..LedgerConfig::default()
        };
        let ledger = CreditLedger::new(Arc::clone(&store), config, PricingConfig::default());
        (ledger, store, dir)
    }

    fn seeded_user(ledger: &CreditLedger<RocksStore>, balance: i64) -> UserId {
        let user_id = UserId::generate();
        ledger.create_account(user_id).unwrap();
        if balance > 0 {
            ledger
                .credit(CreditRequest {
                    user_id,
                    amount_credits: balance,
                    kind: CreditKind::AdminAdjust,
                    reason: Some("Seed balance".into()),
                    request_id: None,
                    payment_intent_id: None,
                })
                .unwrap();
        }
        user_id
    }

    fn consume_request(user_id: UserId, amount: i64, request_id: Option<&str>) -> ConsumeRequest {
        ConsumeRequest {
            user_id,
            amount_credits: amount,
            description: format!("Deducted {amount} credits"),
            request_id: request_id.map(String::from),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn create_account_seeds_monthly_grant() {
        let (ledger, _store, _dir) = test_ledger(1000);
        let user_id = UserId::generate();

        let account = ledger.create_account(user_id).unwrap();
        assert_eq!(account.balance_credits, 1000);
        assert_eq!(account.lifetime_granted_credits, 1000);

        // Same calendar month: the grant key replays instead of stacking.
        let receipt = ledger.grant_free_credits(user_id).unwrap();
        assert!(receipt.replayed);
        assert_eq!(ledger.balance(user_id).unwrap(), 1000);

        let page = ledger
            .list_transactions(ListTransactionsRequest {
                user_id,
                page: 1,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(
            page.transactions[0].transaction_type,
            TransactionType::FreeGrant
        );
        assert!(page.transactions[0].expiration_date.is_some());
    }

    #[test]
    fn create_account_twice_fails() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = UserId::generate();
        ledger.create_account(user_id).unwrap();
        assert!(matches!(
            ledger.create_account(user_id),
            Err(LedgerError::AccountAlreadyExists { .. })
        ));
    }

    #[test]
    fn consume_deducts_and_stamps_balance() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 500);

        let receipt = ledger
            .consume(consume_request(user_id, 10, Some("req-1")))
            .unwrap();
        assert_eq!(receipt.balance_credits, 490);
        assert_eq!(receipt.transaction.amount_credits, -10);
        assert_eq!(receipt.transaction.balance_after_credits, 490);
        assert!(!receipt.replayed);
        assert_eq!(ledger.balance(user_id).unwrap(), 490);
    }

    #[test]
    fn consume_validates_before_storage() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 500);

        assert!(matches!(
            ledger.consume(consume_request(user_id, 0, Some("req-zero"))),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.consume(consume_request(user_id, -10, None)),
            Err(LedgerError::InvalidAmount(_))
        ));

        // Nothing reached the log, and the rejected request id is unburned.
        assert_eq!(store.count_transactions_by_user(&user_id).unwrap(), 1);
        assert!(store
            .find_transaction_by_request(&user_id, "req-zero")
            .unwrap()
            .is_none());
    }

    #[test]
    fn consume_replay_deducts_once() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 500);

        let first = ledger
            .consume(consume_request(user_id, 10, Some("req-dup")))
            .unwrap();
        let second = ledger
            .consume(consume_request(user_id, 10, Some("req-dup")))
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.transaction.id, first.transaction.id);
        assert_eq!(ledger.balance(user_id).unwrap(), 490);
        assert_eq!(store.count_transactions_by_user(&user_id).unwrap(), 2);
    }

    #[test]
    fn consume_exact_balance_then_one_more() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 100);

        let receipt = ledger
            .consume(consume_request(user_id, 100, Some("req-all")))
            .unwrap();
        assert_eq!(receipt.balance_credits, 0);

        let err = ledger
            .consume(consume_request(user_id, 1, Some("req-over")))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                balance: 0,
                required: 1
            }
        ));
        assert_eq!(ledger.balance(user_id).unwrap(), 0);
    }

    #[test]
    fn insufficient_failure_leaves_balance_spendable() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 5);

        let err = ledger
            .consume(consume_request(user_id, 100, Some("req-big")))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                balance: 5,
                required: 100
            }
        ));

        // The failed attempt changed nothing; the full balance still spends.
        let receipt = ledger
            .consume(consume_request(user_id, 5, Some("req-fit")))
            .unwrap();
        assert_eq!(receipt.balance_credits, 0);
    }

    #[test]
    fn charge_usage_tts_scenario() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 500);

        let mut metadata = BTreeMap::new();
        metadata.insert("voice".to_string(), "aria".to_string());

        let receipt = ledger
            .charge_usage(ChargeUsageRequest {
                user_id,
                modality: Modality::Tts,
                input_size: 1000.0,
                request_id: Some("req-tts".into()),
                metadata,
            })
            .unwrap();

        assert_eq!(receipt.transaction.amount_credits, -10);
        assert_eq!(receipt.balance_credits, 490);
        assert_eq!(
            receipt.transaction.description,
            "Usage[TTS] input=1000chars credits=10 req=req-tts voice=aria"
        );
    }

    #[test]
    fn charge_usage_stt_rounds_up() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 1000);

        let receipt = ledger
            .charge_usage(ChargeUsageRequest {
                user_id,
                modality: Modality::Stt,
                input_size: 2.0,
                request_id: None,
                metadata: BTreeMap::new(),
            })
            .unwrap();

        // 2 * 8.3 = 16.6, charged as 17.
        assert_eq!(receipt.transaction.amount_credits, -17);
        assert_eq!(
            receipt.transaction.description,
            "Usage[STT] input=2seconds credits=17"
        );
    }

    #[test]
    fn credit_purchase_dedups_on_intent() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 0);

        let request = CreditRequest {
            user_id,
            amount_credits: 10_000,
            kind: CreditKind::Purchase,
            reason: None,
            request_id: None,
            payment_intent_id: Some("pi_ledger".into()),
        };
        let first = ledger.credit(request.clone()).unwrap();
        let second = ledger.credit(request).unwrap();

        assert!(second.replayed);
        assert_eq!(second.transaction.id, first.transaction.id);
        assert_eq!(ledger.balance(user_id).unwrap(), 10_000);
        assert_eq!(store.count_transactions_by_user(&user_id).unwrap(), 1);
        assert!(first.transaction.expiration_date.is_some());
    }

    #[test]
    fn list_transactions_paginates_newest_first() {
        let (ledger, _store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 1000);

        for i in 1..=12 {
            std::thread::sleep(Duration::from_millis(2));
            ledger
                .consume(consume_request(user_id, i, Some(&format!("req-{i}"))))
                .unwrap();
        }

        let page1 = ledger
            .list_transactions(ListTransactionsRequest {
                user_id,
                page: 1,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page1.total, 13); // seed + 12
        assert_eq!(page1.pages, 2);
        assert_eq!(page1.current, 1);
        assert_eq!(page1.transactions.len(), 10);
        assert_eq!(page1.transactions[0].amount_credits, -12);

        let page2 = ledger
            .list_transactions(ListTransactionsRequest {
                user_id,
                page: 2,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page2.transactions.len(), 3);
        assert_eq!(page2.current, 2);

        let err = ledger
            .list_transactions(ListTransactionsRequest {
                user_id,
                page: 0,
                limit: 10,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid request: invalid page or limit");

        let err = ledger
            .list_transactions(ListTransactionsRequest {
                user_id,
                page: 1,
                limit: 11,
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request: limit cannot be greater than 10"
        );
    }

    #[test]
    fn transaction_lookup_scoped_to_owner() {
        let (ledger, _store, _dir) = test_ledger(0);
        let owner = seeded_user(&ledger, 100);
        let other = seeded_user(&ledger, 100);

        let receipt = ledger
            .consume(consume_request(owner, 10, Some("req-own")))
            .unwrap();

        assert!(ledger.transaction(owner, &receipt.transaction.id).is_ok());
        assert!(matches!(
            ledger.transaction(other, &receipt.transaction.id),
            Err(LedgerError::TransactionNotFound { .. })
        ));
    }

    #[test]
    fn reconcile_agrees_until_credits_lapse() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 50);

        let audit = ledger.reconcile(user_id).unwrap();
        assert_eq!(audit.balance_credits, 50);
        assert_eq!(audit.unexpired_sum_credits, 50);
        assert_eq!(audit.drift_credits, 0);

        // Inject a purchase whose credits have already lapsed.
        let lapsed = Utc::now() - chrono::Duration::days(1);
        store
            .apply_credit(Transaction::purchase(
                user_id,
                100,
                "pi_lapsed".into(),
                lapsed,
            ))
            .unwrap();

        let audit = ledger.reconcile(user_id).unwrap();
        assert_eq!(audit.balance_credits, 150);
        assert_eq!(audit.unexpired_sum_credits, 50);
        assert_eq!(audit.drift_credits, 100);
    }

    #[test]
    fn expire_credits_realizes_lapse_once() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 50);

        let lapsed = Utc::now() - chrono::Duration::days(1);
        store
            .apply_credit(Transaction::purchase(
                user_id,
                100,
                "pi_lapsed".into(),
                lapsed,
            ))
            .unwrap();

        let receipt = ledger.expire_credits(user_id).unwrap().unwrap();
        assert_eq!(receipt.transaction.amount_credits, -100);
        assert_eq!(
            receipt.transaction.transaction_type,
            TransactionType::Expiration
        );
        assert_eq!(receipt.balance_credits, 50);

        let audit = ledger.reconcile(user_id).unwrap();
        assert_eq!(audit.drift_credits, 0);

        // Re-running finds nothing left to expire.
        assert!(ledger.expire_credits(user_id).unwrap().is_none());
    }

    #[test]
    fn expire_credits_clamps_to_balance() {
        let (ledger, store, _dir) = test_ledger(0);
        let user_id = seeded_user(&ledger, 0);

        // A lapsed 100-credit lot of which 70 were already consumed.
        let lapsed = Utc::now() - chrono::Duration::days(1);
        store
            .apply_credit(Transaction::purchase(
                user_id,
                100,
                "pi_spent".into(),
                lapsed,
            ))
            .unwrap();
        ledger
            .consume(consume_request(user_id, 70, Some("req-spent")))
            .unwrap();

        // Drift is 100 but only 30 remain; the debit clamps.
        let receipt = ledger.expire_credits(user_id).unwrap().unwrap();
        assert_eq!(receipt.transaction.amount_credits, -30);
        assert_eq!(receipt.balance_credits, 0);
    }

    #[test]
    fn concurrent_consumes_stop_at_zero() {
        let (ledger, _store, _dir) = test_ledger(0);
        let ledger = Arc::new(ledger);
        // 4 * 100 available, 5 callers want 100 each.
        let user_id = seeded_user(&ledger, 400);

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .consume(consume_request(user_id, 100, Some(&format!("conc-{i}"))))
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 4);
        assert_eq!(ledger.balance(user_id).unwrap(), 0);
    }
}
