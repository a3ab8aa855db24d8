use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::ledger::{LedgerClient, LedgerError};
use super::types::{
    CreditResult, Rejection, RejectionReason, TransactionClaim, TransactionId, ASSET_DECIMALS, ASSET_TICKER,
};
use crate::account::store::{AccountStore, StoreError};
use crate::account::types::{AccountId, DepositCredit};
use crate::client::price_fetcher::PriceOracle;

/// Verifies client deposit claims against the ledger and credits accounts.
///
/// Every path except a successful credit leaves the store untouched. The
/// replay guard is the store's atomic `apply_credit`; the early check below
/// only saves a ledger round trip.
pub struct PaymentVerifier {
    store: Arc<dyn AccountStore>,
    ledger: LedgerClient,
    prices: PriceOracle,
}

fn store_rejection(err: StoreError) -> Rejection {
    match err {
        StoreError::AccountNotFound => Rejection::new(RejectionReason::AccountNotFound, "account not found"),
        StoreError::AlreadyProcessed { txid, .. } => Rejection::new(
            RejectionReason::AlreadyProcessed,
            format!("transaction {} has already been credited", txid),
        ),
        StoreError::Balance(e) => Rejection::new(RejectionReason::InvalidAmount, e.to_string()),
        other => {
            warn!(error = %other, "account store failure during verification");
            Rejection::new(RejectionReason::StoreFailure, "account store unavailable, retry later")
        }
    }
}

impl PaymentVerifier {
    pub fn new(store: Arc<dyn AccountStore>, ledger: LedgerClient, prices: PriceOracle) -> Self {
        Self { store, ledger, prices }
    }

    pub fn ledger_providers(&self) -> Vec<&str> {
        self.ledger.provider_names()
    }

    pub async fn verify_and_credit(&self, claim: &TransactionClaim) -> Result<CreditResult, Rejection> {
        let result = self.run(claim).await;
        match &result {
            Ok(credit) => info!(
                account = %credit.account_id,
                txid = %credit.transaction_id,
                amount = %credit.credited_amount,
                settlement = %credit.settlement_delta,
                rate_source = %credit.rate_source,
                "deposit credited"
            ),
            Err(rejection) => info!(
                account = %claim.account_id,
                txid = %claim.transaction_id,
                reason = %rejection.reason,
                "deposit claim rejected: {}",
                rejection.message
            ),
        }
        result
    }

    async fn run(&self, claim: &TransactionClaim) -> Result<CreditResult, Rejection> {
        // 1. Shape checks, before any I/O
        let raw_txid = claim.transaction_id.trim();
        if raw_txid.is_empty() || claim.account_id.trim().is_empty() || claim.claimed_address.trim().is_empty() {
            return Err(Rejection::new(
                RejectionReason::InvalidFormat,
                "transactionId, accountId and claimedAddress are required",
            ));
        }
        let txid = TransactionId::parse(raw_txid)
            .map_err(|e| Rejection::new(RejectionReason::InvalidFormat, e.to_string()))?;

        // 2. Account
        let account_id = AccountId::from_str(&claim.account_id)
            .map_err(|_| Rejection::new(RejectionReason::AccountNotFound, "account not found"))?;
        let account = self
            .store
            .get(&account_id)
            .map_err(store_rejection)?
            .ok_or_else(|| Rejection::new(RejectionReason::AccountNotFound, "account not found"))?;

        // 3. Address ownership
        if claim.claimed_address.trim() != account.deposit_address {
            return Err(Rejection::new(
                RejectionReason::AddressMismatch,
                "claimed address is not this account's deposit address",
            ));
        }

        // 4. Replay, for this account and across accounts
        if account.has_processed(txid.as_str()) {
            return Err(Rejection::new(
                RejectionReason::AlreadyProcessed,
                format!("transaction {} has already been credited", txid),
            ));
        }
        if self.store.transaction_owner(txid.as_str()).map_err(store_rejection)?.is_some() {
            return Err(Rejection::new(
                RejectionReason::AlreadyProcessed,
                format!("transaction {} has already been credited", txid),
            ));
        }

        // 5. Ledger
        let record = self.ledger.fetch_transaction(&txid).await.map_err(|e| match e {
            LedgerError::Unavailable => Rejection::new(
                RejectionReason::LedgerUnavailable,
                "no ledger provider could be reached, retry later",
            ),
            LedgerError::NotFound => Rejection::new(
                RejectionReason::TransactionNotFound,
                format!("transaction {} not found on the ledger", txid),
            ),
        })?;

        // 6. Output to our address
        let amount = record.amount_paid_to(&account.deposit_address).ok_or_else(|| {
            Rejection::new(
                RejectionReason::NoMatchingOutput,
                "transaction has no output paying this account's deposit address",
            )
        })?;

        // 7.
        if amount <= Decimal::ZERO {
            return Err(Rejection::new(RejectionReason::InvalidAmount, "matched output has no value"));
        }

        // 8.
        if !record.confirmed {
            return Err(Rejection::new(
                RejectionReason::NotConfirmed,
                "transaction has no confirmations yet",
            ));
        }

        // 9. Valuation
        let quote = self.prices.current_rate(ASSET_TICKER).await;
        let settlement_delta = amount
            .checked_mul(quote.rate)
            .map(|d| d.round_dp(ASSET_DECIMALS))
            .ok_or_else(|| Rejection::new(RejectionReason::InvalidAmount, "settlement value overflows"))?;

        // 10. Atomic credit
        let credit = DepositCredit {
            account_id,
            transaction_id: txid.as_str().to_string(),
            asset_amount: amount,
            settlement_amount: settlement_delta,
        };
        let updated = self.store.apply_credit(&credit).map_err(store_rejection)?;

        Ok(CreditResult {
            account_id,
            transaction_id: credit.transaction_id,
            credited_amount: amount,
            settlement_delta,
            rate: quote.rate,
            rate_source: quote.source.to_string(),
            new_asset_balance: updated.balances.asset,
            new_settlement_balance: updated.balances.settlement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::store::MemoryAccountStore;
    use crate::account::types::Account;
    use crate::client::price_fetcher::tests::FakeFeed;
    use crate::client::price_fetcher::PriceFeed;
    use crate::oracle::ledger::tests::{record, FakeProvider};
    use crate::oracle::ledger::{LedgerProvider, ProviderError};
    use crate::oracle::types::TransactionRecord;
    use crate::storage::SledAccountStore;
    use crate::vault::keys::KeyError;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const ADDR1: &str = "addr1";
    const ADDR2: &str = "addr2";

    struct Harness {
        store: Arc<dyn AccountStore>,
        providers: Vec<Arc<FakeProvider>>,
        feed: Arc<FakeFeed>,
    }

    impl Harness {
        fn new(store: Arc<dyn AccountStore>, ledger_response: Result<TransactionRecord, ProviderError>) -> Self {
            Self {
                store,
                providers: vec![
                    FakeProvider::answering("primary", ledger_response),
                    FakeProvider::answering("secondary", Err(ProviderError::Status(503))),
                ],
                feed: FakeFeed::quoting(Decimal::new(50_000, 0)),
            }
        }

        fn with_feed(mut self, feed: Arc<FakeFeed>) -> Self {
            self.feed = feed;
            self
        }

        fn verifier(&self) -> PaymentVerifier {
            let ledger = LedgerClient::new(
                self.providers.iter().map(|p| p.clone() as Arc<dyn LedgerProvider>).collect(),
                Duration::from_millis(200),
            );
            let prices = PriceOracle::new(
                vec![self.feed.clone() as Arc<dyn PriceFeed>],
                Decimal::new(65_000, 0),
                Duration::from_millis(200),
            );
            PaymentVerifier::new(self.store.clone(), ledger, prices)
        }

        fn open(&self, username: &str, address: &'static str) -> Account {
            self.store
                .create_account(username, &|_| Ok::<_, KeyError>(address.to_string()))
                .unwrap()
        }

        fn ledger_calls(&self) -> usize {
            self.providers.iter().map(|p| p.call_count()).sum()
        }

        fn balances(&self, account: &Account) -> (Decimal, Decimal) {
            let acc = self.store.get(&account.id).unwrap().unwrap();
            (acc.balances.asset, acc.balances.settlement)
        }
    }

    fn txid() -> TransactionId {
        TransactionId::parse(&"a1".repeat(32)).unwrap()
    }

    fn claim(account: &Account, txid: &str, address: &str) -> TransactionClaim {
        TransactionClaim {
            transaction_id: txid.to_string(),
            account_id: account.id.to_string(),
            claimed_address: address.to_string(),
        }
    }

    fn memory_harness(ledger_response: Result<TransactionRecord, ProviderError>) -> Harness {
        Harness::new(Arc::new(MemoryAccountStore::new()), ledger_response)
    }

    #[tokio::test]
    async fn test_confirmed_deposit_is_credited() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, true)));
        let account = h.open("alice", ADDR1);

        let result = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap();

        assert_eq!(result.credited_amount, Decimal::new(1, 2));
        assert_eq!(result.settlement_delta, Decimal::new(500, 0));
        assert_eq!(result.new_asset_balance, Decimal::new(1, 2));
        assert_eq!(result.new_settlement_balance, Decimal::new(500, 0));
        assert_eq!(result.rate_source, "feed:fake");
        assert_eq!(h.balances(&account), (Decimal::new(1, 2), Decimal::new(500, 0)));
    }

    #[tokio::test]
    async fn test_resubmission_is_already_processed() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, true)));
        let account = h.open("alice", ADDR1);
        let verifier = h.verifier();

        verifier
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap();
        let calls_after_first = h.ledger_calls();

        // Uppercase variant of the same id
        let err = verifier
            .verify_and_credit(&claim(&account, &txid().as_str().to_uppercase(), ADDR1))
            .await
            .unwrap_err();

        assert_eq!(err.reason, RejectionReason::AlreadyProcessed);
        assert_eq!(h.ledger_calls(), calls_after_first);
        assert_eq!(h.balances(&account), (Decimal::new(1, 2), Decimal::new(500, 0)));
    }

    #[tokio::test]
    async fn test_unconfirmed_transaction_not_credited() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, false)));
        let account = h.open("alice", ADDR1);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap_err();

        assert_eq!(err.reason, RejectionReason::NotConfirmed);
        assert_eq!(h.balances(&account), (Decimal::ZERO, Decimal::ZERO));

        // Later confirmation makes the same claim succeed
        h.providers[0].set_response(Ok(record(&txid(), ADDR1, 1_000_000, true)));
        assert!(h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_no_output_to_deposit_address() {
        let h = memory_harness(Ok(record(&txid(), "someone-else", 1_000_000, true)));
        let account = h.open("alice", ADDR1);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap_err();
        assert_eq!(err.reason, RejectionReason::NoMatchingOutput);
    }

    #[tokio::test]
    async fn test_zero_value_output_is_invalid_amount() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 0, true)));
        let account = h.open("alice", ADDR1);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap_err();
        assert_eq!(err.reason, RejectionReason::InvalidAmount);
    }

    #[tokio::test]
    async fn test_all_ledger_providers_down() {
        let h = memory_harness(Err(ProviderError::Transport("connection refused".to_string())));
        let account = h.open("alice", ADDR1);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap_err();

        assert_eq!(err.reason, RejectionReason::LedgerUnavailable);
        assert!(err.reason.is_retryable());
        assert_eq!(h.providers[1].call_count(), 1);
        assert_eq!(h.balances(&account), (Decimal::ZERO, Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let h = memory_harness(Err(ProviderError::NotFound));
        let account = h.open("alice", ADDR1);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap_err();
        assert_eq!(err.reason, RejectionReason::TransactionNotFound);
    }

    #[tokio::test]
    async fn test_price_feed_down_uses_fallback() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, true))).with_feed(FakeFeed::failing());
        let account = h.open("alice", ADDR1);

        let result = h
            .verifier()
            .verify_and_credit(&claim(&account, txid().as_str(), ADDR1))
            .await
            .unwrap();

        assert_eq!(result.rate, Decimal::new(65_000, 0));
        assert_eq!(result.settlement_delta, Decimal::new(650, 0));
        assert_eq!(result.rate_source, "fallback");
    }

    #[tokio::test]
    async fn test_malformed_txid_makes_no_external_calls() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, true)));
        let account = h.open("alice", ADDR1);
        let verifier = h.verifier();

        let bad_ids = vec![String::new(), "a1".to_string(), "zz".repeat(32), "a1".repeat(33)];
        for bad in &bad_ids {
            let err = verifier
                .verify_and_credit(&claim(&account, bad, ADDR1))
                .await
                .unwrap_err();
            assert_eq!(err.reason, RejectionReason::InvalidFormat, "txid {:?}", bad);
        }

        assert_eq!(h.ledger_calls(), 0);
        assert_eq!(h.feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_unparseable_account() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1_000_000, true)));
        let verifier = h.verifier();

        let mut bogus = TransactionClaim {
            transaction_id: txid().as_str().to_string(),
            account_id: "not-a-uuid".to_string(),
            claimed_address: ADDR1.to_string(),
        };
        assert_eq!(
            verifier.verify_and_credit(&bogus).await.unwrap_err().reason,
            RejectionReason::AccountNotFound
        );

        bogus.account_id = AccountId::generate().to_string();
        assert_eq!(
            verifier.verify_and_credit(&bogus).await.unwrap_err().reason,
            RejectionReason::AccountNotFound
        );
        assert_eq!(h.ledger_calls(), 0);
    }

    #[tokio::test]
    async fn test_claiming_another_accounts_address() {
        let h = memory_harness(Ok(record(&txid(), ADDR2, 1_000_000, true)));
        let alice = h.open("alice", ADDR1);
        let _bob = h.open("bob", ADDR2);

        let err = h
            .verifier()
            .verify_and_credit(&claim(&alice, txid().as_str(), ADDR2))
            .await
            .unwrap_err();

        assert_eq!(err.reason, RejectionReason::AddressMismatch);
        assert_eq!(h.ledger_calls(), 0);
    }

    #[tokio::test]
    async fn test_same_payment_never_credits_two_accounts() {
        let multi = TransactionRecord {
            txid: txid(),
            outputs: vec![
                record(&txid(), ADDR1, 1_000_000, true).outputs.remove(0),
                record(&txid(), ADDR2, 2_000_000, true).outputs.remove(0),
            ],
            confirmed: true,
        };
        let h = memory_harness(Ok(multi));
        let alice = h.open("alice", ADDR1);
        let bob = h.open("bob", ADDR2);
        let verifier = h.verifier();

        verifier
            .verify_and_credit(&claim(&alice, txid().as_str(), ADDR1))
            .await
            .unwrap();
        let err = verifier
            .verify_and_credit(&claim(&bob, txid().as_str(), ADDR2))
            .await
            .unwrap_err();

        assert_eq!(err.reason, RejectionReason::AlreadyProcessed);
        assert_eq!(h.balances(&bob), (Decimal::ZERO, Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_balances_only_grow() {
        let h = memory_harness(Ok(record(&txid(), ADDR1, 1, true)));
        let account = h.open("alice", ADDR1);
        let verifier = h.verifier();

        let mut last = (Decimal::ZERO, Decimal::ZERO);
        for i in 0..5u8 {
            let id = TransactionId::parse(&format!("{:02x}", i).repeat(32)).unwrap();
            h.providers[0].set_response(Ok(record(&id, ADDR1, 10_000 * (i as u64 + 1), true)));
            verifier
                .verify_and_credit(&claim(&account, id.as_str(), ADDR1))
                .await
                .unwrap();

            let now = h.balances(&account);
            assert!(now.0 > last.0 && now.1 > last.1);
            last = now;
        }
        assert_eq!(last.0, Decimal::new(150_000, 8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_claims_credit_once() {
        let h = Harness::new(
            Arc::new(SledAccountStore::temporary().unwrap()),
            Ok(record(&txid(), ADDR1, 1_000_000, true)),
        );
        let account = h.open("alice", ADDR1);
        let verifier = Arc::new(h.verifier());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let verifier = verifier.clone();
            let claim = claim(&account, txid().as_str(), ADDR1);
            handles.push(tokio::spawn(async move { verifier.verify_and_credit(&claim).await }));
        }

        let mut credited = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => credited += 1,
                Err(rejection) => assert_eq!(rejection.reason, RejectionReason::AlreadyProcessed),
            }
        }

        assert_eq!(credited, 1);
        assert_eq!(h.balances(&account), (Decimal::new(1, 2), Decimal::new(500, 0)));
    }
}
