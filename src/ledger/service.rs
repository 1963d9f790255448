//! Ledger service layer - credit, debit and transfer postings

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    parse_amount, EntryType, LedgerAudit, LedgerError, Transaction, Transfer, Wallet,
};
use crate::store::{Store, StoreError, UnitOfWork};

/// Attempts at drawing a fresh transaction ID before giving up
const MAX_TRANSACTION_ID_ATTEMPTS: usize = 5;

const TOP_UP_DESCRIPTION: &str = "Money added to wallet";

/// Ledger service for wallet postings
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open the owner's wallet. Calling it again returns the existing wallet.
    pub async fn open_wallet(&self, owner_id: Uuid) -> Result<Wallet, LedgerError> {
        if self.store.user(owner_id).await?.is_none() {
            return Err(LedgerError::UnknownOwner(owner_id));
        }
        let wallet = self.store.open_wallet(owner_id).await?;
        Ok(wallet)
    }

    pub async fn wallet(&self, owner_id: Uuid) -> Result<Wallet, LedgerError> {
        self.store
            .wallet_by_owner(owner_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(owner_id))
    }

    /// Transactions of the owner's wallet, newest first
    pub async fn history(&self, owner_id: Uuid) -> Result<Vec<Transaction>, LedgerError> {
        let wallet = self.wallet(owner_id).await?;
        Ok(self.store.transactions(wallet.id).await?)
    }

    /// Recompute the balance from the transaction log and compare
    pub async fn audit(&self, owner_id: Uuid) -> Result<LedgerAudit, LedgerError> {
        let wallet = self.wallet(owner_id).await?;
        let transactions = self.store.transactions(wallet.id).await?;
        let audit = LedgerAudit::compute(&wallet, &transactions);
        if !audit.consistent {
            tracing::error!(
                wallet_id = %wallet.id,
                balance = %audit.balance,
                ledger_balance = %audit.ledger_balance,
                "Wallet balance disagrees with its transaction log"
            );
        }
        Ok(audit)
    }

    pub async fn credit(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        let amount = parse_amount(amount)?;
        let mut uow = self.store.begin().await?;
        let transaction = post_credit(uow.as_mut(), owner_id, amount, description).await?;
        uow.commit().await?;

        tracing::info!(
            owner_id = %owner_id,
            transaction_id = %transaction.transaction_id,
            amount = %amount,
            "Wallet credited"
        );
        Ok(transaction)
    }

    pub async fn debit(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        let amount = parse_amount(amount)?;
        let mut uow = self.store.begin().await?;
        let transaction = post_debit(uow.as_mut(), owner_id, amount, description).await?;
        uow.commit().await?;

        tracing::info!(
            owner_id = %owner_id,
            transaction_id = %transaction.transaction_id,
            amount = %amount,
            "Wallet debited"
        );
        Ok(transaction)
    }

    pub async fn transfer(
        &self,
        from_owner: Uuid,
        to_owner: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<Transfer, LedgerError> {
        let amount = parse_amount(amount)?;
        let mut uow = self.store.begin().await?;
        let transfer = post_transfer(uow.as_mut(), from_owner, to_owner, amount, description).await?;
        uow.commit().await?;

        tracing::info!(
            from_owner = %from_owner,
            to_owner = %to_owner,
            amount = %amount,
            debit_id = %transfer.debit.transaction_id,
            credit_id = %transfer.credit.transaction_id,
            "Transfer posted"
        );
        Ok(transfer)
    }

    /// Customer self-service top-up. Opens the wallet on first use.
    pub async fn top_up(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        self.open_wallet(owner_id).await?;
        self.credit(owner_id, amount, description.unwrap_or(TOP_UP_DESCRIPTION))
            .await
    }
}

// ===== Postings inside a caller-owned unit of work =====
//
// Amounts must already have passed `parse_amount`.

pub(crate) async fn post_credit(
    uow: &mut dyn UnitOfWork,
    owner_id: Uuid,
    amount: Decimal,
    description: &str,
) -> Result<Transaction, LedgerError> {
    let mut wallet = uow
        .wallet_for_update(owner_id)
        .await?
        .ok_or(LedgerError::WalletNotFound(owner_id))?;
    wallet.apply_credit(amount)?;
    let transaction = append(uow, &wallet, EntryType::Credit, amount, description).await?;
    uow.update_wallet(&wallet).await?;
    Ok(transaction)
}

pub(crate) async fn post_debit(
    uow: &mut dyn UnitOfWork,
    owner_id: Uuid,
    amount: Decimal,
    description: &str,
) -> Result<Transaction, LedgerError> {
    let mut wallet = uow
        .wallet_for_update(owner_id)
        .await?
        .ok_or(LedgerError::WalletNotFound(owner_id))?;
    wallet.apply_debit(amount)?;
    let transaction = append(uow, &wallet, EntryType::Debit, amount, description).await?;
    uow.update_wallet(&wallet).await?;
    Ok(transaction)
}

/// Debit `from_owner` and credit `to_owner`. Wallets are locked in owner-id
/// order so concurrent opposite transfers cannot deadlock.
pub(crate) async fn post_transfer(
    uow: &mut dyn UnitOfWork,
    from_owner: Uuid,
    to_owner: Uuid,
    amount: Decimal,
    description: &str,
) -> Result<Transfer, LedgerError> {
    if from_owner == to_owner {
        return Err(LedgerError::InvalidInput(
            "cannot transfer to the same wallet".to_string(),
        ));
    }

    let (first, second) = if from_owner < to_owner {
        (from_owner, to_owner)
    } else {
        (to_owner, from_owner)
    };
    let first_wallet = uow
        .wallet_for_update(first)
        .await?
        .ok_or(LedgerError::WalletNotFound(first))?;
    let second_wallet = uow
        .wallet_for_update(second)
        .await?
        .ok_or(LedgerError::WalletNotFound(second))?;
    let (mut source, mut target) = if first == from_owner {
        (first_wallet, second_wallet)
    } else {
        (second_wallet, first_wallet)
    };

    source.apply_debit(amount)?;
    target.apply_credit(amount)?;

    let debit = append(uow, &source, EntryType::Debit, amount, description).await?;
    let credit = append(uow, &target, EntryType::Credit, amount, description).await?;
    uow.update_wallet(&source).await?;
    uow.update_wallet(&target).await?;

    Ok(Transfer { debit, credit })
}

/// Write the transaction record, drawing a new ID on collision
async fn append(
    uow: &mut dyn UnitOfWork,
    wallet: &Wallet,
    entry_type: EntryType,
    amount: Decimal,
    description: &str,
) -> Result<Transaction, LedgerError> {
    for attempt in 1..=MAX_TRANSACTION_ID_ATTEMPTS {
        let transaction = Transaction::new(wallet.id, entry_type, amount, description);
        match uow.insert_transaction(&transaction).await {
            Ok(()) => return Ok(transaction),
            Err(StoreError::Duplicate(_)) => {
                tracing::warn!(
                    transaction_id = %transaction.transaction_id,
                    attempt,
                    "Transaction ID collision, drawing a new one"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Conflict("could not allocate a unique transaction ID".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserRole};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn seeded(store: &MemoryStore) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_user(User {
                id,
                email: format!("{}@example.com", id.simple()),
                name: None,
                role: UserRole::Customer,
                municipality_id: None,
                is_approved: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;
        id
    }

    #[tokio::test]
    async fn test_transfer_moves_both_legs() {
        let store = MemoryStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let (alice, bob) = (seeded(&store).await, seeded(&store).await);
        ledger.top_up(alice, dec!(100), None).await.unwrap();
        ledger.open_wallet(bob).await.unwrap();

        let transfer = ledger
            .transfer(alice, bob, dec!(35.5), "Payment")
            .await
            .unwrap();
        assert_eq!(transfer.debit.entry_type, EntryType::Debit);
        assert_eq!(transfer.credit.entry_type, EntryType::Credit);
        assert_eq!(transfer.debit.amount, dec!(35.50));

        // Reverse direction exercises the other lock order
        ledger.transfer(bob, alice, dec!(5), "Refund").await.unwrap();

        assert_eq!(ledger.wallet(alice).await.unwrap().balance, dec!(69.50));
        assert_eq!(ledger.wallet(bob).await.unwrap().balance, dec!(30.50));
        for owner in [alice, bob] {
            assert!(ledger.audit(owner).await.unwrap().consistent);
        }
    }

    #[tokio::test]
    async fn test_rejected_postings_leave_no_trace() {
        let store = MemoryStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let (alice, bob) = (seeded(&store).await, seeded(&store).await);
        ledger.top_up(alice, dec!(20), None).await.unwrap();
        ledger.open_wallet(bob).await.unwrap();

        assert!(matches!(
            ledger.transfer(alice, bob, dec!(25), "Too much").await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            ledger.transfer(alice, alice, dec!(5), "Loop").await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.debit(alice, dec!(0.001), "Dust").await,
            Err(LedgerError::InvalidInput(_))
        ));

        assert_eq!(ledger.wallet(alice).await.unwrap().balance, dec!(20.00));
        assert_eq!(ledger.history(alice).await.unwrap().len(), 1);
        assert!(ledger.history(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wallets_need_known_owner() {
        let store = MemoryStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let stranger = Uuid::new_v4();

        assert!(matches!(
            ledger.open_wallet(stranger).await,
            Err(LedgerError::UnknownOwner(_))
        ));
        assert!(matches!(
            ledger.wallet(stranger).await,
            Err(LedgerError::WalletNotFound(_))
        ));

        let owner = seeded(&store).await;
        assert!(matches!(
            ledger.credit(owner, dec!(10), "Before opening").await,
            Err(LedgerError::WalletNotFound(_))
        ));
        let opened = ledger.open_wallet(owner).await.unwrap();
        assert_eq!(ledger.open_wallet(owner).await.unwrap().id, opened.id);
    }
}
