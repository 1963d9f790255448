//! Wallet and transaction models

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::LedgerError;

/// Fractional digits kept for every monetary value
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a NUMERIC(12,2) column holds
pub const MAX_AMOUNT: Decimal = dec!(9999999999.99);

const TRANSACTION_ID_PREFIX: &str = "TXN";
const TRANSACTION_ID_SUFFIX_LEN: usize = 12;

/// Per-user wallet
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: to_money(Decimal::ZERO),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn apply_credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        let balance = self.balance + amount;
        if balance > MAX_AMOUNT {
            return Err(LedgerError::InvalidInput(format!(
                "credit would push wallet {} above {}",
                self.id, MAX_AMOUNT
            )));
        }
        self.balance = to_money(balance);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub(crate) fn apply_debit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                wallet_id: self.id,
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance = to_money(self.balance - amount);
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Ledger entry direction
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "entry_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

/// Immutable wallet transaction
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_id: String,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn new(
        wallet_id: Uuid,
        entry_type: EntryType,
        amount: Decimal,
        description: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: generate_transaction_id(),
            wallet_id,
            entry_type,
            amount,
            description: description.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Signed effect of this entry on the wallet balance
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

/// Both legs of a wallet-to-wallet transfer
#[derive(Debug, Serialize, Clone)]
pub struct Transfer {
    pub debit: Transaction,
    pub credit: Transaction,
}

/// Comparison of a wallet balance with its transaction log
#[derive(Debug, Serialize, Clone)]
pub struct LedgerAudit {
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub ledger_balance: Decimal,
    pub transaction_count: usize,
    pub consistent: bool,
}

impl LedgerAudit {
    pub fn compute(wallet: &Wallet, transactions: &[Transaction]) -> Self {
        let ledger_balance = to_money(
            transactions
                .iter()
                .map(Transaction::signed_amount)
                .sum::<Decimal>(),
        );
        Self {
            wallet_id: wallet.id,
            owner_id: wallet.owner_id,
            balance: wallet.balance,
            ledger_balance,
            transaction_count: transactions.len(),
            consistent: ledger_balance == wallet.balance,
        }
    }
}

/// `TXN` followed by twelve upper-case hex characters
pub fn generate_transaction_id() -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(TRANSACTION_ID_SUFFIX_LEN)
        .collect();
    format!("{}{}", TRANSACTION_ID_PREFIX, suffix.to_uppercase())
}

/// Rescale to the ledger's two fractional digits
pub fn to_money(amount: Decimal) -> Decimal {
    let mut amount = amount;
    amount.rescale(MONEY_SCALE);
    amount
}

/// Validate a caller-supplied amount: positive, within column range, and
/// without sub-cent digits.
pub fn parse_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!(
            "amount must be greater than 0, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::InvalidInput(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::InvalidInput(format!(
            "amount {} exceeds the maximum of {}",
            amount, MAX_AMOUNT
        )));
    }
    Ok(to_money(amount))
}

/// Request DTO for adding money to the caller's wallet
#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    pub amount: Decimal,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

/// Request DTO for an operator credit or debit
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustmentRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 200))]
    pub description: String,
}

/// Response DTO for wallet reads
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            owner_id: wallet.owner_id,
            balance: wallet.balance,
            updated_at: wallet.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert_eq!(id.len(), 15);
        assert!(id.starts_with("TXN"));
        assert!(id[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(id, generate_transaction_id());
    }

    #[test]
    fn test_parse_amount_bounds() {
        assert_eq!(parse_amount(dec!(10)).unwrap(), dec!(10.00));
        assert_eq!(parse_amount(dec!(0.01)).unwrap(), dec!(0.01));
        assert_eq!(parse_amount(dec!(12.50)).unwrap().scale(), 2);
        assert_eq!(parse_amount(dec!(12.500)).unwrap(), dec!(12.50));
        assert!(parse_amount(dec!(0)).is_err());
        assert!(parse_amount(dec!(-5)).is_err());
        assert!(parse_amount(dec!(0.001)).is_err());
        assert!(parse_amount(dec!(10000000000)).is_err());
    }

    #[test]
    fn test_debit_rejected_leaves_balance() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_credit(dec!(100)).unwrap();

        let err = wallet.apply_debit(dec!(150)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(wallet.balance, dec!(100));

        wallet.apply_debit(dec!(100)).unwrap();
        assert_eq!(wallet.balance, Decimal::ZERO);
    }

    #[test]
    fn test_audit_detects_drift() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_credit(dec!(80)).unwrap();
        let log = vec![
            Transaction::new(wallet.id, EntryType::Credit, dec!(100), "top up"),
            Transaction::new(wallet.id, EntryType::Debit, dec!(20), "collection"),
        ];

        let audit = LedgerAudit::compute(&wallet, &log);
        assert!(audit.consistent);
        assert_eq!(audit.ledger_balance, dec!(80));
        assert_eq!(audit.transaction_count, 2);

        wallet.balance = dec!(81);
        assert!(!LedgerAudit::compute(&wallet, &log).consistent);
    }
}
