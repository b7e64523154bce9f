use super::money::{Amount, Balance};
use crate::error::FulfillmentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OwnerId = String;

/// A customer's monetary account.
///
/// Every mutation goes through one of the named ledger operations below so
/// that `balance` and `frozen_balance` can never go negative. `version` is
/// bumped by the store on every successful write and drives optimistic
/// concurrency in the ledger.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub currency: String,
    /// Spendable funds.
    pub balance: Balance,
    /// Funds reserved for orders awaiting a provider outcome.
    pub frozen_balance: Balance,
    pub total_deposited: Balance,
    pub total_spent: Balance,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// The ledger operations that may touch a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    Reserve,
    Release,
    Settle,
    Refund,
    Credit,
}

impl LedgerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOp::Reserve => "reserve",
            LedgerOp::Release => "release",
            LedgerOp::Settle => "settle",
            LedgerOp::Refund => "refund",
            LedgerOp::Credit => "credit",
        }
    }
}

impl Wallet {
    pub fn new(owner_id: impl Into<OwnerId>, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            currency: currency.into(),
            balance: Balance::ZERO,
            frozen_balance: Balance::ZERO,
            total_deposited: Balance::ZERO,
            total_spent: Balance::ZERO,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, op: LedgerOp, amount: Amount) -> Result<(), FulfillmentError> {
        match op {
            LedgerOp::Reserve => self.reserve(amount),
            LedgerOp::Release => self.release(amount),
            LedgerOp::Settle => self.settle(amount),
            LedgerOp::Refund => self.refund(amount),
            LedgerOp::Credit => {
                self.credit(amount);
                Ok(())
            }
        }
    }

    /// Holds funds for an order (spendable -> frozen).
    pub fn reserve(&mut self, amount: Amount) -> Result<(), FulfillmentError> {
        let amount = Balance::from(amount);
        if self.balance >= amount {
            self.balance -= amount;
            self.frozen_balance += amount;
            self.touch();
            Ok(())
        } else {
            Err(FulfillmentError::InsufficientFunds {
                required: amount.value(),
                available: self.balance.value(),
            })
        }
    }

    /// Undoes a reserve when the order never reached the queue.
    pub fn release(&mut self, amount: Amount) -> Result<(), FulfillmentError> {
        self.unfreeze(amount, "release")?;
        self.balance += amount.into();
        self.touch();
        Ok(())
    }

    /// Turns held funds into realized spend once a provider accepted the order.
    pub fn settle(&mut self, amount: Amount) -> Result<(), FulfillmentError> {
        self.unfreeze(amount, "settle")?;
        self.total_spent += amount.into();
        self.touch();
        Ok(())
    }

    /// Returns held funds after a provider rejected or failed the order.
    pub fn refund(&mut self, amount: Amount) -> Result<(), FulfillmentError> {
        self.unfreeze(amount, "refund")?;
        self.balance += amount.into();
        self.touch();
        Ok(())
    }

    /// Adds a completed deposit to the spendable balance.
    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
        self.total_deposited += amount.into();
        self.touch();
    }

    fn unfreeze(&mut self, amount: Amount, op: &str) -> Result<(), FulfillmentError> {
        let amount = Balance::from(amount);
        if self.frozen_balance >= amount {
            self.frozen_balance -= amount;
            Ok(())
        } else {
            Err(FulfillmentError::ValidationError(format!(
                "cannot {op} {amount}: only {} frozen",
                self.frozen_balance
            )))
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(v: rust_decimal::Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    fn funded(balance: rust_decimal::Decimal) -> Wallet {
        let mut wallet = Wallet::new("user-1", "USD");
        wallet.credit(amount(balance));
        wallet
    }

    #[test]
    fn test_wallet_credit() {
        let wallet = funded(dec!(10.0));
        assert_eq!(wallet.balance, Balance::new(dec!(10.0)));
        assert_eq!(wallet.total_deposited, Balance::new(dec!(10.0)));
        assert_eq!(wallet.frozen_balance, Balance::ZERO);
    }

    #[test]
    fn test_wallet_reserve_success() {
        let mut wallet = funded(dec!(50.00));
        wallet.reserve(amount(dec!(2.50))).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(47.50)));
        assert_eq!(wallet.frozen_balance, Balance::new(dec!(2.50)));
    }

    #[test]
    fn test_wallet_reserve_insufficient() {
        let mut wallet = funded(dec!(5.00));
        let result = wallet.reserve(amount(dec!(7.50)));
        assert_eq!(
            result,
            Err(FulfillmentError::InsufficientFunds {
                required: dec!(7.50),
                available: dec!(5.00),
            })
        );
        assert_eq!(wallet.balance, Balance::new(dec!(5.00)));
        assert_eq!(wallet.frozen_balance, Balance::ZERO);
    }

    #[test]
    fn test_wallet_settle() {
        let mut wallet = funded(dec!(50.00));
        wallet.reserve(amount(dec!(2.50))).unwrap();
        wallet.settle(amount(dec!(2.50))).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(47.50)));
        assert_eq!(wallet.frozen_balance, Balance::ZERO);
        assert_eq!(wallet.total_spent, Balance::new(dec!(2.50)));
    }

    #[test]
    fn test_wallet_refund_round_trip() {
        let mut wallet = funded(dec!(100));
        wallet.reserve(amount(dec!(100))).unwrap();
        wallet.refund(amount(dec!(100))).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(100)));
        assert_eq!(wallet.frozen_balance, Balance::ZERO);
        assert_eq!(wallet.total_spent, Balance::ZERO);
    }

    #[test]
    fn test_wallet_release() {
        let mut wallet = funded(dec!(10));
        wallet.reserve(amount(dec!(4))).unwrap();
        wallet.release(amount(dec!(4))).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(10)));
        assert_eq!(wallet.frozen_balance, Balance::ZERO);
    }

    #[test]
    fn test_wallet_unfreeze_cannot_go_negative() {
        let mut wallet = funded(dec!(10));
        wallet.reserve(amount(dec!(1))).unwrap();
        for op in [LedgerOp::Settle, LedgerOp::Refund, LedgerOp::Release] {
            let result = wallet.apply(op, amount(dec!(2)));
            assert!(matches!(result, Err(FulfillmentError::ValidationError(_))));
        }
        assert_eq!(wallet.frozen_balance, Balance::new(dec!(1)));
        assert_eq!(wallet.balance, Balance::new(dec!(9)));
    }
}
