use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::Config,
    db::Store,
    error::{AppError, Result},
    models::{AchievementView, Deposit, Posting, Transaction, TxKind, User},
    utils::Clock,
};

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub balance: i64,
    pub achievements: Vec<AchievementView>,
}

/// Deposits, withdrawals and read access to a user's ledger.
pub struct LedgerService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    min_transfer_amount: i64,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            min_transfer_amount: config.min_transfer_amount,
        }
    }

    fn validate_amount(&self, amount: Option<i64>) -> Result<i64> {
        let amount = amount.filter(|a| *a > 0).ok_or_else(|| {
            AppError::InvalidAmount("Amount must be a positive whole number".to_string())
        })?;
        if amount < self.min_transfer_amount {
            return Err(AppError::InvalidAmount(format!(
                "Minimum amount is {}",
                self.min_transfer_amount
            )));
        }
        Ok(amount)
    }

    pub async fn deposit(&self, telegram_id: &str, amount: Option<i64>) -> Result<User> {
        let amount = self.validate_amount(amount)?;
        let posting = Posting::new(self.clock.now()).entry(TxKind::Deposit, amount);
        let user = self.store.commit(telegram_id, &posting).await?;

        tracing::info!(
            "Deposit of {} for {}, balance now {}",
            amount,
            telegram_id,
            user.balance
        );
        Ok(user)
    }

    pub async fn withdraw(&self, telegram_id: &str, amount: Option<i64>) -> Result<User> {
        let amount = self.validate_amount(amount)?;
        let posting = Posting::new(self.clock.now()).entry(TxKind::Withdraw, amount);
        let user = self.store.commit(telegram_id, &posting).await?;

        tracing::info!(
            "Withdrawal of {} for {}, balance now {}",
            amount,
            telegram_id,
            user.balance
        );
        Ok(user)
    }

    pub async fn transactions(&self, telegram_id: &str) -> Result<Vec<Transaction>> {
        self.require_user(telegram_id).await?;
        self.store.list_transactions(telegram_id).await
    }

    pub async fn deposits(&self, telegram_id: &str) -> Result<Vec<Deposit>> {
        self.require_user(telegram_id).await?;
        self.store.list_deposits(telegram_id).await
    }

    pub async fn profile(&self, telegram_id: &str) -> Result<Profile> {
        let user = self.require_user(telegram_id).await?;
        let achievements = self
            .store
            .list_achievements(telegram_id)
            .await?
            .iter()
            .filter_map(AchievementView::from_unlocked)
            .collect();

        Ok(Profile {
            id: user.telegram_id,
            username: user.username,
            balance: user.balance,
            achievements,
        })
    }

    async fn require_user(&self, telegram_id: &str) -> Result<User> {
        self.store
            .get_user(telegram_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
