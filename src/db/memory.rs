use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

use super::Store;
use crate::constants::WINNERS_FEED_CAPACITY;
use crate::error::{AppError, Result};
use crate::models::*;

struct Account {
    user: User,
    transactions: Vec<Transaction>,
    deposits: Vec<Deposit>,
    achievements: Vec<UnlockedAchievement>,
}

impl Account {
    fn new(user: User) -> Self {
        Self {
            user,
            transactions: Vec::new(),
            deposits: Vec::new(),
            achievements: Vec::new(),
        }
    }
}

// Process-local storage for development and tests. Each account has its own
// lock; the map lock is only held long enough to find or insert an account.
// The winners feed keeps only the newest `WINNERS_FEED_CAPACITY` entries.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    accounts: Arc<RwLock<HashMap<String, Arc<Mutex<Account>>>>>,
    winners: Arc<Mutex<VecDeque<Winner>>>,
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Internal("storage lock poisoned".to_string())
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, telegram_id: &str) -> Result<Option<Arc<Mutex<Account>>>> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        Ok(accounts.get(telegram_id).cloned())
    }

    fn require_account(&self, telegram_id: &str) -> Result<Arc<Mutex<Account>>> {
        self.account(telegram_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

#[async_trait]
impl Store for InMemoryStorage {
    async fn find_or_create_user(
        &self,
        new_user: &NewUser,
        at: DateTime<Utc>,
    ) -> Result<(User, bool)> {
        if let Some(account) = self.account(&new_user.telegram_id)? {
            let account = account.lock().map_err(poisoned)?;
            return Ok((account.user.clone(), false));
        }

        let mut accounts = self.accounts.write().map_err(poisoned)?;
        let outcome = match accounts.entry(new_user.telegram_id.clone()) {
            MapEntry::Occupied(existing) => {
                let account = existing.get().lock().map_err(poisoned)?;
                (account.user.clone(), false)
            }
            MapEntry::Vacant(slot) => {
                let user = User {
                    telegram_id: new_user.telegram_id.clone(),
                    username: new_user.username.clone(),
                    balance: new_user.starting_balance,
                    created_at: at,
                };
                slot.insert(Arc::new(Mutex::new(Account::new(user.clone()))));
                (user, true)
            }
        };
        Ok(outcome)
    }

    async fn get_user(&self, telegram_id: &str) -> Result<Option<User>> {
        let Some(account) = self.account(telegram_id)? else {
            return Ok(None);
        };
        let user = account.lock().map_err(poisoned)?.user.clone();
        Ok(Some(user))
    }

    async fn commit(&self, telegram_id: &str, posting: &Posting) -> Result<User> {
        let account = self.require_account(telegram_id)?;
        let mut account = account.lock().map_err(poisoned)?;

        // Everything fallible happens before the first write.
        let balance = posting.apply_to(account.user.balance)?;
        let has_win = posting.entries.iter().any(|e| e.kind == TxKind::Win);
        let mut feed = if has_win {
            Some(self.winners.lock().map_err(poisoned)?)
        } else {
            None
        };

        for entry in &posting.entries {
            account.transactions.push(Transaction {
                id: Uuid::new_v4(),
                user_id: telegram_id.to_string(),
                kind: entry.kind,
                amount: entry.amount,
                created_at: posting.at,
            });

            match entry.kind {
                TxKind::Deposit => account.deposits.push(Deposit {
                    amount: entry.amount,
                    created_at: posting.at,
                }),
                TxKind::Win => {
                    if let Some(feed) = feed.as_mut() {
                        feed.push_back(Winner {
                            id: Uuid::new_v4(),
                            user_id: telegram_id.to_string(),
                            username: account.user.username.clone(),
                            amount: entry.amount,
                            created_at: posting.at,
                        });
                        while feed.len() > WINNERS_FEED_CAPACITY {
                            feed.pop_front();
                        }
                    }
                }
                TxKind::Withdraw | TxKind::Loss => {}
            }
        }

        account.user.balance = balance;

        for achievement in &posting.unlocks {
            let code = achievement.code();
            if !account.achievements.iter().any(|a| a.code == code) {
                account.achievements.push(UnlockedAchievement {
                    code: code.to_string(),
                    unlocked_at: posting.at,
                });
            }
        }

        Ok(account.user.clone())
    }

    async fn list_transactions(&self, telegram_id: &str) -> Result<Vec<Transaction>> {
        let account = self.require_account(telegram_id)?;
        let account = account.lock().map_err(poisoned)?;
        Ok(account.transactions.iter().rev().cloned().collect())
    }

    async fn list_deposits(&self, telegram_id: &str) -> Result<Vec<Deposit>> {
        let account = self.require_account(telegram_id)?;
        let account = account.lock().map_err(poisoned)?;
        Ok(account.deposits.iter().rev().cloned().collect())
    }

    async fn list_achievements(&self, telegram_id: &str) -> Result<Vec<UnlockedAchievement>> {
        let account = self.require_account(telegram_id)?;
        let account = account.lock().map_err(poisoned)?;
        Ok(account.achievements.clone())
    }

    async fn recent_winners(&self, limit: i64) -> Result<Vec<Winner>> {
        let winners = self.winners.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(winners.iter().rev().take(limit).cloned().collect())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
