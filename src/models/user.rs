use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::ACHIEVEMENT_FIRST_WIN;
use crate::error::{AppError, Result};

// ==================== USER ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub telegram_id: String,
    pub username: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Seed for a user created on first login.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub telegram_id: String,
    pub username: String,
    pub starting_balance: i64,
}

/// What clients see of a user.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub balance: i64,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.telegram_id.clone(),
            username: user.username.clone(),
            balance: user.balance,
        }
    }
}

// ==================== TRANSACTION ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
    Win,
    Loss,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
            TxKind::Win => "win",
            TxKind::Loss => "loss",
        }
    }

    /// Credits raise the balance, debits lower it.
    pub fn is_credit(&self) -> bool {
        matches!(self, TxKind::Deposit | TxKind::Win)
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(TxKind::Deposit),
            "withdraw" => Ok(TxKind::Withdraw),
            "win" => Ok(TxKind::Win),
            "loss" => Ok(TxKind::Loss),
            other => Err(AppError::Internal(format!("unknown transaction kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub amount: i64,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            amount: row.amount,
            created_at: row.created_at,
        })
    }
}

// ==================== DEPOSIT ====================
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Deposit {
    pub amount: i64,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

// ==================== WINNER ====================
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Winner {
    #[serde(skip_serializing)]
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub username: String,
    pub amount: i64,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

// ==================== ACHIEVEMENT ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementKind {
    FirstWin,
}

impl AchievementKind {
    pub fn code(&self) -> &'static str {
        match self {
            AchievementKind::FirstWin => ACHIEVEMENT_FIRST_WIN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AchievementKind::FirstWin => "First Win",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AchievementKind::FirstWin => "Win your first game",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            AchievementKind::FirstWin => "star",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            ACHIEVEMENT_FIRST_WIN => Some(AchievementKind::FirstWin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UnlockedAchievement {
    pub code: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub unlocked: bool,
    pub unlocked_at: DateTime<Utc>,
}

impl AchievementView {
    /// Codes missing from the catalogue are dropped.
    pub fn from_unlocked(unlocked: &UnlockedAchievement) -> Option<Self> {
        let kind = AchievementKind::from_code(&unlocked.code)?;
        Some(Self {
            code: kind.code().to_string(),
            name: kind.name().to_string(),
            description: kind.description().to_string(),
            icon: kind.icon().to_string(),
            unlocked: true,
            unlocked_at: unlocked.unlocked_at,
        })
    }
}

// ==================== POSTING ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub kind: TxKind,
    pub amount: i64,
}

/// An ordered group of ledger entries committed all-or-nothing.
#[derive(Debug, Clone)]
pub struct Posting {
    pub entries: Vec<Entry>,
    pub unlocks: Vec<AchievementKind>,
    pub at: DateTime<Utc>,
}

impl Posting {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            entries: Vec::new(),
            unlocks: Vec::new(),
            at,
        }
    }

    pub fn entry(mut self, kind: TxKind, amount: i64) -> Self {
        self.entries.push(Entry { kind, amount });
        self
    }

    pub fn unlock(mut self, achievement: AchievementKind) -> Self {
        self.unlocks.push(achievement);
        self
    }

    /// Balance after every entry is applied in order.
    ///
    /// Fails with `InsufficientFunds` if the running balance would dip below
    /// zero at any step, so a posting is either fully affordable or rejected.
    pub fn apply_to(&self, balance: i64) -> Result<i64> {
        let mut running = balance;
        for entry in &self.entries {
            if entry.amount <= 0 {
                return Err(AppError::InvalidAmount(format!(
                    "{} amount must be positive",
                    entry.kind
                )));
            }
            running = if entry.kind.is_credit() {
                running
                    .checked_add(entry.amount)
                    .ok_or_else(|| AppError::InvalidAmount("amount too large".to_string()))?
            } else {
                running
                    .checked_sub(entry.amount)
                    .filter(|after| *after >= 0)
                    .ok_or(AppError::InsufficientFunds)?
            };
        }
        Ok(running)
    }
}
