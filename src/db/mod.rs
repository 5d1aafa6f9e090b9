pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::*,
};

pub use memory::InMemoryStorage;

/// Persistence boundary for the ledger.
///
/// `commit` is the only way balances change. Implementations must apply a
/// posting all-or-nothing and serialize postings for the same user, so that
/// the affordability check and the write happen in one critical section.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the user and whether this call created it.
    async fn find_or_create_user(&self, new_user: &NewUser, at: DateTime<Utc>)
        -> Result<(User, bool)>;

    async fn get_user(&self, telegram_id: &str) -> Result<Option<User>>;

    async fn commit(&self, telegram_id: &str, posting: &Posting) -> Result<User>;

    /// Newest first.
    async fn list_transactions(&self, telegram_id: &str) -> Result<Vec<Transaction>>;

    /// Newest first.
    async fn list_deposits(&self, telegram_id: &str) -> Result<Vec<Deposit>>;

    async fn list_achievements(&self, telegram_id: &str) -> Result<Vec<UnlockedAchievement>>;

    async fn recent_winners(&self, limit: i64) -> Result<Vec<Winner>>;

    async fn ping(&self) -> bool;

    fn backend(&self) -> &'static str;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ==================== USER QUERIES ====================
#[async_trait]
impl Store for Database {
    async fn find_or_create_user(
        &self,
        new_user: &NewUser,
        at: DateTime<Utc>,
    ) -> Result<(User, bool)> {
        // A concurrent first login loses the insert race and falls through to the lookup.
        let inserted = sqlx::query_as::<_, User>(
            "INSERT INTO users (telegram_id, username, balance, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (telegram_id) DO NOTHING
             RETURNING telegram_id, username, balance, created_at",
        )
        .bind(&new_user.telegram_id)
        .bind(&new_user.username)
        .bind(new_user.starting_balance)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = inserted {
            return Ok((user, true));
        }

        let user = self
            .get_user(&new_user.telegram_id)
            .await?
            .ok_or_else(|| AppError::Internal("user vanished after conflict".to_string()))?;
        Ok((user, false))
    }

    async fn get_user(&self, telegram_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT telegram_id, username, balance, created_at FROM users WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ==================== LEDGER WRITES ====================
    async fn commit(&self, telegram_id: &str, posting: &Posting) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes postings per user until commit or rollback.
        let user = sqlx::query_as::<_, User>(
            "SELECT telegram_id, username, balance, created_at
             FROM users WHERE telegram_id = $1
             FOR UPDATE",
        )
        .bind(telegram_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let balance = posting.apply_to(user.balance)?;

        for entry in &posting.entries {
            sqlx::query(
                "INSERT INTO transactions (id, user_id, kind, amount, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(telegram_id)
            .bind(entry.kind.as_str())
            .bind(entry.amount)
            .bind(posting.at)
            .execute(&mut *tx)
            .await?;

            match entry.kind {
                TxKind::Deposit => {
                    sqlx::query(
                        "INSERT INTO deposits (user_id, amount, created_at) VALUES ($1, $2, $3)",
                    )
                    .bind(telegram_id)
                    .bind(entry.amount)
                    .bind(posting.at)
                    .execute(&mut *tx)
                    .await?;
                }
                TxKind::Win => {
                    sqlx::query(
                        "INSERT INTO winners (id, user_id, username, amount, created_at)
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(Uuid::new_v4())
                    .bind(telegram_id)
                    .bind(&user.username)
                    .bind(entry.amount)
                    .bind(posting.at)
                    .execute(&mut *tx)
                    .await?;
                }
                TxKind::Withdraw | TxKind::Loss => {}
            }
        }

        sqlx::query("UPDATE users SET balance = $1 WHERE telegram_id = $2")
            .bind(balance)
            .bind(telegram_id)
            .execute(&mut *tx)
            .await?;

        for achievement in &posting.unlocks {
            sqlx::query(
                "INSERT INTO user_achievements (user_id, code, unlocked_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, code) DO NOTHING",
            )
            .bind(telegram_id)
            .bind(achievement.code())
            .bind(posting.at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(User { balance, ..user })
    }

    // ==================== LEDGER READS ====================
    async fn list_transactions(&self, telegram_id: &str) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, user_id, kind, amount, created_at
             FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, seq DESC",
        )
        .bind(telegram_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn list_deposits(&self, telegram_id: &str) -> Result<Vec<Deposit>> {
        let deposits = sqlx::query_as::<_, Deposit>(
            "SELECT amount, created_at FROM deposits
             WHERE user_id = $1
             ORDER BY created_at DESC, seq DESC",
        )
        .bind(telegram_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(deposits)
    }

    async fn list_achievements(&self, telegram_id: &str) -> Result<Vec<UnlockedAchievement>> {
        let achievements = sqlx::query_as::<_, UnlockedAchievement>(
            "SELECT code, unlocked_at FROM user_achievements
             WHERE user_id = $1
             ORDER BY unlocked_at ASC",
        )
        .bind(telegram_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(achievements)
    }

    async fn recent_winners(&self, limit: i64) -> Result<Vec<Winner>> {
        let winners = sqlx::query_as::<_, Winner>(
            "SELECT id, user_id, username, amount, created_at FROM winners
             ORDER BY created_at DESC, seq DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(winners)
    }

    async fn ping(&self) -> bool {
        self.pool.acquire().await.is_ok()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
