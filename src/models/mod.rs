// src/models/mod.rs
pub mod user;

// Re-export commonly used types from user.rs so other modules can use `crate::models::X`
pub use user::{
    AchievementKind,
    AchievementView,
    Deposit,
    NewUser,
    Posting,
    PublicUser,
    Transaction,
    TransactionRow,
    TxKind,
    UnlockedAchievement,
    User,
    Winner,
};
