/// Application constants

// Accounts
pub const DEFAULT_STARTING_BALANCE: i64 = 1000;
pub const MIN_TRANSFER_AMOUNT: i64 = 50;

// Sessions
pub const SESSION_TTL_SECS: i64 = 3600;
pub const INIT_DATA_MAX_AGE_SECS: i64 = 3600;

// Telegram
pub const TELEGRAM_WEBAPP_KEY: &[u8] = b"WebAppData";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;
pub const NOTIFY_CONNECT_TIMEOUT_SECS: u64 = 4;
pub const DEFAULT_PLAYER_PREFIX: &str = "player_";

// Public feeds
pub const RECENT_WINNERS_LIMIT: i64 = 3;
pub const WINNERS_FEED_CAPACITY: usize = 50;

// Achievements
pub const ACHIEVEMENT_FIRST_WIN: &str = "first_win";
