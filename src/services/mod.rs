// All service modules
pub mod games;
pub mod ledger;
pub mod notification_service;
pub mod session;

// Re-export for convenience
pub use games::{Dealer, GameService, RandomDealer};
pub use ledger::LedgerService;
pub use notification_service::NotificationService;
pub use session::SessionService;
