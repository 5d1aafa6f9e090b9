use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{
    db::Store,
    error::{AppError, Result},
    models::{AchievementKind, Posting, TxKind},
    services::notification_service::NotificationService,
    utils::Clock,
};

// ==================== GAMES ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    Slots,
    Roulette,
    Blackjack,
    Wheel,
}

/// Roulette pays on rolls of 70..=99 out of 0..=99.
pub const ROULETTE_WIN_FROM: u8 = 70;
pub const ROULETTE_MULTIPLIER: i64 = 2;
pub const BLACKJACK_MULTIPLIER: i64 = 2;
pub const BLACKJACK_SCORE_MIN: u8 = 10;
pub const BLACKJACK_SCORE_MAX: u8 = 20;
pub const WHEEL_SEGMENTS: [i64; 5] = [0, 2, 4, 10, 20];

impl Game {
    pub const ALL: [Game; 4] = [Game::Slots, Game::Roulette, Game::Blackjack, Game::Wheel];

    pub fn min_bet(&self) -> i64 {
        match self {
            Game::Slots => 10,
            Game::Roulette => 10,
            Game::Blackjack => 20,
            Game::Wheel => 5,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Game::Slots => "Slots",
            Game::Roulette => "Roulette",
            Game::Blackjack => "Blackjack",
            Game::Wheel => "Wheel of Fortune",
        }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Outcome {
        match self {
            Game::Slots => Outcome::Slots {
                reels: [
                    Symbol::ALL[rng.random_range(0..Symbol::ALL.len())],
                    Symbol::ALL[rng.random_range(0..Symbol::ALL.len())],
                    Symbol::ALL[rng.random_range(0..Symbol::ALL.len())],
                ],
            },
            Game::Roulette => Outcome::Roulette {
                roll: rng.random_range(0..100),
            },
            Game::Blackjack => Outcome::Blackjack {
                player: rng.random_range(BLACKJACK_SCORE_MIN..=BLACKJACK_SCORE_MAX),
                dealer: rng.random_range(BLACKJACK_SCORE_MIN..=BLACKJACK_SCORE_MAX),
            },
            Game::Wheel => {
                let segment = rng.random_range(0..WHEEL_SEGMENTS.len());
                Outcome::Wheel {
                    segment,
                    multiplier: WHEEL_SEGMENTS[segment],
                }
            }
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Symbol {
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "🍒")]
    Cherry,
    #[serde(rename = "🍋")]
    Lemon,
    #[serde(rename = "🍊")]
    Orange,
    #[serde(rename = "🍉")]
    Watermelon,
    #[serde(rename = "💰")]
    MoneyBag,
}

impl Symbol {
    pub const ALL: [Symbol; 6] = [
        Symbol::Seven,
        Symbol::Cherry,
        Symbol::Lemon,
        Symbol::Orange,
        Symbol::Watermelon,
        Symbol::MoneyBag,
    ];

    /// Payout multiplier for three of a kind.
    pub fn multiplier(&self) -> i64 {
        match self {
            Symbol::Seven => 10,
            Symbol::Cherry => 5,
            Symbol::Lemon => 3,
            Symbol::Orange => 2,
            Symbol::Watermelon | Symbol::MoneyBag => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Slots { reels: [Symbol; 3] },
    Roulette { roll: u8 },
    Blackjack { player: u8, dealer: u8 },
    Wheel { segment: usize, multiplier: i64 },
}

impl Outcome {
    pub fn game(&self) -> Game {
        match self {
            Outcome::Slots { .. } => Game::Slots,
            Outcome::Roulette { .. } => Game::Roulette,
            Outcome::Blackjack { .. } => Game::Blackjack,
            Outcome::Wheel { .. } => Game::Wheel,
        }
    }

    /// Payout multiplier for this draw; zero means the bet is lost.
    pub fn multiplier(&self) -> i64 {
        match self {
            Outcome::Slots { reels } => {
                if reels[0] == reels[1] && reels[1] == reels[2] {
                    reels[0].multiplier()
                } else {
                    0
                }
            }
            Outcome::Roulette { roll } => {
                if *roll >= ROULETTE_WIN_FROM {
                    ROULETTE_MULTIPLIER
                } else {
                    0
                }
            }
            Outcome::Blackjack { player, dealer } => {
                if player > dealer {
                    BLACKJACK_MULTIPLIER
                } else {
                    0
                }
            }
            Outcome::Wheel { multiplier, .. } => *multiplier,
        }
    }

    pub fn payout(&self, bet: i64) -> Result<i64> {
        bet.checked_mul(self.multiplier())
            .ok_or_else(|| AppError::InvalidBet("bet too large".to_string()))
    }
}

// ==================== DEALER ====================

/// Source of game outcomes.
pub trait Dealer: Send + Sync {
    fn draw(&self, game: Game) -> Outcome;
}

pub struct RandomDealer;

impl Dealer for RandomDealer {
    fn draw(&self, game: Game) -> Outcome {
        game.draw(&mut rand::rng())
    }
}

// ==================== SETTLEMENT ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub game: Game,
    pub outcome: Outcome,
    pub win_amount: i64,
    pub balance: i64,
}

pub struct GameService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    dealer: Arc<dyn Dealer>,
    notifier: NotificationService,
}

impl GameService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        dealer: Arc<dyn Dealer>,
        notifier: NotificationService,
    ) -> Self {
        Self {
            store,
            clock,
            dealer,
            notifier,
        }
    }

    /// Debit the bet, draw, and credit any payout as one posting.
    pub async fn play(&self, telegram_id: &str, game: Game, bet: i64) -> Result<Settlement> {
        if bet < game.min_bet() {
            return Err(AppError::InvalidBet(format!(
                "Minimum bet for {} is {}",
                game,
                game.min_bet()
            )));
        }

        let user = self
            .store
            .get_user(telegram_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        if user.balance < bet {
            return Err(AppError::InsufficientFunds);
        }

        let outcome = self.dealer.draw(game);
        if outcome.game() != game {
            return Err(AppError::Internal(format!(
                "dealer returned a {} outcome for {}",
                outcome.game(),
                game
            )));
        }
        let win_amount = outcome.payout(bet)?;

        let mut posting = Posting::new(self.clock.now()).entry(TxKind::Loss, bet);
        if win_amount > 0 {
            posting = posting
                .entry(TxKind::Win, win_amount)
                .unlock(AchievementKind::FirstWin);
        }

        // The store re-checks the balance under the per-user lock.
        let user = self.store.commit(telegram_id, &posting).await?;

        tracing::info!(
            "Settled {} for {}: bet={} win={} balance={}",
            game,
            telegram_id,
            bet,
            win_amount,
            user.balance
        );

        if win_amount > 0 {
            self.notifier.notify_win(&user.telegram_id, game, win_amount);
        }

        Ok(Settlement {
            game,
            outcome,
            win_amount,
            balance: user.balance,
        })
    }

    pub async fn recent_winners(&self, limit: i64) -> Result<Vec<crate::models::Winner>> {
        self.store.recent_winners(limit).await
    }
}

/// Always deals the same outcome.
#[cfg(test)]
pub struct FixedDealer(pub Outcome);

#[cfg(test)]
impl Dealer for FixedDealer {
    fn draw(&self, _game: Game) -> Outcome {
        self.0.clone()
    }
}

#[cfg(test)]
pub fn losing_slots() -> Outcome {
    Outcome::Slots {
        reels: [Symbol::Seven, Symbol::Cherry, Symbol::Lemon],
    }
}
