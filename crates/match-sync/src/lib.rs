//! # Match Sync
//!
//! Synchronization engine for live two-player timed chess matches.
//!
//! Two clients share one match record without a central lock. Every write
//! is a field-scoped patch guarded by preconditions on the snapshot it was
//! made against, and every committed snapshot is pushed to all subscribers.
//!
//! ## Components
//!
//! - **Store**: `MatchStore` - record persistence, conditional updates, snapshot fan-out
//! - **Rules**: `RulesEngine` - move legality and terminal detection (`ShakmatyRules`)
//! - **Clock**: `ClockEngine` / `LocalClock` - remaining time derived from wall-clock instants
//! - **Premove**: `PremoveQueue` - one move buffered while it is the opponent's turn
//! - **Negotiation**: draw offers and takebacks, one pending at a time
//! - **Controller**: `MatchController` - the match state machine
//! - **Session**: `MatchSession` - a participant's subscription, timer and premove

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod negotiation;
pub mod premove;
pub mod rules;
pub mod session;
pub mod store;
pub mod subscription;
pub mod testing;
pub mod time;
pub mod types;

/// Commonly used items.
pub mod prelude {
    pub use crate::clock::{ClockEngine, ClockView, LocalClock};
    pub use crate::config::MatchConfig;
    pub use crate::controller::MatchController;
    pub use crate::error::{MatchError, Rejection};
    pub use crate::premove::{Premove, PremoveQueue};
    pub use crate::rules::{RulesEngine, ShakmatyRules};
    pub use crate::session::MatchSession;
    pub use crate::store::{MatchStore, MemoryMatchStore};
    pub use crate::subscription::SubscriptionGuard;
    pub use crate::time::{ManualClock, TimeSource, WallClock};
    pub use crate::types::*;
}
