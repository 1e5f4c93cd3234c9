//! Clock accounting.
//!
//! Nothing here keeps time on its own. Stored remaining times only change
//! when a move is confirmed; everything a participant sees in between is
//! derived from `last_move_at` and the current wall-clock instant.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::time::elapsed_between;
use crate::types::{Color, MatchRecord};

/// Displayed remaining time for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockView {
    pub white: Duration,
    pub black: Duration,
    /// The side whose clock is running, if any.
    pub active: Option<Color>,
}

impl ClockView {
    #[must_use]
    pub const fn remaining(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    /// The running side, if its time is used up.
    #[must_use]
    pub fn flagged(&self) -> Option<Color> {
        self.active.filter(|&color| self.remaining(color).is_zero())
    }

    fn remaining_mut(&mut self, color: Color) -> &mut Duration {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}

/// Stored-time bookkeeping for a confirmed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveClock {
    /// The mover's new stored remaining time.
    pub remaining: Duration,
    /// Time the mover spent thinking.
    pub spent: Duration,
}

/// Derives live clocks from records and accounts confirmed moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockEngine {
    credit_increment: bool,
}

impl ClockEngine {
    #[must_use]
    pub const fn new(credit_increment: bool) -> Self {
        Self { credit_increment }
    }

    /// Live clocks for `record` at `now`.
    ///
    /// Only the side to move of an active match is running; its value is
    /// the stored time minus the time since `last_move_at`, floored at zero.
    #[must_use]
    pub fn derive(&self, record: &MatchRecord, now: DateTime<Utc>) -> ClockView {
        let mut view = ClockView {
            white: record.white_remaining,
            black: record.black_remaining,
            active: None,
        };
        if record.is_active() {
            let side = record.side_to_move();
            let elapsed = elapsed_between(record.last_move_at, now);
            let remaining = view.remaining_mut(side);
            *remaining = remaining.saturating_sub(elapsed);
            view.active = Some(side);
        }
        view
    }

    /// Stored remaining time for `mover` after a move confirmed at `now`.
    #[must_use]
    pub fn confirm_move(&self, record: &MatchRecord, mover: Color, now: DateTime<Utc>) -> MoveClock {
        let spent = elapsed_between(record.last_move_at, now);
        let mut remaining = record.remaining(mover).saturating_sub(spent);
        if self.credit_increment {
            remaining += record.time_control.increment();
        }
        MoveClock { remaining, spent }
    }
}

/// Display clock driven by a local timer.
///
/// Resynchronized from every snapshot; between snapshots only the running
/// side counts down. Never written back to the store.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    engine: ClockEngine,
    view: ClockView,
    last_tick: DateTime<Utc>,
}

impl LocalClock {
    #[must_use]
    pub fn new(engine: ClockEngine, record: &MatchRecord, now: DateTime<Utc>) -> Self {
        Self {
            engine,
            view: engine.derive(record, now),
            last_tick: now,
        }
    }

    /// Reset the display from a fresh snapshot.
    pub fn sync(&mut self, record: &MatchRecord, now: DateTime<Utc>) -> ClockView {
        self.view = self.engine.derive(record, now);
        self.last_tick = now;
        self.view
    }

    /// Count the running side down by the time since the previous tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockView {
        let elapsed = elapsed_between(Some(self.last_tick), now);
        if let Some(side) = self.view.active {
            let remaining = self.view.remaining_mut(side);
            *remaining = remaining.saturating_sub(elapsed);
        }
        if now > self.last_tick {
            self.last_tick = now;
        }
        self.view
    }

    #[must_use]
    pub const fn view(&self) -> ClockView {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchId, MatchStatus, MoveEntry, ParticipantId, Square, TimeControl};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn active(tc: TimeControl, start: DateTime<Utc>) -> MatchRecord {
        let mut record = MatchRecord::new(
            MatchId::new(),
            ParticipantId::new(),
            tc,
            "start".into(),
            start,
        );
        record.participant_b = Some(ParticipantId::new());
        record.status = MatchStatus::Active;
        record.last_move_at = Some(start);
        record
    }

    fn push_move(record: &mut MatchRecord, at: DateTime<Utc>) {
        let color = record.side_to_move();
        record.move_history.push(MoveEntry {
            from: Square::new(0, 1).unwrap(),
            to: Square::new(0, 2).unwrap(),
            notation: "a3".into(),
            color,
            spent: Duration::ZERO,
            played_at: at,
        });
        record.last_move_at = Some(at);
    }

    #[test]
    fn only_the_side_to_move_runs() {
        let start = Utc::now();
        let mut record = active(TimeControl::FIVE_MINUTES, start);
        push_move(&mut record, start);

        let view = ClockEngine::default().derive(&record, start + chrono::Duration::seconds(10));
        assert_eq!(view.active, Some(Color::Black));
        assert_eq!(view.black, secs(290));
        assert_eq!(view.white, secs(300));
    }

    #[test]
    fn waiting_and_completed_clocks_are_frozen() {
        let start = Utc::now();
        let mut record = active(TimeControl::FIVE_MINUTES, start);
        record.status = MatchStatus::Completed;
        let view = ClockEngine::default().derive(&record, start + chrono::Duration::seconds(60));
        assert_eq!(view.active, None);
        assert_eq!(view.white, secs(300));
        assert_eq!(view.flagged(), None);
    }

    #[test]
    fn derived_time_floors_at_zero() {
        let start = Utc::now();
        let record = active(TimeControl::new(5, 0), start);
        let view = ClockEngine::default().derive(&record, start + chrono::Duration::seconds(60));
        assert_eq!(view.white, Duration::ZERO);
        assert_eq!(view.flagged(), Some(Color::White));
    }

    #[test]
    fn confirm_move_without_increment() {
        let start = Utc::now();
        let record = active(TimeControl::FIFTEEN_PLUS_TEN, start);
        let clock = ClockEngine::default().confirm_move(
            &record,
            Color::White,
            start + chrono::Duration::seconds(4),
        );
        assert_eq!(clock.spent, secs(4));
        assert_eq!(clock.remaining, secs(896));
    }

    #[test]
    fn confirm_move_credits_increment_when_enabled() {
        let start = Utc::now();
        let record = active(TimeControl::FIFTEEN_PLUS_TEN, start);
        let clock = ClockEngine::new(true).confirm_move(
            &record,
            Color::White,
            start + chrono::Duration::seconds(4),
        );
        assert_eq!(clock.remaining, secs(906));
    }

    #[test]
    fn local_clock_ticks_active_side_only() {
        let start = Utc::now();
        let record = active(TimeControl::new(2, 0), start);
        let mut local = LocalClock::new(ClockEngine::default(), &record, start);

        let mut now = start;
        for _ in 0..10 {
            now += chrono::Duration::milliseconds(100);
            local.tick(now);
        }
        assert_eq!(local.view().white, secs(1));
        assert_eq!(local.view().black, secs(2));

        // runs past zero without going negative
        local.tick(now + chrono::Duration::seconds(5));
        assert_eq!(local.view().white, Duration::ZERO);
        assert_eq!(local.view().flagged(), Some(Color::White));
    }

    #[test]
    fn sync_replaces_local_drift() {
        let start = Utc::now();
        let mut record = active(TimeControl::FIVE_MINUTES, start);
        let mut local = LocalClock::new(ClockEngine::default(), &record, start);
        local.tick(start + chrono::Duration::seconds(3));

        let moved_at = start + chrono::Duration::seconds(3);
        record.white_remaining = secs(297);
        push_move(&mut record, moved_at);
        let view = local.sync(&record, moved_at);
        assert_eq!(view.white, secs(297));
        assert_eq!(view.black, secs(300));
        assert_eq!(view.active, Some(Color::Black));
    }
}
