//! Draw offers and takeback requests.
//!
//! Both follow the same handshake: one participant proposes, the other
//! accepts or declines, and the proposer may cancel while it is pending.
//! Only one negotiation of either kind may be pending at a time.
//!
//! These functions validate against a snapshot and build the guarded
//! [`Transition`]; they never touch the store.

use chrono::{DateTime, Utc};

use crate::error::{MatchError, Rejection};
use crate::rules::{replay, RulesEngine};
use crate::store::{HistoryEdit, MatchPatch, Precondition, Transition};
use crate::types::{
    MatchRecord, MatchResult, MatchStatus, NegotiationKind, NegotiationState, ParticipantId,
    ResultReason,
};

fn ensure_participant(record: &MatchRecord, participant: ParticipantId) -> Result<(), MatchError> {
    record
        .color_of(participant)
        .map(|_| ())
        .ok_or_else(|| Rejection::NotInMatch.into())
}

fn ensure_active(record: &MatchRecord) -> Result<(), MatchError> {
    if record.is_active() {
        Ok(())
    } else {
        Err(MatchError::precondition(format!("match is {}", record.status)))
    }
}

/// The pending negotiation of `kind`, or a precondition failure.
fn pending(record: &MatchRecord, kind: NegotiationKind) -> Result<NegotiationState, MatchError> {
    record
        .pending(kind)
        .ok_or_else(|| MatchError::precondition(format!("no {kind} is pending")))
}

/// Open a negotiation of `kind`.
pub fn propose(
    record: &MatchRecord,
    kind: NegotiationKind,
    proposer: ParticipantId,
) -> Result<Transition, MatchError> {
    ensure_participant(record, proposer)?;
    ensure_active(record)?;
    if let Some((open, _)) = record.pending_negotiation() {
        return Err(MatchError::precondition(format!("a {open} is already pending")));
    }

    let mut preconditions = vec![
        Precondition::StatusIs(MatchStatus::Active),
        Precondition::NoPendingNegotiation,
    ];
    if kind == NegotiationKind::Takeback {
        if record.move_history.is_empty() {
            return Err(Rejection::NothingToTakeBack.into());
        }
        // the request is for the move the proposer saw
        preconditions.extend(Precondition::same_board(record));
    }

    let patch =
        MatchPatch::default().with_negotiation(kind, Some(NegotiationState::pending(proposer)));
    Ok(Transition::new(patch, preconditions))
}

/// Accept or decline the pending negotiation of `kind`.
///
/// An accepted takeback drops the last move and rebuilds the position by
/// replaying the rest through `rules`. Remaining times are kept as stored
/// and the running side's clock restarts at `now`.
pub fn respond(
    record: &MatchRecord,
    kind: NegotiationKind,
    responder: ParticipantId,
    accept: bool,
    rules: &dyn RulesEngine,
    now: DateTime<Utc>,
) -> Result<Transition, MatchError> {
    ensure_participant(record, responder)?;
    ensure_active(record)?;
    let state = pending(record, kind)?;
    if state.proposer == responder {
        return Err(Rejection::OwnProposal { kind }.into());
    }

    let mut preconditions = vec![
        Precondition::StatusIs(MatchStatus::Active),
        Precondition::PendingNegotiation {
            kind,
            proposer: state.proposer,
        },
    ];
    let mut patch = MatchPatch::default().with_negotiation(kind, None);

    match (kind, accept) {
        (_, false) => {}
        (NegotiationKind::Draw, true) => {
            patch = patch.complete(MatchResult::drawn(ResultReason::DrawAgreement));
        }
        (NegotiationKind::Takeback, true) => {
            let count = record.move_count();
            let Some(kept) = count.checked_sub(1) else {
                return Err(Rejection::NothingToTakeBack.into());
            };
            let position = replay(rules, &record.move_history[..kept])?;
            patch.history = Some(HistoryEdit::TruncateTo(kept));
            patch.position = Some(position);
            patch.last_move_at = Some(now);
            preconditions.extend(Precondition::same_board(record));
        }
    }

    Ok(Transition::new(patch, preconditions))
}

/// Withdraw the proposer's pending negotiation of `kind`.
pub fn cancel(
    record: &MatchRecord,
    kind: NegotiationKind,
    proposer: ParticipantId,
) -> Result<Transition, MatchError> {
    ensure_participant(record, proposer)?;
    ensure_active(record)?;
    let state = pending(record, kind)?;
    if state.proposer != proposer {
        return Err(Rejection::NotProposer { kind }.into());
    }

    Ok(Transition::new(
        MatchPatch::default().with_negotiation(kind, None),
        vec![
            Precondition::StatusIs(MatchStatus::Active),
            Precondition::PendingNegotiation { kind, proposer },
        ],
    ))
}
