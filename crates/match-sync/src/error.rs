use crate::rules::RulesError;
use crate::types::{Color, MatchId, MatchStatus, NegotiationKind};

/// Errors returned by every match operation.
///
/// None of these are fatal: after any error a client can resubscribe and
/// resynchronize from the next snapshot.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The action is not allowed against the snapshot it was made on.
    /// Nothing was written.
    #[error("rejected: {0}")]
    Validation(#[from] Rejection),

    /// The record changed underneath the caller. Nothing was written.
    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    /// Transient backend failure. Retrying is up to the caller.
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("match {match_id} not found")]
    NotFound { match_id: MatchId },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MatchError {
    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Whether the same call may succeed if simply retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// The validation reason, if this is a rejection.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Validation(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<RulesError> for MatchError {
    fn from(err: RulesError) -> Self {
        Self::Validation(err.into())
    }
}

/// Why an action was rejected locally.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("match is {status}")]
    NotActive { status: MatchStatus },

    #[error("not your turn - it is {expected}'s turn")]
    NotYourTurn { expected: Color },

    #[error("it is already your turn")]
    AlreadyYourTurn,

    #[error("participant is not in this match")]
    NotInMatch,

    #[error("invalid move: {reason}")]
    IllegalMove { reason: String },

    #[error("cannot respond to your own {kind}")]
    OwnProposal { kind: NegotiationKind },

    #[error("only the proposer can cancel the {kind}")]
    NotProposer { kind: NegotiationKind },

    #[error("no moves to take back")]
    NothingToTakeBack,

    #[error("clock has not run out")]
    ClockNotExpired,

    #[error("time control must start with a positive amount of time")]
    InvalidTimeControl,
}

impl From<RulesError> for Rejection {
    fn from(err: RulesError) -> Self {
        Self::IllegalMove {
            reason: err.to_string(),
        }
    }
}
