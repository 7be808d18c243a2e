//! State-machine rejections with stable error codes.

use std::fmt;

use uuid::Uuid;

/// A rejected voting operation.
///
/// Each variant maps to a stable `error_code` identifier via
/// [`VoteError::code`]; the request layer carries these as `BAD_REQUEST`
/// with the specific reason string.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteError {
    /// A voter with this id (or email) already exists.
    AlreadyRegistered(String),
    /// The poll id names no known poll.
    PollNotFound(Uuid),
    /// The poll exists but is outside its voting window.
    PollInactive(Uuid),
    /// The voter id names no registered voter.
    VoterNotRegistered(String),
    /// The voter is not in the poll's eligible set.
    VoterNotEligible(String),
    /// The voter has already voted on a single-vote poll.
    DoubleVote(String),
    /// The chosen option is not on the poll's option list.
    InvalidChoice(String),
    /// The ballot signature is missing or does not verify.
    InvalidSignature,
}

impl VoteError {
    /// Stable identifier surfaced as `error_code`.
    pub fn code(&self) -> &'static str {
        match self {
            VoteError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            VoteError::PollNotFound(_) => "POLL_NOT_FOUND",
            VoteError::PollInactive(_) => "POLL_INACTIVE",
            VoteError::VoterNotRegistered(_) => "VOTER_NOT_REGISTERED",
            VoteError::VoterNotEligible(_) => "VOTER_NOT_ELIGIBLE",
            VoteError::DoubleVote(_) => "DOUBLE_VOTE",
            VoteError::InvalidChoice(_) => "INVALID_CHOICE",
            VoteError::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}

impl fmt::Display for VoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteError::AlreadyRegistered(id) => {
                write!(f, "voter `{id}` is already registered")
            }
            VoteError::PollNotFound(id) => write!(f, "poll `{id}` not found"),
            VoteError::PollInactive(id) => write!(f, "poll `{id}` is not active"),
            VoteError::VoterNotRegistered(id) => write!(f, "voter `{id}` is not registered"),
            VoteError::VoterNotEligible(id) => {
                write!(f, "voter `{id}` is not eligible for this poll")
            }
            VoteError::DoubleVote(id) => {
                write!(f, "voter `{id}` has already voted on this poll")
            }
            VoteError::InvalidChoice(choice) => {
                write!(f, "`{choice}` is not an option on this poll")
            }
            VoteError::InvalidSignature => write!(f, "ballot signature is missing or invalid"),
        }
    }
}

impl std::error::Error for VoteError {}
