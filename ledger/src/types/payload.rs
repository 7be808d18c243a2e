//! Block payloads and the permissive decoder.
//!
//! Freshly appended blocks carry the typed [`BlockPayload`] enum, but any
//! payload that has round-tripped through a durable sink comes back as a
//! generic JSON map whose keys may be snake_case or the legacy camelCase
//! spelling, with numbers occasionally re-encoded as strings. All reload
//! paths go through [`BlockPayload::decode`], so consumers that walk the
//! chain only ever see the typed form.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Ballot, Poll};

/// Tagged block payload.
///
/// The serialized form uses a `type` tag with snake_case variant names,
/// matching the canonical at-rest encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockPayload {
    /// Marker payload of block 0.
    Genesis { message: String },
    /// A single voter registration.
    VoterRegistration { voter_id: String, timestamp: i64 },
    /// A poll definition, embedded whole.
    PollCreation { poll: Poll },
    /// An ordered batch of ballots sealed together.
    Votes { votes: Vec<Ballot>, count: usize },
}

/// Error produced when a generic payload value cannot be decoded.
#[derive(Debug)]
pub enum PayloadError {
    /// The value is not a JSON object.
    NotAnObject,
    /// The `type` tag is missing or not a string.
    MissingTag,
    /// The `type` tag names no known payload kind.
    UnknownTag(String),
    /// A required field is absent under every accepted spelling.
    MissingField(&'static str),
    /// A field is present but has an unusable shape.
    InvalidField(&'static str, String),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::NotAnObject => write!(f, "payload is not a JSON object"),
            PayloadError::MissingTag => write!(f, "payload has no usable `type` tag"),
            PayloadError::UnknownTag(tag) => write!(f, "unknown payload type `{tag}`"),
            PayloadError::MissingField(name) => write!(f, "payload field `{name}` is missing"),
            PayloadError::InvalidField(name, reason) => {
                write!(f, "payload field `{name}` is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for PayloadError {}

impl BlockPayload {
    /// Decodes a payload from a JSON value, typed or generic.
    ///
    /// The canonical tagged encoding is tried first; anything else falls
    /// through to a field-by-field walk that accepts snake_case and
    /// camelCase keys and tolerates stringly-typed numbers.
    pub fn decode(value: &Value) -> Result<BlockPayload, PayloadError> {
        if let Ok(payload) = serde_json::from_value::<BlockPayload>(value.clone()) {
            return Ok(payload);
        }

        let map = value.as_object().ok_or(PayloadError::NotAnObject)?;
        let tag = field(map, "type")
            .and_then(Value::as_str)
            .ok_or(PayloadError::MissingTag)?;

        match tag {
            "genesis" => Ok(BlockPayload::Genesis {
                message: req_string(map, "message")?,
            }),
            "voter_registration" => Ok(BlockPayload::VoterRegistration {
                voter_id: req_string(map, "voter_id")?,
                timestamp: req_i64(map, "timestamp")?,
            }),
            "poll_creation" => {
                let poll_value = field(map, "poll").ok_or(PayloadError::MissingField("poll"))?;
                Ok(BlockPayload::PollCreation {
                    poll: decode_poll(poll_value)?,
                })
            }
            "votes" => {
                let list = field(map, "votes")
                    .and_then(Value::as_array)
                    .ok_or(PayloadError::MissingField("votes"))?;
                let votes = list
                    .iter()
                    .map(decode_ballot)
                    .collect::<Result<Vec<_>, _>>()?;
                let count = opt_i64(map, "count").unwrap_or(votes.len() as i64) as usize;
                Ok(BlockPayload::Votes { votes, count })
            }
            other => Err(PayloadError::UnknownTag(other.to_string())),
        }
    }
}

/// Decodes a ballot from a typed or generic-map representation.
pub fn decode_ballot(value: &Value) -> Result<Ballot, PayloadError> {
    if let Ok(ballot) = serde_json::from_value::<Ballot>(value.clone()) {
        return Ok(ballot);
    }

    let map = value.as_object().ok_or(PayloadError::NotAnObject)?;
    Ok(Ballot {
        vote_id: req_uuid(map, "vote_id")?,
        poll_id: req_uuid(map, "poll_id")?,
        voter_id: req_string(map, "voter_id")?,
        choice: req_string(map, "choice")?,
        timestamp: req_i64(map, "timestamp")?,
        signature: field(map, "signature")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Decodes a poll from a typed or generic-map representation.
pub fn decode_poll(value: &Value) -> Result<Poll, PayloadError> {
    if let Ok(poll) = serde_json::from_value::<Poll>(value.clone()) {
        return Ok(poll);
    }

    let map = value.as_object().ok_or(PayloadError::NotAnObject)?;
    Ok(Poll {
        poll_id: req_uuid(map, "poll_id")?,
        title: req_string(map, "title")?,
        description: req_string(map, "description")?,
        options: req_string_list(map, "options")?,
        creator: req_string(map, "creator")?,
        start_time: req_i64(map, "start_time")?,
        end_time: req_i64(map, "end_time")?,
        eligible_voters: req_string_list(map, "eligible_voters")?,
        allow_multiple_votes: opt_bool(map, "allow_multiple_votes").unwrap_or(false),
        is_anonymous: opt_bool(map, "is_anonymous").unwrap_or(false),
    })
}

/// Looks a field up under its snake_case name, then the camelCase variant.
fn field<'a>(map: &'a Map<String, Value>, snake: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(snake) {
        return Some(v);
    }
    map.get(&snake_to_camel(snake))
}

fn snake_to_camel(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn req_string(map: &Map<String, Value>, name: &'static str) -> Result<String, PayloadError> {
    field(map, name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(PayloadError::MissingField(name))
}

fn req_i64(map: &Map<String, Value>, name: &'static str) -> Result<i64, PayloadError> {
    opt_i64(map, name).ok_or(PayloadError::MissingField(name))
}

/// Accepts JSON numbers, stringly-typed integers, and float re-encodings.
fn opt_i64(map: &Map<String, Value>, name: &'static str) -> Option<i64> {
    let value = field(map, name)?;
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn opt_bool(map: &Map<String, Value>, name: &'static str) -> Option<bool> {
    match field(map, name)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse::<bool>().ok(),
        _ => None,
    }
}

fn req_uuid(map: &Map<String, Value>, name: &'static str) -> Result<Uuid, PayloadError> {
    let raw = field(map, name)
        .and_then(Value::as_str)
        .ok_or(PayloadError::MissingField(name))?;
    Uuid::parse_str(raw).map_err(|e| PayloadError::InvalidField(name, e.to_string()))
}

fn req_string_list(
    map: &Map<String, Value>,
    name: &'static str,
) -> Result<Vec<String>, PayloadError> {
    let list = field(map, name)
        .and_then(Value::as_array)
        .ok_or(PayloadError::MissingField(name))?;
    list.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| PayloadError::InvalidField(name, "non-string entry".to_string()))
        })
        .collect()
}
