//! Extracted entity tokens
//!
//! A [`Token`] is a recognized span within one message of a conversation.
//! Tokens are produced by an external analyzer and afterwards owned and
//! mutated (hints, state) by the token post-processor. They are referenced
//! by integer index from template slots, never removed once accepted except
//! by dedup/merge.

use crate::model::MessageTopic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Well-known hint names. Hints are free-form strings; these are the ones
/// the built-in rulesets and template builders agree on.
pub mod hint {
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const VIA: &str = "via";
    pub const AT: &str = "at";
    pub const DEPART: &str = "depart";
    pub const ARRIVE: &str = "arrive";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const INSTANT: &str = "instant";
    pub const NEGATED: &str = "negated";
}

/// The type of an extracted token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// A date or point in time
    Date,
    /// A conversation topic (typically the result of a classifier)
    Topic,
    /// Any other kind of named entity
    Entity,
    /// An entity representing a location
    Place,
    /// An entity representing an organization
    Organization,
    /// An entity representing a person
    Person,
    /// An entity representing a product or service
    Product,
    /// An entity representing a train (number or line)
    Train,
    /// An attribute, typically an adjective
    Attribute,
    /// A term from a terminology
    Term,
    /// A keyword (result of keyword extraction)
    Keyword,
    /// A recognized question phrase
    QuestionIdentifier,
    /// Anything else
    Other,
}

/// The state of a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    /// The token is accepted and may fill template slots
    #[default]
    Accepted,
    /// The token was rejected and is ignored by validation and rules
    Rejected,
}

/// The typed value of a token. The variant is expected to agree with the
/// [`TokenType`]: `Topic` tokens carry a [`MessageTopic`], `Date` tokens a
/// timestamp, everything else the matched text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum TokenValue {
    Text(String),
    Date(DateTime<Utc>),
    Topic(MessageTopic),
}

impl TokenValue {
    /// The topic carried by this value, if any
    pub fn as_topic(&self) -> Option<MessageTopic> {
        match self {
            TokenValue::Topic(t) => Some(*t),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenValue::Text(s) => write!(f, "{}", s),
            TokenValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            TokenValue::Topic(t) => write!(f, "{:?}", t),
        }
    }
}

/// A recognized entity span within one message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Index of the message this token was extracted from (back-reference,
    /// not ownership)
    pub message_idx: usize,
    /// Start char offset within the message content
    pub start: usize,
    /// End char offset within the message content (exclusive)
    pub end: usize,
    /// The type of the token
    pub token_type: TokenType,
    /// The typed value
    pub value: TokenValue,
    /// Extraction confidence in `[0, 1]`
    pub confidence: f32,
    /// Token state
    #[serde(default)]
    pub state: TokenState,
    /// Free-form annotations such as `from`, `to`, `negated`
    #[serde(default)]
    pub hints: BTreeSet<String>,
}

impl Token {
    /// Create an accepted token without hints
    pub fn new(
        message_idx: usize,
        start: usize,
        end: usize,
        token_type: TokenType,
        value: TokenValue,
        confidence: f32,
    ) -> Self {
        Self {
            message_idx,
            start,
            end,
            token_type,
            value,
            confidence,
            state: TokenState::Accepted,
            hints: BTreeSet::new(),
        }
    }

    /// Add a hint. Returns `true` if the hint was newly added, `false` if
    /// it was blank or already present.
    pub fn add_hint(&mut self, hint: impl Into<String>) -> bool {
        let hint = hint.into();
        if hint.trim().is_empty() {
            return false;
        }
        self.hints.insert(hint)
    }

    /// Check whether this token carries the given hint
    pub fn has_hint(&self, hint: &str) -> bool {
        self.hints.contains(hint)
    }

    /// Ordering used by the post-processor: lower message index first, then
    /// lower start offset, then *higher* end offset. Sorting a token run
    /// this way puts a containing span before the spans it contains, which
    /// is what the dedup walk relies on.
    pub fn cmp_idx_start_end(a: &Token, b: &Token) -> Ordering {
        a.message_idx
            .cmp(&b.message_idx)
            .then(a.start.cmp(&b.start))
            .then(b.end.cmp(&a.end))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Token[{}|{},{}|{:?}|{}]",
            self.message_idx, self.start, self.end, self.token_type, self.value
        )
    }
}
