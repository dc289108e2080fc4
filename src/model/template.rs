//! Intent templates and their slot bindings
//!
//! A [`Template`] is a candidate intent for a topic, built and extended
//! across conversation turns. Its [`Slot`]s bind semantic roles to tokens
//! by index into the conversation token sequence.

use crate::model::{MessageTopic, TokenType};
use serde::{Deserialize, Serialize};

/// The state of a template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateState {
    /// Created by analysis, awaiting user interaction
    #[default]
    Suggested,
    /// Confirmed by a user
    Confirmed,
    /// Rejected by a user; no longer updated
    Rejected,
}

/// A named role within a template, bound (or not) to a token index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Role name, e.g. `from`
    pub role: String,
    /// Required token type, `None` accepts any type
    pub token_type: Option<TokenType>,
    /// Whether the role is required for the template to be complete
    #[serde(default)]
    pub required: bool,
    /// Index into the conversation token sequence, `-1` if unfilled
    #[serde(default = "unfilled")]
    pub token_index: i32,
    /// Optional prompt to send back when the slot is still unfilled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inquiry_message: Option<String>,
}

fn unfilled() -> i32 {
    -1
}

impl Slot {
    /// Create an unfilled slot
    pub fn new(role: impl Into<String>, token_type: Option<TokenType>, required: bool) -> Self {
        Self {
            role: role.into(),
            token_type,
            required,
            token_index: -1,
            inquiry_message: None,
        }
    }

    /// Set the inquiry message
    pub fn with_inquiry(mut self, message: impl Into<String>) -> Self {
        self.inquiry_message = Some(message.into());
        self
    }

    /// The bound token index, if the slot is filled
    pub fn bound_index(&self) -> Option<usize> {
        usize::try_from(self.token_index).ok()
    }
}

/// A candidate intent instance for a topic, with its slot bindings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// The topic this template expresses
    pub topic: MessageTopic,
    /// Probability that this is the intended template, `[0, 1]`
    pub probability: f32,
    /// Template state
    #[serde(default)]
    pub state: TemplateState,
    /// The slots, including the implicit `topic` slot(s)
    pub slots: Vec<Slot>,
}

impl Template {
    /// Create an empty template for a topic
    pub fn new(topic: MessageTopic) -> Self {
        Self {
            topic,
            probability: 0.0,
            state: TemplateState::Suggested,
            slots: Vec::new(),
        }
    }

    /// All slots with the given role
    pub fn slots_for_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.iter().filter(move |s| s.role == role)
    }

    /// Whether any slot with the given role is bound to a token
    pub fn has_filled_role(&self, role: &str) -> bool {
        self.slots_for_role(role).any(|s| s.token_index >= 0)
    }

    /// Token indices bound by any slot of this template
    pub fn bound_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(Slot::bound_index)
    }
}
