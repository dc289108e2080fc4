//! Conversation aggregate
//!
//! The conversation is the aggregate root: an append-growing sequence of
//! messages plus everything analysis has derived from them (tokens,
//! templates, the incremental-analysis watermark). It is the only shared
//! mutable resource in the system; the store guards it with conditional
//! writes.

use crate::model::{Template, Token};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default cap for the message window
pub const DEFAULT_MESSAGE_WINDOW: usize = 50;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// An end user; only user messages are considered by rule processing
    User,
    /// A support agent
    Agent,
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
    /// Created, no analysis has run yet
    #[default]
    New,
    /// At least one analysis pass has committed
    InProgress,
    /// Explicitly completed; no longer picked up by channel lookup
    Complete,
}

/// A single message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Identifier, unique within the conversation
    pub id: String,
    /// Message origin
    pub origin: MessageOrigin,
    /// Reference to the sender (user or agent id)
    pub sender: String,
    /// Textual content
    pub content: String,
    /// When the message was sent
    pub sent_at: DateTime<Utc>,
    /// Vote score, adjusted after the fact
    #[serde(default)]
    pub votes: i32,
}

impl Message {
    /// Create a user message sent now
    pub fn user(id: impl Into<String>, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: MessageOrigin::User,
            sender: sender.into(),
            content: content.into(),
            sent_at: Utc::now(),
            votes: 0,
        }
    }

    /// Create an agent message sent now
    pub fn agent(id: impl Into<String>, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: MessageOrigin::Agent,
            ..Self::user(id, sender, content)
        }
    }
}

/// The conversation aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identifier
    pub id: Uuid,
    /// Owning client identifier
    pub owner: Uuid,
    /// Channel this conversation belongs to
    pub channel_id: String,
    /// Ordered message log, capped at the message window
    pub messages: Vec<Message>,
    /// All tokens extracted so far; append-only within an analysis
    /// generation, compacted only by dedup/merge
    #[serde(default)]
    pub tokens: Vec<Token>,
    /// Candidate intents built across turns
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Lifecycle status
    #[serde(default)]
    pub status: ConversationStatus,
    /// Index of the last message already incorporated into analysis,
    /// `-1` if none
    pub last_message_analyzed: i32,
    /// Last modification timestamp, refreshed by every store write
    pub last_modified: DateTime<Utc>,
}

impl Conversation {
    /// Create a new, empty conversation
    pub fn new(owner: Uuid, channel_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            channel_id: channel_id.into(),
            messages: Vec::new(),
            tokens: Vec::new(),
            templates: Vec::new(),
            status: ConversationStatus::New,
            last_message_analyzed: -1,
            last_modified: Utc::now(),
        }
    }

    /// Find a message by id
    pub fn find_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Enforce the bounded message window: drop the oldest messages from
    /// the head until at most `window` remain, then shift the watermark and
    /// all token message indices to stay consistent with the truncated log.
    /// Tokens of evicted messages are dropped and slot bindings are
    /// remapped to the compacted token sequence (bindings to evicted tokens
    /// become unfilled).
    pub fn apply_message_window(&mut self, window: usize) {
        if window == 0 || self.messages.len() <= window {
            return;
        }
        let evicted = self.messages.len() - window;
        self.messages.drain(..evicted);
        self.last_message_analyzed = (self.last_message_analyzed - evicted as i32).max(-1);

        // drop tokens of evicted messages, remember where survivors moved
        let mut remap = vec![-1i32; self.tokens.len()];
        let mut kept = Vec::with_capacity(self.tokens.len());
        for (old_idx, mut token) in std::mem::take(&mut self.tokens).into_iter().enumerate() {
            if token.message_idx < evicted {
                continue;
            }
            token.message_idx -= evicted;
            remap[old_idx] = kept.len() as i32;
            kept.push(token);
        }
        self.tokens = kept;

        for template in &mut self.templates {
            for slot in &mut template.slots {
                if let Some(old_idx) = slot.bound_index() {
                    slot.token_index = remap.get(old_idx).copied().unwrap_or(-1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageTopic, Slot, TokenType, TokenValue};

    fn conversation_with_messages(count: usize) -> Conversation {
        let mut conv = Conversation::new(Uuid::new_v4(), "channel-1");
        for i in 0..count {
            conv.messages
                .push(Message::user(format!("msg-{}", i), "alice", format!("message {}", i)));
        }
        conv
    }

    fn token_at(message_idx: usize, value: &str) -> Token {
        Token::new(
            message_idx,
            0,
            value.len(),
            TokenType::Place,
            TokenValue::Text(value.to_string()),
            0.9,
        )
    }

    #[test]
    fn test_window_noop_below_cap() {
        let mut conv = conversation_with_messages(10);
        conv.apply_message_window(50);
        assert_eq!(conv.messages.len(), 10);
    }

    #[test]
    fn test_window_truncates_head() {
        let mut conv = conversation_with_messages(55);
        conv.apply_message_window(50);
        assert_eq!(conv.messages.len(), 50);
        // oldest 5 evicted, first retained message was input position 5
        assert_eq!(conv.messages[0].id, "msg-5");
        assert_eq!(conv.messages[49].id, "msg-54");
    }

    #[test]
    fn test_window_shifts_watermark() {
        let mut conv = conversation_with_messages(55);
        conv.last_message_analyzed = 52;
        conv.apply_message_window(50);
        assert_eq!(conv.last_message_analyzed, 47);
    }

    #[test]
    fn test_window_watermark_floor() {
        let mut conv = conversation_with_messages(55);
        conv.last_message_analyzed = 2; // all analyzed messages evicted
        conv.apply_message_window(50);
        assert_eq!(conv.last_message_analyzed, -1);
    }

    #[test]
    fn test_window_drops_and_shifts_tokens() {
        let mut conv = conversation_with_messages(55);
        conv.tokens.push(token_at(1, "Evicted"));
        conv.tokens.push(token_at(7, "Berlin"));
        conv.apply_message_window(50);

        assert_eq!(conv.tokens.len(), 1);
        assert_eq!(conv.tokens[0].message_idx, 2); // 7 - 5 evicted
        assert_eq!(conv.tokens[0].value, TokenValue::Text("Berlin".to_string()));
        // every surviving token still addresses a valid message
        for token in &conv.tokens {
            assert!(token.message_idx < conv.messages.len());
        }
    }

    #[test]
    fn test_window_remaps_slot_bindings() {
        let mut conv = conversation_with_messages(55);
        conv.tokens.push(token_at(0, "Gone"));
        conv.tokens.push(token_at(10, "Berlin"));

        let mut template = Template::new(MessageTopic::Travel);
        let mut gone = Slot::new("from", Some(TokenType::Place), true);
        gone.token_index = 0;
        let mut kept = Slot::new("to", Some(TokenType::Place), true);
        kept.token_index = 1;
        template.slots.push(gone);
        template.slots.push(kept);
        conv.templates.push(template);

        conv.apply_message_window(50);

        let template = &conv.templates[0];
        assert_eq!(template.slots[0].token_index, -1); // binding to evicted token cleared
        assert_eq!(template.slots[1].token_index, 0); // remapped to compacted sequence
    }

    #[test]
    fn test_find_message() {
        let conv = conversation_with_messages(3);
        assert!(conv.find_message("msg-1").is_some());
        assert!(conv.find_message("nope").is_none());
    }
}
