//! Conversation data model
//!
//! Pure data types with identity and ordering rules: conversations,
//! messages, extracted tokens, the topic hierarchy, and the intent
//! templates with their slot bindings.

mod conversation;
mod template;
mod token;
mod topic;

pub use conversation::{
    Conversation, ConversationStatus, Message, MessageOrigin, DEFAULT_MESSAGE_WINDOW,
};
pub use template::{Slot, Template, TemplateState};
pub use token::{hint, Token, TokenState, TokenType, TokenValue};
pub use topic::MessageTopic;
