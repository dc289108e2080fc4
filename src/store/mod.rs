//! Conversation store with optimistic concurrency
//!
//! In-memory store backed by optional JSON file persistence, one file per
//! conversation:
//! ```text
//! <data_dir>/
//! ├── <conversation-uuid>.json
//! └── ...
//! ```
//!
//! The conversation document is the only shared mutable resource in the
//! system. Writers never overwrite blindly: `append_message` compares the
//! stored message count against the caller's read snapshot, and
//! `save_if_not_modified_after` compares `last_modified` against the
//! caller's read timestamp. A failed condition surfaces as
//! [`Error::ConcurrentModification`](crate::Error::ConcurrentModification);
//! the caller owns the re-read-and-retry loop, the store never retries
//! internally.

use crate::config::StoreConfig;
use crate::model::{Conversation, ConversationStatus, Message};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of an [`updated_since`](ConversationStore::updated_since) poll
#[derive(Debug, Clone)]
pub struct UpdatedIds {
    /// Conversations modified after the requested timestamp, oldest first
    pub ids: Vec<Uuid>,
    /// Timestamp to pass to the next poll
    pub sync_time: DateTime<Utc>,
}

/// Conversation store with conditional-update semantics
pub struct ConversationStore {
    message_window: usize,
    data_dir: Option<PathBuf>,
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl ConversationStore {
    /// Create a store from configuration. With a `data_dir` set, existing
    /// conversation files are loaded and writes are persisted through.
    pub async fn new(config: &StoreConfig) -> crate::Result<Self> {
        let data_dir = config.data_dir.clone();
        if let Some(dir) = &data_dir {
            tokio::fs::create_dir_all(dir).await?;
        }
        let store = Self {
            message_window: config.message_window,
            data_dir,
            conversations: Arc::new(RwLock::new(HashMap::new())),
        };
        store.load_from_disk().await;
        Ok(store)
    }

    /// Volatile store with the default message window, for tests and
    /// embedded use
    pub fn in_memory() -> Self {
        Self {
            message_window: crate::model::DEFAULT_MESSAGE_WINDOW,
            data_dir: None,
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a new conversation. Fails if the identifier is already taken.
    pub async fn create(&self, mut conversation: Conversation) -> crate::Result<Conversation> {
        conversation.apply_message_window(self.message_window);
        conversation.last_modified = Utc::now();

        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(crate::Error::Store(format!(
                "Conversation {} already exists",
                conversation.id
            )));
        }
        conversations.insert(conversation.id, conversation.clone());
        drop(conversations);

        self.persist(&conversation).await;
        Ok(conversation)
    }

    /// Retrieve a conversation by id
    pub async fn get(&self, id: Uuid) -> crate::Result<Conversation> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| crate::Error::NotFound(format!("Conversation {}", id)))
    }

    /// Append a message, or edit it in place when a message with the same
    /// id already exists.
    ///
    /// The append path is a compare-and-swap on the message count: it only
    /// succeeds when the stored conversation still has as many messages as
    /// `expected`, the caller's read snapshot. On a lost race the call
    /// fails with `ConcurrentModification` and no write happens.
    pub async fn append_message(
        &self,
        expected: &Conversation,
        message: Message,
    ) -> crate::Result<Conversation> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(&expected.id)
            .ok_or_else(|| crate::Error::NotFound(format!("Conversation {}", expected.id)))?;

        if let Some(existing) = stored.messages.iter_mut().find(|m| m.id == message.id) {
            // edit by id, replace in place
            *existing = message;
        } else {
            if stored.messages.len() != expected.messages.len() {
                return Err(crate::Error::ConcurrentModification(format!(
                    "Conversation {} has {} messages, append expected {}",
                    expected.id,
                    stored.messages.len(),
                    expected.messages.len()
                )));
            }
            stored.messages.push(message);
            stored.apply_message_window(self.message_window);
        }
        stored.last_modified = Utc::now();
        let updated = stored.clone();
        drop(conversations);

        self.persist(&updated).await;
        Ok(updated)
    }

    /// Replace the full conversation document, conditional on the stored
    /// `last_modified` not being after `since` (the caller's read time).
    ///
    /// This is how the analysis coordinator publishes token, template and
    /// watermark changes without clobbering a concurrent message append.
    pub async fn save_if_not_modified_after(
        &self,
        conversation: &Conversation,
        since: DateTime<Utc>,
    ) -> crate::Result<Conversation> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(&conversation.id)
            .ok_or_else(|| crate::Error::NotFound(format!("Conversation {}", conversation.id)))?;

        if stored.last_modified > since {
            return Err(crate::Error::ConcurrentModification(format!(
                "Conversation {} modified at {}, after read time {}",
                conversation.id, stored.last_modified, since
            )));
        }
        let mut updated = conversation.clone();
        updated.apply_message_window(self.message_window);
        updated.last_modified = Utc::now();
        *stored = updated.clone();
        drop(conversations);

        self.persist(&updated).await;
        Ok(updated)
    }

    /// Set the conversation status
    pub async fn update_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
    ) -> crate::Result<Conversation> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(&id)
            .ok_or_else(|| crate::Error::NotFound(format!("Conversation {}", id)))?;
        stored.status = status;
        stored.last_modified = Utc::now();
        let updated = stored.clone();
        drop(conversations);

        self.persist(&updated).await;
        Ok(updated)
    }

    /// Adjust the vote score of a message
    pub async fn adjust_message_votes(
        &self,
        id: Uuid,
        message_id: &str,
        delta: i32,
    ) -> crate::Result<Conversation> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(&id)
            .ok_or_else(|| crate::Error::NotFound(format!("Conversation {}", id)))?;
        let message = stored
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| {
                crate::Error::NotFound(format!("Message {} in conversation {}", message_id, id))
            })?;
        message.votes += delta;
        stored.last_modified = Utc::now();
        let updated = stored.clone();
        drop(conversations);

        self.persist(&updated).await;
        Ok(updated)
    }

    /// The current (most recently modified, not completed) conversation of
    /// a channel, if any
    pub async fn find_current_by_channel(&self, channel_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .await
            .values()
            .filter(|c| c.channel_id == channel_id && c.status != ConversationStatus::Complete)
            .max_by_key(|c| c.last_modified)
            .cloned()
    }

    /// Conversations modified after `since`, oldest first, with the
    /// timestamp to resume the next poll from.
    ///
    /// When nothing changed, the returned `sync_time` is advanced by one
    /// millisecond past `since`. Under a coarse-resolution clock a write
    /// and a poll can share a timestamp; without the nudge such a poll
    /// would return the same conversations forever. The millisecond step
    /// is a heuristic tied to the persistence clock, not a guaranteed
    /// granularity.
    pub async fn updated_since(&self, since: DateTime<Utc>) -> UpdatedIds {
        let conversations = self.conversations.read().await;
        let mut updated: Vec<(DateTime<Utc>, Uuid)> = conversations
            .values()
            .filter(|c| c.last_modified > since)
            .map(|c| (c.last_modified, c.id))
            .collect();
        updated.sort();

        let sync_time = updated
            .last()
            .map(|(ts, _)| *ts)
            .unwrap_or_else(|| since + Duration::milliseconds(1));
        UpdatedIds {
            ids: updated.into_iter().map(|(_, id)| id).collect(),
            sync_time,
        }
    }

    async fn load_from_disk(&self) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
                }
                return;
            }
        };

        let mut conversations = self.conversations.write().await;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str::<Conversation>(&data) {
                    Ok(conversation) => {
                        conversations.insert(conversation.id, conversation);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
        tracing::info!(count = conversations.len(), "Loaded conversations from disk");
    }

    /// Persist a conversation to disk. Persistence failures are logged,
    /// never surfaced: the in-memory state already committed.
    async fn persist(&self, conversation: &Conversation) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let path = dir.join(format!("{}.json", conversation.id));
        match serde_json::to_string_pretty(conversation) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&path, json).await {
                    tracing::warn!("Failed to persist conversation {}: {}", conversation.id, e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to serialize conversation {}: {}", conversation.id, e);
            }
        }
    }
}
