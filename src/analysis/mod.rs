//! Incremental analysis coordination
//!
//! The coordinator owns the analysis pipeline for one conversation update:
//! read the conversation, collect raw token candidates from the external
//! analyzer for messages past the watermark, dedup/merge, apply rule
//! hints, build or extend templates, advance the watermark and publish the
//! whole thing with a conditional store write. A lost write race is
//! expected control flow: the pass is discarded and replayed from a fresh
//! read, a bounded number of times.
//!
//! Nothing in a pass mutates shared state. The in-memory model built
//! during the pass is exclusively owned by it and thrown away when the
//! commit fails.

mod builder;

use crate::config::AnalysisConfig;
use crate::model::{Conversation, ConversationStatus, Template, Token};
use crate::processor::{apply_rulesets, dedup_merge, TokenRuleset};
use crate::registry::TemplateRegistry;
use crate::store::ConversationStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// External NLP pipeline producing raw token candidates.
///
/// The coordinator treats this as a black box emitting typed spans with
/// confidence, keyed by message index and character offsets. Candidates
/// for already-analyzed messages are ignored.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, conversation: &Conversation) -> crate::Result<Vec<Token>>;
}

/// Outcome of one committed analysis pass
#[derive(Debug)]
pub struct AnalysisResult {
    pub conversation_id: Uuid,
    /// Templates created by this pass
    pub new_templates: Vec<Template>,
    /// Pre-existing templates whose slots or probability changed
    pub updated_templates: Vec<Template>,
    /// The committed watermark
    pub watermark: i32,
}

/// Drives incremental analysis of conversations
pub struct AnalysisCoordinator {
    store: Arc<ConversationStore>,
    registry: Arc<TemplateRegistry>,
    analyzer: Arc<dyn Analyzer>,
    rulesets: Vec<Arc<dyn TokenRuleset>>,
    config: AnalysisConfig,
}

impl AnalysisCoordinator {
    pub fn new(
        store: Arc<ConversationStore>,
        registry: Arc<TemplateRegistry>,
        analyzer: Arc<dyn Analyzer>,
        rulesets: Vec<Arc<dyn TokenRuleset>>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            store,
            registry,
            analyzer,
            rulesets,
            config,
        }
    }

    /// Analyze a conversation and commit the result.
    ///
    /// The commit is conditional on the conversation not having been
    /// modified since the read. On a conflict the whole pass is replayed
    /// from a fresh read, up to `max_commit_retries` times; the last
    /// conflict is surfaced to the caller.
    pub async fn analyze_conversation(
        &self,
        conversation_id: Uuid,
    ) -> crate::Result<AnalysisResult> {
        let mut attempt: u32 = 0;
        loop {
            let conversation = self.store.get(conversation_id).await?;
            let read_time = conversation.last_modified;

            let (analyzed, outcome) = self.run_pass(conversation).await?;

            match self
                .store
                .save_if_not_modified_after(&analyzed, read_time)
                .await
            {
                Ok(saved) => {
                    tracing::debug!(
                        conversation = %conversation_id,
                        watermark = saved.last_message_analyzed,
                        created = outcome.created.len(),
                        updated = outcome.updated.len(),
                        "Analysis committed"
                    );
                    return Ok(AnalysisResult {
                        conversation_id,
                        new_templates: collect(&saved, &outcome.created),
                        updated_templates: collect(&saved, &outcome.updated),
                        watermark: saved.last_message_analyzed,
                    });
                }
                Err(crate::Error::ConcurrentModification(reason))
                    if attempt < self.config.max_commit_retries =>
                {
                    attempt += 1;
                    tracing::debug!(
                        conversation = %conversation_id,
                        attempt,
                        %reason,
                        "Analysis commit lost a write race, retrying from fresh read"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Templates of a conversation that are complete enough to act on
    pub fn valid_templates<'a>(&self, conversation: &'a Conversation) -> Vec<&'a Template> {
        conversation
            .templates
            .iter()
            .filter(|t| self.registry.is_valid(t, &conversation.tokens))
            .collect()
    }

    /// One in-memory analysis pass over a read snapshot. Pure apart from
    /// the analyzer call; commits nothing.
    async fn run_pass(
        &self,
        mut conversation: Conversation,
    ) -> crate::Result<(Conversation, builder::BuildOutcome)> {
        let watermark = conversation.last_message_analyzed;
        let last_idx = conversation.messages.len() as i32 - 1;

        if last_idx > watermark {
            let candidates = self.analyzer.analyze(&conversation).await?;
            for token in candidates {
                if (token.message_idx as i32) <= watermark {
                    tracing::debug!(token = %token, "Candidate for analyzed message, ignoring");
                    continue;
                }
                if token.message_idx >= conversation.messages.len() || token.start >= token.end {
                    tracing::warn!(token = %token, "Malformed token candidate, ignoring");
                    continue;
                }
                conversation.tokens.push(token);
            }
        }

        let removed = dedup_merge(&mut conversation.tokens, watermark);
        if removed > 0 {
            tracing::debug!(removed, "Collapsed duplicate tokens");
        }

        apply_rulesets(&mut conversation, &self.rulesets, &self.config.language);

        let outcome = builder::update_templates(&mut conversation, &self.registry);

        // the watermark never moves backward
        conversation.last_message_analyzed = last_idx.max(watermark);
        if conversation.status == ConversationStatus::New {
            conversation.status = ConversationStatus::InProgress;
        }
        Ok((conversation, outcome))
    }
}

fn collect(conversation: &Conversation, indices: &[usize]) -> Vec<Template> {
    indices
        .iter()
        .filter_map(|&i| conversation.templates.get(i).cloned())
        .collect()
}
