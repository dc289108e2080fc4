//! Bounded analysis worker pool
//!
//! A fixed set of worker tasks (default 2) drains a queue of conversation
//! ids, one analysis task per conversation-update event. Tasks for
//! different conversations run in parallel; concurrent tasks for the same
//! conversation are allowed to race, the store's conditional write decides
//! the winner and the coordinator replays the loser.

use crate::analysis::AnalysisCoordinator;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 256;

/// Worker pool executing analysis tasks from a shared queue
pub struct AnalysisWorkerPool {
    queue: mpsc::Sender<Uuid>,
    handles: Vec<JoinHandle<()>>,
}

impl AnalysisWorkerPool {
    /// Spawn `workers` worker tasks draining a shared queue
    pub fn start(coordinator: Arc<AnalysisCoordinator>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (queue, receiver) = mpsc::channel::<Uuid>(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|worker| {
                let receiver = receiver.clone();
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    loop {
                        // hold the lock only while waiting for the next id,
                        // not across the analysis itself
                        let next = { receiver.lock().await.recv().await };
                        let Some(conversation_id) = next else {
                            break;
                        };
                        match coordinator.analyze_conversation(conversation_id).await {
                            Ok(result) => {
                                tracing::debug!(
                                    worker,
                                    conversation = %conversation_id,
                                    watermark = result.watermark,
                                    "Analysis task finished"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    worker,
                                    conversation = %conversation_id,
                                    error = %e,
                                    "Analysis task failed"
                                );
                            }
                        }
                    }
                    tracing::debug!(worker, "Analysis worker stopped");
                })
            })
            .collect();

        tracing::info!(workers, "Analysis worker pool started");
        Self { queue, handles }
    }

    /// Enqueue an analysis task for a conversation. Applies backpressure
    /// when the queue is full.
    pub async fn submit(&self, conversation_id: Uuid) -> crate::Result<()> {
        self.queue
            .send(conversation_id)
            .await
            .map_err(|_| crate::Error::Internal("Analysis queue is closed".to_string()))
    }

    /// Close the queue and wait for the workers to drain it
    pub async fn shutdown(self) {
        drop(self.queue);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Analysis worker panicked: {}", e);
            }
        }
    }
}
