//! Colloquy - Conversational Intent Extraction Engine
//!
//! Colloquy turns an ongoing support conversation into structured,
//! actionable intents. An external NLP analyzer produces raw token
//! candidates (typed spans with confidence); Colloquy owns everything
//! after that: deduplication, rule-driven hint assignment, template
//! building with slot-filling validation, and conditional persistence of
//! the growing conversation aggregate.
//!
//! ## Pipeline
//!
//! ```text
//!  message appended
//!        │
//!        ▼
//!  ┌──────────────────┐   raw token candidates   ┌────────────────┐
//!  │ AnalysisWorker   │◄─────────────────────────│  Analyzer      │
//!  │ Pool (default 2) │                          │  (external)    │
//!  └────────┬─────────┘                          └────────────────┘
//!           ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ AnalysisCoordinator                          │
//!  │  1. collect candidates past the watermark    │
//!  │  2. dedup/merge overlapping mentions         │
//!  │  3. regex rulesets attach hints (from, to…)  │
//!  │  4. build/extend templates, validate slots   │
//!  │  5. advance watermark                        │
//!  └────────┬─────────────────────────────────────┘
//!           ▼ conditional write (compare-and-swap)
//!  ┌──────────────────┐
//!  │ ConversationStore│  bounded message window, optimistic concurrency
//!  └──────────────────┘
//! ```
//!
//! Re-running analysis over an unchanged conversation is idempotent: the
//! watermark guards the new-token region, dedup collapses repeated
//! mentions and the template builder never re-fills an already-filled
//! role.
//!
//! ## Modules
//!
//! - [`model`]: conversation aggregate, tokens, topics, templates
//! - [`registry`]: per-topic template definitions and completeness rules
//! - [`processor`]: token dedup/merge and rule-based hint assignment
//! - [`analysis`]: the incremental analysis coordinator
//! - [`store`]: conversation store with conditional updates
//! - [`worker`]: bounded analysis worker pool
//! - [`config`]: configuration management

pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod processor;
pub mod registry;
pub mod store;
pub mod worker;

pub use analysis::{AnalysisCoordinator, AnalysisResult, Analyzer};
pub use config::{AnalysisConfig, ColloquyConfig, StoreConfig};
pub use error::{Error, Result};
pub use model::{Conversation, ConversationStatus, Message, MessageOrigin, MessageTopic};
pub use registry::TemplateRegistry;
pub use store::ConversationStore;
pub use worker::AnalysisWorkerPool;
