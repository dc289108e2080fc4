//! Token post-processing
//!
//! Two passes run over freshly extracted tokens after the external
//! analyzer and before template building:
//!
//! - [`dedup`]: collapse overlapping same-type mentions produced by
//!   multiple extractors into one representative token, unioning hints
//! - [`rules`]: rule-driven hint assignment (e.g. "from X" marks the
//!   Place token X with the `from` hint) driven by externally supplied
//!   rulesets filtered by language and topic

pub mod dedup;
pub mod rules;

pub use dedup::dedup_merge;
pub use rules::{apply_rulesets, default_rulesets, RegexRuleset, TokenRuleset};
