//! Rule-driven hint assignment
//!
//! A [`TokenRuleset`] declares the language it understands, the topics it
//! applies to and the token types it wants to see. The coordinator applies
//! every matching ruleset to each new user message, passing only tokens of
//! the declared types by index into the conversation's token table.
//!
//! The concrete [`RegexRuleset`] strategy rewrites the message text,
//! replacing each token's source span with a `<Type>` placeholder so that
//! patterns match against the type instead of the actual value:
//!
//! ```text
//! "I want to go from Berlin to Hamburg"
//!   -> "I want to go from <Place> to <Place>"
//! ```
//!
//! Each capturing group of a pattern maps to an optional hint attached to
//! the token(s) at the group's offset. A matched offset group is consumed;
//! later rules matching the same offset are ignored (first match wins).

use crate::model::{Conversation, MessageOrigin, MessageTopic, Token, TokenState, TokenType};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A set of rules assigning hints to tokens of a user message
pub trait TokenRuleset: Send + Sync {
    /// Language this ruleset understands (ISO 639-1), `None` for all
    fn language(&self) -> Option<&str>;

    /// Topics this ruleset applies to; a message qualifies when the
    /// transitive closure of its Topic tokens intersects this set
    fn topics(&self) -> &[MessageTopic];

    /// Token types this ruleset operates on
    fn token_types(&self) -> &[TokenType];

    /// Apply the rules to the selected tokens (indices into `tokens`) of a
    /// message with the given content
    fn apply(&self, content: &str, tokens: &mut [Token], selected: &[usize]);
}

/// Regex-based [`TokenRuleset`] matching against placeholder-rewritten text
pub struct RegexRuleset {
    language: Option<String>,
    topics: Vec<MessageTopic>,
    token_types: Vec<TokenType>,
    rules: Vec<(Regex, Vec<Option<String>>)>,
}

impl RegexRuleset {
    /// Create an empty ruleset
    pub fn new(
        language: Option<&str>,
        topics: Vec<MessageTopic>,
        token_types: Vec<TokenType>,
    ) -> Self {
        Self {
            language: language.map(|l| l.to_ascii_lowercase()),
            topics,
            token_types,
            rules: Vec::new(),
        }
    }

    /// Add a rule. The hints correspond to the capturing groups of the
    /// pattern; `None` for a group that does not assign a hint.
    pub fn add_rule(&mut self, pattern: &str, hints: &[Option<&str>]) -> crate::Result<()> {
        let regex = Regex::new(pattern)
            .map_err(|e| crate::Error::Config(format!("Invalid rule pattern '{}': {}", pattern, e)))?;
        self.rules
            .push((regex, hints.iter().map(|h| h.map(str::to_string)).collect()));
        Ok(())
    }

    /// Builder-style [`add_rule`](Self::add_rule)
    pub fn rule(mut self, pattern: &str, hints: &[Option<&str>]) -> crate::Result<Self> {
        self.add_rule(pattern, hints)?;
        Ok(self)
    }

    /// Rewrite the content replacing token spans with `<Type>` placeholders.
    /// Returns the rewritten text and a map from placeholder byte offset to
    /// the arena indices of the token(s) at that offset.
    ///
    /// Token spans are char offsets; they are translated to byte offsets
    /// before slicing so multibyte content does not shift the spans.
    fn placeholder_text(
        &self,
        content: &str,
        tokens: &[Token],
        order: &[usize],
    ) -> (String, BTreeMap<usize, Vec<usize>>) {
        let byte_offsets: Vec<usize> = content
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(content.len()))
            .collect();

        let mut text = String::with_capacity(content.len());
        let mut offsets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut cursor = 0usize; // byte offset into content

        for &idx in order {
            let token = &tokens[idx];
            let (Some(&start), Some(&end)) =
                (byte_offsets.get(token.start), byte_offsets.get(token.end))
            else {
                tracing::warn!(token = %token, "Token span outside message content, skipping");
                continue;
            };
            if start < cursor {
                // overlapping with the previous token group
                if let Some(group) = offsets.values_mut().next_back() {
                    let first = &tokens[group[0]];
                    if first.start == token.start
                        && first.end == token.end
                        && first.token_type == token.token_type
                    {
                        group.push(idx);
                    } else {
                        tracing::warn!(first = %first, second = %token,
                            "Unsupported overlapping tokens, keeping first-seen group");
                    }
                }
                cursor = cursor.max(end);
                continue;
            }
            let Some(prefix) = content.get(cursor..start) else {
                tracing::warn!(token = %token, "Token span outside message content, skipping");
                continue;
            };
            text.push_str(prefix);
            offsets.insert(text.len(), vec![idx]);
            text.push_str(&format!("<{:?}>", token.token_type));
            cursor = end;
        }
        if let Some(rest) = content.get(cursor..) {
            text.push_str(rest);
        }
        (text, offsets)
    }
}

impl TokenRuleset for RegexRuleset {
    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    fn topics(&self) -> &[MessageTopic] {
        &self.topics
    }

    fn token_types(&self) -> &[TokenType] {
        &self.token_types
    }

    fn apply(&self, content: &str, tokens: &mut [Token], selected: &[usize]) {
        if selected.is_empty() {
            return;
        }
        let mut order = selected.to_vec();
        order.sort_by(|&a, &b| Token::cmp_idx_start_end(&tokens[a], &tokens[b]));

        let (text, mut offsets) = self.placeholder_text(content, tokens, &order);

        for (regex, hints) in &self.rules {
            for captures in regex.captures_iter(&text) {
                for (group, hint) in hints.iter().enumerate() {
                    let Some(m) = captures.get(group + 1) else {
                        continue;
                    };
                    let Some(hint) = hint else {
                        continue;
                    };
                    match offsets.remove(&m.start()) {
                        Some(group_tokens) => {
                            for token_idx in group_tokens {
                                let token = &mut tokens[token_idx];
                                if token.add_hint(hint.clone()) {
                                    tracing::debug!(hint = %hint, token = %token, "Assigned hint");
                                }
                            }
                        }
                        None => {
                            // either no placeholder at this offset or the
                            // group was already consumed by an earlier rule
                            tracing::debug!(offset = m.start(), pattern = %regex,
                                "No unconsumed token group at match offset");
                        }
                    }
                }
            }
        }
    }
}

/// Apply every matching ruleset to the new user messages of a conversation.
///
/// For each message past the watermark with `User` origin, the transitive
/// topic closure of the message's Topic tokens is computed; every ruleset
/// whose language matches and whose topic set intersects that closure is
/// applied, seeing only the message's non-rejected tokens of its declared
/// types.
pub fn apply_rulesets(
    conversation: &mut Conversation,
    rulesets: &[Arc<dyn TokenRuleset>],
    language: &str,
) {
    let applicable: Vec<&Arc<dyn TokenRuleset>> = rulesets
        .iter()
        .filter(|rs| {
            rs.language()
                .map_or(true, |l| l.eq_ignore_ascii_case(language))
        })
        .collect();
    if applicable.is_empty() {
        return;
    }

    let start = (conversation.last_message_analyzed + 1).max(0) as usize;
    for message_idx in start..conversation.messages.len() {
        if conversation.messages[message_idx].origin != MessageOrigin::User {
            continue;
        }
        let message_tokens: Vec<usize> = conversation
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.message_idx == message_idx && t.state != TokenState::Rejected)
            .map(|(i, _)| i)
            .collect();

        let closure: BTreeSet<MessageTopic> = message_tokens
            .iter()
            .map(|&i| &conversation.tokens[i])
            .filter(|t| t.token_type == TokenType::Topic)
            .filter_map(|t| t.value.as_topic())
            .flat_map(|topic| topic.hierarchy().iter().copied())
            .collect();
        if closure.is_empty() {
            continue;
        }

        for ruleset in &applicable {
            if !ruleset.topics().iter().any(|t| closure.contains(t)) {
                continue;
            }
            let selected: Vec<usize> = message_tokens
                .iter()
                .copied()
                .filter(|&i| {
                    ruleset
                        .token_types()
                        .contains(&conversation.tokens[i].token_type)
                })
                .collect();
            if selected.is_empty() {
                continue;
            }
            let content = conversation.messages[message_idx].content.clone();
            ruleset.apply(&content, &mut conversation.tokens, &selected);
        }
    }
}

/// Built-in English rulesets for the travel and perimeter intents
pub fn default_rulesets() -> Vec<Arc<dyn TokenRuleset>> {
    vec![
        Arc::new(english_travel_ruleset().expect("built-in travel rules compile")),
        Arc::new(english_perimeter_ruleset().expect("built-in perimeter rules compile")),
    ]
}

fn english_travel_ruleset() -> crate::Result<RegexRuleset> {
    use crate::model::hint;
    RegexRuleset::new(
        Some("en"),
        vec![MessageTopic::Travel, MessageTopic::TrainInfo],
        vec![TokenType::Place, TokenType::Date],
    )
    .rule(r"not (?:via |through )?(<Place>)", &[Some(hint::NEGATED)])?
    .rule(r"from (<Place>)", &[Some(hint::FROM)])?
    .rule(r"to (<Place>)", &[Some(hint::TO)])?
    .rule(r"via (<Place>)", &[Some(hint::VIA)])?
    .rule(
        r"(?:leave|leaving|depart(?:ing)?)(?: \w+)? (<Date>)",
        &[Some(hint::DEPART)],
    )?
    .rule(
        r"arriv(?:e|ing|al)(?: \w+)? (<Date>)",
        &[Some(hint::ARRIVE)],
    )
}

fn english_perimeter_ruleset() -> crate::Result<RegexRuleset> {
    use crate::model::hint;
    RegexRuleset::new(
        Some("en"),
        vec![MessageTopic::Perimeter],
        vec![TokenType::Place, TokenType::Date],
    )
    .rule(r"(?:near|around|close to|at|in) (<Place>)", &[Some(hint::AT)])?
    .rule(
        r"from (<Date>) (?:to|until) (<Date>)",
        &[Some(hint::START), Some(hint::END)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{hint, Message, TokenValue};
    use uuid::Uuid;

    fn place(message_idx: usize, start: usize, end: usize, value: &str) -> Token {
        Token::new(
            message_idx,
            start,
            end,
            TokenType::Place,
            TokenValue::Text(value.to_string()),
            0.8,
        )
    }

    fn topic(message_idx: usize, value: MessageTopic) -> Token {
        Token::new(message_idx, 0, 1, TokenType::Topic, TokenValue::Topic(value), 0.9)
    }

    #[test]
    fn test_regex_assigns_from_and_to() {
        let ruleset = english_travel_ruleset().unwrap();
        //               0123456789012345678901234567890123456
        let content = "I want to go from Berlin to Hamburg";
        let mut tokens = vec![place(0, 18, 24, "Berlin"), place(0, 28, 35, "Hamburg")];

        ruleset.apply(content, &mut tokens, &[0, 1]);

        assert!(tokens[0].has_hint(hint::FROM));
        assert!(!tokens[0].has_hint(hint::TO));
        assert!(tokens[1].has_hint(hint::TO));
    }

    #[test]
    fn test_first_match_consumes_offset_group() {
        // "not via X": the negation rule runs first and consumes the group,
        // the via rule must not fire for the same token
        let ruleset = english_travel_ruleset().unwrap();
        let content = "not via Frankfurt";
        let mut tokens = vec![place(0, 8, 17, "Frankfurt")];

        ruleset.apply(content, &mut tokens, &[0]);

        assert!(tokens[0].has_hint(hint::NEGATED));
        assert!(!tokens[0].has_hint(hint::VIA));
    }

    #[test]
    fn test_overlapping_same_span_tokens_grouped() {
        // two producers marked the identical span: both get the hint
        let ruleset = english_travel_ruleset().unwrap();
        let content = "from Berlin";
        let mut tokens = vec![place(0, 5, 11, "Berlin"), place(0, 5, 11, "Berlin")];

        ruleset.apply(content, &mut tokens, &[0, 1]);

        assert!(tokens[0].has_hint(hint::FROM));
        assert!(tokens[1].has_hint(hint::FROM));
    }

    #[test]
    fn test_mismatched_overlap_keeps_first_group() {
        // partially overlapping tokens disagree on the span: logged, the
        // first-seen token still gets the hint
        let ruleset = english_travel_ruleset().unwrap();
        let content = "from Bad Homburg";
        let mut tokens = vec![place(0, 5, 16, "Bad Homburg"), place(0, 9, 16, "Homburg")];

        ruleset.apply(content, &mut tokens, &[0, 1]);

        assert!(tokens[0].has_hint(hint::FROM));
    }

    #[test]
    fn test_multibyte_content_before_token() {
        // spans are char offsets; "é" adds a byte the slicing must absorb
        let ruleset = english_travel_ruleset().unwrap();
        let content = "héllo from Berlin";
        let mut tokens = vec![place(0, 11, 17, "Berlin")];

        ruleset.apply(content, &mut tokens, &[0]);

        assert!(tokens[0].has_hint(hint::FROM));
    }

    #[test]
    fn test_span_past_end_of_content_skipped() {
        let ruleset = english_travel_ruleset().unwrap();
        let content = "from Berlin";
        let mut tokens = vec![place(0, 5, 99, "Berlin")];

        ruleset.apply(content, &mut tokens, &[0]);

        assert!(tokens[0].hints.is_empty());
    }

    #[test]
    fn test_multi_group_rule() {
        let ruleset = english_perimeter_ruleset().unwrap();
        let content = "hotels from Friday until Sunday";
        let mut tokens = vec![
            Token::new(0, 12, 18, TokenType::Date, TokenValue::Text("Friday".into()), 0.8),
            Token::new(0, 25, 31, TokenType::Date, TokenValue::Text("Sunday".into()), 0.8),
        ];

        ruleset.apply(content, &mut tokens, &[0, 1]);

        assert!(tokens[0].has_hint(hint::START));
        assert!(tokens[1].has_hint(hint::END));
    }

    fn travel_conversation(content: &str) -> Conversation {
        let mut conv = Conversation::new(Uuid::new_v4(), "channel-1");
        conv.messages.push(Message::user("m-0", "alice", content));
        conv
    }

    #[test]
    fn test_apply_rulesets_topic_intersection() {
        let mut conv = travel_conversation("go from Berlin to Hamburg");
        conv.tokens.push(topic(0, MessageTopic::TravelTrain)); // child of Travel
        conv.tokens.push(place(0, 8, 14, "Berlin"));
        conv.tokens.push(place(0, 18, 25, "Hamburg"));

        apply_rulesets(&mut conv, &default_rulesets(), "en");

        // ruleset declared Travel; the message topic closure contains it
        assert!(conv.tokens[1].has_hint(hint::FROM));
        assert!(conv.tokens[2].has_hint(hint::TO));
    }

    #[test]
    fn test_apply_rulesets_skips_foreign_language() {
        let mut conv = travel_conversation("go from Berlin to Hamburg");
        conv.tokens.push(topic(0, MessageTopic::Travel));
        conv.tokens.push(place(0, 8, 14, "Berlin"));

        apply_rulesets(&mut conv, &default_rulesets(), "de");

        assert!(conv.tokens[1].hints.is_empty());
    }

    #[test]
    fn test_apply_rulesets_skips_agent_messages() {
        let mut conv = Conversation::new(Uuid::new_v4(), "channel-1");
        conv.messages
            .push(Message::agent("m-0", "bot", "go from Berlin to Hamburg"));
        conv.tokens.push(topic(0, MessageTopic::Travel));
        conv.tokens.push(place(0, 8, 14, "Berlin"));

        apply_rulesets(&mut conv, &default_rulesets(), "en");

        assert!(conv.tokens[1].hints.is_empty());
    }

    #[test]
    fn test_apply_rulesets_skips_analyzed_messages() {
        let mut conv = travel_conversation("go from Berlin to Hamburg");
        conv.last_message_analyzed = 0; // message already analyzed
        conv.tokens.push(topic(0, MessageTopic::Travel));
        conv.tokens.push(place(0, 8, 14, "Berlin"));

        apply_rulesets(&mut conv, &default_rulesets(), "en");

        assert!(conv.tokens[1].hints.is_empty());
    }

    #[test]
    fn test_apply_rulesets_skips_rejected_tokens() {
        let mut conv = travel_conversation("go from Berlin to Hamburg");
        conv.tokens.push(topic(0, MessageTopic::Travel));
        let mut rejected = place(0, 8, 14, "Berlin");
        rejected.state = TokenState::Rejected;
        conv.tokens.push(rejected);

        apply_rulesets(&mut conv, &default_rulesets(), "en");

        assert!(conv.tokens[1].hints.is_empty());
    }

    #[test]
    fn test_apply_rulesets_no_topic_closure() {
        // without Topic tokens no ruleset applies
        let mut conv = travel_conversation("go from Berlin to Hamburg");
        conv.tokens.push(place(0, 8, 14, "Berlin"));

        apply_rulesets(&mut conv, &default_rulesets(), "en");

        assert!(conv.tokens[0].hints.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut ruleset = RegexRuleset::new(None, vec![MessageTopic::Travel], vec![TokenType::Place]);
        assert!(ruleset.add_rule("(<Place", &[Some("broken")]).is_err());
    }
}
