//! Dedup/merge of overlapping token mentions
//!
//! Multiple extractors may mark the same mention in a message as a token
//! of the same type. This pass keeps one representative per maximal
//! overlapping group and copies the hints of removed tokens onto the
//! survivor. Only the "new" region of the token sequence — tokens of
//! messages past the analysis watermark — is touched, so indices of
//! already-referenced tokens stay stable.

use crate::model::{Token, TokenType};
use std::collections::HashMap;

/// Deduplicate the new region of the token sequence.
///
/// Tokens whose `message_idx` exceeds `last_message_analyzed` are
/// considered new (all of them if the watermark is `-1`). The new region
/// is stable-sorted by (message, start asc, end desc) and walked once,
/// keeping an active token per type: a token that lies within the active
/// token of its type, in the same message and with an equal value, is a
/// duplicate — it is removed and its hints are merged onto the survivor.
///
/// Returns the number of removed tokens. Deterministic: equal input order
/// yields equal output regardless of producer order.
pub fn dedup_merge(tokens: &mut Vec<Token>, last_message_analyzed: i32) -> usize {
    let first_new = if last_message_analyzed >= 0 {
        // scan from the tail for the last already-analyzed token
        let watermark = last_message_analyzed as usize;
        tokens
            .iter()
            .rposition(|t| t.message_idx <= watermark)
            .map(|i| i + 1)
            .unwrap_or(0)
    } else {
        0
    };

    let mut fresh = tokens.split_off(first_new);
    fresh.sort_by(Token::cmp_idx_start_end);

    let before = fresh.len();
    let mut active: HashMap<TokenType, usize> = HashMap::new();
    let mut kept: Vec<Token> = Vec::with_capacity(fresh.len());
    for token in fresh {
        if let Some(&active_idx) = active.get(&token.token_type) {
            let survivor = &mut kept[active_idx];
            if survivor.message_idx == token.message_idx
                && token.end <= survivor.end
                && token.value == survivor.value
            {
                tracing::debug!(token = %token, survivor = %survivor, "Dropping duplicate token");
                for hint in token.hints {
                    survivor.add_hint(hint);
                }
                continue;
            }
        }
        active.insert(token.token_type, kept.len());
        kept.push(token);
    }
    let removed = before - kept.len();
    tokens.extend(kept);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{hint, TokenValue};

    fn token(message_idx: usize, start: usize, end: usize, token_type: TokenType, value: &str) -> Token {
        Token::new(
            message_idx,
            start,
            end,
            token_type,
            TokenValue::Text(value.to_string()),
            0.8,
        )
    }

    #[test]
    fn test_exact_duplicate_collapsed() {
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 0, 6, TokenType::Place, "Berlin"),
        ];
        let removed = dedup_merge(&mut tokens, -1);
        assert_eq!(removed, 1);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, TokenValue::Text("Berlin".to_string()));
    }

    #[test]
    fn test_hints_unioned_onto_survivor() {
        let mut first = token(0, 0, 6, TokenType::Place, "Berlin");
        first.add_hint(hint::FROM);
        let mut second = token(0, 0, 6, TokenType::Place, "Berlin");
        second.add_hint(hint::NEGATED);

        let mut tokens = vec![first, second];
        dedup_merge(&mut tokens, -1);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].has_hint(hint::FROM));
        assert!(tokens[0].has_hint(hint::NEGATED));
    }

    #[test]
    fn test_different_value_kept() {
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 0, 6, TokenType::Place, "Berlin Hbf"),
        ];
        assert_eq!(dedup_merge(&mut tokens, -1), 0);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_different_type_kept() {
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 0, 6, TokenType::Keyword, "Berlin"),
        ];
        assert_eq!(dedup_merge(&mut tokens, -1), 0);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_different_message_kept() {
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(1, 0, 6, TokenType::Place, "Berlin"),
        ];
        assert_eq!(dedup_merge(&mut tokens, -1), 0);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_contained_span_with_equal_value_collapsed() {
        // a shorter mention contained in a longer one with the same value
        let mut tokens = vec![
            token(0, 0, 10, TokenType::Place, "Berlin"),
            token(0, 2, 8, TokenType::Place, "Berlin"),
        ];
        assert_eq!(dedup_merge(&mut tokens, -1), 1);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].end, 10); // the containing span survives
    }

    #[test]
    fn test_watermark_protects_old_region() {
        // the two duplicates sit in message 0, which is already analyzed
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(1, 0, 7, TokenType::Place, "Hamburg"),
        ];
        assert_eq!(dedup_merge(&mut tokens, 0), 0);
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_new_region_sorted_and_deduped() {
        // producers emit out of order; the new region is sorted before the walk
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"), // old region
            token(1, 8, 14, TokenType::Place, "Munich"),
            token(1, 0, 7, TokenType::Place, "Hamburg"),
            token(1, 8, 14, TokenType::Place, "Munich"),
        ];
        assert_eq!(dedup_merge(&mut tokens, 0), 1);
        assert_eq!(tokens.len(), 3);
        // old region untouched and first
        assert_eq!(tokens[0].value, TokenValue::Text("Berlin".to_string()));
        // new region in span order
        assert_eq!(tokens[1].value, TokenValue::Text("Hamburg".to_string()));
        assert_eq!(tokens[2].value, TokenValue::Text("Munich".to_string()));
    }

    #[test]
    fn test_idempotent() {
        let mut tokens = vec![
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 0, 6, TokenType::Place, "Berlin"),
            token(0, 10, 14, TokenType::Date, "noon"),
        ];
        dedup_merge(&mut tokens, -1);
        let snapshot: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();

        assert_eq!(dedup_merge(&mut tokens, -1), 0);
        let replay: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        assert_eq!(snapshot, replay);
    }

    #[test]
    fn test_empty_input() {
        let mut tokens: Vec<Token> = Vec::new();
        assert_eq!(dedup_merge(&mut tokens, -1), 0);
        assert!(tokens.is_empty());
    }
}
