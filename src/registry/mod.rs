//! Template registry with topic-hierarchy fallback lookup
//!
//! The registry maps topics to their [`TemplateDefinition`]s. Lookup first
//! tries an exact match and then walks the topic's ancestor chain, nearest
//! ancestor first. Registration is a one-time bulk load; registering two
//! definitions for the same topic is a configuration error and fails at
//! startup, never at analysis time.

pub mod definition;

pub use definition::{
    application_help, other, perimeter, product, role, thanks, train_info, travel,
    CompletenessRule, TemplateDefinition,
};

use crate::model::{MessageTopic, Template, Token};
use std::collections::HashMap;

/// Registry of template definitions keyed by topic
#[derive(Debug)]
pub struct TemplateRegistry {
    definitions: HashMap<MessageTopic, TemplateDefinition>,
}

impl TemplateRegistry {
    /// Bulk-load definitions. Fails fast with
    /// [`Error::DuplicateTopicRegistration`](crate::Error::DuplicateTopicRegistration)
    /// if two definitions claim the same topic.
    pub fn new(definitions: Vec<TemplateDefinition>) -> crate::Result<Self> {
        let mut map = HashMap::with_capacity(definitions.len());
        for def in definitions {
            let topic = def.topic();
            if map.insert(topic, def).is_some() {
                return Err(crate::Error::DuplicateTopicRegistration(topic.to_string()));
            }
        }
        Ok(Self { definitions: map })
    }

    /// Registry with all built-in definitions
    pub fn with_defaults() -> Self {
        Self::new(vec![
            travel(),
            train_info(),
            product(),
            perimeter(),
            application_help(),
            thanks(),
            other(),
        ])
        .expect("built-in definitions have unique topics")
    }

    /// Look up the definition for a topic: exact match first, then the
    /// nearest ancestor with a definition. `None` if the hierarchy is
    /// exhausted without a match.
    pub fn definition_for(&self, topic: MessageTopic) -> Option<&TemplateDefinition> {
        topic
            .hierarchy()
            .iter()
            .find_map(|t| self.definitions.get(t))
    }

    /// All registered definitions, in no particular order
    pub fn definitions(&self) -> impl Iterator<Item = &TemplateDefinition> {
        self.definitions.values()
    }

    /// Evaluate a template against the conversation's current token set.
    /// Returns `false` when no definition is registered for the template's
    /// topic (or any of its ancestors); that situation is logged and never
    /// fatal.
    pub fn is_valid(&self, template: &Template, tokens: &[Token]) -> bool {
        match self.definition_for(template.topic) {
            Some(def) => def.is_valid(template, tokens),
            None => {
                tracing::warn!(topic = %template.topic, "No template definition for topic");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Slot, TokenType, TokenValue};

    #[test]
    fn test_exact_lookup() {
        let registry = TemplateRegistry::with_defaults();
        let def = registry.definition_for(MessageTopic::Travel).unwrap();
        assert_eq!(def.topic(), MessageTopic::Travel);
    }

    #[test]
    fn test_hierarchy_fallback() {
        let registry = TemplateRegistry::with_defaults();
        // no dedicated TravelTrain definition: falls back to Travel
        let def = registry.definition_for(MessageTopic::TravelTrain).unwrap();
        assert_eq!(def.topic(), MessageTopic::Travel);

        let def = registry.definition_for(MessageTopic::PerimeterGastronomy).unwrap();
        assert_eq!(def.topic(), MessageTopic::Perimeter);
    }

    #[test]
    fn test_lookup_miss() {
        let registry = TemplateRegistry::new(vec![travel()]).unwrap();
        assert!(registry.definition_for(MessageTopic::TrainInfo).is_none());
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        // register both Product and TrainProduct: exact match must win
        let specialized = TemplateRegistry::new(vec![product()]).unwrap();
        let def = specialized.definition_for(MessageTopic::TrainProduct).unwrap();
        assert_eq!(def.topic(), MessageTopic::Product);
    }

    #[test]
    fn test_duplicate_registration_fails_fast() {
        let err = TemplateRegistry::new(vec![travel(), travel()]).unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateTopicRegistration(_)));
    }

    #[test]
    fn test_is_valid_unknown_topic() {
        let registry = TemplateRegistry::new(vec![travel()]).unwrap();
        let tokens = vec![Token::new(
            0,
            0,
            4,
            TokenType::Topic,
            TokenValue::Topic(MessageTopic::TrainInfo),
            0.9,
        )];
        let mut template = Template::new(MessageTopic::TrainInfo);
        let mut slot = Slot::new(role::TOPIC, Some(TokenType::Topic), true);
        slot.token_index = 0;
        template.slots.push(slot);
        // no definition registered for TrainInfo: not valid, not fatal
        assert!(!registry.is_valid(&template, &tokens));
    }
}
