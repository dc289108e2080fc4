//! Per-topic template definitions
//!
//! A [`TemplateDefinition`] is the stateless description of one intent: the
//! slot shapes it knows by role name, and the completeness rule deciding
//! whether a set of present-and-valid roles is enough to act on. The rules
//! are a closed tagged variant evaluated over role sets; no dynamic
//! dispatch is involved.

use crate::model::{MessageTopic, Slot, Template, Token, TokenState, TokenType};
use std::collections::BTreeSet;

/// Role names used by the built-in definitions
pub mod role {
    /// The implicit topic slot every template carries
    pub const TOPIC: &str = "topic";
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const VIA: &str = "via";
    pub const DEPART: &str = "depart";
    pub const ARRIVE: &str = "arrive";
    pub const CARD: &str = "card";
    pub const CLASS: &str = "class";
    pub const TRAIN: &str = "train";
    pub const DATE: &str = "date";
    pub const WHAT: &str = "what";
    pub const PRODUCT: &str = "product";
    pub const LOCATION: &str = "location";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const QUESTION: &str = "question";
    pub const KEYWORD: &str = "keyword";
}

/// The shape of a single slot a definition can create
#[derive(Debug, Clone)]
struct SlotShape {
    role: &'static str,
    token_type: Option<TokenType>,
    required: bool,
    inquiry: &'static str,
}

/// Completeness rule over the set of present-and-valid role names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletenessRule {
    /// `from && to && (depart || arrive)`
    Travel,
    /// `date && (train || (from && to))`
    TrainInfo,
    /// `product`
    Product,
    /// `location && what`
    Perimeter,
    /// `question || keyword`
    ApplicationHelp,
    /// Always complete
    Always,
}

impl CompletenessRule {
    fn is_complete(&self, present: &BTreeSet<&str>) -> bool {
        use role::*;
        match self {
            CompletenessRule::Travel => {
                present.contains(FROM)
                    && present.contains(TO)
                    && (present.contains(DEPART) || present.contains(ARRIVE))
            }
            CompletenessRule::TrainInfo => {
                present.contains(DATE)
                    && (present.contains(TRAIN)
                        || (present.contains(FROM) && present.contains(TO)))
            }
            CompletenessRule::Product => present.contains(PRODUCT),
            CompletenessRule::Perimeter => present.contains(LOCATION) && present.contains(WHAT),
            CompletenessRule::ApplicationHelp => {
                present.contains(QUESTION) || present.contains(KEYWORD)
            }
            CompletenessRule::Always => true,
        }
    }
}

/// The stateless definition of one intent topic
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    topic: MessageTopic,
    shapes: Vec<SlotShape>,
    rule: CompletenessRule,
}

impl TemplateDefinition {
    fn new(topic: MessageTopic, rule: CompletenessRule, shapes: Vec<SlotShape>) -> Self {
        Self { topic, shapes, rule }
    }

    /// The topic this definition is registered for
    pub fn topic(&self) -> MessageTopic {
        self.topic
    }

    /// Role names this definition can create slots for (excluding the
    /// implicit topic role)
    pub fn roles(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.shapes.iter().map(|s| s.role)
    }

    /// Create a slot for a role, correctly initialized with the type and
    /// required flag of this definition. Returns `None` for unknown roles.
    pub fn create_slot(&self, role: &str) -> Option<Slot> {
        if role == role::TOPIC {
            return Some(Slot::new(role::TOPIC, Some(TokenType::Topic), true));
        }
        self.shapes.iter().find(|s| s.role == role).map(|shape| {
            let slot = Slot::new(shape.role, shape.token_type, shape.required);
            if shape.inquiry.is_empty() {
                slot
            } else {
                slot.with_inquiry(shape.inquiry)
            }
        })
    }

    /// Check that a bound token index resolves to a token of the expected
    /// type and non-rejected state. Out-of-range indices are treated as
    /// absent, never as an error.
    fn validate_token(&self, tokens: &[Token], index: i32, expected: Option<TokenType>) -> bool {
        let Ok(idx) = usize::try_from(index) else {
            return false;
        };
        match tokens.get(idx) {
            Some(token) => {
                expected.map_or(true, |t| token.token_type == t)
                    && token.state != TokenState::Rejected
            }
            None => false,
        }
    }

    /// Check that a slot's declared shape agrees with the shape this
    /// definition would create for the role. Unknown roles are permissive
    /// (forward/backward compatible slot vocabularies).
    fn validate_shape(&self, slot: &Slot) -> bool {
        match self.create_slot(&slot.role) {
            Some(expected) => {
                expected.token_type == slot.token_type && expected.required == slot.required
            }
            None => true,
        }
    }

    /// The set of role names whose slots pass both the shape check and the
    /// token check
    fn present_and_valid_roles<'a>(&self, slots: &'a [Slot], tokens: &[Token]) -> BTreeSet<&'a str> {
        slots
            .iter()
            .filter(|slot| self.validate_shape(slot))
            .filter(|slot| self.validate_token(tokens, slot.token_index, slot.token_type))
            .map(|slot| slot.role.as_str())
            .collect()
    }

    /// Evaluate whether the template is complete enough to act on.
    ///
    /// A template always carries an explicit topic-token binding: if the
    /// implicit `topic` slot is absent, unfilled or invalid, the template
    /// is not valid regardless of the completeness rule.
    pub fn is_valid(&self, template: &Template, tokens: &[Token]) -> bool {
        let topic_bound = template
            .slots_for_role(role::TOPIC)
            .any(|slot| self.validate_token(tokens, slot.token_index, Some(TokenType::Topic)));
        if !topic_bound {
            return false;
        }
        let present = self.present_and_valid_roles(&template.slots, tokens);
        self.rule.is_complete(&present)
    }
}

/// Travel intent: where from, where to, when
pub fn travel() -> TemplateDefinition {
    use role::*;
    TemplateDefinition::new(
        MessageTopic::Travel,
        CompletenessRule::Travel,
        vec![
            SlotShape { role: FROM, token_type: Some(TokenType::Place), required: true, inquiry: "Where do you want to depart from?" },
            SlotShape { role: TO, token_type: Some(TokenType::Place), required: true, inquiry: "Where do you want to go?" },
            SlotShape { role: VIA, token_type: Some(TokenType::Place), required: false, inquiry: "" },
            SlotShape { role: DEPART, token_type: Some(TokenType::Date), required: false, inquiry: "When do you want to leave?" },
            SlotShape { role: ARRIVE, token_type: Some(TokenType::Date), required: false, inquiry: "When do you want to arrive?" },
            SlotShape { role: CARD, token_type: Some(TokenType::Product), required: false, inquiry: "Do you have a loyalty card?" },
            SlotShape { role: CLASS, token_type: Some(TokenType::Product), required: false, inquiry: "Which class do you want to travel?" },
        ],
    )
}

/// Train information intent: status of a specific train
pub fn train_info() -> TemplateDefinition {
    use role::*;
    TemplateDefinition::new(
        MessageTopic::TrainInfo,
        CompletenessRule::TrainInfo,
        vec![
            SlotShape { role: TRAIN, token_type: Some(TokenType::Train), required: false, inquiry: "Which train is it about?" },
            SlotShape { role: DATE, token_type: Some(TokenType::Date), required: true, inquiry: "Is it about the current train?" },
            SlotShape { role: FROM, token_type: Some(TokenType::Place), required: false, inquiry: "Where did the train depart?" },
            SlotShape { role: TO, token_type: Some(TokenType::Place), required: false, inquiry: "Where is the train heading?" },
            SlotShape { role: WHAT, token_type: None, required: false, inquiry: "What exactly are you looking for?" },
        ],
    )
}

/// Product information intent
pub fn product() -> TemplateDefinition {
    use role::*;
    TemplateDefinition::new(
        MessageTopic::Product,
        CompletenessRule::Product,
        vec![
            SlotShape { role: PRODUCT, token_type: Some(TokenType::Product), required: true, inquiry: "What do you want to know?" },
            SlotShape { role: WHAT, token_type: None, required: false, inquiry: "What exactly are you looking for?" },
        ],
    )
}

/// Perimeter search intent: something near a location
pub fn perimeter() -> TemplateDefinition {
    use role::*;
    TemplateDefinition::new(
        MessageTopic::Perimeter,
        CompletenessRule::Perimeter,
        vec![
            SlotShape { role: LOCATION, token_type: Some(TokenType::Place), required: true, inquiry: "And where exactly?" },
            SlotShape { role: START, token_type: Some(TokenType::Date), required: false, inquiry: "From when?" },
            SlotShape { role: END, token_type: Some(TokenType::Date), required: false, inquiry: "Until when?" },
            SlotShape { role: WHAT, token_type: None, required: true, inquiry: "What exactly are you looking for?" },
        ],
    )
}

/// Application help intent: questions about the application itself
pub fn application_help() -> TemplateDefinition {
    use role::*;
    TemplateDefinition::new(
        MessageTopic::ApplicationHelp,
        CompletenessRule::ApplicationHelp,
        vec![
            SlotShape { role: QUESTION, token_type: Some(TokenType::QuestionIdentifier), required: false, inquiry: "" },
            SlotShape { role: KEYWORD, token_type: Some(TokenType::Keyword), required: false, inquiry: "" },
        ],
    )
}

/// Fallback intent for everything without a specific definition
pub fn other() -> TemplateDefinition {
    TemplateDefinition::new(MessageTopic::Other, CompletenessRule::Always, Vec::new())
}

/// Thanks, goodbyes and other pleasantries
pub fn thanks() -> TemplateDefinition {
    TemplateDefinition::new(MessageTopic::Thanks, CompletenessRule::Always, Vec::new())
}
