//! Template building and slot filling
//!
//! Templates evolve across turns: an existing template is extended before
//! any new one is created, and a new template is only created for a Topic
//! token no template has claimed yet. Slots may bind tokens from any
//! message, so a later message can fill an earlier template's missing
//! role.

use crate::model::{
    hint, Conversation, Slot, Template, TemplateState, Token, TokenState, TokenType,
};
use crate::registry::{role, TemplateDefinition, TemplateRegistry};
use std::collections::BTreeSet;

/// Indices into `conversation.templates` touched by one builder run
#[derive(Debug, Default)]
pub(crate) struct BuildOutcome {
    pub created: Vec<usize>,
    pub updated: Vec<usize>,
}

/// Extend existing templates and create new ones from unclaimed Topic
/// tokens.
pub(crate) fn update_templates(
    conversation: &mut Conversation,
    registry: &TemplateRegistry,
) -> BuildOutcome {
    let Conversation {
        tokens, templates, ..
    } = conversation;
    let mut outcome = BuildOutcome::default();

    // topic tokens already claimed by a template
    let mut consumed: BTreeSet<usize> = templates
        .iter()
        .flat_map(|t| t.slots_for_role(role::TOPIC).filter_map(|s| s.bound_index()))
        .collect();

    // pass 1: extend existing templates
    for idx in 0..templates.len() {
        if templates[idx].state == TemplateState::Rejected {
            continue;
        }
        let topic = templates[idx].topic;
        let Some(def) = registry.definition_for(topic) else {
            tracing::warn!(topic = %topic, "No template definition for topic, skipping");
            continue;
        };

        let mut changed = absorb_topic_tokens(&mut templates[idx], tokens, &mut consumed);
        changed |= fill_open_roles(&mut templates[idx], def, tokens);
        if changed {
            outcome.updated.push(idx);
        }
    }

    // pass 2: new templates from unclaimed Topic tokens
    for (token_idx, token) in tokens.iter().enumerate() {
        if token.token_type != TokenType::Topic
            || token.state == TokenState::Rejected
            || consumed.contains(&token_idx)
        {
            continue;
        }
        let Some(topic) = token.value.as_topic() else {
            tracing::warn!(token = %token, "Topic token without topic value");
            continue;
        };
        let Some(def) = registry.definition_for(topic) else {
            tracing::warn!(topic = %topic, "No template definition for topic, skipping");
            continue;
        };

        let mut template = Template::new(topic);
        template.probability = token.confidence;
        if let Some(mut slot) = def.create_slot(role::TOPIC) {
            slot.token_index = token_idx as i32;
            template.slots.push(slot);
        }
        // required roles start out as unfilled slots so their inquiry
        // prompts are available to downstream consumers
        for role_name in def.roles() {
            if let Some(slot) = def.create_slot(role_name) {
                if slot.required {
                    template.slots.push(slot);
                }
            }
        }
        fill_open_roles(&mut template, def, tokens);

        consumed.insert(token_idx);
        templates.push(template);
        outcome.created.push(templates.len() - 1);
    }

    outcome
}

/// Claim unconsumed Topic tokens whose hierarchy reaches the template's
/// topic: a later `TravelTrain` classification extends an existing
/// `Travel` template instead of spawning a competitor.
fn absorb_topic_tokens(
    template: &mut Template,
    tokens: &[Token],
    consumed: &mut BTreeSet<usize>,
) -> bool {
    let mut changed = false;
    for (token_idx, token) in tokens.iter().enumerate() {
        if token.token_type != TokenType::Topic
            || token.state == TokenState::Rejected
            || consumed.contains(&token_idx)
        {
            continue;
        }
        let Some(topic) = token.value.as_topic() else {
            continue;
        };
        if !topic.hierarchy().contains(&template.topic) {
            continue;
        }
        let mut slot = Slot::new(role::TOPIC, Some(TokenType::Topic), true);
        slot.token_index = token_idx as i32;
        template.slots.push(slot);
        template.probability = template.probability.max(token.confidence);
        consumed.insert(token_idx);
        changed = true;
    }
    changed
}

/// Fill every role of the definition that has no filled slot yet, binding
/// the first eligible token in sequence order. Returns whether any slot
/// was filled.
fn fill_open_roles(template: &mut Template, def: &TemplateDefinition, tokens: &[Token]) -> bool {
    let mut changed = false;
    let mut bound: BTreeSet<usize> = template.bound_indices().collect();

    for role_name in def.roles() {
        if template.has_filled_role(role_name) {
            continue;
        }
        let Some(shape) = def.create_slot(role_name) else {
            continue;
        };
        let candidate = tokens.iter().enumerate().find(|(idx, token)| {
            !bound.contains(idx)
                && token.state != TokenState::Rejected
                && !token.has_hint(hint::NEGATED)
                && token_fits_role(role_name, shape.token_type, def, token)
        });
        if let Some((token_idx, _)) = candidate {
            // bind an existing unfilled slot in place, or add one
            if let Some(open) = template
                .slots
                .iter_mut()
                .find(|s| s.role == role_name && s.token_index < 0)
            {
                open.token_index = token_idx as i32;
            } else {
                let mut slot = shape;
                slot.token_index = token_idx as i32;
                template.slots.push(slot);
            }
            bound.insert(token_idx);
            changed = true;
        }
    }
    changed
}

/// Whether a token can fill a role. Typed roles require a type match plus
/// either a hint naming the role or an unambiguous type (no other role of
/// the definition wants the same type). Untyped roles accept extracted
/// keywords and terms.
fn token_fits_role(
    role_name: &str,
    expected: Option<TokenType>,
    def: &TemplateDefinition,
    token: &Token,
) -> bool {
    let Some(expected) = expected else {
        return matches!(token.token_type, TokenType::Keyword | TokenType::Term);
    };
    if token.token_type != expected {
        return false;
    }
    if token.has_hint(role_name) || hint_alias(role_name).is_some_and(|h| token.has_hint(h)) {
        return true;
    }
    // without a hint only an unambiguous type is safe to bind
    def.roles()
        .filter(|r| {
            def.create_slot(r)
                .is_some_and(|s| s.token_type == Some(expected))
        })
        .count()
        == 1
}

/// Roles whose rule-assigned hint is named differently than the role
fn hint_alias(role_name: &str) -> Option<&'static str> {
    match role_name {
        role::LOCATION => Some(hint::AT),
        role::DATE => Some(hint::INSTANT),
        _ => None,
    }
}
