//! Conversion of a stored conversation into the turn list a provider accepts.
//!
//! The adapter is a pure function over data: given the same history, profile and system
//! prompt it always produces the same output, so a history can be re-adapted across retries.

pub mod alternation;
pub mod format;

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::role::Role;
use crate::models::turn::ConversationTurn;
use crate::providers::profile::ProviderProfile;

/// The content of a provider-ready turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdaptedContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl AdaptedContent {
    /// Concatenated text of the content, ignoring non-text blocks
    pub fn to_text(&self) -> String {
        match self {
            AdaptedContent::Text(text) => text.clone(),
            AdaptedContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// The content as one string, serializing blocks as JSON
    pub fn stringify(&self) -> String {
        match self {
            AdaptedContent::Text(text) => text.clone(),
            AdaptedContent::Blocks(blocks) => serde_json::to_string(blocks).unwrap_or_default(),
        }
    }

    /// Put `prefix` in front of the text, separated by a blank line. Block content gets the
    /// prefix on its first text block, or a new leading text block when it has none.
    pub fn prepend_text(&mut self, prefix: &str) {
        match self {
            AdaptedContent::Text(text) => *text = join_parts([prefix, text.as_str()]),
            AdaptedContent::Blocks(blocks) => {
                let first_text = blocks
                    .iter_mut()
                    .find_map(|block| block.get_mut("text").filter(|text| text.is_string()));
                match first_text {
                    Some(text) => {
                        let existing = text.as_str().unwrap_or_default().to_string();
                        *text = Value::String(join_parts([prefix, existing.as_str()]));
                    }
                    None => blocks.insert(0, text_block(prefix)),
                }
            }
        }
    }

    /// Put `suffix` after the text, separated by a blank line. Block content keeps its blocks
    /// and gets `suffix` as a trailing text block.
    pub fn append_text(&mut self, suffix: &str) {
        match self {
            AdaptedContent::Text(text) => *text = join_parts([text.as_str(), suffix]),
            AdaptedContent::Blocks(blocks) => blocks.push(text_block(suffix)),
        }
    }
}

/// A turn in the exact shape a provider SDK serializes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptedTurn {
    pub role: Role,
    pub content: AdaptedContent,
    /// Image URIs for providers that take images beside the text (Ollama)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl AdaptedTurn {
    pub fn new(role: Role, content: AdaptedContent) -> Self {
        Self {
            role,
            content,
            images: None,
        }
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, AdaptedContent::Text(text.into()))
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, AdaptedContent::Text(text.into()))
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System, AdaptedContent::Text(text.into()))
    }
}

pub(crate) fn text_block(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

/// Join the non-empty parts with blank lines
pub(crate) fn join_parts<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convert a stored conversation into provider-ready turns.
///
/// System turns collapse into one leading system turn (falling back to `system_prompt`).
/// Providers that require strict alternation get their remaining turns normalized so they
/// alternate user/assistant and end on a user turn.
pub fn adapt(
    history: &[ConversationTurn],
    profile: &ProviderProfile,
    system_prompt: &str,
) -> Vec<AdaptedTurn> {
    let last_index = history.len().saturating_sub(1);
    let mut system_parts = Vec::new();
    let mut turns = Vec::with_capacity(history.len() + 1);

    for (index, turn) in history.iter().enumerate() {
        let placeholder = index == last_index && turn.role == Role::Assistant;
        if turn.is_empty() && !placeholder {
            continue;
        }

        match turn.role {
            Role::System => system_parts.push(turn.content.to_text()),
            Role::User => turns.push(format::user_turn(turn, profile)),
            Role::Assistant => turns.push(AdaptedTurn::assistant(turn.content.to_text())),
        }
    }

    let mut system = join_parts(system_parts.iter().map(String::as_str));
    if system.is_empty() {
        system = system_prompt.trim().to_string();
    }

    if profile.requires_strict_alternation {
        turns = alternation::normalize(turns);
    }

    let mut adapted = Vec::with_capacity(turns.len() + 1);
    if !system.is_empty() {
        adapted.push(AdaptedTurn::system(system));
    }
    adapted.extend(turns);
    adapted
}

/// The turn list for a continuation round: the first round's turns, the assistant text it
/// produced (if any) and the follow-up turn carrying tool results.
///
/// Under strict alternation a follow-up that would sit next to the last user turn is appended
/// to that turn, so its images and other blocks reach the second round intact.
pub fn continuation_turns(
    adapted: &[AdaptedTurn],
    first_round_text: &str,
    follow_up: &str,
    profile: &ProviderProfile,
) -> Vec<AdaptedTurn> {
    let mut turns = adapted.to_vec();
    if !first_round_text.trim().is_empty() {
        turns.push(AdaptedTurn::assistant(first_round_text));
    }

    if profile.requires_strict_alternation {
        if let Some(last) = turns.last_mut().filter(|turn| turn.role == Role::User) {
            last.content.append_text(follow_up);
            return turns;
        }
    }
    turns.push(AdaptedTurn::user(follow_up));

    if !profile.requires_strict_alternation {
        return turns;
    }

    let split = turns
        .iter()
        .position(|turn| turn.role != Role::System)
        .unwrap_or(turns.len());
    let rest = turns.split_off(split);
    turns.extend(alternation::normalize(rest));
    turns
}
