use super::{join_parts, AdaptedContent, AdaptedTurn};
use crate::models::role::Role;

const EMPTY_CONVERSATION: &str = "Please respond.";
const LEADING_USER: &str = "Please continue with the conversation.";
const GAP_USER: &str = "Continue.";
const TRAILING_USER: &str = "Please provide your response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    User,
    Assistant,
}

/// Rewrite non-system turns so they alternate user/assistant and end on a user turn.
///
/// Total over any input: it never fails, it only merges turns and inserts filler.
/// Input that already alternates and ends on a user turn comes back unchanged.
pub fn normalize(turns: Vec<AdaptedTurn>) -> Vec<AdaptedTurn> {
    let mut merged = merge_neighbors(turns);
    if merged.is_empty() {
        return vec![AdaptedTurn::user(EMPTY_CONVERSATION)];
    }

    let mut output = Vec::with_capacity(merged.len() + 2);
    match merged.iter().position(|turn| is_user(turn)) {
        Some(0) => {}
        Some(k) => {
            let folded: Vec<String> = merged[..k]
                .iter()
                .map(|turn| turn.content.to_text())
                .collect();
            let preamble = join_parts(folded.iter().map(String::as_str));
            let mut rest = merged.split_off(k);
            if !preamble.is_empty() {
                rest[0]
                    .content
                    .prepend_text(&format!("[Previous assistant response: {}]", preamble));
            }
            merged = rest;
        }
        None => output.push(AdaptedTurn::user(LEADING_USER)),
    }

    let mut expect = if output.is_empty() {
        Expect::User
    } else {
        Expect::Assistant
    };

    for turn in merged {
        match (expect, is_user(&turn)) {
            (Expect::User, true) => {
                output.push(turn);
                expect = Expect::Assistant;
            }
            (Expect::User, false) => {
                output.push(AdaptedTurn::user(GAP_USER));
                output.push(turn);
            }
            (Expect::Assistant, false) => {
                output.push(turn);
                expect = Expect::User;
            }
            (Expect::Assistant, true) => match output.pop() {
                Some(previous) => output.push(merge(previous, turn)),
                None => output.push(turn),
            },
        }
    }

    if output.last().map_or(true, |turn| !is_user(turn)) {
        output.push(AdaptedTurn::user(TRAILING_USER));
    }
    output
}

fn is_user(turn: &AdaptedTurn) -> bool {
    turn.role != Role::Assistant
}

/// Collapse runs of same-role turns into one turn each
pub fn merge_neighbors(turns: Vec<AdaptedTurn>) -> Vec<AdaptedTurn> {
    let mut merged: Vec<AdaptedTurn> = Vec::with_capacity(turns.len());
    for turn in turns {
        match merged.last() {
            Some(previous) if is_user(previous) == is_user(&turn) => {
                if let Some(previous) = merged.pop() {
                    merged.push(merge(previous, turn));
                }
            }
            _ => merged.push(turn),
        }
    }
    merged
}

/// Join two turns' text with a blank line. Non-string content is stringified first.
fn merge(first: AdaptedTurn, second: AdaptedTurn) -> AdaptedTurn {
    let text = join_parts([
        first.content.stringify().as_str(),
        second.content.stringify().as_str(),
    ]);

    let images = match (first.images, second.images) {
        (None, None) => None,
        (a, b) => Some(a.into_iter().chain(b).flatten().collect()),
    };

    AdaptedTurn {
        role: first.role,
        content: AdaptedContent::Text(text),
        images,
    }
}
