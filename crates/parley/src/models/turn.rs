use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::content::Content;
use super::role::Role;
use super::tool::{ToolInvocation, ToolOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// The body of a persisted turn: plain text or structured blocks
pub enum TurnContent {
    Text(String),
    Blocks(Vec<Content>),
}

impl Default for TurnContent {
    fn default() -> Self {
        TurnContent::Text(String::new())
    }
}

impl TurnContent {
    /// The plain text of the content. Blocks contribute their text blocks only.
    pub fn to_text(&self) -> String {
        match self {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// The content as a single string, serializing structured blocks as JSON
    pub fn stringify(&self) -> String {
        match self {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Blocks(blocks) => serde_json::to_string(blocks).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TurnContent::Text(text) => text.trim().is_empty(),
            TurnContent::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl From<&str> for TurnContent {
    fn from(text: &str) -> Self {
        TurnContent::Text(text.to_string())
    }
}

impl From<String> for TurnContent {
    fn from(text: String) -> Self {
        TurnContent::Text(text)
    }
}

/// An image attached to a user turn. `data` holds raw base64 or a `data:` URI; `url` points
/// at a remote image. An attachment with neither is dropped during adaptation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ImageAttachment {
    pub fn base64<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        Self {
            data: Some(data.into()),
            mime_type: Some(mime_type.into()),
            url: None,
        }
    }

    pub fn url<S: Into<String>>(url: S) -> Self {
        Self {
            data: None,
            mime_type: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

impl Note {
    pub fn new<S: Into<String>, T: Into<String>>(title: S, content: T) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Attachments {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.notes.is_empty()
    }
}

/// One message in a thread, as owned by the conversation store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    pub role: Role,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Attachments>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Value>,
}

impl ConversationTurn {
    fn new(role: Role) -> Self {
        ConversationTurn {
            id: Uuid::new_v4().to_string(),
            role,
            content: TurnContent::default(),
            timestamp: Utc::now(),
            status: TurnStatus::Completed,
            attachments: None,
            tool_calls: None,
            tool_results: None,
            citations: None,
        }
    }

    /// Create a new user turn with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant turn with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a new system turn with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = TurnContent::Text(text.into());
        self
    }

    pub fn with_content(mut self, content: TurnContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_status(mut self, status: TurnStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// A turn with no text, no attachments and no tool activity
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.attachments.as_ref().map_or(true, Attachments::is_empty)
            && self.tool_calls.as_ref().map_or(true, Vec::is_empty)
    }
}

/// A partial update to a stored turn. Only the fields that are set are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnPatch {
    pub content: Option<TurnContent>,
    pub status: Option<TurnStatus>,
    pub tool_calls: Option<Vec<ToolInvocation>>,
    pub tool_results: Option<Vec<ToolOutcome>>,
    pub citations: Option<Value>,
}

impl TurnPatch {
    pub fn content<S: Into<String>>(text: S) -> Self {
        Self {
            content: Some(TurnContent::Text(text.into())),
            ..Default::default()
        }
    }

    pub fn status(status: TurnStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TurnStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn apply(self, turn: &mut ConversationTurn) {
        if let Some(content) = self.content {
            turn.content = content;
        }
        if let Some(status) = self.status {
            turn.status = status;
        }
        if let Some(tool_calls) = self.tool_calls {
            turn.tool_calls = Some(tool_calls);
        }
        if let Some(tool_results) = self.tool_results {
            turn.tool_results = Some(tool_results);
        }
        if let Some(citations) = self.citations {
            turn.citations = Some(citations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_content_roundtrips_both_shapes() {
        let text: TurnContent = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, TurnContent::Text("hello".to_string()));

        let blocks: TurnContent =
            serde_json::from_value(json!([{"type": "text", "text": "hi"}])).unwrap();
        assert_eq!(blocks, TurnContent::Blocks(vec![Content::text("hi")]));
        assert_eq!(blocks.to_text(), "hi");
        assert_eq!(blocks.stringify(), r#"[{"type":"text","text":"hi"}]"#);
    }

    #[test]
    fn test_whitespace_turn_is_empty() {
        assert!(ConversationTurn::user().with_text("  \n").is_empty());
        assert!(!ConversationTurn::user()
            .with_attachments(Attachments {
                images: vec![ImageAttachment::url("https://example.com/a.png")],
                notes: vec![],
            })
            .is_empty());
    }

    #[test]
    fn test_patch_only_overwrites_supplied_fields() {
        let mut turn = ConversationTurn::assistant()
            .with_text("partial")
            .with_status(TurnStatus::Processing);

        TurnPatch::status(TurnStatus::Cancelled).apply(&mut turn);
        assert_eq!(turn.content, TurnContent::from("partial"));
        assert_eq!(turn.status, TurnStatus::Cancelled);

        TurnPatch::content("final").apply(&mut turn);
        assert_eq!(turn.content.to_text(), "final");
        assert_eq!(turn.status, TurnStatus::Cancelled);
    }

    #[test]
    fn test_turn_serializes_camel_case() {
        let turn = ConversationTurn::user().with_id("m1").with_text("Hi");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Hi");
        assert_eq!(value["status"], "completed");
        assert!(value.get("toolCalls").is_none());
    }
}
