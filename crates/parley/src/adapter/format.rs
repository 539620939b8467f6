use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::{join_parts, text_block, AdaptedContent, AdaptedTurn};
use crate::models::content::Content;
use crate::models::role::Role;
use crate::models::turn::{ConversationTurn, ImageAttachment, Note, TurnContent};
use crate::providers::profile::{ImageContentShape, ProviderProfile};

const DEFAULT_MIME_TYPE: &str = "image/png";

lazy_static! {
    static ref DATA_URI: Regex = Regex::new(r"^data:([^;,]+);base64,(.+)$").unwrap();
}

/// Where an image's bytes come from once an attachment has been validated
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Base64 { data: String, mime_type: String },
    Url(String),
}

impl ImageSource {
    /// A `data:` URI or the remote URL
    pub fn uri(&self) -> String {
        match self {
            ImageSource::Base64 { data, mime_type } => {
                format!("data:{};base64,{}", mime_type, data)
            }
            ImageSource::Url(url) => url.clone(),
        }
    }

    fn from_base64(data: &str, mime_type: Option<&str>) -> Option<Self> {
        let (mime_type, data) = match DATA_URI.captures(data.trim()) {
            Some(captures) => (captures[1].to_string(), captures[2].to_string()),
            None => (
                mime_type
                    .filter(|mime| !mime.is_empty())
                    .unwrap_or(DEFAULT_MIME_TYPE)
                    .to_string(),
                data.trim().to_string(),
            ),
        };

        if let Err(e) = STANDARD.decode(&data) {
            tracing::warn!(error = %e, "dropping image attachment with undecodable base64 data");
            return None;
        }
        Some(ImageSource::Base64 { data, mime_type })
    }

    /// Resolve an attachment, preferring inline data over a URL
    pub fn from_attachment(attachment: &ImageAttachment) -> Option<Self> {
        let data = attachment.data.as_deref().filter(|data| !data.trim().is_empty());
        let url = attachment.url.as_deref().filter(|url| !url.trim().is_empty());

        match (data, url) {
            (Some(data), _) => Self::from_base64(data, attachment.mime_type.as_deref()),
            (None, Some(url)) if url.starts_with("data:") => {
                Self::from_base64(url, attachment.mime_type.as_deref())
            }
            (None, Some(url)) => Some(ImageSource::Url(url.trim().to_string())),
            (None, None) => {
                tracing::warn!("dropping image attachment without data or url");
                None
            }
        }
    }
}

/// Convert an image to the block shape a provider expects. The Ollama shape has no block
/// form; its images travel as URIs beside the text.
pub fn image_block(image: &ImageSource, shape: ImageContentShape) -> Value {
    match (shape, image) {
        (ImageContentShape::InlineBase64, ImageSource::Base64 { data, mime_type }) => json!({
            "type": "image",
            "source_type": "base64",
            "mime_type": mime_type,
            "data": data,
        }),
        (ImageContentShape::InlineBase64, ImageSource::Url(url)) => json!({
            "type": "image",
            "source_type": "url",
            "url": url,
        }),
        (ImageContentShape::AnthropicSource, ImageSource::Base64 { data, mime_type }) => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data,
            }
        }),
        (ImageContentShape::AnthropicSource, ImageSource::Url(url)) => json!({
            "type": "image",
            "source": {
                "type": "url",
                "url": url,
            }
        }),
        (ImageContentShape::ImageUrl, image) | (ImageContentShape::OllamaList, image) => json!({
            "type": "image_url",
            "image_url": image.uri(),
        }),
    }
}

pub fn render_notes(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|note| format!("[Note: {}]\n{}", note.title, note.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shape a user turn: its text, attached notes and images in the provider's format
pub fn user_turn(turn: &ConversationTurn, profile: &ProviderProfile) -> AdaptedTurn {
    let mut images = Vec::new();
    let text = match &turn.content {
        TurnContent::Text(text) => text.clone(),
        TurnContent::Blocks(blocks) => {
            for (data, mime_type) in blocks.iter().filter_map(Content::as_image) {
                images.extend(ImageSource::from_base64(data, Some(mime_type)));
            }
            turn.content.to_text()
        }
    };

    let (notes, attachment_images) = match &turn.attachments {
        Some(attachments) => (render_notes(&attachments.notes), attachments.images.as_slice()),
        None => (String::new(), &[][..]),
    };
    images.extend(attachment_images.iter().filter_map(ImageSource::from_attachment));

    let text = join_parts([text.as_str(), notes.as_str()]);

    if images.is_empty() {
        return AdaptedTurn::new(Role::User, AdaptedContent::Text(text));
    }

    if !profile.supports_multi_modal {
        tracing::debug!(
            provider = %profile.kind,
            count = images.len(),
            "provider does not accept images, dropping them"
        );
        return AdaptedTurn::new(Role::User, AdaptedContent::Text(text));
    }

    if profile.image_content_shape == ImageContentShape::OllamaList {
        let mut adapted = AdaptedTurn::new(Role::User, AdaptedContent::Text(text));
        adapted.images = Some(images.iter().map(ImageSource::uri).collect());
        return adapted;
    }

    let mut blocks = Vec::with_capacity(images.len() + 1);
    if !text.is_empty() {
        blocks.push(text_block(&text));
    }
    blocks.extend(
        images
            .iter()
            .map(|image| image_block(image, profile.image_content_shape)),
    );
    AdaptedTurn::new(Role::User, AdaptedContent::Blocks(blocks))
}
