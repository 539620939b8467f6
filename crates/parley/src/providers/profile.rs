use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The closed set of back-ends a profile can describe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    Perplexity,
    Local,
}

/// How a provider expects images inside a user turn
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageContentShape {
    /// `{"type": "image", "source_type": "base64", "mime_type": ..., "data": ...}`
    InlineBase64,
    /// `{"type": "image_url", "image_url": "<url or data uri>"}`
    ImageUrl,
    /// `{"type": "image", "source": {"type": "base64", "media_type": ..., "data": ...}}`
    AnthropicSource,
    /// Plain text content plus a flat `images` list on the turn
    OllamaList,
}

/// Static descriptor of what a back-end accepts. Selected once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    pub requires_strict_alternation: bool,
    pub supports_multi_modal: bool,
    pub image_content_shape: ImageContentShape,
    pub tool_binding_supported: bool,
}

const OLLAMA_VISION_MARKERS: &[&str] = &["llava", "vision", "bakllava", "moondream"];

impl ProviderProfile {
    /// The profile for a provider kind, refined by the model name where a provider's
    /// capabilities differ per model.
    pub fn for_kind(kind: ProviderKind, model: &str) -> Self {
        match kind {
            ProviderKind::OpenAi => Self {
                kind,
                requires_strict_alternation: false,
                supports_multi_modal: true,
                image_content_shape: ImageContentShape::ImageUrl,
                tool_binding_supported: true,
            },
            ProviderKind::Anthropic => Self {
                kind,
                requires_strict_alternation: true,
                supports_multi_modal: true,
                image_content_shape: ImageContentShape::AnthropicSource,
                tool_binding_supported: true,
            },
            ProviderKind::Google => Self {
                kind,
                requires_strict_alternation: true,
                supports_multi_modal: true,
                image_content_shape: ImageContentShape::InlineBase64,
                tool_binding_supported: true,
            },
            ProviderKind::Ollama => {
                let model = model.to_lowercase();
                Self {
                    kind,
                    requires_strict_alternation: false,
                    supports_multi_modal: OLLAMA_VISION_MARKERS
                        .iter()
                        .any(|marker| model.contains(marker)),
                    image_content_shape: ImageContentShape::OllamaList,
                    tool_binding_supported: true,
                }
            }
            ProviderKind::Perplexity => Self {
                kind,
                requires_strict_alternation: true,
                supports_multi_modal: false,
                image_content_shape: ImageContentShape::ImageUrl,
                tool_binding_supported: false,
            },
            ProviderKind::Local => Self {
                kind,
                requires_strict_alternation: false,
                supports_multi_modal: false,
                image_content_shape: ImageContentShape::ImageUrl,
                tool_binding_supported: false,
            },
        }
    }
}
