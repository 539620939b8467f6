use std::str::FromStr;

use super::profile::{ProviderKind, ProviderProfile};

/// Resolve a `{base_url, model, type}` triple from agent configuration to a profile.
///
/// An explicit, recognised `provider_type` wins. Otherwise the kind is inferred from the
/// base URL, and anything unrecognised is treated as OpenAI-compatible. No network calls.
pub fn resolve_profile(
    base_url: &str,
    model: &str,
    provider_type: Option<&str>,
) -> ProviderProfile {
    let kind = provider_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| {
            let parsed = ProviderKind::from_str(value).ok();
            if parsed.is_none() {
                tracing::debug!(
                    provider_type = value,
                    "unrecognised provider type, inferring from base url"
                );
            }
            parsed
        })
        .unwrap_or_else(|| infer_kind(base_url));

    ProviderProfile::for_kind(kind, model)
}

/// Guess the provider kind from its base URL
pub fn infer_kind(base_url: &str) -> ProviderKind {
    let url = base_url.trim().to_lowercase();

    if url.is_empty() || url.starts_with("local") || url.starts_with("in-process") {
        ProviderKind::Local
    } else if url.contains("anthropic") {
        ProviderKind::Anthropic
    } else if url.contains("generativelanguage.googleapis") || url.contains("gemini") {
        ProviderKind::Google
    } else if url.contains("perplexity") {
        ProviderKind::Perplexity
    } else if url.contains(":11434") || url.contains("ollama") {
        ProviderKind::Ollama
    } else {
        ProviderKind::OpenAi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::profile::ImageContentShape;

    #[test]
    fn test_explicit_type_wins() {
        let profile = resolve_profile(
            "https://api.openai.com",
            "claude-3-5-sonnet",
            Some("Anthropic"),
        );
        assert_eq!(profile.kind, ProviderKind::Anthropic);
        assert!(profile.requires_strict_alternation);
    }

    #[test]
    fn test_infers_from_base_url() {
        let cases = [
            ("https://api.anthropic.com", ProviderKind::Anthropic),
            ("https://generativelanguage.googleapis.com/v1beta", ProviderKind::Google),
            ("https://api.perplexity.ai", ProviderKind::Perplexity),
            ("http://localhost:11434", ProviderKind::Ollama),
            ("https://openrouter.ai/api/v1", ProviderKind::OpenAi),
            ("", ProviderKind::Local),
        ];
        for (url, expected) in cases {
            assert_eq!(infer_kind(url), expected, "{}", url);
        }
    }

    #[test]
    fn test_unknown_type_falls_back_to_inference() {
        let profile = resolve_profile("http://127.0.0.1:11434", "llava", Some("mystery"));
        assert_eq!(profile.kind, ProviderKind::Ollama);
        assert_eq!(profile.image_content_shape, ImageContentShape::OllamaList);
        assert!(profile.supports_multi_modal);
    }
}
