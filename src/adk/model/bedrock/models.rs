//! Model catalog - maps interface-native names and human aliases to the
//! canonical Bedrock model identifiers.
//!
//! Resolution is deliberately permissive: an unknown name falls back to
//! [DEFAULT_MODEL_ID] instead of erroring, so a typo in a model flag never
//! blocks a call.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const CLAUDE_SONNET_4: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";
pub const CLAUDE_OPUS_4: &str = "us.anthropic.claude-opus-4-20250514-v1:0";
pub const CLAUDE_35_SONNET: &str = "us.anthropic.claude-3-5-sonnet-20241022-v2:0";
pub const CLAUDE_37_SONNET: &str = "us.anthropic.claude-3-7-sonnet-20250219-v1:0";
pub const CLAUDE_35_HAIKU: &str = "us.anthropic.claude-3-5-haiku-20241022-v1:0";
pub const CLAUDE_3_OPUS: &str = "us.anthropic.claude-3-opus-20240229-v1:0";
pub const CLAUDE_3_HAIKU: &str = "us.anthropic.claude-3-haiku-20240307-v1:0";

/// Where unresolvable names land
pub const DEFAULT_MODEL_ID: &str = CLAUDE_35_SONNET;

/// Every canonical identifier this adapter will route to
const CANONICAL_MODELS: &[&str] = &[
    CLAUDE_SONNET_4,
    CLAUDE_OPUS_4,
    CLAUDE_35_SONNET,
    CLAUDE_37_SONNET,
    CLAUDE_35_HAIKU,
    CLAUDE_3_OPUS,
    CLAUDE_3_HAIKU,
];

/// Interface-native model names, matched exactly
static INTERFACE_MODELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gemini-2.5-pro", CLAUDE_37_SONNET),
        ("gemini-2.5-flash", CLAUDE_35_SONNET),
        ("gemini-2.5-flash-lite", CLAUDE_35_HAIKU),
        ("gemini-2.0-flash", CLAUDE_35_SONNET),
        ("gemini-2.0-flash-lite", CLAUDE_35_HAIKU),
        ("gemini-1.5-pro", CLAUDE_35_SONNET),
        ("gemini-1.5-flash", CLAUDE_3_HAIKU),
    ])
});

/// Short names and versioned variants, keyed by their normalized form
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("claudesonnet4", CLAUDE_SONNET_4),
        ("sonnet4", CLAUDE_SONNET_4),
        ("claudeopus4", CLAUDE_OPUS_4),
        ("opus4", CLAUDE_OPUS_4),
        ("sonnet", CLAUDE_35_SONNET),
        ("claude35sonnet", CLAUDE_35_SONNET),
        ("claude35sonnetv2", CLAUDE_35_SONNET),
        ("claude37sonnet", CLAUDE_37_SONNET),
        ("sonnet37", CLAUDE_37_SONNET),
        ("opus", CLAUDE_3_OPUS),
        ("claude3opus", CLAUDE_3_OPUS),
        ("haiku", CLAUDE_35_HAIKU),
        ("claude35haiku", CLAUDE_35_HAIKU),
        ("claude3haiku", CLAUDE_3_HAIKU),
    ])
});

/// Lower-case and strip separators so "claude-3.5-sonnet", "Claude_3.5_Sonnet"
/// and "claude35sonnet" all key the same alias entry.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | '.') && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Resolve an interface-native name, alias, or canonical id to a canonical
/// Bedrock model identifier. Never fails; unknown input degrades to
/// [DEFAULT_MODEL_ID].
pub fn resolve_model(name: &str) -> &'static str {
    if let Some(id) = INTERFACE_MODELS.get(name) {
        return id;
    }
    if let Some(id) = ALIASES.get(normalize(name).as_str()) {
        return id;
    }
    if let Some(id) = CANONICAL_MODELS.iter().copied().find(|id| *id == name) {
        return id;
    }
    log::debug!("unknown model name '{}', using default {}", name, DEFAULT_MODEL_ID);
    DEFAULT_MODEL_ID
}

/// True only for canonical Bedrock identifiers; aliases resolve but are not
/// themselves valid ids.
pub fn is_bedrock_model_id(candidate: &str) -> bool {
    CANONICAL_MODELS.contains(&candidate)
}

/// Canonical identifiers this adapter knows, for listing by external tooling
pub fn supported_models() -> impl Iterator<Item = &'static str> {
    CANONICAL_MODELS.iter().copied()
}
