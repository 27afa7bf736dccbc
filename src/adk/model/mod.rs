// SPDX-License-Identifier: MIT

//! Model module - defines the LLM model trait and shared types
//!
//! This module provides the core Model trait and the native request/response
//! shapes. Backend implementations live in their own submodules:
//! - [bedrock] - Anthropic Claude models served through Amazon Bedrock

pub mod bedrock;

use crate::adk::error::AdkError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub system_instruction: Option<SystemInstruction>,
}

/// System instruction as accepted from the host, in any of its three shapes:
/// a bare string, a single part, or a full content object with ordered parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemInstruction {
    Text(String),
    Part { text: String },
    Content { parts: Vec<InstructionPart> },
}

/// One part of a [SystemInstruction::Content]; parts without text are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionPart {
    pub text: Option<String>,
}

impl SystemInstruction {
    /// Flatten to a single instruction string. Parts without text are
    /// dropped; remaining texts are joined with newlines. Returns None when
    /// nothing textual is left.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Self::Text(t) => t.clone(),
            Self::Part { text } => text.clone(),
            Self::Content { parts } => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// A model turn holding a single text part
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// Parts of a message - text or inline binary media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Inline media carried as base64 (images, PDFs, ...)
    InlineData { mime_type: String, data: String },
}

/// Why generation stopped, in the host interface's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Other,
}

/// Token accounting attached to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_tokens: u32,
    pub candidate_tokens: u32,
    pub total_tokens: u32,
}

/// Native response shape, independent of any particular backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: Content,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<UsageMetadata>,
    /// The model label the caller asked for, echoed back for correlation
    pub model: String,
}

impl GenerateResponse {
    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Result of a token-count request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    pub total_tokens: u32,
}

/// Finite, single-pass sequence of partial responses. Each element becomes
/// available as the corresponding transport frame arrives; dropping the
/// stream early closes the underlying connection.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<GenerateResponse, AdkError>> + Send>>;

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Generate a complete response for the conversation.
    ///
    /// `prompt_id` is an opaque caller-supplied correlation id; it only ever
    /// shows up in log lines.
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        prompt_id: &str,
    ) -> Result<GenerateResponse, AdkError>;

    /// Generate a response as a lazy sequence of partial responses.
    async fn generate_content_stream(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        prompt_id: &str,
    ) -> Result<ContentStream, AdkError>;

    /// Count (or estimate) the tokens the conversation would consume.
    async fn count_tokens(&self, history: &[Content]) -> Result<CountTokensResponse, AdkError>;

    /// Embed the given texts. Backends without embedding support return
    /// [AdkError::Unsupported].
    async fn embed_content(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_instruction_from_string() {
        let si = SystemInstruction::Text("Be brief".to_string());
        assert_eq!(si.as_text(), Some("Be brief".to_string()));
    }

    #[test]
    fn test_system_instruction_from_part() {
        let si = SystemInstruction::Part {
            text: "Be brief".to_string(),
        };
        assert_eq!(si.as_text(), Some("Be brief".to_string()));
    }

    #[test]
    fn test_system_instruction_joins_parts_with_newline() {
        let si = SystemInstruction::Content {
            parts: vec![
                InstructionPart {
                    text: Some("First".to_string()),
                },
                InstructionPart { text: None },
                InstructionPart {
                    text: Some("Second".to_string()),
                },
            ],
        };
        assert_eq!(si.as_text(), Some("First\nSecond".to_string()));
    }

    #[test]
    fn test_system_instruction_empty_is_none() {
        let si = SystemInstruction::Content { parts: vec![] };
        assert_eq!(si.as_text(), None);
    }

    #[test]
    fn test_system_instruction_deserializes_all_shapes() {
        let from_string: SystemInstruction = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(from_string.as_text(), Some("hi".to_string()));

        let from_part: SystemInstruction = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(from_part.as_text(), Some("hi".to_string()));

        let from_parts: SystemInstruction =
            serde_json::from_str(r#"{"parts":[{"text":"a"},{"text":null},{"text":"b"}]}"#).unwrap();
        assert_eq!(from_parts.as_text(), Some("a\nb".to_string()));
    }

    #[test]
    fn test_response_text_concatenates_text_parts() {
        let resp = GenerateResponse {
            content: Content {
                role: "model".to_string(),
                parts: vec![
                    Part::Text("Hello,".to_string()),
                    Part::InlineData {
                        mime_type: "image/png".to_string(),
                        data: "aWdub3JlZA==".to_string(),
                    },
                    Part::Text(" world".to_string()),
                ],
            },
            finish_reason: Some(FinishReason::Stop),
            usage: None,
            model: "sonnet".to_string(),
        };
        assert_eq!(resp.text(), "Hello, world");
    }
}
