//! Amazon Bedrock backend for an ADK-style content generation interface.
//!
//! The [adk::model::Model] trait is the host-facing contract: generate a
//! response (complete or streamed) from an ordered conversation, estimate
//! token counts, embed content. [adk::model::bedrock::BedrockModel] satisfies
//! it by translating conversations into the Anthropic messages schema that
//! Bedrock's `invoke` / `invoke-with-response-stream` endpoints speak, signing
//! requests with SigV4, and translating responses (including the eventstream
//! transport frames) back into the native shape.

pub mod adk;

pub use adk::error::AdkError;
pub use adk::model::bedrock::BedrockModel;
pub use adk::model::{Content, GenerationConfig, Model, Part};
