//! Bedrock Model - Anthropic Claude models served through Amazon Bedrock
//!
//! Translates the native conversation shape into the Anthropic messages
//! schema Bedrock's `invoke` / `invoke-with-response-stream` endpoints
//! accept, signs each request with SigV4, and translates complete responses
//! or eventstream transport frames back into native responses.

pub mod eventstream;
pub mod models;
pub mod sigv4;

use super::{
    Content, ContentStream, CountTokensResponse, FinishReason, GenerateResponse, GenerationConfig,
    Model, Part, UsageMetadata,
};
use crate::adk::error::AdkError;
use async_trait::async_trait;
use eventstream::{decode_event, FrameDecoder, StreamEvent};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sigv4::AwsCredentials;
use std::env;

pub use models::{is_bedrock_model_id, resolve_model, supported_models, DEFAULT_MODEL_ID};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_TOP_P: f32 = 1.0;

/// Bedrock-backed model implementation
pub struct BedrockModel {
    client: Client,
    credentials: AwsCredentials,
    region: String,
    model_id: String,
}

impl BedrockModel {
    /// Create a new BedrockModel from the execution environment.
    ///
    /// Requires `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`; honors
    /// `AWS_SESSION_TOKEN`, `AWS_REGION` / `AWS_DEFAULT_REGION` and the
    /// conventional proxy variables. `model_name` may be an interface-native
    /// name, an alias, or a canonical Bedrock id.
    pub fn new(model_name: &str) -> Result<Self, AdkError> {
        let credentials = AwsCredentials::from_env()?;
        let region = env::var("AWS_REGION")
            .or_else(|_| env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());
        Self::with_config(model_name, region, credentials, None)
    }

    /// Create a BedrockModel with explicit configuration. `proxy_url`
    /// overrides the proxy environment variables when given.
    pub fn with_config(
        model_name: &str,
        region: impl Into<String>,
        credentials: AwsCredentials,
        proxy_url: Option<&str>,
    ) -> Result<Self, AdkError> {
        Ok(Self {
            client: build_http_client(proxy_url)?,
            credentials,
            region: region.into(),
            model_id: resolve_model(model_name).to_string(),
        })
    }

    /// Canonical model id all calls route to
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Convert one conversation turn into an Anthropic message. Turns with a
    /// role the remote schema cannot represent are dropped (None), not
    /// rejected.
    ///
    /// Content is a plain string while the turn is text-only; the first media
    /// part switches it to block-array form, flushing text gathered so far as
    /// individual text blocks ahead of the media block. The remote schema
    /// requires exactly this asymmetry.
    fn content_to_message(content: &Content) -> Option<serde_json::Value> {
        let role = match content.role.as_str() {
            "user" => "user",
            "model" => "assistant",
            _ => return None,
        };

        let mut blocks: Vec<serde_json::Value> = Vec::new();
        let mut pending_text: Vec<&str> = Vec::new();
        let mut has_media = false;

        for part in &content.parts {
            match part {
                Part::Text(t) => pending_text.push(t),
                Part::InlineData { mime_type, data } => {
                    for t in pending_text.drain(..) {
                        blocks.push(json!({ "type": "text", "text": t }));
                    }
                    blocks.push(json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": mime_type,
                            "data": data,
                        }
                    }));
                    has_media = true;
                }
            }
        }

        let content_value = if has_media {
            for t in pending_text.drain(..) {
                blocks.push(json!({ "type": "text", "text": t }));
            }
            json!(blocks)
        } else {
            json!(pending_text.concat())
        };

        Some(json!({ "role": role, "content": content_value }))
    }

    /// Assemble the Anthropic-on-Bedrock request body. Numeric defaults apply
    /// only when the parameter is absent; an explicit zero survives.
    fn build_request_body(
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = history
            .iter()
            .filter_map(Self::content_to_message)
            .collect();

        let mut body = json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": config.and_then(|c| c.max_output_tokens).unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": config.and_then(|c| c.temperature).unwrap_or(DEFAULT_TEMPERATURE),
            "top_p": config.and_then(|c| c.top_p).unwrap_or(DEFAULT_TOP_P),
            "messages": messages,
        });

        if let Some(system) = config
            .and_then(|c| c.system_instruction.as_ref())
            .and_then(|s| s.as_text())
        {
            body["system"] = json!(system);
        }

        body
    }

    /// POST a signed request to the invoke endpoint, returning the raw
    /// response after the status check.
    async fn send_invoke(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, AdkError> {
        let operation = if streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        let encoded_model = urlencoding::encode(&self.model_id).into_owned();
        let path = format!("/model/{}/{}", encoded_model, operation);
        // SigV4 canonical paths are double-encoded for every service but S3
        let canonical_path = format!(
            "/model/{}/{}",
            urlencoding::encode(&encoded_model),
            operation
        );
        let host = format!("bedrock-runtime.{}.amazonaws.com", self.region);
        let url = format!("https://{}{}", host, path);
        let payload = serde_json::to_vec(body)?;

        let signed = sigv4::sign_request(
            &self.credentials,
            &self.region,
            "bedrock",
            "POST",
            &host,
            &canonical_path,
            "",
            "application/json",
            &payload,
            &sigv4::amz_timestamp(chrono::Utc::now()),
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization)
            .body(payload);
        if let Some(token) = &signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }
        if streaming {
            request = request.header("Accept", "application/vnd.amazon.eventstream");
        }

        let resp = request
            .send()
            .await
            .map_err(|e| AdkError::api("bedrock", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AdkError::api("bedrock", format!("{}: {}", status, text)));
        }
        Ok(resp)
    }
}

/// Map the remote stop reason onto the native vocabulary. Total by
/// construction: unrecognized values land on Other rather than erroring.
fn map_stop_reason(raw: Option<&str>) -> Option<FinishReason> {
    let raw = raw?;
    Some(match raw {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        _ => FinishReason::Other,
    })
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: Option<InvokeUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct InvokeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Aggregate a complete invoke response into the native shape. Non-text
/// blocks are ignored; total tokens are the exact sum of the reported counts.
fn response_from_invoke(resp: InvokeResponse, model: &str) -> GenerateResponse {
    let text: String = resp
        .content
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect();

    let usage = resp.usage.map(|u| UsageMetadata {
        prompt_tokens: u.input_tokens,
        candidate_tokens: u.output_tokens,
        total_tokens: u.input_tokens + u.output_tokens,
    });

    GenerateResponse {
        content: Content {
            role: "model".to_string(),
            parts: vec![Part::Text(text)],
        },
        finish_reason: map_stop_reason(resp.stop_reason.as_deref()),
        usage,
        model: model.to_string(),
    }
}

/// Translate a decoded generation-event sequence into native partial
/// responses: one incremental response per text delta, then a final empty
/// response carrying the finish reason and usage once the message stops.
///
/// The transport reports no running output-token count, so the candidate
/// figure is approximated by counting delta events. That is an event count,
/// not a tokenizer count; treat it accordingly.
pub fn native_stream<S>(events: S, model: String) -> ContentStream
where
    S: Stream<Item = Result<StreamEvent, AdkError>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        futures::pin_mut!(events);
        let mut input_tokens: u32 = 0;
        let mut delta_count: u32 = 0;

        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::MessageStart { message } => {
                    if let Some(usage) = message.and_then(|m| m.usage) {
                        input_tokens = usage.input_tokens.unwrap_or(0);
                    }
                }
                StreamEvent::ContentBlockDelta { delta } => {
                    delta_count += 1;
                    if let Some(text) = delta.and_then(|d| d.text) {
                        yield GenerateResponse {
                            content: Content {
                                role: "model".to_string(),
                                parts: vec![Part::Text(text)],
                            },
                            finish_reason: None,
                            usage: None,
                            model: model.clone(),
                        };
                    }
                }
                StreamEvent::MessageStop => {
                    yield GenerateResponse {
                        content: Content {
                            role: "model".to_string(),
                            parts: vec![Part::Text(String::new())],
                        },
                        finish_reason: Some(FinishReason::Stop),
                        usage: Some(UsageMetadata {
                            prompt_tokens: input_tokens,
                            candidate_tokens: delta_count,
                            total_tokens: input_tokens + delta_count,
                        }),
                        model: model.clone(),
                    };
                    break;
                }
                // content_block_start/stop, message_delta, unknown kinds
                _ => {}
            }
        }
    })
}

/// Decode the transport body into generation events as frames arrive
fn event_stream(resp: reqwest::Response) -> impl Stream<Item = Result<StreamEvent, AdkError>> {
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => decoder.extend(&bytes),
                Err(e) => {
                    yield Err(AdkError::api("bedrock", e.to_string()));
                    return;
                }
            }
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => match decode_event(frame) {
                        Ok(Some(event)) => yield Ok(event),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    }
}

/// Build the shared HTTP client, attaching a forwarding proxy when one is
/// configured explicitly or via the conventional environment variables.
/// A malformed proxy never fails construction; it degrades to no proxy with
/// a warning so the base feature stays available.
fn build_http_client(explicit_proxy: Option<&str>) -> Result<Client, AdkError> {
    let mut builder = Client::builder();

    if let Some(raw) = explicit_proxy.map(str::to_string).or_else(proxy_from_env) {
        match url::Url::parse(&raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                match reqwest::Proxy::all(raw.clone()) {
                    Ok(proxy) => {
                        log::debug!("routing Bedrock calls through proxy {}", raw);
                        builder = builder.proxy(proxy);
                    }
                    Err(e) => log::warn!("ignoring unusable proxy {}: {}", raw, e),
                }
            }
            Ok(parsed) => log::warn!(
                "ignoring proxy {} with unsupported scheme '{}'",
                raw,
                parsed.scheme()
            ),
            Err(e) => log::warn!("ignoring malformed proxy URL {}: {}", raw, e),
        }
    }

    Ok(builder.build()?)
}

fn proxy_from_env() -> Option<String> {
    ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"]
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
}

#[async_trait]
impl Model for BedrockModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        prompt_id: &str,
    ) -> Result<GenerateResponse, AdkError> {
        let body = Self::build_request_body(history, config);
        log::debug!(
            "bedrock generate_content prompt_id={} model={}",
            prompt_id,
            self.model_id
        );
        log::debug!(
            "bedrock request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self.send_invoke(&body, false).await?;
        let parsed: InvokeResponse = resp
            .json()
            .await
            .map_err(|e| AdkError::api("bedrock", format!("invalid response body: {}", e)))?;

        Ok(response_from_invoke(parsed, &self.model_id))
    }

    async fn generate_content_stream(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        prompt_id: &str,
    ) -> Result<ContentStream, AdkError> {
        let body = Self::build_request_body(history, config);
        log::debug!(
            "bedrock generate_content_stream prompt_id={} model={}",
            prompt_id,
            self.model_id
        );

        let resp = self.send_invoke(&body, true).await?;
        Ok(native_stream(event_stream(resp), self.model_id.clone()))
    }

    /// Bedrock exposes no counting endpoint for these models; this is the
    /// chars/4 estimate, nothing more.
    async fn count_tokens(&self, history: &[Content]) -> Result<CountTokensResponse, AdkError> {
        let chars: usize = history
            .iter()
            .flat_map(|c| &c.parts)
            .map(|p| match p {
                Part::Text(t) => t.chars().count(),
                Part::InlineData { .. } => 0,
            })
            .sum();

        Ok(CountTokensResponse {
            total_tokens: chars.div_ceil(4) as u32,
        })
    }

    async fn embed_content(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AdkError> {
        Err(AdkError::Unsupported(
            "embedding is not available through the Bedrock backend; use a dedicated embedding provider".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::SystemInstruction;

    #[test]
    fn test_text_only_turn_serializes_as_plain_string() {
        let content = Content {
            role: "user".to_string(),
            parts: vec![
                Part::Text("Hello ".to_string()),
                Part::Text("world".to_string()),
            ],
        };

        let msg = BedrockModel::content_to_message(&content).unwrap();
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello world");
    }

    #[test]
    fn test_media_switches_turn_to_block_array() {
        let content = Content {
            role: "user".to_string(),
            parts: vec![
                Part::Text("What is this?".to_string()),
                Part::InlineData {
                    mime_type: "image/png".to_string(),
                    data: "iVBORw0KGgo=".to_string(),
                },
            ],
        };

        let msg = BedrockModel::content_to_message(&content).unwrap();
        let blocks = msg["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "text");
        assert_eq!(blocks[0]["text"], "What is this?");
        assert_eq!(blocks[1]["type"], "image");
        assert_eq!(blocks[1]["source"]["media_type"], "image/png");
        assert_eq!(blocks[1]["source"]["data"], "iVBORw0KGgo=");
    }

    #[test]
    fn test_text_after_media_stays_in_block_form() {
        let content = Content {
            role: "user".to_string(),
            parts: vec![
                Part::Text("before".to_string()),
                Part::InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: "Zm9v".to_string(),
                },
                Part::Text("after".to_string()),
            ],
        };

        let msg = BedrockModel::content_to_message(&content).unwrap();
        let blocks = msg["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["text"], "before");
        assert_eq!(blocks[1]["type"], "image");
        assert_eq!(blocks[2]["text"], "after");
    }

    #[test]
    fn test_model_role_maps_to_assistant() {
        let content = Content::model("Sure.");
        let msg = BedrockModel::content_to_message(&content).unwrap();
        assert_eq!(msg["role"], "assistant");
    }

    // Policy, not an accident: unrepresentable roles are dropped silently.
    #[test]
    fn test_unknown_roles_are_dropped() {
        let content = Content {
            role: "system".to_string(),
            parts: vec![Part::Text("ignored".to_string())],
        };
        assert!(BedrockModel::content_to_message(&content).is_none());

        let body = BedrockModel::build_request_body(
            &[
                Content {
                    role: "tool".to_string(),
                    parts: vec![Part::Text("ignored".to_string())],
                },
                Content::user("kept"),
            ],
            None,
        );
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_defaults_apply_only_when_absent() {
        let body = BedrockModel::build_request_body(&[Content::user("hi")], None);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["anthropic_version"], ANTHROPIC_VERSION);
        assert!(body.get("system").is_none());

        let config = GenerationConfig {
            temperature: Some(0.0),
            max_output_tokens: Some(100),
            top_p: Some(0.5),
            system_instruction: None,
        };
        let body = BedrockModel::build_request_body(&[Content::user("hi")], Some(&config));
        // explicit zero survives
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["top_p"], 0.5);
    }

    #[test]
    fn test_system_instruction_lands_in_body() {
        let config = GenerationConfig {
            system_instruction: Some(SystemInstruction::Text("Be terse".to_string())),
            ..Default::default()
        };
        let body = BedrockModel::build_request_body(&[Content::user("hi")], Some(&config));
        assert_eq!(body["system"], "Be terse");
    }

    #[test]
    fn test_stop_reason_mapping_is_total() {
        assert_eq!(map_stop_reason(Some("end_turn")), Some(FinishReason::Stop));
        assert_eq!(
            map_stop_reason(Some("stop_sequence")),
            Some(FinishReason::Stop)
        );
        assert_eq!(
            map_stop_reason(Some("max_tokens")),
            Some(FinishReason::MaxTokens)
        );
        // never an error on values we have not seen before
        assert_eq!(
            map_stop_reason(Some("model_context_window_exceeded")),
            Some(FinishReason::Other)
        );
        assert_eq!(map_stop_reason(None), None);
    }

    #[test]
    fn test_response_from_invoke_aggregates_text_and_usage() {
        let parsed: InvokeResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "Hello, " },
                { "type": "tool_use", "id": "t1", "name": "x", "input": {} },
                { "type": "text", "text": "world" }
            ],
            "stop_reason": "max_tokens",
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        }))
        .unwrap();

        let resp = response_from_invoke(parsed, "test-model");
        assert_eq!(resp.text(), "Hello, world");
        assert_eq!(resp.finish_reason, Some(FinishReason::MaxTokens));
        let usage = resp.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.candidate_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(resp.model, "test-model");
    }

    #[test]
    fn test_http_client_survives_malformed_proxy() {
        assert!(build_http_client(Some("not a url")).is_ok());
        assert!(build_http_client(Some("socks5://host:1080")).is_ok());
        assert!(build_http_client(Some("http://127.0.0.1:8118")).is_ok());
    }
}
