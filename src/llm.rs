//! Transmission backends for finished payloads.
//!
//! The core only sees [`Transmitter`]: send text with a response budget and
//! get text back. Each backend is a thin blocking `reqwest` client. Every
//! failure (network, auth, bad status, unexpected shape) comes back as a
//! [`TransmissionError`]. Timeouts are enforced here, not by the caller.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::budgeter::estimate_tokens;
use crate::infra::config::LlmConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_MODEL: &str = "claude-3-opus-20240229";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MISTRAL_URL: &str = "https://api.mistral.ai/v1/chat/completions";
const MISTRAL_MODEL: &str = "mistral-large-latest";
const TEMPERATURE: f32 = 0.7;
const TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`TransmissionError::Status`]
const MAX_ERROR_BODY: usize = 400;

/// Failure reported by a transmission backend
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError
{
    #[error("{0} client is not configured")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {code}: {body}")]
    Status
    {
        code: u16,
        body: String,
    },

    #[error("invalid response: {0}")]
    Format(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outbound capability that turns a payload into a reply
pub trait Transmitter: Send
{
    /// Short backend name for logs and errors
    fn name(&self) -> &str;

    /// Whether credentials/endpoint are present
    fn is_configured(&self) -> bool;

    /// Token estimate for budgeting against this backend
    fn estimate_tokens(
        &self,
        text: &str,
    ) -> usize
    {
        estimate_tokens(text)
    }

    /// Send `text` and return the reply, asking for at most `max_tokens`
    fn send(
        &self,
        text: &str,
        max_tokens: usize,
    ) -> Result<String, TransmissionError>;
}

/// Which remote service to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Backend
{
    #[default]
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,

    #[serde(rename = "anthropic")]
    Anthropic,

    #[serde(rename = "mistral")]
    Mistral,

    #[serde(rename = "mistral-self-hosted")]
    MistralSelfHosted,
}

/// Build the transmitter selected by configuration
pub fn build_transmitter(cfg: &LlmConfig) -> Result<Box<dyn Transmitter>, TransmissionError>
{
    let t: Box<dyn Transmitter> = match cfg.backend
    {
        Backend::OpenAi => Box::new(ChatCompletionsClient::new(
            "openai",
            OPENAI_URL.to_string(),
            OPENAI_MODEL,
            Some(cfg.api_key.clone()),
        )?),
        Backend::Mistral => Box::new(ChatCompletionsClient::new(
            "mistral",
            MISTRAL_URL.to_string(),
            MISTRAL_MODEL,
            Some(cfg.api_key.clone()),
        )?),
        Backend::MistralSelfHosted => Box::new(ChatCompletionsClient::new(
            "mistral-self-hosted",
            self_hosted_url(&cfg.mistral_endpoint, cfg.mistral_ssl),
            MISTRAL_MODEL,
            None,
        )?),
        Backend::Anthropic => Box::new(AnthropicClient::new(cfg.api_key.clone())?),
    };
    Ok(t)
}

/// Full chat-completions URL for a self-hosted endpoint (`host:port[/path]`)
pub fn self_hosted_url(
    endpoint: &str,
    ssl: bool,
) -> String
{
    let endpoint = endpoint
        .trim()
        .trim_end_matches('/');
    if endpoint.is_empty()
    {
        return String::new();
    }

    let base = if endpoint.contains("://")
    {
        endpoint.to_string()
    }
    else
    {
        let scheme = if ssl { "https" } else { "http" };
        format!("{scheme}://{endpoint}")
    };

    if base.ends_with("/chat/completions")
    {
        base
    }
    else
    {
        format!("{base}/v1/chat/completions")
    }
}

fn http_client() -> Result<Client, TransmissionError>
{
    Ok(Client::builder()
        .connect_timeout(TIMEOUT)
        .timeout(TIMEOUT)
        .build()?)
}

/// Send a request and decode a JSON body, mapping non-2xx to `Status`
fn execute<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, TransmissionError>
{
    let resp = req.send()?;
    let status = resp.status();
    let body = resp.text()?;

    if !status.is_success()
    {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY
        {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(TransmissionError::Status {
            code: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// OpenAI-compatible `/chat/completions` client (OpenAI, Mistral, self-hosted)
pub struct ChatCompletionsClient
{
    name: &'static str,
    url: String,
    model: &'static str,

    /// `None` for endpoints that take no credential
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse
{
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice
{
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage
{
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient
{
    pub fn new(
        name: &'static str,
        url: String,
        model: &'static str,
        api_key: Option<String>,
    ) -> Result<Self, TransmissionError>
    {
        Ok(Self {
            name,
            url,
            model,
            api_key,
            client: http_client()?,
        })
    }

    #[cfg(test)]
    fn url(&self) -> &str
    {
        &self.url
    }
}

fn chat_content(resp: ChatResponse) -> Result<String, TransmissionError>
{
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| {
            c.message
                .content
        })
        .ok_or_else(|| TransmissionError::Format("no choices in response".into()))
}

impl Transmitter for ChatCompletionsClient
{
    fn name(&self) -> &str
    {
        self.name
    }

    fn is_configured(&self) -> bool
    {
        match &self.api_key
        {
            Some(key) => !key
                .trim()
                .is_empty(),
            None => !self
                .url
                .is_empty(),
        }
    }

    #[instrument(skip_all, fields(backend = self.name, chars = text.len(), max_tokens = max_tokens))]
    fn send(
        &self,
        text: &str,
        max_tokens: usize,
    ) -> Result<String, TransmissionError>
    {
        if !self.is_configured()
        {
            return Err(TransmissionError::NotConfigured(self.name.to_string()));
        }

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": text }],
            "max_tokens": max_tokens,
            "temperature": TEMPERATURE,
        });

        let mut req = self
            .client
            .post(&self.url)
            .json(&body);
        if let Some(key) = &self.api_key
        {
            req = req.bearer_auth(key);
        }

        let resp: ChatResponse = execute(req)?;
        let reply = chat_content(resp)?;
        debug!(reply_chars = reply.len(), "reply received");
        Ok(reply)
    }
}

/// Anthropic Messages API client
pub struct AnthropicClient
{
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse
{
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock
{
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient
{
    pub fn new(api_key: String) -> Result<Self, TransmissionError>
    {
        Ok(Self {
            api_key,
            client: http_client()?,
        })
    }
}

fn messages_content(resp: MessagesResponse) -> Result<String, TransmissionError>
{
    let text: Vec<String> = resp
        .content
        .into_iter()
        .filter_map(|b| b.text)
        .collect();

    if text.is_empty()
    {
        return Err(TransmissionError::Format("no text content in response".into()));
    }
    Ok(text.join(""))
}

impl Transmitter for AnthropicClient
{
    fn name(&self) -> &str
    {
        "anthropic"
    }

    fn is_configured(&self) -> bool
    {
        !self
            .api_key
            .trim()
            .is_empty()
    }

    #[instrument(skip_all, fields(backend = "anthropic", chars = text.len(), max_tokens = max_tokens))]
    fn send(
        &self,
        text: &str,
        max_tokens: usize,
    ) -> Result<String, TransmissionError>
    {
        if !self.is_configured()
        {
            return Err(TransmissionError::NotConfigured("anthropic".into()));
        }

        let body = json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": text }],
        });

        let req = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let resp: MessagesResponse = execute(req)?;
        let reply = messages_content(resp)?;
        debug!(reply_chars = reply.len(), "reply received");
        Ok(reply)
    }
}

/// Offline stand-in that reports what would have been sent
#[derive(Debug, Default, Clone)]
pub struct DryRun;

impl Transmitter for DryRun
{
    fn name(&self) -> &str
    {
        "dry-run"
    }

    fn is_configured(&self) -> bool
    {
        true
    }

    fn send(
        &self,
        text: &str,
        max_tokens: usize,
    ) -> Result<String, TransmissionError>
    {
        Ok(format!(
            "(dry run) would send {} chars (~{} tokens) with max_tokens={}",
            text.chars()
                .count(),
            self.estimate_tokens(text),
            max_tokens
        ))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_self_hosted_url_forms()
    {
        assert_eq!(
            self_hosted_url("localhost:8080", false),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            self_hosted_url("llm.internal/", true),
            "https://llm.internal/v1/chat/completions"
        );
        assert_eq!(
            self_hosted_url("http://box:9000/v1/chat/completions", true),
            "http://box:9000/v1/chat/completions"
        );
        assert_eq!(self_hosted_url("  ", false), "");
    }

    #[test]
    fn test_configuration_checks()
    {
        let keyed = ChatCompletionsClient::new("openai", OPENAI_URL.into(), OPENAI_MODEL, Some(" ".into())).unwrap();
        assert!(!keyed.is_configured());

        let hosted = ChatCompletionsClient::new("m", self_hosted_url("h:1", false), MISTRAL_MODEL, None).unwrap();
        assert!(hosted.is_configured());
        assert_eq!(hosted.url(), "http://h:1/v1/chat/completions");

        assert!(
            !AnthropicClient::new(String::new())
                .unwrap()
                .is_configured()
        );
    }

    #[test]
    fn test_unconfigured_send_fails_without_network()
    {
        let c = AnthropicClient::new(String::new()).unwrap();
        let err = c
            .send("hi", 10)
            .unwrap_err();
        assert!(matches!(err, TransmissionError::NotConfigured(_)));
    }

    #[test]
    fn test_response_shapes()
    {
        let ok: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#).unwrap();
        assert_eq!(chat_content(ok).unwrap(), "hello");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(chat_content(empty), Err(TransmissionError::Format(_))));

        let msg: MessagesResponse =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}"#).unwrap();
        assert_eq!(messages_content(msg).unwrap(), "ab");
    }

    #[test]
    fn test_dry_run_reports_payload_size()
    {
        let reply = DryRun
            .send(&"x".repeat(40), 8000)
            .unwrap();
        assert_eq!(reply, "(dry run) would send 40 chars (~10 tokens) with max_tokens=8000");
    }

    #[test]
    fn test_backend_names_round_trip_through_serde()
    {
        let b: Backend = serde_json::from_str("\"mistral-self-hosted\"").unwrap();
        assert_eq!(b, Backend::MistralSelfHosted);
        assert_eq!(serde_json::to_string(&Backend::OpenAi).unwrap(), "\"openai\"");
    }
}
