//! Arbiter backed by the Gemini `generateContent` REST endpoint.
//!
//! The request pins a JSON response schema (`best_match_id`, `confidence`,
//! `reasoning`) so the reply can be decoded without free-text parsing.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use vdmatch_core::config::ArbiterConfig;

use super::{Arbiter, ArbiterError, ArbiterRequest, ArbiterVerdict};

/// Structured decision the model is asked to return.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchDecision {
    pub best_match_id: String,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for one configured model.
pub struct GeminiArbiter {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    temperature: f32,
}

impl std::fmt::Debug for GeminiArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiArbiter")
            .field("url", &self.url)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl GeminiArbiter {
    #[must_use]
    pub fn new(config: &ArbiterConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vdmatch/", env!("CARGO_PKG_VERSION")))
            .build();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        Self {
            agent,
            url,
            api_key,
            temperature: config.temperature,
        }
    }

    /// Build a client with the key read from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`ArbiterError::MissingApiKey`] if the variable is unset or blank.
    pub fn from_config(config: &ArbiterConfig) -> Result<Self, ArbiterError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ArbiterError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(config, key))
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "best_match_id": { "type": "STRING" },
                        "confidence": { "type": "STRING" },
                        "reasoning": { "type": "STRING" }
                    },
                    "required": ["best_match_id"]
                }
            }
        })
    }
}

impl Arbiter for GeminiArbiter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn judge(&self, request: &ArbiterRequest<'_>) -> Result<ArbiterVerdict, ArbiterError> {
        let body = self.request_body(&request.prompt());
        let response = self
            .agent
            .post(&self.url)
            .set("x-goog-api-key", &self.api_key)
            .send_json(body)
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => ArbiterError::Status {
                    status,
                    body: response.into_string().unwrap_or_default(),
                },
                ureq::Error::Transport(transport) => ArbiterError::Transport(transport.to_string()),
            })?;

        let text = response
            .into_string()
            .map_err(|err| ArbiterError::Transport(format!("reading response body: {err}")))?;
        let decision = parse_decision(&text)?;
        tracing::debug!(
            pick = %decision.best_match_id,
            confidence = decision.confidence.as_deref().unwrap_or("-"),
            reasoning = decision.reasoning.as_deref().unwrap_or("-"),
            "arbiter replied"
        );
        Ok(ArbiterVerdict::from_reply(&decision.best_match_id))
    }
}

/// Decode a `generateContent` response body into the model's decision.
///
/// # Errors
///
/// Returns [`ArbiterError::MalformedResponse`] if the envelope carries no
/// text or the text is not a decision object.
pub fn parse_decision(body: &str) -> Result<MatchDecision, ArbiterError> {
    let envelope: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| ArbiterError::MalformedResponse(format!("envelope: {err}")))?;

    let text: String = envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ArbiterError::MalformedResponse("no text in reply".to_string()));
    }

    serde_json::from_str(text.trim())
        .map_err(|err| ArbiterError::MalformedResponse(format!("decision: {err}")))
}
