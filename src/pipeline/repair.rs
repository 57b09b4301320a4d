//! AI-assisted validation: ask a language model to check and repair the SVG.
//!
//! The oracle is a trait so the orchestrator never knows which backend it
//! talks to. Two ship with the crate:
//!
//! * [`OpenRouterOracle`] posts an OpenAI-style chat-completions request
//!   (bearer credential, `response_format = json_object`) to a configurable
//!   endpoint, OpenRouter by default.
//! * [`ProviderOracle`] routes the same two messages through any
//!   `edgequake-llm` provider.
//!
//! [`RepairValidator`] owns everything around the call: the configuration
//! and input checks, and parsing the model's JSON verdict.

use crate::config::OracleConfig;
use crate::error::ValidationError;
use crate::prompts::REPAIR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A language model that answers a system + user message pair with text.
#[async_trait]
pub trait RepairOracle: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Return the model's raw reply text.
    ///
    /// # Errors
    /// [`ValidationError::UpstreamError`] when the model cannot be reached or
    /// answers with a non-2xx status, [`ValidationError::ResponseParseError`]
    /// when the transport envelope has no reply text.
    async fn complete(&self, system: &str, content: &str) -> Result<String, ValidationError>;
}

// ── OpenRouter ───────────────────────────────────────────────────────────────

/// Raw HTTP chat-completions client.
pub struct OpenRouterOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenRouterOracle {
    pub fn new(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self, ValidationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ValidationError::ConfigurationError {
                hint: format!("HTTP client could not be built: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, system: &str, content: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": content },
            ],
            "response_format": { "type": "json_object" },
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

impl fmt::Debug for OpenRouterOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterOracle")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RepairOracle for OpenRouterOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, content: &str) -> Result<String, ValidationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system, content))
            .send()
            .await
            .map_err(|e| ValidationError::UpstreamError {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Repair oracle answered HTTP {}", status.as_u16());
            return Err(ValidationError::UpstreamError {
                detail: status.as_u16().to_string(),
            });
        }

        let envelope: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ValidationError::ResponseParseError {
                    detail: format!("response body is not JSON: {e}"),
                })?;

        envelope
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ValidationError::ResponseParseError {
                detail: "missing choices[0].message.content".into(),
            })
    }
}

// ── edgequake-llm provider ───────────────────────────────────────────────────

/// Oracle backed by an `edgequake-llm` provider.
pub struct ProviderOracle {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OracleConfig) -> Self {
        Self {
            provider,
            label: config
                .provider_name
                .clone()
                .unwrap_or_else(|| "llm-provider".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build the named provider through [`ProviderFactory`].
    pub fn from_name(name: &str, config: &OracleConfig) -> Result<Self, ValidationError> {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            ValidationError::ConfigurationError {
                hint: format!("provider '{name}' could not be created: {e}"),
            }
        })?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl RepairOracle for ProviderOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, system: &str, content: &str) -> Result<String, ValidationError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(content)];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ValidationError::UpstreamError {
                detail: e.to_string(),
            })?;
        debug!(
            "Repair oracle used {} input / {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Verdict ──────────────────────────────────────────────────────────────────

/// The JSON object the model is asked to reply with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepairVerdict {
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, alias = "svg_content")]
    pub content: Option<String>,
    #[serde(default)]
    pub issues_found: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Result of a successful AI validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairReport {
    /// Repaired content when `fixed`, the original otherwise.
    pub content: String,
    pub fixed: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$").unwrap());

static ROOT_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<svg[\s>/]").unwrap());

/// Parse the model reply, unwrapping a Markdown code fence if present.
pub fn parse_verdict(raw: &str) -> Result<RepairVerdict, ValidationError> {
    let body = FENCE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str());
    serde_json::from_str(body.trim()).map_err(|e| ValidationError::ResponseParseError {
        detail: format!("reply is not the expected JSON object: {e}"),
    })
}

// ── Validator ────────────────────────────────────────────────────────────────

/// AI validation path.
pub struct RepairValidator {
    oracle: Result<Arc<dyn RepairOracle>, String>,
}

impl fmt::Debug for RepairValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepairValidator")
            .field(
                "oracle",
                &self.oracle.as_ref().map(|o| o.name().to_string()),
            )
            .finish()
    }
}

impl RepairValidator {
    pub fn new(oracle: Arc<dyn RepairOracle>) -> Self {
        Self { oracle: Ok(oracle) }
    }

    /// A validator whose every call fails with `ConfigurationError`.
    pub fn unconfigured(hint: impl Into<String>) -> Self {
        Self {
            oracle: Err(hint.into()),
        }
    }

    /// Pick the backend described by `config`.
    ///
    /// A named provider wins over the raw endpoint. Missing credentials do
    /// not fail here; they surface on the first call, so a pipeline that
    /// never takes the AI path does not need them.
    pub fn from_config(config: &OracleConfig) -> Self {
        if let Some(name) = &config.provider_name {
            return match ProviderOracle::from_name(name, config) {
                Ok(oracle) => Self::new(Arc::new(oracle)),
                Err(e) => {
                    warn!("AI repair disabled: {}", e);
                    Self::unconfigured(e.to_string())
                }
            };
        }
        match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => match OpenRouterOracle::new(config, key) {
                Ok(oracle) => Self::new(Arc::new(oracle)),
                Err(e) => Self::unconfigured(e.to_string()),
            },
            None => Self::unconfigured("OpenRouter API key not configured"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.oracle.is_ok()
    }

    /// Validate `content` through the oracle, possibly rewriting it.
    ///
    /// "Nothing to fix" is a success with `fixed == false` and the original
    /// content, even when the model omits the content field.
    pub async fn validate_and_repair(&self, content: &[u8]) -> Result<RepairReport, ValidationError> {
        let oracle = self
            .oracle
            .as_ref()
            .map_err(|hint| ValidationError::ConfigurationError { hint: hint.clone() })?;

        let original = std::str::from_utf8(content).map_err(|_| ValidationError::InvalidInput)?;
        if original.trim().is_empty() || !ROOT_MARKER_RE.is_match(original) {
            return Err(ValidationError::InvalidInput);
        }

        info!("AI validation via {} ({} bytes)", oracle.name(), content.len());
        let raw = oracle.complete(REPAIR_SYSTEM_PROMPT, original).await?;
        if raw.trim().is_empty() {
            return Err(ValidationError::ResponseParseError {
                detail: "empty reply".into(),
            });
        }
        let verdict = parse_verdict(&raw)?;

        let content = if verdict.fixed {
            verdict
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ValidationError::ResponseParseError {
                    detail: "reply marks the SVG as fixed but carries no content".into(),
                })?
        } else {
            original.to_string()
        };

        info!(
            "AI validation finished: fixed={}, {} issues, {} warnings",
            verdict.fixed,
            verdict.issues_found.len(),
            verdict.warnings.len()
        );
        Ok(RepairReport {
            content,
            fixed: verdict.fixed,
            issues: verdict.issues_found,
            warnings: verdict.warnings,
        })
    }
}
