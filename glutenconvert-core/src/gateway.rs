//! Inference gateway
//!
//! The single seam between the chat machinery and the external AI service.
//! Responses cross this boundary only after being validated into a tagged
//! [`InferenceReply`]; nothing downstream ever sees a raw payload.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::{Error, Result};
use crate::types::ChatMode;

/// A single request forwarded to the inference service
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    /// The user's message text (or a scan instruction for image requests)
    pub text: String,
    /// Mode the request was made under
    pub mode: ChatMode,
    /// Resolved serving size, when the recipe-creator sub-dialog set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<u32>,
    /// Base64-encoded image payload for label scans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl InferenceRequest {
    pub fn new(text: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            text: text.into(),
            mode,
            serving_size: None,
            image: None,
        }
    }

    pub fn with_serving_size(mut self, n: u32) -> Self {
        self.serving_size = Some(n);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Validated response from the inference service.
///
/// Conversion-shaped responses carry the converted recipe body separately from
/// the conversational summary so the log can attach it to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceReply {
    /// Plain conversational reply
    Text(String),
    /// Reply plus a converted recipe body
    ConvertedRecipe { summary: String, recipe: String },
}

impl InferenceReply {
    /// The conversational text of the reply, whichever shape it has
    pub fn text(&self) -> &str {
        match self {
            InferenceReply::Text(t) => t,
            InferenceReply::ConvertedRecipe { summary, .. } => summary,
        }
    }

    /// The converted recipe body, if this reply carries one
    pub fn recipe(&self) -> Option<&str> {
        match self {
            InferenceReply::Text(_) => None,
            InferenceReply::ConvertedRecipe { recipe, .. } => Some(recipe),
        }
    }
}

/// Interface the chat controller and job worker dispatch through.
///
/// Implemented by [`HttpInferenceGateway`] in production and by scripted
/// fakes in tests.
pub trait InferenceGateway {
    fn send(
        &self,
        request: InferenceRequest,
    ) -> impl std::future::Future<Output = Result<InferenceReply>> + Send;
}

/// Raw wire shape of a service response, before validation
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default, rename = "convertedRecipe")]
    converted_recipe: Option<String>,
}

/// HTTP gateway to the inference service
pub struct HttpInferenceGateway {
    config: InferenceConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpInferenceGateway {
    /// Create a gateway from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("inference.endpoint is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = config.resolved_api_key() {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    async fn post_chat(&self, request: &InferenceRequest) -> Result<InferenceReply> {
        let url = format!("{}/chat", self.base_url);

        let body = ChatRequestBody {
            model: &self.config.model,
            message: &request.text,
            mode: request.mode.as_str(),
            serving_size: request.serving_size,
            image: request.image.as_deref(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let wire: WireResponse = response
                .json()
                .await
                .map_err(|e| Error::Inference(format!("failed to parse response: {}", e)))?;
            validate_reply(wire)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Inference(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

impl InferenceGateway for HttpInferenceGateway {
    async fn send(&self, request: InferenceRequest) -> Result<InferenceReply> {
        self.post_chat(&request).await
    }
}

/// Request body for POST /chat
#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    message: &'a str,
    mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    serving_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

/// Validate a wire payload into a tagged reply.
///
/// An empty or absent response text is a gateway error, never an empty chat
/// message. A converted-recipe field with no usable body degrades to a plain
/// text reply.
fn validate_reply(wire: WireResponse) -> Result<InferenceReply> {
    let text = wire
        .response
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Inference("response payload has no text".to_string()))?;

    match wire.converted_recipe.map(|s| s.trim().to_string()) {
        Some(recipe) if !recipe.is_empty() => Ok(InferenceReply::ConvertedRecipe {
            summary: text,
            recipe,
        }),
        _ => Ok(InferenceReply::Text(text)),
    }
}

/// Check if an error is retryable (transient)
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Inference(msg) => {
            msg.contains("50") && (msg.contains("API error") || msg.contains("HTTP"))
                || msg.contains("timeout")
                || msg.contains("connection")
                || msg.contains("request failed")
        }
        _ => false,
    }
}
