use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::storyboard::settings::Quality;
use crate::utils::retry::{with_retry, RetryPolicy};

/// Which storyboard step issued a model request. Used for model routing,
/// timing logs and test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    IdentityAnalysis,
    SceneScript,
    BulkSuggestion,
    SingleSuggestion,
    Render,
}

impl RequestKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestKind::IdentityAnalysis => "identity_analysis",
            RequestKind::SceneScript => "scene_script",
            RequestKind::BulkSuggestion => "bulk_suggestion",
            RequestKind::SingleSuggestion => "single_suggestion",
            RequestKind::Render => "render",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineImage { mime_type: String, data: Arc<[u8]> },
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Part::Text(value.into())
    }

    pub fn image(mime_type: impl Into<String>, data: Arc<[u8]>) -> Self {
        Part::InlineImage {
            mime_type: mime_type.into(),
            data,
        }
    }

    #[cfg(test)]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::InlineImage { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutput {
    pub quality: Quality,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub kind: RequestKind,
    pub parts: Vec<Part>,
    /// When set, the model must answer with JSON matching this schema.
    pub response_schema: Option<Value>,
    /// When set, the request asks for an image instead of text.
    pub image_output: Option<ImageOutput>,
}

impl ModelRequest {
    pub fn text(kind: RequestKind, parts: Vec<Part>) -> Self {
        Self {
            kind,
            parts,
            response_schema: None,
            image_output: None,
        }
    }

    pub fn json(kind: RequestKind, parts: Vec<Part>, schema: Value) -> Self {
        Self {
            kind,
            parts,
            response_schema: Some(schema),
            image_output: None,
        }
    }

    pub fn image(kind: RequestKind, parts: Vec<Part>, output: ImageOutput) -> Self {
        Self {
            kind,
            parts,
            response_schema: None,
            image_output: Some(output),
        }
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::InlineImage { .. }))
            .count()
    }

    #[cfg(test)]
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub images: Vec<InlineImage>,
}

#[cfg(test)]
impl ModelResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn from_image(image: InlineImage) -> Self {
        Self {
            text: String::new(),
            images: vec![image],
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("rate limited by model provider: {0}")]
    RateLimited(String),
    #[error("no usable API credential: {0}")]
    Credential(String),
    #[error("model request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model request could not be sent: {0}")]
    Transport(String),
    #[error("model response was malformed: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::RateLimited(_))
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}

/// Sends `request`, retrying only rate-limit errors under `policy`.
pub async fn generate_with_retry(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    request: &ModelRequest,
) -> Result<ModelResponse, ModelError> {
    with_retry(policy, request.kind.as_str(), ModelError::is_rate_limited, || {
        client.generate(request)
    })
    .await
}
