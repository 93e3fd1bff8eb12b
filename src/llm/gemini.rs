use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::{de::IgnoredAny, Deserialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::client::{
    ImageOutput, InlineImage, ModelClient, ModelError, ModelRequest, ModelResponse, Part,
    RequestKind,
};
use crate::llm::credentials::CredentialProvider;
use crate::storyboard::settings::Quality;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// Model names and request knobs, resolved once from `CONFIG`.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub image_hq_model: String,
    pub image_hq_size: String,
    pub safety_profile: String,
    pub request_timeout: Duration,
}

impl GeminiSettings {
    pub fn from_config() -> Self {
        Self {
            base_url: CONFIG.gemini_base_url.clone(),
            text_model: CONFIG.gemini_text_model.clone(),
            image_model: CONFIG.gemini_image_model.clone(),
            image_hq_model: CONFIG.gemini_image_hq_model.clone(),
            image_hq_size: CONFIG.gemini_image_hq_size.clone(),
            safety_profile: CONFIG.gemini_safety_settings.clone(),
            request_timeout: Duration::from_secs(CONFIG.gemini_request_timeout_secs),
        }
    }

    fn model_for(&self, request: &ModelRequest) -> &str {
        match &request.image_output {
            Some(output) if output.quality == Quality::High => &self.image_hq_model,
            Some(_) => &self.image_model,
            None => &self.text_model,
        }
    }
}

pub struct GeminiClient {
    settings: GeminiSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            settings,
            credentials,
        }
    }
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using standard thresholds.",
                profile
            );
            "BLOCK_MEDIUM_AND_ABOVE"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn build_image_config(output: &ImageOutput, hq_size: &str) -> Value {
    let mut map = Map::new();

    let aspect_ratio = output.aspect_ratio.trim();
    if !aspect_ratio.is_empty() {
        map.insert("aspectRatio".to_string(), json!(aspect_ratio));
    }

    if output.quality == Quality::High {
        let size = hq_size.trim();
        if !size.is_empty() {
            map.insert("imageSize".to_string(), json!(size));
        }
    }

    Value::Object(map)
}

fn build_gemini_parts(parts: &[Part]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineImage { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": general_purpose::STANDARD.encode(data),
                }
            }),
        })
        .collect()
}

fn build_payload(request: &ModelRequest, settings: &GeminiSettings) -> Value {
    let mut generation_config = Map::new();

    if let Some(schema) = &request.response_schema {
        generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }

    if let Some(output) = &request.image_output {
        generation_config.insert("responseModalities".to_string(), json!(["TEXT", "IMAGE"]));
        generation_config.insert(
            "imageConfig".to_string(),
            build_image_config(output, &settings.image_hq_size),
        );
    }

    let mut payload = json!({
        "contents": [{ "role": "user", "parts": build_gemini_parts(&request.parts) }],
        "safetySettings": build_safety_settings(&settings.safety_profile),
    });
    if !generation_config.is_empty() {
        if let Some(object) = payload.as_object_mut() {
            object.insert("generationConfig".to_string(), Value::Object(generation_config));
        }
    }
    payload
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        let mut config = config.clone();
        if let Some(object) = config.as_object_mut() {
            if object.remove("responseSchema").is_some() {
                object.insert("responseSchema".to_string(), json!("<schema>"));
            }
        }
        summary.insert("generationConfig".to_string(), config);
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in iter_parts(response) {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") {
                    image_parts += 1;
                }
            }
            GeminiPart::Other(_) => {}
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        let status = value
            .pointer("/error/status")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        return (message, status, truncate_for_log(&value.to_string(), 2000));
    }

    (None, None, truncate_for_log(trimmed, 2000))
}

/// Maps a non-success HTTP answer onto the error classes the retry policy
/// understands. Quota exhaustion is reported by Gemini both as 429 and as
/// `RESOURCE_EXHAUSTED` bodies on other statuses.
fn classify_api_error(status: StatusCode, body: &str) -> ModelError {
    let (message, api_status, body_summary) = summarize_error_body(body);
    let detail = message.unwrap_or(body_summary);
    let lowered = detail.to_lowercase();

    let quota_signal = api_status.as_deref() == Some("RESOURCE_EXHAUSTED")
        || lowered.contains("quota")
        || lowered.contains("resource_exhausted");
    if status == StatusCode::TOO_MANY_REQUESTS || quota_signal {
        return ModelError::RateLimited(format!("status {}: {}", status.as_u16(), detail));
    }

    let key_rejected = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("api key not valid")
        || lowered.contains("api_key_invalid");
    if key_rejected {
        return ModelError::Credential(format!("key rejected: {}", detail));
    }

    ModelError::Api {
        status: status.as_u16(),
        message: detail,
    }
}

fn iter_parts(response: &GeminiResponse) -> impl Iterator<Item = &GeminiPart> {
    response
        .candidates
        .iter()
        .flatten()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
}

fn extract_text_from_response(response: &GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for part in iter_parts(response) {
        if let GeminiPart::Text { text } = part {
            if !text.trim().is_empty() {
                text_parts.push(text.as_str());
            }
        }
    }
    text_parts.join("\n")
}

fn extract_images_from_response(response: &GeminiResponse) -> Vec<InlineImage> {
    let mut images = Vec::new();
    for part in iter_parts(response) {
        if let GeminiPart::InlineData { inline_data } = part {
            if !inline_data.mime_type.starts_with("image/") {
                continue;
            }
            match general_purpose::STANDARD.decode(&inline_data.data) {
                Ok(bytes) => images.push(InlineImage {
                    mime_type: inline_data.mime_type.clone(),
                    data: bytes,
                }),
                Err(err) => warn!("Dropping undecodable inline image from Gemini: {}", err),
            }
        }
    }
    images
}

fn redact_api_key(text: &str, key: &str) -> String {
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

async fn call_gemini_api(
    settings: &GeminiSettings,
    api_key: &str,
    model: &str,
    payload: &Value,
) -> Result<GeminiResponse, ModelError> {
    let client = get_http_client();
    let url = format!("{}/models/{}:generateContent", settings.base_url, model);

    if tracing::enabled!(tracing::Level::DEBUG) {
        let payload_summary = summarize_gemini_payload(payload);
        debug!(target: "llm.gemini", model = model, payload = %payload_summary);
    }

    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .timeout(settings.request_timeout)
        .json(payload)
        .send()
        .await
        .map_err(|err| {
            let err_text = redact_api_key(&err.to_string(), api_key);
            warn!(
                "Gemini request failed to send: {} (timeout={}, connect={})",
                err_text,
                err.is_timeout(),
                err.is_connect()
            );
            ModelError::Transport(err_text)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = classify_api_error(status, &body);
        warn!("Gemini API error: model={}, {}", model, error);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.gemini",
                status = %status,
                body = %truncate_for_log(&body, 4000)
            );
        }
        return Err(error);
    }

    let value = response
        .json::<GeminiResponse>()
        .await
        .map_err(|err| ModelError::Malformed(err.to_string()))?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        let response_summary = summarize_gemini_response(&value);
        debug!(target: "llm.gemini", model = model, response = %response_summary);
    }
    Ok(value)
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let api_key = self.credentials.api_key().ok_or_else(|| {
            ModelError::Credential(
                "set GEMINI_API_KEY or write a key to the configured key file".to_string(),
            )
        })?;

        let model = self.settings.model_for(request);
        let payload = build_payload(request, &self.settings);
        let metadata = json!({
            "parts": request.parts.len(),
            "images": request.image_count(),
            "structured": request.response_schema.is_some(),
        });

        let settings = &self.settings;
        let api_key = api_key.as_str();
        let payload = &payload;
        log_llm_timing("gemini", model, request.kind.as_str(), Some(metadata), move || async move {
            let response = call_gemini_api(settings, api_key, model, payload).await?;
            let images = if request.kind == RequestKind::Render {
                extract_images_from_response(&response)
            } else {
                Vec::new()
            };
            Ok::<_, ModelError>(ModelResponse {
                text: extract_text_from_response(&response),
                images,
            })
        })
        .await
    }
}
