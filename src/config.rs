use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;
use url::Url;

use crate::storyboard::settings::{AspectRatio, Quality};
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_api_key_file: PathBuf,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub gemini_image_hq_model: String,
    pub gemini_image_hq_size: String,
    pub gemini_safety_settings: String,
    pub gemini_request_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_attempts: usize,
    pub render_pacing_ms: u64,
    pub default_aspect_ratio: AspectRatio,
    pub default_quality: Quality,
    pub output_dir: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn normalize_base_url(value: String) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|err| anyhow!("Invalid GEMINI_BASE_URL '{trimmed}': {err}"))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(anyhow!(
            "GEMINI_BASE_URL must use http or https, got '{}'",
            parsed.scheme()
        ));
    }
    Ok(trimmed.to_string())
}

impl Config {
    pub fn load() -> Result<Self> {
        let default_aspect_ratio = {
            let raw = env_string("DEFAULT_ASPECT_RATIO", "16:9");
            AspectRatio::parse(&raw)
                .ok_or_else(|| anyhow!("Unsupported DEFAULT_ASPECT_RATIO value: {raw}"))?
        };
        let default_quality = {
            let raw = env_string("DEFAULT_QUALITY", "standard");
            Quality::parse(&raw).ok_or_else(|| anyhow!("Unsupported DEFAULT_QUALITY value: {raw}"))?
        };

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", "").trim().to_string(),
            gemini_api_key_file: PathBuf::from(env_string("GEMINI_API_KEY_FILE", ".gemini_api_key")),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ))?,
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-3-flash-preview"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_image_hq_model: env_string("GEMINI_IMAGE_HQ_MODEL", "gemini-3-pro-image-preview"),
            gemini_image_hq_size: env_string("GEMINI_IMAGE_HQ_SIZE", "2K"),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            gemini_request_timeout_secs: env_u64("GEMINI_REQUEST_TIMEOUT_SECS", 120).max(1),
            retry_base_delay_ms: env_u64("RETRY_BASE_DELAY_MS", 2000),
            retry_max_attempts: env_usize("RETRY_MAX_ATTEMPTS", 3),
            render_pacing_ms: env_u64("RENDER_PACING_MS", 1500),
            default_aspect_ratio,
            default_quality,
            output_dir: PathBuf::from(env_string("STORYBOARD_OUTPUT_DIR", "storyboard_out")),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_delay_ms),
            self.retry_max_attempts,
        )
    }

    pub fn render_pacing(&self) -> Duration {
        Duration::from_millis(self.render_pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_safety_profile_falls_back_to_standard() {
        assert_eq!(normalize_gemini_safety_settings("loose".to_string()), "standard");
        assert_eq!(normalize_gemini_safety_settings("OFF".to_string()), "permissive");
        assert_eq!(normalize_gemini_safety_settings(" ".to_string()), "standard");
    }

    #[test]
    fn base_url_is_trimmed_and_validated() {
        let url = normalize_base_url("https://example.test/v1beta/".to_string()).unwrap();
        assert_eq!(url, "https://example.test/v1beta");
        assert!(normalize_base_url("not a url".to_string()).is_err());
        assert!(normalize_base_url("ftp://example.test".to_string()).is_err());
    }
}
