use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::CONFIG;

/// Source of the Gemini API key. Consulted before every dispatch so a key
/// written to the key file while the process runs is picked up.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        non_empty(&self.0)
    }
}

/// Reads a key from a plain text file, first non-empty line wins.
#[derive(Debug, Clone)]
pub struct KeyFileCredentials {
    path: PathBuf,
}

impl KeyFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for KeyFileCredentials {
    fn api_key(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents.lines().find_map(non_empty),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("API key file {} not present", self.path.display());
                None
            }
            Err(err) => {
                warn!("Failed to read API key file {}: {}", self.path.display(), err);
                None
            }
        }
    }
}

/// Tries each provider in order.
pub struct ChainedCredentials {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainedCredentials {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Key file first, then `GEMINI_API_KEY`.
    pub fn from_config() -> Self {
        Self::new(vec![
            Box::new(KeyFileCredentials::new(CONFIG.gemini_api_key_file.clone())),
            Box::new(StaticCredentials::new(CONFIG.gemini_api_key.clone())),
        ])
    }
}

impl CredentialProvider for ChainedCredentials {
    fn api_key(&self) -> Option<String> {
        self.providers.iter().find_map(|provider| provider.api_key())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
