pub mod client;
pub mod credentials;
pub mod gemini;
pub mod media;
#[cfg(test)]
pub mod testing;

pub use client::{
    generate_with_retry, ImageOutput, ModelClient, ModelError, ModelRequest, Part, RequestKind,
};
#[cfg(test)]
pub use client::{InlineImage, ModelResponse};
pub use credentials::ChainedCredentials;
pub use gemini::{GeminiClient, GeminiSettings};
