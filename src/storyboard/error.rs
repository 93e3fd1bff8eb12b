use crate::llm::ModelError;
use crate::storyboard::assets::AssetRole;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoryboardError {
    #[error("product identity analysis failed: {0}")]
    AnalysisFailure(String),
    #[error("scene script failed: {0}")]
    ScriptFailure(String),
    #[error("prompt suggestion failed: {0}")]
    SuggestionFailure(String),
    #[error("scene render failed: {0}")]
    RenderFailure(String),
    #[error("no usable API credential: {0}")]
    AuthFailure(String),
    #[error("missing required assets: {}", format_roles(.0))]
    MissingAssets(Vec<AssetRole>),
    #[error("scene {0} does not exist in the current storyboard")]
    UnknownScene(u32),
    #[error("scene {0} is already busy")]
    SceneBusy(u32),
    #[error("the creative brief is empty")]
    EmptyBrief,
    #[error("failed to export scene image: {0}")]
    Export(String),
}

fn format_roles(roles: &[AssetRole]) -> String {
    roles
        .iter()
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoryboardError {
    /// Wraps a model error in the failure kind of the calling operation.
    /// Credential problems always surface as `AuthFailure`.
    pub fn from_model(kind: fn(String) -> StoryboardError, err: ModelError) -> Self {
        match err {
            ModelError::Credential(detail) => StoryboardError::AuthFailure(detail),
            other => kind(other.to_string()),
        }
    }
}
