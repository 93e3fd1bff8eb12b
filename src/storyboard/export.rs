use std::path::{Path, PathBuf};

use tracing::info;

use crate::llm::media::ensure_png;
use crate::storyboard::error::StoryboardError;
use crate::storyboard::scene::Scene;

/// Writes the rendered image of `scene` into `dir` as PNG. Returns `None`
/// when the scene has nothing rendered yet.
pub async fn export_scene(scene: &Scene, dir: &Path) -> Result<Option<PathBuf>, StoryboardError> {
    let Some(image) = &scene.image else {
        return Ok(None);
    };

    let png = ensure_png(&image.data).map_err(|err| {
        StoryboardError::Export(format!("scene {} could not be converted to PNG: {err}", scene.id))
    })?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| StoryboardError::Export(format!("{}: {err}", dir.display())))?;

    let path = dir.join(scene.export_file_name());
    tokio::fs::write(&path, png)
        .await
        .map_err(|err| StoryboardError::Export(format!("{}: {err}", path.display())))?;
    info!("Exported scene {} to {}", scene.id, path.display());
    Ok(Some(path))
}

pub async fn export_scenes(scenes: &[Scene], dir: &Path) -> Result<Vec<PathBuf>, StoryboardError> {
    let mut written = Vec::new();
    for scene in scenes {
        if let Some(path) = export_scene(scene, dir).await? {
            written.push(path);
        }
    }
    Ok(written)
}
