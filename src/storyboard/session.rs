use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::CONFIG;
use crate::llm::ModelClient;
use crate::storyboard::assets::{Asset, AssetRegistry, AssetRole};
use crate::storyboard::composer::{
    render_scene, split_into_scenes, suggest_all_from_assets, suggest_one, RenderJob,
};
use crate::storyboard::error::StoryboardError;
use crate::storyboard::identity::{extract_identity, identity_summary, ProductIdentity};
use crate::storyboard::scene::Scene;
use crate::storyboard::settings::RenderSettings;
use crate::storyboard::templates::{default_scenes, template_by_id, templates_for, ContentMode};
use crate::utils::retry::RetryPolicy;
use crate::utils::timing::ActionTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChange {
    AssetsUploaded,
    ModeSwitched,
}

impl InputChange {
    const fn as_str(self) -> &'static str {
        match self {
            InputChange::AssetsUploaded => "assets_uploaded",
            InputChange::ModeSwitched => "mode_switched",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderBatchReport {
    pub rendered: Vec<u32>,
    pub failed: Vec<(u32, String)>,
    pub identity_used: bool,
}

/// One user session: assets, the active mode and its scenes.
pub struct Storyboard {
    client: Arc<dyn ModelClient>,
    policy: RetryPolicy,
    pacing: Duration,
    auto_suggest: bool,
    registry: AssetRegistry,
    mode: ContentMode,
    scenes: Vec<Scene>,
    settings: RenderSettings,
    advisory: Option<String>,
}

impl Storyboard {
    pub fn new(
        client: Arc<dyn ModelClient>,
        mode: ContentMode,
        policy: RetryPolicy,
        pacing: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            pacing,
            auto_suggest: true,
            registry: AssetRegistry::new(),
            mode,
            scenes: default_scenes(mode),
            settings: RenderSettings::default(),
            advisory: None,
        }
    }

    pub fn from_config(client: Arc<dyn ModelClient>, mode: ContentMode) -> Self {
        let mut board = Self::new(client, mode, CONFIG.retry_policy(), CONFIG.render_pacing());
        board.settings = RenderSettings {
            aspect_ratio: CONFIG.default_aspect_ratio,
            quality: CONFIG.default_quality,
        };
        board
    }

    pub fn with_auto_suggest(mut self, enabled: bool) -> Self {
        self.auto_suggest = enabled;
        self
    }

    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, id: u32) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id == id)
    }

    #[cfg(test)]
    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }

    fn scene_index(&self, id: u32) -> Result<usize, StoryboardError> {
        self.scenes
            .iter()
            .position(|scene| scene.id == id)
            .ok_or(StoryboardError::UnknownScene(id))
    }

    fn ensure_idle(&self, index: usize) -> Result<(), StoryboardError> {
        let scene = &self.scenes[index];
        if scene.is_busy() {
            return Err(StoryboardError::SceneBusy(scene.id));
        }
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn upload(&mut self, role: AssetRole, asset: Asset) {
        info!("Stored {} asset ({})", role.as_str(), asset.mime_type);
        self.registry.set_asset(role, asset);
        self.on_inputs_changed(InputChange::AssetsUploaded).await;
    }

    pub async fn upload_many(&mut self, assets: Vec<(AssetRole, Asset)>) {
        for (role, asset) in assets {
            info!("Stored {} asset ({})", role.as_str(), asset.mime_type);
            self.registry.set_asset(role, asset);
        }
        self.on_inputs_changed(InputChange::AssetsUploaded).await;
    }

    #[allow(dead_code)]
    pub async fn select_mode(&mut self, mode: ContentMode) {
        if mode == self.mode {
            return;
        }
        info!("Switching content mode {} -> {}", self.mode.as_str(), mode.as_str());
        self.mode = mode;
        self.scenes = default_scenes(mode);
        self.on_inputs_changed(InputChange::ModeSwitched).await;
    }

    /// Readiness rule: whenever inputs change and the registry is ready,
    /// every scene gets an asset-driven prompt suggestion.
    pub async fn on_inputs_changed(&mut self, change: InputChange) {
        if !self.auto_suggest || !self.registry.is_ready() {
            return;
        }
        info!(
            "Inputs changed ({}), suggesting prompts for {} scenes",
            change.as_str(),
            self.scenes.len()
        );
        if let Err(err) = self.run_bulk_suggestion().await {
            warn!("Automatic prompt suggestion failed: {}", err);
        }
    }

    pub fn set_prompt(&mut self, id: u32, prompt: impl Into<String>) -> Result<(), StoryboardError> {
        let index = self.scene_index(id)?;
        self.scenes[index].set_prompt(prompt);
        Ok(())
    }

    pub async fn request_split(&mut self, brief: &str) -> Result<(), StoryboardError> {
        let mut timer = ActionTimer::start("split", None);
        let result = split_into_scenes(
            self.client.as_ref(),
            &self.policy,
            brief,
            &self.registry,
            self.mode,
            templates_for(self.mode),
        )
        .await;
        match result {
            Ok(scenes) => {
                self.scenes = scenes;
                self.advisory = None;
                Ok(())
            }
            Err(err) => {
                timer.mark_status("error", Some(err.to_string()));
                if !matches!(err, StoryboardError::EmptyBrief) {
                    self.advisory = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    pub async fn request_suggest_all(&mut self) -> Result<(), StoryboardError> {
        if !self.registry.is_ready() {
            return Err(StoryboardError::MissingAssets(self.registry.missing_required()));
        }
        if let Some(busy) = self.scenes.iter().find(|scene| scene.is_busy()) {
            return Err(StoryboardError::SceneBusy(busy.id));
        }
        self.run_bulk_suggestion().await
    }

    async fn run_bulk_suggestion(&mut self) -> Result<(), StoryboardError> {
        let mut timer = ActionTimer::start("suggest_all", None);
        for scene in &mut self.scenes {
            scene.begin_suggesting();
        }

        let result = suggest_all_from_assets(
            self.client.as_ref(),
            &self.policy,
            &self.registry,
            self.mode,
            templates_for(self.mode),
        )
        .await;

        match result {
            Ok(suggestions) => {
                for scene in &mut self.scenes {
                    let suggested = suggestions
                        .iter()
                        .find(|(id, _)| *id == scene.id)
                        .map(|(_, prompt)| prompt.clone());
                    scene.finish_suggesting(suggested);
                }
                self.advisory = None;
                Ok(())
            }
            Err(err) => {
                timer.mark_status("error", Some(err.to_string()));
                let mode = self.mode;
                for scene in &mut self.scenes {
                    let template = template_by_id(mode, scene.id);
                    if let Some(template) = template {
                        scene.title = template.title.to_string();
                    }
                    scene.finish_suggesting(template.map(|template| template.default_prompt.to_string()));
                }
                self.advisory = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn request_suggest_one(&mut self, id: u32) -> Result<(), StoryboardError> {
        let index = self.scene_index(id)?;
        self.ensure_idle(index)?;
        let template = template_by_id(self.mode, id).ok_or(StoryboardError::UnknownScene(id))?;
        if !self.registry.is_ready() {
            return Err(StoryboardError::MissingAssets(self.registry.missing_required()));
        }

        let mut timer = ActionTimer::start("suggest_one", Some(id));
        self.scenes[index].begin_suggesting();
        let result = suggest_one(
            self.client.as_ref(),
            &self.policy,
            id,
            &self.registry,
            template,
            self.mode,
        )
        .await;

        match result {
            Ok(prompt) => {
                self.scenes[index].finish_suggesting(Some(prompt));
                Ok(())
            }
            Err(err) => {
                timer.mark_status("error", Some(err.to_string()));
                self.scenes[index].finish_suggesting(None);
                self.advisory = Some(err.to_string());
                Err(err)
            }
        }
    }

    // Needs the container and the gift box. Failures degrade to generic grounding.
    async fn identity_for_render(&self) -> Option<ProductIdentity> {
        if self.registry.get(AssetRole::Container).is_none()
            || self.registry.get(AssetRole::SecondaryContainer).is_none()
        {
            return None;
        }
        match extract_identity(self.client.as_ref(), &self.policy, &self.registry).await {
            Ok(identity) => Some(identity),
            Err(err) => {
                warn!("Identity analysis failed, rendering without it: {}", err);
                None
            }
        }
    }

    async fn dispatch_render(
        &mut self,
        index: usize,
        identity: Option<&ProductIdentity>,
        is_editing: bool,
        instruction: Option<&str>,
    ) -> Result<(), StoryboardError> {
        let scene_id = self.scenes[index].id;
        let mut timer = ActionTimer::start("render", Some(scene_id));
        self.scenes[index].begin_render();

        let result = {
            let job = RenderJob {
                scene: &self.scenes[index],
                registry: &self.registry,
                identity,
                settings: self.settings,
                mode: self.mode,
                is_editing,
                instruction,
            };
            render_scene(self.client.as_ref(), &self.policy, &job).await
        };

        match result {
            Ok(image) => {
                self.scenes[index].finish_render(Ok(image));
                info!("Scene {} rendered", scene_id);
                Ok(())
            }
            Err(err) => {
                timer.mark_status("error", Some(err.to_string()));
                warn!("Scene {} render failed: {}", scene_id, err);
                self.scenes[index].finish_render(Err(err.to_string()));
                Err(err)
            }
        }
    }

    pub async fn request_render(
        &mut self,
        id: u32,
        is_editing: bool,
        instruction: Option<&str>,
    ) -> Result<(), StoryboardError> {
        let index = self.scene_index(id)?;
        self.ensure_idle(index)?;
        let identity = self.identity_for_render().await;
        self.dispatch_render(index, identity.as_ref(), is_editing, instruction)
            .await
    }

    /// Renders every scene in catalog order, sharing one identity across the
    /// batch and pausing between dispatches.
    pub async fn request_render_all(&mut self) -> RenderBatchReport {
        let mut timer = ActionTimer::start("render_all", None);
        let identity = self.identity_for_render().await;
        if let Some(identity) = &identity {
            info!("Batch identity: {}", identity_summary(identity));
        }

        let mut report = RenderBatchReport {
            identity_used: identity.is_some(),
            ..RenderBatchReport::default()
        };
        for index in 0..self.scenes.len() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            let scene_id = self.scenes[index].id;
            let outcome = match self.ensure_idle(index) {
                Ok(()) => {
                    self.dispatch_render(index, identity.as_ref(), false, None)
                        .await
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => report.rendered.push(scene_id),
                Err(err) => report.failed.push((scene_id, err.to_string())),
            }
        }

        if !report.failed.is_empty() {
            timer.mark_status(
                "partial",
                Some(format!("{} of {} scenes failed", report.failed.len(), self.scenes.len())),
            );
        }
        report
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        info!("Resetting storyboard session");
        self.registry.clear();
        self.scenes = default_scenes(self.mode);
        self.advisory = None;
    }
}
