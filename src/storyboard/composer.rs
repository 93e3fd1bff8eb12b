use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::llm::{
    generate_with_retry, ImageOutput, ModelClient, ModelRequest, Part, RequestKind,
};
use crate::storyboard::assets::{AssetRegistry, AssetRole};
use crate::storyboard::error::StoryboardError;
use crate::storyboard::identity::{consistency_block, ProductIdentity};
use crate::storyboard::scene::{RenderedImage, Scene};
use crate::storyboard::settings::RenderSettings;
use crate::storyboard::templates::{ContentMode, SceneTemplate};
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_EDIT_INSTRUCTION: &str = "Improve the quality and realism of this image.";

const GENERIC_GROUNDING: &str = "[IMPORTANT]: You are a professional product photographer. You MUST generate an image that features the EXACT product shown in the reference images below. Pay close attention to the shape, label text, colors and materials of the MAIN PRODUCT CONTAINER, the CONTAINER LID and the GIFT BOX. Do not hallucinate different packaging or box designs. DO NOT change the container label color or text between scenes.";

const NEGATIVE_CONSTRAINTS: &str = "ABSOLUTE PROHIBITIONS - DO NOT VIOLATE:
1. DO NOT change the container label color from the reference image.
2. DO NOT change or modify the text on the container label.
3. DO NOT invent different card characters or card designs.
4. DO NOT change the gift box pattern or color scheme.
5. DO NOT make the container opaque if the reference shows it transparent.
6. DO NOT add labels, stickers or text that are not in the references.
7. DO NOT replace the product with anything other than what the references show.

YOU MUST:
- Copy the EXACT container label color and text.
- Copy the EXACT card design.
- Copy the EXACT gift box pattern.
- Only change the BACKGROUND, LIGHTING and SETTING.";

const LISTING_HERO_RULE: &str = "Scene 1 of a listing MUST keep the headline \"A DAILY DOSE OF POSITIVITY\" on the left, show the container and the gift box at equal height, and include NO thank you card.";

const REFERENCES_HEADER: &str = "=== REFERENCE IMAGES - STUDY THESE CAREFULLY ===";
const REFERENCES_FOOTER: &str = "=== END OF REFERENCE IMAGES ===";

#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub scene: &'a Scene,
    pub registry: &'a AssetRegistry,
    pub identity: Option<&'a ProductIdentity>,
    pub settings: RenderSettings,
    pub mode: ContentMode,
    pub is_editing: bool,
    pub instruction: Option<&'a str>,
}

impl RenderJob<'_> {
    pub fn edits_existing_image(&self) -> bool {
        self.is_editing && self.scene.image.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    scenes: Vec<ScriptedScene>,
}

#[derive(Debug, Deserialize)]
struct ScriptedScene {
    #[serde(default)]
    title: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct SuggestionReply {
    #[serde(default)]
    scenes: Vec<SuggestedPrompt>,
}

#[derive(Debug, Deserialize)]
struct SuggestedPrompt {
    id: u32,
    prompt: String,
}

fn visual_reference_parts(registry: &AssetRegistry) -> Vec<Part> {
    let mut parts = Vec::with_capacity(registry.len() * 2);
    for (role, asset) in registry.present() {
        parts.push(asset.to_part());
        parts.push(Part::text(format!(
            "[VISUAL REFERENCE]: {}",
            role.reference_label()
        )));
    }
    parts
}

fn scene_array_schema(item: Value, count: usize) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "scenes": {
                "type": "ARRAY",
                "items": item,
                "minItems": count,
                "maxItems": count
            }
        },
        "required": ["scenes"]
    })
}

pub fn split_schema(count: usize) -> Value {
    scene_array_schema(
        json!({
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING", "description": "Short title for the scene" },
                "prompt": {
                    "type": "STRING",
                    "description": "Full image prompt combining template structure, visual product details and the user idea"
                }
            },
            "required": ["title", "prompt"]
        }),
        count,
    )
}

pub fn suggestion_schema(count: usize) -> Value {
    scene_array_schema(
        json!({
            "type": "OBJECT",
            "properties": {
                "id": { "type": "INTEGER" },
                "prompt": { "type": "STRING" }
            },
            "required": ["id", "prompt"]
        }),
        count,
    )
}

pub fn build_split_request(
    brief: &str,
    registry: &AssetRegistry,
    mode: ContentMode,
    templates: &[SceneTemplate],
) -> ModelRequest {
    let count = templates.len();
    let template_context = templates
        .iter()
        .enumerate()
        .map(|(position, template)| {
            format!("[TEMPLATE SCENE {}]:\n{}", position + 1, template.reference_text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let instruction = format!(
        "You are an expert e-commerce creative director specializing in {label}.
Write a storyboard based on the USER IDEA (\"{brief}\") while strictly following the structure of the REFERENCE TEMPLATES.

STRICT CONTEXT: {exclusion}

INPUTS:
1. VISUAL REFERENCES (above): the actual product images.
2. REFERENCE TEMPLATES (below): the required layout, text placement and camera angle for each scene.
3. USER IDEA: the theme, setting and vibe.

For each of the {count} scenes write a detailed image prompt that:
1. Follows the [TEMPLATE SCENE] structure EXACTLY. Do not change the scene type.
2. Describes the product exactly as seen in the VISUAL REFERENCES, replacing generic template descriptions with the real colors and text. Fall back to the template description only for items without a reference.
3. Applies the USER IDEA to the background, decorations, lighting and context only.

USER IDEA: \"{brief}\"

REFERENCE TEMPLATES TO ADAPT:
{template_context}",
        label = mode.label(),
        exclusion = mode.exclusion_rule(),
    );

    let mut parts = visual_reference_parts(registry);
    parts.push(Part::text(instruction));
    ModelRequest::json(RequestKind::SceneScript, parts, split_schema(count))
}

pub async fn split_into_scenes(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    brief: &str,
    registry: &AssetRegistry,
    mode: ContentMode,
    templates: &[SceneTemplate],
) -> Result<Vec<Scene>, StoryboardError> {
    let brief = brief.trim();
    if brief.is_empty() {
        return Err(StoryboardError::EmptyBrief);
    }

    let request = build_split_request(brief, registry, mode, templates);
    let response = generate_with_retry(client, policy, &request)
        .await
        .map_err(|err| StoryboardError::from_model(StoryboardError::ScriptFailure, err))?;

    let reply: ScriptReply = serde_json::from_str(response.text.trim()).map_err(|err| {
        StoryboardError::ScriptFailure(format!("invalid scene script payload: {err}"))
    })?;
    if reply.scenes.len() != templates.len() {
        return Err(StoryboardError::ScriptFailure(format!(
            "expected {} scenes, model returned {}",
            templates.len(),
            reply.scenes.len()
        )));
    }

    let scenes = reply
        .scenes
        .into_iter()
        .zip(templates)
        .enumerate()
        .map(|(position, (scripted, template))| {
            let title = match scripted.title.trim() {
                "" => template.title.to_string(),
                title => title.to_string(),
            };
            Scene::new(position as u32 + 1, title, scripted.prompt.trim())
        })
        .collect::<Vec<_>>();
    info!("Split brief into {} {} scenes", scenes.len(), mode.as_str());
    Ok(scenes)
}

pub fn build_bulk_suggestion_request(
    registry: &AssetRegistry,
    mode: ContentMode,
    templates: &[SceneTemplate],
) -> ModelRequest {
    let count = templates.len();
    let templates_instruction = templates
        .iter()
        .enumerate()
        .map(|(position, template)| {
            format!(
                "[SCENE {} TEMPLATE]\n{}\n--------------------------------------------------",
                position + 1,
                template.reference_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut rules = vec![
        "1. STRICTLY ADHERE TO TEMPLATES: Scene 1 adapts [SCENE 1 TEMPLATE], Scene 2 adapts [SCENE 2 TEMPLATE], and so on. Do NOT mix them up.".to_string(),
        "2. PRODUCT GROUNDING: Replace generic template placeholders with the ACTUAL details from the visual references above.".to_string(),
    ];
    if mode == ContentMode::Listing {
        rules.push(format!("3. {LISTING_HERO_RULE}"));
    }

    let instruction = format!(
        "ROLE: Creative director for {label}.

STRICT REQUIREMENT: You are generating {label}. {exclusion}

TASK: Write exactly {count} detailed image prompts (Scene 1 to Scene {count}).

CRITICAL RULES:
{rules}

REFERENCE TEMPLATES TO ADAPT:
{templates_instruction}

Output JSON: {{ \"scenes\": [{{ \"id\": 1, \"prompt\": \"...\" }}] }}",
        label = mode.label(),
        exclusion = mode.exclusion_rule(),
        rules = rules.join("\n"),
    );

    let mut parts = visual_reference_parts(registry);
    parts.push(Part::text(instruction));
    ModelRequest::json(RequestKind::BulkSuggestion, parts, suggestion_schema(count))
}

// Unknown ids and blank prompts are dropped; callers merge by id.
pub async fn suggest_all_from_assets(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    registry: &AssetRegistry,
    mode: ContentMode,
    templates: &[SceneTemplate],
) -> Result<Vec<(u32, String)>, StoryboardError> {
    if !registry.is_ready() {
        return Err(StoryboardError::MissingAssets(registry.missing_required()));
    }

    let request = build_bulk_suggestion_request(registry, mode, templates);
    let response = generate_with_retry(client, policy, &request)
        .await
        .map_err(|err| StoryboardError::from_model(StoryboardError::SuggestionFailure, err))?;

    let reply: SuggestionReply = serde_json::from_str(response.text.trim()).map_err(|err| {
        StoryboardError::SuggestionFailure(format!("invalid suggestion payload: {err}"))
    })?;

    let known_ids = 1..=templates.len() as u32;
    let mut suggestions = Vec::with_capacity(reply.scenes.len());
    for suggestion in reply.scenes {
        let prompt = suggestion.prompt.trim();
        if !known_ids.contains(&suggestion.id) || prompt.is_empty() {
            warn!(
                "Dropping suggestion for scene {} ({} chars)",
                suggestion.id,
                prompt.len()
            );
            continue;
        }
        suggestions.push((suggestion.id, prompt.to_string()));
    }
    debug!(
        "Received {} of {} suggested prompts",
        suggestions.len(),
        templates.len()
    );
    Ok(suggestions)
}

pub fn build_single_suggestion_request(
    scene_id: u32,
    registry: &AssetRegistry,
    template: &SceneTemplate,
    mode: ContentMode,
) -> ModelRequest {
    let mut parts: Vec<Part> = registry.present().map(|(_, asset)| asset.to_part()).collect();
    let mut instruction = format!(
        "You are creating a prompt for {}.\n\nReference template: \"{}\"\n\nTask: Adapt this template to the product images provided above. Keep the layout and vibe of the template, but update the specific product details (colors, text, shape) to match the images. Output ONLY the new prompt in English.",
        mode.label(),
        template.reference_text
    );
    if mode == ContentMode::Listing && scene_id == 1 {
        instruction.push(' ');
        instruction.push_str(LISTING_HERO_RULE);
    }
    parts.push(Part::text(instruction));
    ModelRequest::text(RequestKind::SingleSuggestion, parts)
}

pub async fn suggest_one(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    scene_id: u32,
    registry: &AssetRegistry,
    template: &SceneTemplate,
    mode: ContentMode,
) -> Result<String, StoryboardError> {
    if !registry.is_ready() {
        return Err(StoryboardError::MissingAssets(registry.missing_required()));
    }

    let request = build_single_suggestion_request(scene_id, registry, template, mode);
    let response = generate_with_retry(client, policy, &request)
        .await
        .map_err(|err| StoryboardError::from_model(StoryboardError::SuggestionFailure, err))?;

    let prompt = response.text.trim();
    if prompt.is_empty() {
        return Err(StoryboardError::SuggestionFailure(format!(
            "empty suggestion for scene {scene_id}"
        )));
    }
    Ok(prompt.to_string())
}

// Container, secondary container and card front go last, right before the final instruction.
pub fn reinforce_references(registry: &AssetRegistry, parts: &mut Vec<Part>) {
    const REMINDERS: [(AssetRole, &str); 3] = [
        (AssetRole::Container, "REMINDER: Here is the EXACT container you must copy:"),
        (
            AssetRole::SecondaryContainer,
            "REMINDER: Here is the EXACT gift box you must copy:",
        ),
        (AssetRole::CardFront, "REMINDER: Here are the EXACT cards you must copy:"),
    ];
    for (role, caption) in REMINDERS {
        if let Some(asset) = registry.get(role) {
            parts.push(Part::text(caption));
            parts.push(asset.to_part());
        }
    }
}

pub fn build_render_request(job: &RenderJob<'_>) -> ModelRequest {
    let scene = job.scene;
    let style = job.mode.render_style();
    let mut parts = Vec::new();

    match job.identity {
        Some(identity) => parts.push(Part::text(consistency_block(identity, scene.id))),
        None => parts.push(Part::text(GENERIC_GROUNDING)),
    }

    parts.push(Part::text(REFERENCES_HEADER));
    for (position, (role, asset)) in job.registry.present().enumerate() {
        parts.push(Part::text(format!(
            "REFERENCE IMAGE {}: {}\n{}",
            position + 1,
            role.reference_label(),
            role.copy_directive()
        )));
        parts.push(asset.to_part());
    }
    parts.push(Part::text(REFERENCES_FOOTER));
    parts.push(Part::text(NEGATIVE_CONSTRAINTS));

    match (&scene.image, job.edits_existing_image()) {
        (Some(current), true) => {
            parts.push(current.to_part());
            parts.push(Part::text(
                "[IMAGE TO EDIT]: The image above is the current generated result.",
            ));
            let instruction = job
                .instruction
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(DEFAULT_EDIT_INSTRUCTION);
            parts.push(Part::text(format!(
                "[TASK]: EDIT the [IMAGE TO EDIT] based on this instruction: \"{instruction}\". Maintain the product identity from the reference images. Context: {style}"
            )));
        }
        _ => {
            parts.push(Part::text(format!(
                "[TASK]: Generate a lifestyle product photography image.

1. Study the container, card and gift box reference images.
2. Memorize their exact appearance: colors, text and design.
3. Recreate them IDENTICALLY in the new scene.
4. Only change the background and setting according to the scene description.

SCENE DESCRIPTION: \"{prompt}\"
STYLE: {style}
ASPECT RATIO: {aspect}",
                prompt = scene.prompt,
                aspect = job.settings.aspect_ratio.as_str(),
            )));
            reinforce_references(job.registry, &mut parts);
            parts.push(Part::text(
                "FINAL INSTRUCTION: The container label, the cards and the gift box MUST look EXACTLY like the reference images. COPY the product appearance, CHANGE only the background.",
            ));
        }
    }

    ModelRequest::image(
        RequestKind::Render,
        parts,
        ImageOutput {
            quality: job.settings.quality,
            aspect_ratio: job.settings.aspect_ratio.as_str().to_string(),
        },
    )
}

pub async fn render_scene(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    job: &RenderJob<'_>,
) -> Result<RenderedImage, StoryboardError> {
    let request = build_render_request(job);
    debug!(
        "Rendering scene {} ({}, identity: {}, edit: {}, {} images attached)",
        job.scene.id,
        job.settings.quality.as_str(),
        job.identity.is_some(),
        job.edits_existing_image(),
        request.image_count()
    );
    let response = generate_with_retry(client, policy, &request)
        .await
        .map_err(|err| StoryboardError::from_model(StoryboardError::RenderFailure, err))?;

    let Some(image) = response.images.into_iter().next() else {
        return Err(StoryboardError::RenderFailure(format!(
            "model returned no image for scene {}",
            job.scene.id
        )));
    };
    Ok(RenderedImage::new(image.mime_type, image.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::credentials::{KeyFileCredentials, StaticCredentials};
    use crate::llm::testing::FakeModel;
    use crate::llm::{ChainedCredentials, GeminiClient, GeminiSettings, ModelError, ModelResponse};
    use crate::storyboard::assets::{ready_registry, Asset};
    use crate::storyboard::identity::sample_identity;
    use crate::storyboard::settings::{AspectRatio, Quality};
    use crate::storyboard::templates::{template_by_id, templates_for};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), 3)
    }

    fn script_json(count: usize) -> String {
        let scenes: Vec<Value> = (0..count)
            .map(|index| json!({ "title": format!("Scene {}", index + 1), "prompt": format!(" prompt {} ", index + 1) }))
            .collect();
        json!({ "scenes": scenes }).to_string()
    }

    fn rendered_scene(prompt: &str) -> Scene {
        let mut scene = Scene::new(3, "Knolling", prompt);
        scene.finish_render(Ok(RenderedImage::new("image/png", vec![42u8, 42, 42])));
        scene
    }

    fn job<'a>(
        scene: &'a Scene,
        registry: &'a AssetRegistry,
        identity: Option<&'a ProductIdentity>,
        is_editing: bool,
    ) -> RenderJob<'a> {
        RenderJob {
            scene,
            registry,
            identity,
            settings: RenderSettings::default(),
            mode: ContentMode::Listing,
            is_editing,
            instruction: None,
        }
    }

    fn contains_image(request: &ModelRequest, bytes: &[u8]) -> bool {
        request.parts.iter().any(|part| match part {
            Part::InlineImage { data, .. } => &data[..] == bytes,
            Part::Text(_) => false,
        })
    }

    #[tokio::test]
    async fn split_returns_one_scene_per_template_with_sequential_ids() {
        let templates = templates_for(ContentMode::BrandContent);
        let model = FakeModel::new().on_text(RequestKind::SceneScript, &script_json(templates.len()));

        let scenes = split_into_scenes(
            &model,
            &fast_policy(),
            "a cozy autumn morning",
            &ready_registry(),
            ContentMode::BrandContent,
            templates,
        )
        .await
        .unwrap();

        let ids: Vec<u32> = scenes.iter().map(|scene| scene.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(scenes[0].prompt, "prompt 1");

        let request = &model.calls()[0];
        let schema = request.response_schema.as_ref().unwrap();
        assert_eq!(schema["properties"]["scenes"]["minItems"], json!(5));
        assert_eq!(schema["properties"]["scenes"]["maxItems"], json!(5));
        assert!(request.joined_text().contains("a cozy autumn morning"));
        assert_eq!(request.image_count(), 4);
    }

    #[tokio::test]
    async fn split_rejects_wrong_scene_count() {
        let templates = templates_for(ContentMode::Listing);
        let model = FakeModel::new().on_text(RequestKind::SceneScript, &script_json(5));
        let err = split_into_scenes(
            &model,
            &fast_policy(),
            "beach picnic",
            &ready_registry(),
            ContentMode::Listing,
            templates,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoryboardError::ScriptFailure(ref detail) if detail.contains("expected 6")));
    }

    #[tokio::test]
    async fn split_refuses_blank_brief_without_calling() {
        let model = FakeModel::new();
        let err = split_into_scenes(
            &model,
            &fast_policy(),
            "   ",
            &ready_registry(),
            ContentMode::Listing,
            templates_for(ContentMode::Listing),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoryboardError::EmptyBrief));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn split_falls_back_to_template_titles() {
        let templates = templates_for(ContentMode::BrandContent);
        let scenes: Vec<Value> = (0..templates.len())
            .map(|_| json!({ "title": "", "prompt": "p" }))
            .collect();
        let model = FakeModel::new()
            .on_text(RequestKind::SceneScript, &json!({ "scenes": scenes }).to_string());
        let scenes = split_into_scenes(
            &model,
            &fast_policy(),
            "idea",
            &AssetRegistry::new(),
            ContentMode::BrandContent,
            templates,
        )
        .await
        .unwrap();
        assert_eq!(scenes[0].title, templates[0].title);
    }

    #[tokio::test]
    async fn suggest_one_refuses_until_registry_is_ready() {
        let model = FakeModel::new().on_text(RequestKind::SingleSuggestion, "unused");
        let mut registry = AssetRegistry::new();
        registry.set_asset(AssetRole::Container, Asset::new("image/png", vec![1u8]));
        let template = template_by_id(ContentMode::Listing, 2).unwrap();

        let err = suggest_one(&model, &fast_policy(), 2, &registry, template, ContentMode::Listing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::MissingAssets(ref roles) if roles.len() == 3));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn suggest_one_trims_plain_text_reply() {
        let model = FakeModel::new().on_text(RequestKind::SingleSuggestion, "\n  A sunny ritual  \n");
        let template = template_by_id(ContentMode::Listing, 1).unwrap();
        let prompt = suggest_one(
            &model,
            &fast_policy(),
            1,
            &ready_registry(),
            template,
            ContentMode::Listing,
        )
        .await
        .unwrap();
        assert_eq!(prompt, "A sunny ritual");

        let request = &model.calls()[0];
        assert!(request.response_schema.is_none());
        assert!(request.joined_text().contains("A DAILY DOSE OF POSITIVITY"));
    }

    #[tokio::test]
    async fn bulk_suggestion_drops_unknown_ids() {
        let reply = json!({
            "scenes": [
                { "id": 1, "prompt": "first" },
                { "id": 9, "prompt": "stray" },
                { "id": 3, "prompt": "  " },
                { "id": 4, "prompt": "fourth" }
            ]
        });
        let model = FakeModel::new().on_text(RequestKind::BulkSuggestion, &reply.to_string());
        let suggestions = suggest_all_from_assets(
            &model,
            &fast_policy(),
            &ready_registry(),
            ContentMode::BrandContent,
            templates_for(ContentMode::BrandContent),
        )
        .await
        .unwrap();
        assert_eq!(
            suggestions,
            vec![(1, "first".to_string()), (4, "fourth".to_string())]
        );
        let text = model.calls()[0].joined_text();
        assert!(text.contains("Do not use standard white background listing layouts."));
        assert!(!text.contains("A DAILY DOSE OF POSITIVITY\" on the left"));
    }

    #[tokio::test]
    async fn suggestion_failures_surface_as_suggestion_failures() {
        let model = FakeModel::new().on_error(
            RequestKind::BulkSuggestion,
            ModelError::Api {
                status: 500,
                message: "boom".to_string(),
            },
        );
        let err = suggest_all_from_assets(
            &model,
            &fast_policy(),
            &ready_registry(),
            ContentMode::Listing,
            templates_for(ContentMode::Listing),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoryboardError::SuggestionFailure(_)));
        assert_eq!(model.call_count(), 1);
    }

    #[test]
    fn fresh_render_omits_prior_image_and_reinforces_references() {
        let registry = ready_registry();
        let scene = rendered_scene("picnic on the grass");
        let request = build_render_request(&job(&scene, &registry, None, false));

        assert!(!contains_image(&request, &[42, 42, 42]));
        assert_eq!(request.image_count(), 4 + 3);
        let text = request.joined_text();
        assert!(text.contains("SCENE DESCRIPTION: \"picnic on the grass\""));
        assert!(text.contains("ASPECT RATIO: 16:9"));
        assert!(text.contains(GENERIC_GROUNDING));
        assert!(text.contains(NEGATIVE_CONSTRAINTS));

        let reinforced: Vec<&Part> = request.parts.iter().rev().skip(1).take(6).collect();
        let container = registry.get(AssetRole::Container).unwrap();
        assert!(reinforced.iter().any(|part| matches!(part, Part::InlineImage { data, .. } if Arc::ptr_eq(data, &container.data))));
        assert!(matches!(request.parts.last(), Some(Part::Text(text)) if text.starts_with("FINAL INSTRUCTION")));
    }

    #[test]
    fn edit_render_attaches_current_image_and_instruction() {
        let registry = ready_registry();
        let scene = rendered_scene("picnic");
        let mut edit = job(&scene, &registry, None, true);
        edit.instruction = Some("make it warmer");
        let request = build_render_request(&edit);

        assert!(contains_image(&request, &[42, 42, 42]));
        assert_eq!(request.image_count(), 4 + 1);
        let text = request.joined_text();
        assert!(text.contains("[IMAGE TO EDIT]"));
        assert!(text.contains("\"make it warmer\""));
        assert!(!text.contains("REMINDER"));
        assert!(text.contains(NEGATIVE_CONSTRAINTS));

        edit.instruction = None;
        let text = build_render_request(&edit).joined_text();
        assert!(text.contains(DEFAULT_EDIT_INSTRUCTION));
    }

    #[test]
    fn edit_without_image_falls_back_to_fresh_generation() {
        let registry = ready_registry();
        let scene = Scene::new(1, "Hero", "hero prompt");
        let request = build_render_request(&job(&scene, &registry, None, true));
        assert!(!request.joined_text().contains("[IMAGE TO EDIT]"));
        assert!(request.joined_text().contains("REMINDER"));
    }

    #[test]
    fn identity_block_leads_the_request() {
        let registry = ready_registry();
        let scene = Scene::new(4, "Collage", "collage");
        let identity = sample_identity("approximately 3.3 inches", "same height, 3.3 inches");
        let request = build_render_request(&job(&scene, &registry, Some(&identity), false));
        let first = request.parts[0].as_text().unwrap();
        assert!(first.contains("MANDATORY PRODUCT IDENTITY (Scene 4)"));
        assert!(first.contains("MUST render at EQUAL HEIGHT"));
        assert!(!request.joined_text().contains(GENERIC_GROUNDING));

        let identity = sample_identity("3.3 inches", "4 inches");
        let request = build_render_request(&job(&scene, &registry, Some(&identity), false));
        assert!(!request.joined_text().contains("EQUAL HEIGHT"));
    }

    #[test]
    fn quality_and_aspect_ratio_pass_through() {
        let registry = ready_registry();
        let scene = Scene::new(1, "Hero", "hero");
        let mut hq = job(&scene, &registry, None, false);
        hq.settings = RenderSettings {
            aspect_ratio: AspectRatio::Portrait9x16,
            quality: Quality::High,
        };
        let request = build_render_request(&hq);
        let output = request.image_output.unwrap();
        assert_eq!(output.quality, Quality::High);
        assert_eq!(output.aspect_ratio, "9:16");
    }

    #[tokio::test]
    async fn render_without_image_is_a_render_failure() {
        let model = FakeModel::new().on(RequestKind::Render, |_, _| {
            Ok(ModelResponse::from_text("I cannot draw that"))
        });
        let registry = ready_registry();
        let scene = Scene::new(2, "Ritual", "ritual");
        let err = render_scene(&model, &fast_policy(), &job(&scene, &registry, None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::RenderFailure(ref detail) if detail.contains("no image")));
    }

    #[tokio::test]
    async fn render_retries_rate_limits_then_returns_image() {
        let model = FakeModel::new().on(RequestKind::Render, |_, previous| {
            if previous < 2 {
                Err(ModelError::RateLimited("RESOURCE_EXHAUSTED".to_string()))
            } else {
                Ok(ModelResponse::from_image(crate::llm::InlineImage {
                    mime_type: "image/png".to_string(),
                    data: vec![7u8, 7],
                }))
            }
        });
        let registry = ready_registry();
        let scene = Scene::new(2, "Ritual", "ritual");
        let image = render_scene(&model, &fast_policy(), &job(&scene, &registry, None, false))
            .await
            .unwrap();
        assert_eq!(&image.data[..], &[7u8, 7][..]);
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn credential_errors_surface_as_auth_failures() {
        let model = FakeModel::new().on_error(
            RequestKind::Render,
            ModelError::Credential("no key configured".to_string()),
        );
        let registry = ready_registry();
        let scene = Scene::new(2, "Ritual", "ritual");
        let err = render_scene(&model, &fast_policy(), &job(&scene, &registry, None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::AuthFailure(_)));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn gemini_without_any_key_fails_render_with_auth_failure() {
        let settings = GeminiSettings {
            base_url: "https://example.test/v1beta".to_string(),
            text_model: "text-model".to_string(),
            image_model: "image-model".to_string(),
            image_hq_model: "image-hq-model".to_string(),
            image_hq_size: "2K".to_string(),
            safety_profile: "standard".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        let credentials = ChainedCredentials::new(vec![
            Box::new(StaticCredentials::new("  ")),
            Box::new(KeyFileCredentials::new("/nonexistent/storyboard/gemini.key")),
        ]);
        let client = GeminiClient::new(settings, Arc::new(credentials));

        let registry = ready_registry();
        let scene = Scene::new(1, "Hero", "hero");
        let err = render_scene(&client, &fast_policy(), &job(&scene, &registry, None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::AuthFailure(_)));
    }
}
