use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::llm::{generate_with_retry, ModelClient, ModelRequest, Part, RequestKind};
use crate::storyboard::assets::AssetRegistry;
use crate::storyboard::error::StoryboardError;
use crate::utils::retry::RetryPolicy;

const ANALYST_INSTRUCTION: &str = "You are a product analyst. Analyze these product reference images and extract the EXACT visual identity that MUST be maintained consistently across all marketing images.

CRITICAL ANALYSIS REQUIREMENTS:

1. CONTAINER IDENTITY:
   - Label color (be VERY specific, e.g. \"bright yellow #FFD700\", not just \"yellow\")
   - Exact text visible on the label (transcribe it precisely)
   - Container shape (cylindrical, square, unique shape?)
   - Approximate height (estimate in inches or cm)

2. GIFT BOX IDENTITY:
   - Primary color scheme (specific color names or codes if visible)
   - Pattern and design elements
   - Approximate height relative to the container (e.g. \"same height as container ~3.3 inches\", \"taller than container ~4 inches\")

3. CARD IDENTITY:
   - Design style and dominant colors
   - Approximate size
   - Unique visual elements (characters, icons, borders)

4. CRITICAL RELATIONSHIPS:
   - Are the container and the box the same height? If yes, state it explicitly.
   - Which item is largest or most prominent?

Fill every field of the requested JSON structure.";

/// Canonical visual description of the product, computed once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIdentity {
    pub container: ContainerIdentity,
    pub secondary_container: SecondaryContainerIdentity,
    pub cards: CardIdentity,
    pub raw_analysis: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerIdentity {
    pub label_color: String,
    pub label_text: String,
    pub shape: String,
    pub approximate_height: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryContainerIdentity {
    pub primary_color: String,
    pub pattern: String,
    pub approximate_height: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardIdentity {
    pub design: String,
    pub approximate_size: String,
}

impl ProductIdentity {
    /// Strict parse: every field must be present and non-blank.
    pub fn from_json(payload: &str) -> Result<Self, StoryboardError> {
        let identity: ProductIdentity = serde_json::from_str(payload.trim()).map_err(|err| {
            StoryboardError::AnalysisFailure(format!("invalid identity payload: {err}"))
        })?;
        if let Some(field) = identity.first_blank_field() {
            return Err(StoryboardError::AnalysisFailure(format!(
                "identity field {field} is empty"
            )));
        }
        Ok(identity)
    }

    fn first_blank_field(&self) -> Option<&'static str> {
        let fields = [
            ("container.labelColor", &self.container.label_color),
            ("container.labelText", &self.container.label_text),
            ("container.shape", &self.container.shape),
            ("container.approximateHeight", &self.container.approximate_height),
            ("secondaryContainer.primaryColor", &self.secondary_container.primary_color),
            ("secondaryContainer.pattern", &self.secondary_container.pattern),
            (
                "secondaryContainer.approximateHeight",
                &self.secondary_container.approximate_height,
            ),
            ("cards.design", &self.cards.design),
            ("cards.approximateSize", &self.cards.approximate_size),
        ];
        fields
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
    }

    pub fn heights_equal(&self) -> bool {
        heights_described_equal(
            &self.container.approximate_height,
            &self.secondary_container.approximate_height,
        )
    }
}

fn string_field(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

pub fn identity_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "container": {
                "type": "OBJECT",
                "properties": {
                    "labelColor": string_field("Specific color of the container label"),
                    "labelText": string_field("Exact text visible on the label"),
                    "shape": string_field("Shape of the container"),
                    "approximateHeight": string_field("Estimated height of the container")
                },
                "required": ["labelColor", "labelText", "shape", "approximateHeight"]
            },
            "secondaryContainer": {
                "type": "OBJECT",
                "properties": {
                    "primaryColor": string_field("Primary color of the gift box"),
                    "pattern": string_field("Pattern or design on the gift box"),
                    "approximateHeight": string_field("Height of the gift box, especially relative to the container")
                },
                "required": ["primaryColor", "pattern", "approximateHeight"]
            },
            "cards": {
                "type": "OBJECT",
                "properties": {
                    "design": string_field("Design style and elements of the cards"),
                    "approximateSize": string_field("Approximate size of the cards")
                },
                "required": ["design", "approximateSize"]
            },
            "rawAnalysis": string_field("Full detailed analysis text")
        },
        "required": ["container", "secondaryContainer", "cards", "rawAnalysis"]
    })
}

pub fn build_identity_request(registry: &AssetRegistry) -> ModelRequest {
    let mut parts = Vec::with_capacity(registry.len() * 2 + 1);
    for (position, (role, asset)) in registry.present().enumerate() {
        parts.push(asset.to_part());
        parts.push(Part::text(format!(
            "[IMAGE {}]: {} - {}",
            position + 1,
            role.reference_label(),
            role.analysis_focus()
        )));
    }
    parts.push(Part::text(ANALYST_INSTRUCTION));
    ModelRequest::json(RequestKind::IdentityAnalysis, parts, identity_schema())
}

/// Runs the single structured analysis call over every present asset.
pub async fn extract_identity(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    registry: &AssetRegistry,
) -> Result<ProductIdentity, StoryboardError> {
    let request = build_identity_request(registry);
    debug!(
        "Requesting product identity analysis with {} reference images",
        request.image_count()
    );
    let response = generate_with_retry(client, policy, &request)
        .await
        .map_err(|err| StoryboardError::from_model(StoryboardError::AnalysisFailure, err))?;

    let identity = ProductIdentity::from_json(&response.text)?;
    info!("Product identity extracted: {}", identity_summary(&identity));
    Ok(identity)
}

static MEASUREMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\d+(?:\.\d+)?)[\s-]*(inches|inch|in\b|"|centimeters|centimetres|cm|millimeters|millimetres|mm)"#)
        .expect("measurement pattern is valid")
});

static HEIGHT_EQUALITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:same|equal|identical)\s+(?:in\s+)?(?:height|tall)\b|\bequally\s+tall\b|\bas\s+tall\s+as\b|\bheights?\s+(?:is\s+|are\s+)?(?:the\s+)?(?:same|equal|identical)\b",
    )
    .expect("height equality pattern is valid")
});

const NEGATED_EQUALITY: [&str; 5] = [
    "not the same",
    "not equal",
    "unequal",
    "not identical",
    "different height",
];

/// First measurement in the text, in millimetres.
fn first_measurement_mm(text: &str) -> Option<f64> {
    let captures = MEASUREMENT_PATTERN.captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_lowercase();
    let factor = match unit.as_str() {
        "inches" | "inch" | "in" | "\"" => 25.4,
        "centimeters" | "centimetres" | "cm" => 10.0,
        _ => 1.0,
    };
    Some(value * factor)
}

/// True when the two height descriptions say the items are equally tall.
/// Explicit measurements win over wording when both sides carry one.
pub fn heights_described_equal(container_height: &str, box_height: &str) -> bool {
    let container = container_height.to_lowercase();
    let secondary = box_height.to_lowercase();

    if [&container, &secondary]
        .iter()
        .any(|text| NEGATED_EQUALITY.iter().any(|phrase| text.contains(phrase)))
    {
        return false;
    }

    if let (Some(a), Some(b)) = (
        first_measurement_mm(&container),
        first_measurement_mm(&secondary),
    ) {
        return (a - b).abs() <= 1.0;
    }

    [&container, &secondary]
        .iter()
        .any(|text| HEIGHT_EQUALITY_PATTERN.is_match(text))
}

/// Mandatory identity block placed at the top of every render request.
pub fn consistency_block(identity: &ProductIdentity, scene_id: u32) -> String {
    let container = &identity.container;
    let secondary = &identity.secondary_container;
    let relationship = if identity.heights_equal() {
        "   - The CONTAINER and the GIFT BOX are THE SAME HEIGHT. They MUST render at EQUAL HEIGHT in this scene.".to_string()
    } else {
        format!(
            "   - Height relationship: container ({}) vs gift box ({})",
            container.approximate_height, secondary.approximate_height
        )
    };

    format!(
        "=== MANDATORY PRODUCT IDENTITY (Scene {scene_id}) ===

CRITICAL: These product details MUST match EXACTLY across ALL scenes.
Do NOT change colors, labels, text or proportions.

MAIN CONTAINER:
   - Shape: {shape}
   - Label Color: {label_color}
   - Label Text: \"{label_text}\"
   - Height: {container_height}

GIFT BOX:
   - Color: {box_color}
   - Pattern: {pattern}
   - Height: {box_height}

CARDS:
   - Design: {card_design}
   - Size: {card_size}

CRITICAL RELATIONSHIPS:
{relationship}

DO NOT:
   - Change the container label color or text
   - Modify the gift box pattern or design
   - Alter the relative sizes of container and gift box
   - Replace the printed cards with real-world objects they depict

CONSISTENCY CHECK:
   Compare Scene {scene_id} with Scene 1. The container label, box design and product identity MUST be IDENTICAL.
===",
        shape = container.shape,
        label_color = container.label_color,
        label_text = container.label_text,
        container_height = container.approximate_height,
        box_color = secondary.primary_color,
        pattern = secondary.pattern,
        box_height = secondary.approximate_height,
        card_design = identity.cards.design,
        card_size = identity.cards.approximate_size,
    )
}

pub fn identity_summary(identity: &ProductIdentity) -> String {
    format!(
        "Product: {} container labeled \"{}\", {} box with {}, {} cards (~{})",
        identity.container.label_color,
        identity.container.label_text,
        identity.secondary_container.primary_color,
        identity.secondary_container.pattern,
        identity.cards.design,
        identity.cards.approximate_size
    )
}

#[cfg(test)]
pub(crate) fn sample_identity(container_height: &str, box_height: &str) -> ProductIdentity {
    ProductIdentity {
        container: ContainerIdentity {
            label_color: "bright yellow #FFD700".to_string(),
            label_text: "Happy Jar".to_string(),
            shape: "cylindrical".to_string(),
            approximate_height: container_height.to_string(),
        },
        secondary_container: SecondaryContainerIdentity {
            primary_color: "pastel green".to_string(),
            pattern: "rainbows and clouds".to_string(),
            approximate_height: box_height.to_string(),
        },
        cards: CardIdentity {
            design: "hand-drawn cartoon".to_string(),
            approximate_size: "2 inches".to_string(),
        },
        raw_analysis: "full analysis".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeModel;
    use crate::llm::ModelError;
    use crate::storyboard::assets::{ready_registry, Asset, AssetRole};
    use std::time::Duration;

    const IDENTITY_JSON: &str = r#"{
        "container": {
            "labelColor": "bright yellow",
            "labelText": "Happy Jar",
            "shape": "cylindrical",
            "approximateHeight": "approximately 3.3 inches"
        },
        "secondaryContainer": {
            "primaryColor": "green",
            "pattern": "rainbows",
            "approximateHeight": "same height, 3.3 inches"
        },
        "cards": { "design": "cartoon", "approximateSize": "business card" },
        "rawAnalysis": "analysis"
    }"#;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), 3)
    }

    #[test]
    fn equal_height_directive_only_when_heights_match() {
        let equal = sample_identity("approximately 3.3 inches", "same height, 3.3 inches");
        let block = consistency_block(&equal, 2);
        assert!(block.contains("MUST render at EQUAL HEIGHT"));
        assert!(block.contains("Scene 2"));

        let different = sample_identity("3.3 inches", "4 inches");
        let block = consistency_block(&different, 2);
        assert!(!block.contains("EQUAL HEIGHT"));
        assert!(block.contains("container (3.3 inches) vs gift box (4 inches)"));
    }

    #[test]
    fn height_comparison_handles_wording_and_units() {
        assert!(heights_described_equal("about 8 cm", "as tall as the jar"));
        assert!(heights_described_equal("short", "same height as the jar"));
        assert!(!heights_described_equal("about 8 cm", "same width as the container"));
        assert!(!heights_described_equal("short", "same as the lid color"));
        assert!(heights_described_equal("3 in", "7.62 cm"));
        assert!(!heights_described_equal("same as before, 3 inches", "5 inches"));
        assert!(!heights_described_equal("3 inches", "not the same height"));
        assert!(!heights_described_equal("tall", "short"));
    }

    #[test]
    fn hyphenated_heights_are_compared_as_numbers() {
        let different = sample_identity("3.3-inch tall", "4-inch tall, same width as the container");
        let block = consistency_block(&different, 2);
        assert!(!block.contains("EQUAL HEIGHT"));

        assert!(heights_described_equal("3.3-inch", "3.3 inches, same height"));
        assert!(heights_described_equal("8-cm", "80-mm"));
    }

    #[test]
    fn strict_parse_rejects_missing_and_blank_fields() {
        let identity = ProductIdentity::from_json(IDENTITY_JSON).unwrap();
        assert_eq!(identity.container.label_text, "Happy Jar");
        assert!(identity.heights_equal());

        let missing: Value = {
            let mut value: Value = serde_json::from_str(IDENTITY_JSON).unwrap();
            value["cards"].as_object_mut().unwrap().remove("approximateSize");
            value
        };
        let err = ProductIdentity::from_json(&missing.to_string()).unwrap_err();
        assert!(matches!(err, StoryboardError::AnalysisFailure(_)));

        let blank = IDENTITY_JSON.replace("\"cylindrical\"", "\"  \"");
        let err = ProductIdentity::from_json(&blank).unwrap_err();
        assert!(err.to_string().contains("container.shape"));
    }

    #[test]
    fn summary_is_one_line() {
        let summary = identity_summary(&sample_identity("3 in", "3 in"));
        assert!(!summary.contains('\n'));
        assert!(summary.contains("\"Happy Jar\""));
    }

    #[tokio::test]
    async fn extraction_issues_one_json_request_with_captions() {
        let model = FakeModel::new().on_text(RequestKind::IdentityAnalysis, IDENTITY_JSON);
        let mut registry = ready_registry();
        registry.set_asset(AssetRole::Lid, Asset::new("image/png", vec![5u8]));

        let identity = extract_identity(&model, &fast_policy(), &registry)
            .await
            .unwrap();
        assert_eq!(identity.secondary_container.primary_color, "green");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let request = &calls[0];
        assert!(request.response_schema.is_some());
        assert_eq!(request.image_count(), 5);
        let text = request.joined_text();
        assert!(text.contains("[IMAGE 1]: MAIN PRODUCT CONTAINER"));
        assert!(text.contains("[IMAGE 2]: CONTAINER LID"));
        assert!(text.contains("product analyst"));
    }

    #[tokio::test]
    async fn extraction_failures_are_analysis_failures() {
        let model = FakeModel::new().on_text(RequestKind::IdentityAnalysis, "{\"container\": {}}");
        let err = extract_identity(&model, &fast_policy(), &ready_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::AnalysisFailure(_)));

        let model = FakeModel::new().on_error(
            RequestKind::IdentityAnalysis,
            ModelError::RateLimited("quota".to_string()),
        );
        let err = extract_identity(&model, &fast_policy(), &ready_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::AnalysisFailure(_)));
        assert_eq!(model.call_count(), 4);
    }
}
