use std::collections::BTreeMap;
use std::sync::Arc;

use crate::llm::media::resolve_image_mime_type;
use crate::llm::Part;

/// Role of an uploaded reference image. Declaration order is the canonical
/// order images are attached to model requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetRole {
    Container,
    Lid,
    CardFront,
    CardBack,
    SecondaryContainer,
    NoteCard,
}

impl AssetRole {
    #[cfg(test)]
    pub const ALL: [AssetRole; 6] = [
        AssetRole::Container,
        AssetRole::Lid,
        AssetRole::CardFront,
        AssetRole::CardBack,
        AssetRole::SecondaryContainer,
        AssetRole::NoteCard,
    ];

    pub const REQUIRED: [AssetRole; 4] = [
        AssetRole::Container,
        AssetRole::CardFront,
        AssetRole::CardBack,
        AssetRole::SecondaryContainer,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "container" | "jar" | "product" => Some(AssetRole::Container),
            "lid" => Some(AssetRole::Lid),
            "card-front" | "sticker" => Some(AssetRole::CardFront),
            "card-back" | "sticker-back" => Some(AssetRole::CardBack),
            "secondary-container" | "box" => Some(AssetRole::SecondaryContainer),
            "note-card" | "thank-you-card" => Some(AssetRole::NoteCard),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AssetRole::Container => "container",
            AssetRole::Lid => "lid",
            AssetRole::CardFront => "card-front",
            AssetRole::CardBack => "card-back",
            AssetRole::SecondaryContainer => "secondary-container",
            AssetRole::NoteCard => "note-card",
        }
    }

    /// Short label used when the image is only visual context.
    pub const fn reference_label(self) -> &'static str {
        match self {
            AssetRole::Container => "MAIN PRODUCT CONTAINER",
            AssetRole::Lid => "CONTAINER LID",
            AssetRole::CardFront => "CARD FRONT / DESIGN",
            AssetRole::CardBack => "CARD BACK / CONTENT",
            AssetRole::SecondaryContainer => "GIFT BOX (SECONDARY CONTAINER)",
            AssetRole::NoteCard => "THANK YOU NOTE CARD",
        }
    }

    /// What the identity analysis should read off this image.
    pub const fn analysis_focus(self) -> &'static str {
        match self {
            AssetRole::Container => "Analyze shape, label color, label text, approximate height",
            AssetRole::Lid => "Analyze color, material, design",
            AssetRole::CardFront => "Analyze design elements, text, style",
            AssetRole::CardBack => "Analyze content, design",
            AssetRole::SecondaryContainer => {
                "Analyze color, pattern, design, approximate height relative to the container"
            }
            AssetRole::NoteCard => "Analyze design, text",
        }
    }

    /// Render-time caption: what the image is and that it must be copied.
    pub const fn copy_directive(self) -> &'static str {
        match self {
            AssetRole::Container => {
                "This is THE container you MUST recreate in the scene. COPY its exact label color, text and shape. DO NOT invent a different container design."
            }
            AssetRole::Lid => "This is the exact lid design. COPY this lid appearance. DO NOT invent a replacement.",
            AssetRole::CardFront => {
                "These are the exact cards that go inside the container. COPY their design, colors and characters. DO NOT invent replacement illustrations."
            }
            AssetRole::CardBack => {
                "This is the back side of the cards. COPY this text content and style. DO NOT invent a replacement."
            }
            AssetRole::SecondaryContainer => {
                "This is THE exact gift box design. COPY its color, pattern and design elements. DO NOT create a different box."
            }
            AssetRole::NoteCard => {
                "This is the thank you card design. COPY this card appearance. DO NOT invent a replacement."
            }
        }
    }
}

/// One uploaded reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl Asset {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Accepts the bytes only when they are (or declare to be) a supported image.
    pub fn from_upload(data: Vec<u8>, declared_mime: Option<&str>) -> Option<Self> {
        let mime_type = resolve_image_mime_type(declared_mime, &data)?;
        Some(Self::new(mime_type, data))
    }

    pub fn to_part(&self) -> Part {
        Part::image(self.mime_type.clone(), Arc::clone(&self.data))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: BTreeMap<AssetRole, Asset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any asset already stored for `role`.
    pub fn set_asset(&mut self, role: AssetRole, asset: Asset) -> Option<Asset> {
        self.assets.insert(role, asset)
    }

    pub fn get(&self, role: AssetRole) -> Option<&Asset> {
        self.assets.get(&role)
    }

    pub fn is_ready(&self) -> bool {
        AssetRole::REQUIRED
            .iter()
            .all(|role| self.assets.contains_key(role))
    }

    pub fn missing_required(&self) -> Vec<AssetRole> {
        AssetRole::REQUIRED
            .into_iter()
            .filter(|role| !self.assets.contains_key(role))
            .collect()
    }

    /// Present assets in canonical role order.
    pub fn present(&self) -> impl Iterator<Item = (AssetRole, &Asset)> {
        self.assets.iter().map(|(role, asset)| (*role, asset))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }
}

#[cfg(test)]
pub(crate) fn ready_registry() -> AssetRegistry {
    let mut registry = AssetRegistry::new();
    for (index, role) in AssetRole::REQUIRED.into_iter().enumerate() {
        registry.set_asset(role, Asset::new("image/png", vec![index as u8 + 1; 4]));
    }
    registry
}
