use crate::storyboard::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Listing,
    BrandContent,
}

impl ContentMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "listing" => Some(ContentMode::Listing),
            "brand" | "brand-content" | "a+" | "aplus" | "content-a-plus" => {
                Some(ContentMode::BrandContent)
            }
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ContentMode::Listing => "listing",
            ContentMode::BrandContent => "brand-content",
        }
    }

    pub fn scene_count(self) -> usize {
        templates_for(self).len()
    }

    /// Human readable label used inside model instructions.
    pub const fn label(self) -> &'static str {
        match self {
            ContentMode::Listing => "Standard Product Listing Images",
            ContentMode::BrandContent => "A+ Brand Story Content",
        }
    }

    /// Keeps the model from borrowing layouts from the other catalog.
    pub const fn exclusion_rule(self) -> &'static str {
        match self {
            ContentMode::Listing => "Do not use A+ brand content layouts.",
            ContentMode::BrandContent => "Do not use standard white background listing layouts.",
        }
    }

    pub const fn render_style(self) -> &'static str {
        match self {
            ContentMode::Listing => "E-commerce listing: clean studio, high contrast.",
            ContentMode::BrandContent => {
                "A+ brand content: cinematic, luxury brand storytelling, editorial look."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTemplate {
    pub index: u32,
    pub title: &'static str,
    pub reference_text: &'static str,
    pub default_prompt: &'static str,
}

pub fn templates_for(mode: ContentMode) -> &'static [SceneTemplate] {
    match mode {
        ContentMode::Listing => &LISTING_TEMPLATES,
        ContentMode::BrandContent => &BRAND_CONTENT_TEMPLATES,
    }
}

pub fn template_by_id(mode: ContentMode, id: u32) -> Option<&'static SceneTemplate> {
    templates_for(mode).iter().find(|template| template.index == id)
}

pub fn default_scenes(mode: ContentMode) -> Vec<Scene> {
    templates_for(mode).iter().map(Scene::from_template).collect()
}

static LISTING_TEMPLATES: [SceneTemplate; 6] = [
    SceneTemplate {
        index: 1,
        title: "HERO & INCLUDED",
        default_prompt: "Listing hero shot: headline \"A DAILY DOSE OF POSITIVITY\" on the left. Container and gift box at equal height on a light oak desk in natural sunlight, small 2 inch cards scattered in front. No thank you card.",
        reference_text: r#"[LEFT SIDE TITLE]
Headline "A DAILY DOSE OF POSITIVITY" in large, bold, inspiring green lettering.

[MAIN PRODUCTS (RIGHT SIDE)]
On a light oak desk under soft natural sunlight: one clear container with a black lid, approx 3.3 inches tall, label facing the camera. The gift box stands next to it.
CRITICAL HEIGHT CONSTRAINT: the container and the box are EXACTLY THE SAME HEIGHT (approx 3.3 inches). A ruler laid across their tops would be perfectly horizontal. Do not make the box taller.
Several small cards (approx 2 inches) scattered in front, looking tiny next to the container.

[SETTING]
Clean light oak desk, softly blurred sunlit shelf with a small potted plant and a stack of books. Everyday uplifting mood, no holiday elements.

[STYLE & LIGHT]
High-end commercial product photography, vibrant cheerful colors, soft diffused side sunlight.

[TECHNICAL]
50mm lens, sharp focus on the whole set, shallow depth of field, high texture detail, 8k."#,
    },
    SceneTemplate {
        index: 2,
        title: "HOW TO USE / RITUAL",
        default_prompt: "Three step how-to infographic: open the container, pick a card, read and smile.",
        reference_text: r#"[LAYOUT]
Clean, bright 3-panel horizontal infographic banner. Title at top: "YOUR 3-STEP RITUAL". Fresh, sunny, everyday vibe.

[PANEL 1: STEP 1]
Title "STEP 1. OPEN YOUR JAR". Close-up of hands twisting open the lid on a sunlit kitchen counter.

[PANEL 2: STEP 2]
Title "STEP 2. PICK A CARD". Macro shot of fingers pinching one small folded paper card from the container. Clearly paper, not plastic.

[PANEL 3: STEP 3]
Title "STEP 3. READ & SMILE". A smiling woman holds one tiny card (approx 2 inches) showing the printed back side. The open container sits nearby.

[FOOTER]
Bottom text box: "Daily happiness in 3 simple steps!"

[STYLE]
Commercial photography, fresh yellow/green/white palette, soft natural light, 8k."#,
    },
    SceneTemplate {
        index: 3,
        title: "WHAT'S INCLUDED / KNOLLING",
        default_prompt: "Knolling layout of the set contents: container, gift box, 60 cards, thank you card, with playful hand-drawn labels.",
        reference_text: r#"[LAYOUT]
Organized "What's Included" knolling shot on a clean wooden surface, items clearly separated.
Top banner "WHAT'S INCLUDED?" in a playful, bouncy, hand-drawn cartoon lettering on a soft yellow wavy banner.

[LABEL STYLE]
All pointer labels in a friendly rounded marker font, green text in chubby speech bubbles with a yellow or beige border.

[ITEMS]
1. Container (center), 3.3 inches tall, filled with cards. Label: "1x Jar (60 Cards Inside)", dimension arrow "3.3 inches".
2. Gift box (left), upright. Label: "1x Gift-Ready Box", dimension arrow "3.3 inches".
3. Cards (right/front), small fanned pile. Label: "60x Unique Affirmation Cards", "2 inches (Tiny & Cute!)".
4. Thank you card (bottom corner). Label: "1x Thank You Card".

[SETTING]
Light oak desk, bright white wall, soft shadows, no holiday decoration.

[STYLE]
High-end e-commerce photography, flat lay or 45 degree angle, 8k."#,
    },
    SceneTemplate {
        index: 4,
        title: "GIFTS FOR / COLLAGE",
        default_prompt: "2x2 collage: a gift for friends, colleagues, students and yourself. Emphasize the compact 3.3 inch size.",
        reference_text: r#"[SCALE]
The product is a SMALL, PALM-SIZED container (3.3 inches). Never render it large.

[COLLAGE RULE]
2x2 collage with FOUR DIFFERENT scenes. Never repeat a panel.

[TOP LEFT] Tag "Gift for Friends": candid cafe moment, one friend hands the small gift box to another, natural window light.
[TOP RIGHT] Tag "Gift for Colleagues": lived-in office desk, container among monitor, mug and sticky notes; half the height of the mug.
[BOTTOM LEFT] Tag "Gift for Students": study desk with open textbook and notes under a warm desk lamp; one card leaning on the container.
[BOTTOM RIGHT] Tag "Gift for Yourself": person curled up on a couch reading a tiny card, container on a side table with tea.

[STYLE]
Authentic lifestyle photography, 100% natural light, slightly off-center organic framing, simple sans-serif tags in yellow/green boxes."#,
    },
    SceneTemplate {
        index: 5,
        title: "DECORATION / LIFESTYLE GRID",
        default_prompt: "2x2 collage of the set decorating four living spaces: desk, living room, bookshelf, bedside table.",
        reference_text: r#"[LAYOUT]
2x2 lifestyle grid titled "FITS EVERY SPACE". Real, lived-in home spaces.

[TOP LEFT] "DESK MOTIVATION": home office desk in morning light, laptop open, coffee mug, products placed casually.
[TOP RIGHT] "DAILY LIVING ROOM JOY": rustic coffee table with magazines and tea, afternoon sun, lid slightly askew.
[BOTTOM LEFT] "A SHELF FULL OF SMILES": bookshelf with real books, products nestled between rows.
[BOTTOM RIGHT] "MORNING PICK-ME-UP": bedside table with a warm lamp, glass of water, golden hour light.

[STYLE]
Instagram lifestyle aesthetic, natural light with different time of day per panel, warm color grading, no catalog sterility."#,
    },
    SceneTemplate {
        index: 6,
        title: "WHY CHOOSE US / COMPARISON",
        default_prompt: "Comparison infographic \"Why Choose Us\": left column shows the full set, right column a plain generic jar. Criteria: packaging, content, design, quality.",
        reference_text: r#"[LAYOUT]
Amazon comparison infographic titled "WHY CHOOSE US?" on a soft yellow banner. Two vertical columns.

[LEFT COLUMN: OUR PRODUCT]
Green checkmark header. The container and gift box side by side, angled 15 degrees, soft studio light with a gentle rim light. Crisp label, matte box texture, vibrant colors.
Checklist rows: "Beautifully Illustrated Gift Box Included", "60 Unique Affirmation Cards", "Adorable Hand-Drawn Characters", "Premium Thick Card Stock".

[RIGHT COLUMN: OTHERS]
Red X header. One plain empty glass jar, no label, same angle, soft salmon background.
Checklist rows: "No Box / Plastic Bag", "Generic Square Paper", "Boring Plain Text", "Flimsy Thin Paper".

[STYLE]
High-end product photography, saturated left column, muted right column, 8k."#,
    },
];

static BRAND_CONTENT_TEMPLATES: [SceneTemplate; 5] = [
    SceneTemplate {
        index: 1,
        title: "A+ HERO BANNER",
        default_prompt: "Balanced hero shot: container centered under a title, lid open beside it, modern desk background, warm light.",
        reference_text: r#"[PURPOSE]
Professional hero marketing image, clean, positive and trustworthy.

[COMPOSITION]
Centered, symmetrical. Vertical axis: text, product, space. Close on the container.

[CENTER TEXT]
Title "Positive Pickle Jar", subline "60 Affirmation Cards for Daily Encouragement". Rounded sans-serif, white or soft green, gentle drop shadow.

[PRODUCT]
Open container centered under the text, lid beside it, two cards standing nearby and a few fanned on the desk. Product fills 55-65% of the frame height.

[BACKGROUND]
Modern light wood desk, laptop and notebook blurred behind, mini plant, warm window sunlight.

[NEGATIVE]
No people, no hearts, no extra text, no watermark, no dark background, no harsh light."#,
    },
    SceneTemplate {
        index: 2,
        title: "3 STEPS RITUAL",
        default_prompt: "Three step infographic: open the jar, pick one, read and reset. Clean Amazon style.",
        reference_text: r#"[PURPOSE]
Daily marketing infographic, cheerful, fresh and trustworthy.

[HEADER]
"3 Simple Steps to Feel Better Every Day", subline "Turning small moments into daily positivity."

[STEPS]
Three rounded panels with green borders and step badges.
STEP 1 "Open the jar and start your positive moment." Container on a bright surface, no people.
STEP 2 "Pick one pickle, a small message just for you." Hand taking one card, background softly blurred.
STEP 3 "Read, breathe, and reset your mindset." Young adult reading a card by a window, relaxed smile.

[FOOTER]
"One pickle. One thought. One better day." in a minimal rounded frame.

[NEGATIVE]
No hearts, no ribbons, no dark or vintage tones, no watermark."#,
    },
    SceneTemplate {
        index: 3,
        title: "DAILY ENCOURAGEMENT BANNER",
        default_prompt: "Hero and gallery banner: a young person reading a card in a bright space, plus a 3-4 panel gallery of product moments.",
        reference_text: r#"[LAYOUT]
Left: hero lifestyle image. Right: gallery of 3-4 rounded panels.

[HERO]
Young adult relaxing on a light sofa, holding and reading a card, natural smile, sunlight and greenery.

[GALLERY]
Panel 1 "A Little Daily Encouragement": reading a card at a desk.
Panel 2 "One Pickle, One Positive Thought": hand taking a card from the container.
Panel 3 "Start Your Day with Positivity": morning desk with coffee and the container in focus.
Panel 4 (optional) "Share the Good Vibes": two people sharing cards.

[PRODUCT BADGE]
Rounded badge "Positive Pickle Jar / 60 Affirmation Cards" next to a crisp product photo.

[NEGATIVE]
No hearts, candles or roses, no dark tones, no clutter."#,
    },
    SceneTemplate {
        index: 4,
        title: "WHAT'S INSIDE / ANATOMY",
        default_prompt: "Three column anatomy image (box, jar, stickers) explaining the set contents. Neutral background, title \"WHAT'S INSIDE?\".",
        reference_text: r#"[PURPOSE]
Clean "WHAT'S INSIDE" product anatomy image explaining the set.

[HEADER]
"WHAT'S INSIDE?" with subheading "Everything included in your set". Rounded sans-serif, dark green.

[LAYOUT]
Three evenly spaced columns on a bright neutral background.
Left: gift box upright, badge "Affirmation Gift Box".
Center: open container as focal point, lid tilted beside it, a few cards spilling out, badge "Jar with 60 Affirmation Notes Inside".
Right: four stickers in a soft arc, badge "4 Cute Stickers Included".

[STYLE]
Professional studio light, soft shadows, minimal desk details blurred, 4K."#,
    },
    SceneTemplate {
        index: 5,
        title: "DAILY HERO LIFESTYLE",
        default_prompt: "Daily lifestyle hero: a young woman reading a card in a cozy space, product clearly visible.",
        reference_text: r#"[SUBJECT]
A young woman in her 20s, natural look, gentle calm smile, holding one small card (approx 2 inches) angled toward the camera.

[PRODUCT]
Open container on the desk beside her, lid placed neatly next to it, filled with cards; a few cards and stickers scattered.

[SETTING]
Cozy daytime home office or reading corner, soft window light, neutral books, minimal greenery. Warm white, beige, light wood and green accents.

[COMPOSITION]
Horizontal hero banner, subject slightly off-center, product fully visible, clean negative space for a headline (no text rendered).

[STYLE]
High-end lifestyle photography, 50mm f/1.8, sharp focus on hand and card.

[NEGATIVE]
No watermark, no hearts or candles, no heavy makeup, no harsh shadows."#,
    },
];
