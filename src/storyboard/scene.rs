use std::sync::Arc;

use crate::llm::Part;
use crate::storyboard::templates::SceneTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Generating,
    Rendered,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionState {
    Idle,
    Suggesting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl RenderedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn to_part(&self) -> Part {
        Part::image(self.mime_type.clone(), Arc::clone(&self.data))
    }
}

/// One storyboard slot. The prompt is user-editable in any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub id: u32,
    pub title: String,
    pub prompt: String,
    pub image: Option<RenderedImage>,
    pub render_state: RenderState,
    pub suggestion_state: SuggestionState,
    pub last_error: Option<String>,
}

impl Scene {
    pub fn new(id: u32, title: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            prompt: prompt.into(),
            image: None,
            render_state: RenderState::Idle,
            suggestion_state: SuggestionState::Idle,
            last_error: None,
        }
    }

    pub fn from_template(template: &SceneTemplate) -> Self {
        Self::new(template.index, template.title, template.default_prompt)
    }

    pub fn is_busy(&self) -> bool {
        self.render_state == RenderState::Generating
            || self.suggestion_state == SuggestionState::Suggesting
    }

    /// Leaves the image and both states untouched.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn begin_suggesting(&mut self) {
        self.suggestion_state = SuggestionState::Suggesting;
    }

    pub fn finish_suggesting(&mut self, prompt: Option<String>) {
        if let Some(prompt) = prompt {
            self.prompt = prompt;
        }
        self.suggestion_state = SuggestionState::Idle;
    }

    pub fn begin_render(&mut self) {
        self.render_state = RenderState::Generating;
        self.last_error = None;
    }

    pub fn finish_render(&mut self, outcome: Result<RenderedImage, String>) {
        match outcome {
            Ok(image) => {
                self.image = Some(image);
                self.render_state = RenderState::Rendered;
                self.last_error = None;
            }
            Err(detail) => {
                self.render_state = RenderState::Errored;
                self.last_error = Some(detail);
            }
        }
    }

    pub fn export_file_name(&self) -> String {
        export_file_name(&self.title)
    }
}

/// `STORYBOARD_<first 20 chars of title, whitespace runs as "_">.png`
pub fn export_file_name(title: &str) -> String {
    let truncated: String = title.chars().take(20).collect();
    let mut normalized = String::with_capacity(truncated.len());
    let mut in_whitespace = false;
    for ch in truncated.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                normalized.push('_');
            }
            in_whitespace = true;
        } else {
            in_whitespace = false;
            let safe = if matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '-'
            } else {
                ch
            };
            normalized.push(safe);
        }
    }
    format!("STORYBOARD_{normalized}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_name_truncates_then_collapses_whitespace() {
        assert_eq!(
            export_file_name("HERO & INCLUDED"),
            "STORYBOARD_HERO_&_INCLUDED.png"
        );
        assert_eq!(
            export_file_name("WHAT'S INCLUDED / KNOLLING"),
            "STORYBOARD_WHAT'S_INCLUDED_-_KN.png"
        );
        assert_eq!(export_file_name("a  \t b"), "STORYBOARD_a_b.png");
    }

    #[test]
    fn prompt_edit_keeps_rendered_image() {
        let mut scene = Scene::new(1, "Hero", "first");
        scene.begin_render();
        scene.finish_render(Ok(RenderedImage::new("image/png", vec![1u8, 2, 3])));
        assert_eq!(scene.render_state, RenderState::Rendered);

        scene.set_prompt("second");
        assert_eq!(scene.prompt, "second");
        assert!(scene.image.is_some());
        assert_eq!(scene.render_state, RenderState::Rendered);
        assert_eq!(scene.image.as_ref().unwrap().data.as_ref(), &[1u8, 2, 3][..]);
    }

    #[test]
    fn failed_render_is_recoverable_and_keeps_previous_image() {
        let mut scene = Scene::new(2, "Ritual", "prompt");
        scene.finish_render(Ok(RenderedImage::new("image/png", vec![9u8])));
        scene.begin_render();
        assert!(scene.is_busy());
        scene.finish_render(Err("no image".to_string()));
        assert_eq!(scene.render_state, RenderState::Errored);
        assert_eq!(scene.last_error.as_deref(), Some("no image"));
        assert!(scene.image.is_some());
        assert!(!scene.is_busy());

        scene.begin_render();
        assert_eq!(scene.last_error, None);
        scene.finish_render(Ok(RenderedImage::new("image/png", vec![7u8])));
        assert_eq!(scene.render_state, RenderState::Rendered);
    }

    #[test]
    fn suggestion_cycle_returns_to_idle() {
        let mut scene = Scene::new(3, "Grid", "old");
        scene.begin_suggesting();
        assert!(scene.is_busy());
        scene.finish_suggesting(None);
        assert_eq!(scene.suggestion_state, SuggestionState::Idle);
        assert_eq!(scene.prompt, "old");
        scene.begin_suggesting();
        scene.finish_suggesting(Some("new".to_string()));
        assert_eq!(scene.prompt, "new");
    }
}
