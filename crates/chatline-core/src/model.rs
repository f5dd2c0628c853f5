//! Model selection.
//!
//! The visible selector mirrors its choice into a hidden field; the session
//! only ever reads the hidden field when it builds a request.

use tokio::sync::watch;

/// Used when no selector is attached.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Groq,
    Gemini,
    DeepSeek,
}

impl ModelFamily {
    pub fn all() -> Vec<ModelFamily> {
        vec![ModelFamily::Groq, ModelFamily::Gemini, ModelFamily::DeepSeek]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::Groq => "Groq",
            ModelFamily::Gemini => "Gemini (Google)",
            ModelFamily::DeepSeek => "DeepSeek",
        }
    }

    pub fn models(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::Groq => &[
                "llama-3.3-70b-versatile",
                "llama-3.1-8b-instant",
                "gemma2-9b-it",
                "meta-llama/llama-4-maverick-17b-128e-instruct",
            ],
            ModelFamily::Gemini => &[
                "gemini-2.5-flash-preview-04-17",
                "gemini-2.5-pro-exp-03-25",
            ],
            ModelFamily::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
        }
    }

    /// Family of a known model id, if any.
    pub fn for_model(model: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|family| family.models().contains(&model))
    }
}

/// Every model the stock chat endpoint routes.
pub fn known_models() -> Vec<String> {
    ModelFamily::all()
        .iter()
        .flat_map(|family| family.models().iter().map(|m| m.to_string()))
        .collect()
}

/// The hidden field read by the session.
#[derive(Debug, Clone, Default)]
pub struct SelectedModel {
    field: Option<watch::Receiver<String>>,
}

impl SelectedModel {
    /// No selector attached; always yields [`DEFAULT_MODEL`].
    pub fn detached() -> Self {
        Self { field: None }
    }

    pub fn current(&self) -> String {
        match &self.field {
            Some(rx) => rx.borrow().clone(),
            None => DEFAULT_MODEL.to_string(),
        }
    }
}

/// The visible selection control.
pub struct ModelSelector {
    choices: Vec<String>,
    selected: usize,
    field: watch::Sender<String>,
}

impl ModelSelector {
    /// Build a selector over `choices`, preselecting `initial` when it is one
    /// of them (otherwise it is added as the first choice).
    pub fn new(mut choices: Vec<String>, initial: Option<&str>) -> Self {
        if choices.is_empty() {
            choices.push(DEFAULT_MODEL.to_string());
        }
        let selected = match initial {
            Some(model) => match choices.iter().position(|c| c == model) {
                Some(idx) => idx,
                None => {
                    choices.insert(0, model.to_string());
                    0
                }
            },
            None => 0,
        };
        let (field, _rx) = watch::channel(choices[selected].clone());
        Self {
            choices,
            selected,
            field,
        }
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn value(&self) -> &str {
        &self.choices[self.selected]
    }

    /// Select the choice at `idx` and mirror it into the hidden field.
    /// Out-of-range indexes are ignored.
    pub fn select(&mut self, idx: usize) -> Option<&str> {
        let value = self.choices.get(idx)?.clone();
        self.selected = idx;
        self.field.send_replace(value);
        Some(self.value())
    }

    /// Hidden field handle for the session.
    pub fn hidden_field(&self) -> SelectedModel {
        SelectedModel {
            field: Some(self.field.subscribe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_field_uses_default() {
        assert_eq!(SelectedModel::detached().current(), DEFAULT_MODEL);
        assert_eq!(SelectedModel::default().current(), DEFAULT_MODEL);
    }

    #[test]
    fn test_selection_is_mirrored_into_hidden_field() {
        let mut selector = ModelSelector::new(known_models(), None);
        let field = selector.hidden_field();
        assert_eq!(field.current(), "llama-3.3-70b-versatile");

        let idx = selector
            .choices()
            .iter()
            .position(|m| m == "deepseek-chat")
            .unwrap();
        assert_eq!(selector.select(idx), Some("deepseek-chat"));
        assert_eq!(field.current(), "deepseek-chat");
    }

    #[test]
    fn test_out_of_range_select_is_ignored() {
        let mut selector = ModelSelector::new(vec!["a".into(), "b".into()], Some("b"));
        assert_eq!(selector.value(), "b");
        assert_eq!(selector.select(7), None);
        assert_eq!(selector.value(), "b");
    }

    #[test]
    fn test_unknown_initial_model_is_kept() {
        let selector = ModelSelector::new(known_models(), Some("my-local-model"));
        assert_eq!(selector.value(), "my-local-model");
        assert_eq!(selector.hidden_field().current(), "my-local-model");
        assert_eq!(ModelFamily::for_model("my-local-model"), None);
        assert_eq!(ModelFamily::for_model("gemma2-9b-it"), Some(ModelFamily::Groq));
    }
}
