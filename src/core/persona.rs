use serde::{Deserialize, Serialize};

pub const DEFAULT_PROMPT_PREFIX: &str = "you are ";
pub const DEFAULT_PROMPT_SUFFIX: &str =
    ". speak in the first person and never break character. keep your responses relatively brief and to the point.";
pub const DEFAULT_PERSONALITY: &str =
    "an open source AI chatbot named Ollamarama, powered by Ollama.";

/// User turn sent after installing a new system prompt.
pub const INTRODUCTION_REQUEST: &str = "introduce yourself";

/// Two-part wrapper spliced around a persona to build a system prompt.
///
/// Serialized as a two-element array, `["you are ", ". stay in character."]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct PersonaTemplate {
    pub prefix: String,
    pub suffix: String,
}

impl PersonaTemplate {
    /// Create a template from its prefix and suffix
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Build the system prompt for `persona`
    ///
    /// The persona is inserted verbatim; no trimming or punctuation is added.
    pub fn render(&self, persona: &str) -> String {
        format!("{}{}{}", self.prefix, persona, self.suffix)
    }
}

impl Default for PersonaTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_PREFIX, DEFAULT_PROMPT_SUFFIX)
    }
}

impl From<(String, String)> for PersonaTemplate {
    fn from((prefix, suffix): (String, String)) -> Self {
        Self { prefix, suffix }
    }
}

impl From<PersonaTemplate> for (String, String) {
    fn from(template: PersonaTemplate) -> Self {
        (template.prefix, template.suffix)
    }
}

/// Where the active system prompt came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Persona spliced into the configured template.
    Persona(String),
    /// System prompt supplied verbatim by the user.
    Custom(String),
    /// No system prompt at all.
    Stock,
}

impl PromptSource {
    /// Resolve the system prompt text, if any
    ///
    /// Blank personas and custom prompts resolve to `None`, so callers can
    /// clear the conversation without installing an empty system message.
    pub fn system_prompt(&self, template: &PersonaTemplate) -> Option<String> {
        match self {
            PromptSource::Persona(persona) if !persona.trim().is_empty() => {
                Some(template.render(persona))
            }
            PromptSource::Custom(prompt) if !prompt.trim().is_empty() => Some(prompt.clone()),
            _ => None,
        }
    }
}
