//! The conversation session: active model, options, persona, and routing of
//! each turn through the plain or tool-aware reply pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::chat_client::ChatBackend;
use crate::core::config::Config;
use crate::core::error::{ChatError, ValidationError};
use crate::core::history::ConversationHistory;
use crate::core::message::Message;
use crate::core::options::{ModelOptions, OptionKind};
use crate::core::orchestrator::{ToolOrchestrator, TurnOutcome};
use crate::core::persona::{PersonaTemplate, PromptSource, INTRODUCTION_REQUEST};
use crate::core::reply::{show_whole_reply, stream_reply, ResponseEnd, ResponseView, VisibleReply};
use crate::tools::ToolRegistry;

/// Startup values for a [`SessionController`]. Options given here also become
/// the defaults restored by `reset`.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub models: BTreeMap<String, String>,
    pub default_model: String,
    pub options: ModelOptions,
    pub template: PersonaTemplate,
    pub personality: String,
    /// Verbatim system prompt that replaces the persona at startup and on
    /// every `reset`.
    pub custom_prompt: Option<String>,
    pub tools_enabled: bool,
    pub streaming: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            models: config.models.clone(),
            default_model: config.default_model_id(),
            options: config.options,
            template: config.prompt.clone(),
            personality: config.personality.clone(),
            custom_prompt: None,
            tools_enabled: false,
            streaming: true,
        }
    }

    /// Points the default model at `name`, matched with [`match_model`].
    pub fn select_model(&mut self, name: &str) -> Result<(), ValidationError> {
        self.default_model = match_model(&self.models, name)?;
        Ok(())
    }

    fn startup_prompt(&self) -> PromptSource {
        match &self.custom_prompt {
            Some(prompt) => PromptSource::Custom(prompt.clone()),
            None => PromptSource::Persona(self.personality.clone()),
        }
    }
}

fn shorten_model_name(name: &str) -> &str {
    name.strip_suffix(":latest").unwrap_or(name)
}

/// Resolves a user-supplied model name to a model id.
///
/// Accepts a configured key, a key with its `:latest` suffix dropped, or one
/// of the configured ids.
pub fn match_model(models: &BTreeMap<String, String>, name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if let Some(id) = models.get(name) {
        return Ok(id.clone());
    }
    if let Some((_, id)) = models
        .iter()
        .find(|(key, _)| shorten_model_name(key) == name)
    {
        return Ok(id.clone());
    }
    if models.values().any(|id| id == name) {
        return Ok(name.to_string());
    }

    Err(ValidationError::UnknownModel {
        name: name.to_string(),
        available: models.keys().cloned().collect::<Vec<_>>().join(", "),
    })
}

pub struct SessionController<V: ResponseView> {
    backend: Arc<dyn ChatBackend>,
    registry: ToolRegistry,
    history: ConversationHistory,
    models: BTreeMap<String, String>,
    default_model: String,
    model: String,
    default_options: ModelOptions,
    options: ModelOptions,
    template: PersonaTemplate,
    personality: String,
    startup_prompt: PromptSource,
    tools_enabled: bool,
    streaming: bool,
    view: V,
}

impl<V: ResponseView> SessionController<V> {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: ToolRegistry,
        settings: SessionSettings,
        view: V,
    ) -> Self {
        let startup_prompt = settings.startup_prompt();
        Self {
            backend,
            registry,
            history: ConversationHistory::new(),
            models: settings.models,
            model: settings.default_model.clone(),
            default_model: settings.default_model,
            default_options: settings.options,
            options: settings.options,
            template: settings.template,
            personality: settings.personality,
            startup_prompt,
            tools_enabled: settings.tools_enabled,
            streaming: settings.streaming,
            view,
        }
    }

    /// Restores the configured model and options, then reinstalls the
    /// startup persona or custom prompt and asks for an introduction.
    pub async fn reset(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnOutcome>, ChatError> {
        info!(model = %self.default_model, "Bot reset");
        self.model = self.default_model.clone();
        self.options = self.default_options;
        let source = self.startup_prompt.clone();
        self.install_prompt(source, cancel).await
    }

    pub async fn set_persona(
        &mut self,
        persona: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnOutcome>, ChatError> {
        if !persona.trim().is_empty() {
            info!("Persona set to {persona}");
        }
        self.install_prompt(PromptSource::Persona(persona.to_string()), cancel)
            .await
    }

    pub async fn set_custom_prompt(
        &mut self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnOutcome>, ChatError> {
        if !prompt.trim().is_empty() {
            info!("Custom system prompt set: {prompt}");
        }
        self.install_prompt(PromptSource::Custom(prompt.to_string()), cancel)
            .await
    }

    /// Drops the system prompt and the conversation.
    pub fn stock(&mut self) {
        self.history.clear();
        info!("Stock model settings applied");
        self.view.notice("Stock model settings applied");
    }

    async fn install_prompt(
        &mut self,
        source: PromptSource,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnOutcome>, ChatError> {
        self.history.clear();
        let Some(prompt) = source.system_prompt(&self.template) else {
            return Ok(None);
        };

        self.history.append(Message::system(prompt));
        self.history.append(Message::user(INTRODUCTION_REQUEST));
        self.respond(cancel).await.map(Some)
    }

    pub fn change_model(&mut self, name: &str) -> Result<&str, ValidationError> {
        match match_model(&self.models, name) {
            Ok(id) => {
                self.model = id;
                info!("Model changed to {}", self.model);
                self.view.notice(&format!("Model set to {}", self.model));
                Ok(&self.model)
            }
            Err(err) => {
                self.view.error(&err.to_string());
                Err(err)
            }
        }
    }

    pub fn reset_model(&mut self) -> &str {
        self.model = self.default_model.clone();
        info!("Model changed to {}", self.model);
        self.view.notice(&format!("Model set to {}", self.model));
        &self.model
    }

    pub fn change_option(&mut self, kind: OptionKind, raw: &str) -> Result<f64, ValidationError> {
        let result = kind
            .parse_value(raw)
            .and_then(|value| self.options.set(kind, value).map(|()| value));
        match &result {
            Ok(value) => {
                info!(option = kind.name(), value, "Option changed");
                self.view.notice(&format!("{kind} set to {value}"));
            }
            Err(err) => self.view.error(&err.to_string()),
        }
        result
    }

    pub fn change_option_by_name(&mut self, name: &str, raw: &str) -> Result<f64, ValidationError> {
        match name.parse::<OptionKind>() {
            Ok(kind) => self.change_option(kind, raw),
            Err(err) => {
                self.view.error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Flips routing between the plain and tool-aware pipelines. Returns the
    /// new state.
    pub fn toggle_tools(&mut self) -> bool {
        self.tools_enabled = !self.tools_enabled;
        let message = if self.tools_enabled {
            format!("Tools enabled ({} available)", self.registry.len())
        } else {
            "Tools disabled".to_string()
        };
        info!(enabled = self.tools_enabled, "{message}");
        self.view.notice(&message);
        self.tools_enabled
    }

    /// Sends one user message and displays the reply.
    pub async fn send(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        self.history.append(Message::user(text));
        self.history.trim();
        info!("User: {text}");
        self.respond(cancel).await
    }

    async fn respond(&mut self, cancel: &CancellationToken) -> Result<TurnOutcome, ChatError> {
        let result = if self.tools_enabled {
            ToolOrchestrator::new(self.backend.as_ref(), &self.registry)
                .run(
                    &mut self.history,
                    &self.model,
                    &self.options,
                    &mut self.view,
                    cancel,
                )
                .await
        } else {
            self.plain_reply(cancel).await
        };

        match result {
            Ok(outcome) => {
                info!("Bot: {}", outcome.reply.text);
                Ok(outcome)
            }
            Err(err) => {
                error!(model = %self.model, error = %err, "Failed to get response");
                self.view.error(&format!("Failed to get response: {err}"));
                Err(err)
            }
        }
    }

    async fn plain_reply(&mut self, cancel: &CancellationToken) -> Result<TurnOutcome, ChatError> {
        let reply = if self.streaming {
            let stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                stream = self.backend.chat_stream(&self.model, self.history.messages(), &self.options) => Some(stream?),
            };
            match stream {
                Some(stream) => stream_reply(stream, &mut self.view, cancel).await?,
                None => self.interrupted_before_reply(),
            }
        } else {
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                text = self.backend.chat(&self.model, self.history.messages(), &self.options) => Some(text?),
            };
            match text {
                Some(text) => show_whole_reply(&text, &mut self.view),
                None => self.interrupted_before_reply(),
            }
        };

        if reply.should_persist() {
            self.history.append(Message::assistant(reply.text.clone()));
        }
        self.history.trim();
        Ok(TurnOutcome::plain(reply))
    }

    fn interrupted_before_reply(&mut self) -> VisibleReply {
        info!("Request interrupted by user");
        self.view.begin_response();
        self.view.end_response("", ResponseEnd::Interrupted);
        VisibleReply {
            text: String::new(),
            interrupted: true,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn models(&self) -> &BTreeMap<String, String> {
        &self.models
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn default_options(&self) -> &ModelOptions {
        &self.default_options
    }

    pub fn personality(&self) -> &str {
        &self.personality
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }
}
