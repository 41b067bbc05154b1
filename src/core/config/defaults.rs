use std::time::Duration;

use crate::core::config::data::Config;

impl Config {
    /// Key of the model used at startup and by `/model reset`: the configured
    /// `default_model`, else the first model key.
    pub fn default_model_key(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.models.keys().next().map(String::as_str))
    }

    /// Maps a model key to its id. Unknown keys are passed through unchanged
    /// so a bare model id also works as a default.
    pub fn resolve_model(&self, key: &str) -> String {
        self.models
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    pub fn default_model_id(&self) -> String {
        self.default_model_key()
            .map(|key| self.resolve_model(key))
            .unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
