//! Model configuration handed to a provider per completion call.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
}

impl ModelConfig {
    pub fn new<S: Into<String>>(model_name: S) -> Self {
        ModelConfig {
            model_name: model_name.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::new(DEFAULT_MODEL)
    }
}
