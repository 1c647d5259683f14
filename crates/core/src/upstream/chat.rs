use crate::config::LanguageModelConfig;
use crate::models::{ChatCompletion, ChatMessage};
use crate::traits::LanguageModel;
use crate::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{build_client, read_json};

const SERVICE: &str = "chat-completions";

/// OpenAI-compatible chat-completions endpoint, such as a Gaia node.
pub struct ChatCompletionsModel {
    url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl ChatCompletionsModel {
    pub fn new(config: &LanguageModelConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client: build_client(SERVICE, config.timeout)?,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, GatewayError> {
        let mut request = self.client.post(&self.url).json(&json!({
            "messages": messages,
            "model": self.model,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::from_transport(SERVICE, error))?;
        read_json(SERVICE, response).await
    }
}
