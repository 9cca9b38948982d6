//! services/api/src/adapters/reasoning_llm.rs
//!
//! This module contains the adapter for the chat reasoning providers.
//! It implements the `ReasoningService` port from the `core` crate over any
//! OpenAI-compatible chat completions endpoint. Primary and fallback providers
//! are two instances of this adapter with their own client and model.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use chitchat_core::ports::{OutputSchema, PortError, PortResult, Prompt, ReasoningService};
use serde_json::Value;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ReasoningService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiReasoningAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReasoningAdapter {
    /// Creates a new `OpenAiReasoningAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn messages(prompt: &Prompt) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.clone())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.clone())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ])
    }

    async fn first_content(
        &self,
        request: async_openai::types::CreateChatCompletionRequest,
    ) -> PortResult<String> {
        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::Unexpected(format!("Model {} returned no choices in its response.", self.model))
        })?;
        choice.message.content.ok_or_else(|| {
            PortError::Unexpected(format!("Model {} response contained no text content.", self.model))
        })
    }
}

//=========================================================================================
// `ReasoningService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReasoningService for OpenAiReasoningAdapter {
    async fn complete_structured(&self, prompt: &Prompt, schema: &OutputSchema) -> PortResult<Value> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(prompt)?)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema.name.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: Some(true),
                },
            })
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let content = self.first_content(request).await?;
        debug!("Structured reply from {}: {}", self.model, content);
        serde_json::from_str(&content)
            .map_err(|e| PortError::Unexpected(format!("Structured reply is not JSON: {}", e)))
    }

    async fn complete(&self, prompt: &Prompt) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(prompt)?)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.first_content(request).await
    }
}
