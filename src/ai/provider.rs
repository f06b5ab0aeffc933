use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::ai::AiError;
use crate::config::AppConfig;

/// Sampling parameters fixed by the assistant design.
const TEMPERATURE: f32 = 0.7;
const MAX_RESPONSE_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation, provider-agnostic.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Boundary to the external LLM API. Faked in tests.
#[async_trait]
pub trait AiProvider: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;

    /// Single-shot completion; `None` when the API returns no content.
    async fn complete(&self, turns: Vec<ChatTurn>) -> Result<Option<String>, AiError>;

    /// Token-streamed completion. Each received item is one incremental
    /// text fragment; the channel closes when the stream ends.
    async fn complete_stream(
        &self,
        turns: Vec<ChatTurn>,
    ) -> Result<mpsc::Receiver<Result<String, AiError>>, AiError>;
}

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiProvider {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
        if let Some(base) = &config.openai_api_base {
            openai_config = openai_config.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai_config),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }
}

fn to_request_messages(turns: Vec<ChatTurn>) -> Result<Vec<ChatCompletionRequestMessage>, AiError> {
    turns
        .into_iter()
        .map(|turn| {
            let message = match turn.role {
                ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content)
                    .build()
                    .map(ChatCompletionRequestMessage::from),
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content)
                    .build()
                    .map(ChatCompletionRequestMessage::from),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content)
                    .build()
                    .map(ChatCompletionRequestMessage::from),
            };
            message.map_err(|err| AiError::Completion(err.to_string()))
        })
        .collect()
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(text)
            .build()
            .map_err(|err| AiError::Embedding(err.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|err| AiError::Embedding(err.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| AiError::Embedding("no embedding returned".to_string()))?;

        Ok(embedding)
    }

    async fn complete(&self, turns: Vec<ChatTurn>) -> Result<Option<String>, AiError> {
        let messages = to_request_messages(turns)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_RESPONSE_TOKENS)
            .build()
            .map_err(|err| AiError::Completion(err.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|err| AiError::Completion(err.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        Ok(content.filter(|text| !text.is_empty()))
    }

    async fn complete_stream(
        &self,
        turns: Vec<ChatTurn>,
    ) -> Result<mpsc::Receiver<Result<String, AiError>>, AiError> {
        let messages = to_request_messages(turns)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .temperature(TEMPERATURE)
            .stream(true)
            .build()
            .map_err(|err| AiError::Completion(err.to_string()))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|err| AiError::Completion(err.to_string()))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(response) => {
                        let delta = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone());
                        if let Some(delta) = delta {
                            if !delta.is_empty() && tx.send(Ok(delta)).await.is_err() {
                                // Receiver dropped; consumer stopped pulling.
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(AiError::Completion(err.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
