//! OpenAI-backed idea and script generation.

use super::{parse_concept, Concept, IdeaGenerator, Script, ScriptWriter};
use crate::config::{prompts, TopicConfig};
use crate::error::{PosterError, Result};
use crate::openai::{create_client, first_message};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

const MAX_COMPLETION_TOKENS: u32 = 1000;

/// Idea generator using chat completions in JSON mode.
pub struct OpenAIIdeaGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIIdeaGenerator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

#[async_trait]
impl IdeaGenerator for OpenAIIdeaGenerator {
    #[instrument(skip(self, topic), fields(topic = %topic.name, model = %topic.idea.model))]
    async fn generate_idea(&self, topic: &TopicConfig) -> Result<Concept> {
        let prompt = prompts::idea_prompt(&topic.idea);
        debug!("Idea prompt is {} characters", prompt.len());

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PosterError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&topic.idea.model)
            .messages(messages)
            .temperature(topic.idea.temperature)
            .top_p(0.95)
            .frequency_penalty(1.0)
            .presence_penalty(0.5)
            .max_completion_tokens(MAX_COMPLETION_TOKENS)
            .n(1)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| PosterError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PosterError::Service(format!("Idea generation call failed: {}", e)))?;

        let content = first_message(response)
            .ok_or_else(|| PosterError::Generation("Empty idea response".to_string()))?;

        let concept = parse_concept(&content, &topic.idea.subject_key, &topic.idea.concept_key)?;
        info!("Generated idea: {}", concept.subject);
        Ok(concept)
    }
}

/// Script writer using chat completions.
pub struct OpenAIScriptWriter {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIScriptWriter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

#[async_trait]
impl ScriptWriter for OpenAIScriptWriter {
    #[instrument(skip(self, concept, topic), fields(topic = %topic.name, model = %topic.story.model))]
    async fn write_script(&self, concept: &Concept, topic: &TopicConfig) -> Result<Script> {
        let prompt = prompts::story_prompt(&topic.story, &concept.hook);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PosterError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&topic.story.model)
            .messages(messages)
            .temperature(topic.story.temperature)
            .top_p(0.90)
            .frequency_penalty(1.2)
            .max_completion_tokens(MAX_COMPLETION_TOKENS)
            .n(1)
            .build()
            .map_err(|e| PosterError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PosterError::Service(format!("Script writing call failed: {}", e)))?;

        let text = first_message(response)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PosterError::Generation("Empty script response".to_string()))?;

        let script = Script::new(text);
        if let Some(max_words) = topic.story.max_words {
            if script.word_count() > max_words as usize {
                debug!(
                    "Script has {} words, above the requested {}",
                    script.word_count(),
                    max_words
                );
            }
        }

        Ok(script)
    }
}
