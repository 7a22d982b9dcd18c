//! Image prompt planning for AI-generated images.

use crate::config::{prompts, ImagePlan, ImageSection, TopicConfig};
use crate::error::{PosterError, Result};
use crate::generation::Script;
use crate::openai::{create_client, first_message};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

/// Render one shot template for a subject.
///
/// `{subject}` is replaced everywhere. The base style fills `{base_style}`
/// when the template has that placeholder, and is appended otherwise.
pub fn render_shot(template: &str, subject: &str, base_style: &str) -> String {
    let rendered = template.replace("{subject}", subject);
    if rendered.contains("{base_style}") {
        rendered.replace("{base_style}", base_style)
    } else if base_style.is_empty() {
        rendered
    } else {
        format!("{}, {}", rendered, base_style)
    }
}

/// One prompt per shot template, in template order.
pub fn templated_prompts(image: &ImageSection, subject: &str) -> Vec<String> {
    image
        .plan
        .shots()
        .iter()
        .map(|shot| render_shot(&shot.template, subject, &image.base_style))
        .collect()
}

/// Derives context-specific image prompts from a narrative.
#[async_trait]
pub trait ScenePrompter: Send + Sync {
    async fn scene_prompts(
        &self,
        topic: &TopicConfig,
        instructions: &str,
        subject: &str,
        script: &Script,
        count: usize,
    ) -> Result<Vec<String>>;
}

/// Resolve the prompt list for a topic's image plan.
///
/// AI-generated plans fall back to the templated list when the prompter
/// fails or returns nothing.
pub async fn plan_image_prompts(
    prompter: &dyn ScenePrompter,
    topic: &TopicConfig,
    subject: &str,
    script: &Script,
    count: usize,
) -> Vec<String> {
    let ImagePlan::AiGenerated { instructions, .. } = &topic.image.plan else {
        return templated_prompts(&topic.image, subject);
    };

    match prompter.scene_prompts(topic, instructions, subject, script, count).await {
        Ok(generated) if !generated.is_empty() => {
            info!("Generated {} scene prompts", generated.len());
            generated
                .into_iter()
                .map(|p| with_style(&p, &topic.image.base_style))
                .collect()
        }
        Ok(_) => {
            warn!("Scene prompter returned no prompts, using shot templates");
            templated_prompts(&topic.image, subject)
        }
        Err(e) => {
            warn!("Scene prompt generation failed, using shot templates: {}", e);
            templated_prompts(&topic.image, subject)
        }
    }
}

fn with_style(prompt: &str, base_style: &str) -> String {
    if base_style.is_empty() {
        prompt.trim().to_string()
    } else {
        format!("{}, {}", prompt.trim().trim_end_matches(['.', ',']), base_style)
    }
}

#[derive(Debug, Deserialize)]
struct ScenePromptResponse {
    prompts: Vec<String>,
}

/// Parse a `{"prompts": [...]}` response, dropping blank entries.
pub(crate) fn parse_scene_prompts(raw: &str) -> Result<Vec<String>> {
    let parsed: ScenePromptResponse = serde_json::from_str(raw.trim()).map_err(|e| {
        PosterError::Generation(format!("Scene prompt response is not valid JSON: {}", e))
    })?;

    Ok(parsed
        .prompts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

/// Scene prompter using chat completions in JSON mode.
pub struct OpenAIScenePrompter {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIScenePrompter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

#[async_trait]
impl ScenePrompter for OpenAIScenePrompter {
    async fn scene_prompts(
        &self,
        topic: &TopicConfig,
        instructions: &str,
        subject: &str,
        script: &Script,
        count: usize,
    ) -> Result<Vec<String>> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instructions)
                .build()
                .map_err(|e| PosterError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompts::scene_prompt(subject, &script.text, count))
                .build()
                .map_err(|e| PosterError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&topic.story.model)
            .messages(messages)
            .temperature(0.8)
            .max_completion_tokens(1500u32)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| PosterError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PosterError::Service(format!("Scene prompt call failed: {}", e)))?;

        let content = first_message(response)
            .ok_or_else(|| PosterError::Generation("Empty scene prompt response".to_string()))?;

        parse_scene_prompts(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct BrokenPrompter;

    #[async_trait]
    impl ScenePrompter for BrokenPrompter {
        async fn scene_prompts(
            &self,
            _topic: &TopicConfig,
            _instructions: &str,
            _subject: &str,
            _script: &Script,
            _count: usize,
        ) -> Result<Vec<String>> {
            Err(PosterError::Service("offline".to_string()))
        }
    }

    struct EchoPrompter;

    #[async_trait]
    impl ScenePrompter for EchoPrompter {
        async fn scene_prompts(
            &self,
            _topic: &TopicConfig,
            _instructions: &str,
            subject: &str,
            _script: &Script,
            count: usize,
        ) -> Result<Vec<String>> {
            Ok((0..count).map(|i| format!("{} scene {}.", subject, i)).collect())
        }
    }

    #[test]
    fn test_templated_prompts_substitute_subject_and_style() {
        let topic = TopicConfig::load("cars", Path::new("/nonexistent")).unwrap();
        let subject = "1994-2001 Acura Integra Type R";
        let prompts = templated_prompts(&topic.image, subject);

        assert_eq!(prompts.len(), topic.shot_count());
        for (prompt, shot) in prompts.iter().zip(topic.image.plan.shots()) {
            assert!(prompt.contains(subject));
            assert!(!prompt.contains("{subject}"));
            assert!(prompt.contains(&topic.image.base_style));
            assert_eq!(
                prompt.matches(subject).count(),
                shot.template.matches("{subject}").count()
            );
        }
    }

    #[test]
    fn test_render_shot_placeholder_and_append() {
        assert_eq!(render_shot("{subject}, side view", "Miata", "4k"), "Miata, side view, 4k");
        assert_eq!(
            render_shot("{subject} at night, {base_style}", "Miata", "4k"),
            "Miata at night, 4k"
        );
        assert_eq!(render_shot("{subject}", "Miata", ""), "Miata");
    }

    #[test]
    fn test_parse_scene_prompts() {
        let prompts = parse_scene_prompts(r#"{"prompts": ["a ship", "  ", "a moon"]}"#).unwrap();
        assert_eq!(prompts, vec!["a ship", "a moon"]);
        assert!(parse_scene_prompts(r#"{"images": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_ai_plan_falls_back_to_templates() {
        let topic = TopicConfig::load("alien_stories", Path::new("/nonexistent")).unwrap();
        let script = Script::new("The lights came back.");
        let prompts = plan_image_prompts(&BrokenPrompter, &topic, "The Visitor", &script, 6).await;
        assert_eq!(prompts, templated_prompts(&topic.image, "The Visitor"));
    }

    #[tokio::test]
    async fn test_ai_plan_appends_base_style() {
        let topic = TopicConfig::load("alien_stories", Path::new("/nonexistent")).unwrap();
        let script = Script::new("The lights came back.");
        let prompts = plan_image_prompts(&EchoPrompter, &topic, "The Visitor", &script, 2).await;
        assert_eq!(prompts.len(), 2);
        assert_eq!(
            prompts[0],
            format!("The Visitor scene 0, {}", topic.image.base_style)
        );
    }
}
