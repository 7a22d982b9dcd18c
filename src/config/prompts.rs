//! Prompt construction for the generation stages.
//!
//! Topic-specific text comes from [`TopicConfig`](super::TopicConfig); the
//! fixed scaffolding around it lives here.

use super::topic::{IdeaSection, ScriptStructure, StorySection};
use std::collections::HashMap;

/// User-message template for deriving image prompts from a script.
pub const SCENE_PROMPT_TEMPLATE: &str = r#"Subject: {{subject}}

Story script:
{{script}}

Write exactly {{count}} image prompts that follow the story in order, one per narrated sentence.
Each prompt must stand on its own and mention the subject where it appears in the shot.

Respond with a JSON object of the form {"prompts": ["...", "..."]} and nothing else."#;

/// Render a `{{name}}` style template with the given variables.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Build the idea generation prompt.
pub fn idea_prompt(section: &IdeaSection) -> String {
    let mut prompt = format!("# ROLE:\n{}\n\n", section.role.trim());
    prompt.push_str(&format!("# TASK:\n{}\n\n", section.task.trim()));

    if let Some(characteristics) = &section.output_characteristics {
        prompt.push_str(&format!("# OUTPUT CHARACTERISTICS:\n{}\n\n", characteristics.trim()));
    }

    if !section.examples.is_empty() {
        prompt.push_str("# EXAMPLES:\n\n");
        for (i, example) in section.examples.iter().enumerate() {
            prompt.push_str(&format!("## Example {}:\n{}\n\n", i + 1, example));
        }
    }

    prompt
}

/// Build the script writing prompt for a concept.
pub fn story_prompt(section: &StorySection, concept: &str) -> String {
    let mut prompt = format!("# ROLE:\n{}\n\n", section.role.trim());

    prompt.push_str("# TASK:\n");
    prompt.push_str(&format!(
        "Write a {}-second video script based on the following concept: \"{}\".\n\n",
        section.duration_seconds, concept
    ));

    match &section.structure {
        Some(ScriptStructure::Steps(steps)) => {
            prompt.push_str("Use this structure:\n");
            for step in steps {
                prompt.push_str(&format!("- {}\n", step));
            }
            prompt.push('\n');
        }
        Some(ScriptStructure::Text(text)) => {
            prompt.push_str("Use this structure:\n");
            prompt.push_str(text.trim());
            prompt.push_str("\n\n");
        }
        None => {}
    }

    if let Some(instructions) = &section.instructions {
        prompt.push_str(&format!("# INSTRUCTIONS:\n{}\n\n", instructions.trim()));
    }

    if let Some(characteristics) = &section.output_characteristics {
        prompt.push_str(&format!("# OUTPUT CHARACTERISTICS:\n{}\n\n", characteristics.trim()));
    }

    if let Some(tone) = &section.tone {
        prompt.push_str(&format!("Tone: {}\n", tone));
    }

    if let Some(max_words) = section.max_words {
        prompt.push_str(&format!("Max words: {}\n", max_words));
    }

    if !section.examples.is_empty() {
        prompt.push_str("\n# EXAMPLES:\n");
        for example in &section.examples {
            prompt.push_str(&format!("{}\n\n", example));
        }
    }

    prompt
}

/// Build the user message asking for `count` scene prompts.
pub fn scene_prompt(subject: &str, script: &str, count: usize) -> String {
    let mut vars = HashMap::new();
    vars.insert("subject".to_string(), subject.to_string());
    vars.insert("script".to_string(), script.trim().to_string());
    vars.insert("count".to_string(), count.to_string());
    render(SCENE_PROMPT_TEMPLATE, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicConfig;
    use std::path::Path;

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        assert_eq!(render(template, &vars), "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_idea_prompt_sections() {
        let topic = TopicConfig::load("cars", Path::new("/nonexistent")).unwrap();
        let prompt = idea_prompt(&topic.idea);

        assert!(prompt.starts_with("# ROLE:\n"));
        assert!(prompt.contains("# TASK:\n"));
        assert!(prompt.contains("# OUTPUT CHARACTERISTICS:"));
        assert!(prompt.contains("## Example 1:"));
        assert!(prompt.contains("## Example 2:"));
    }

    #[test]
    fn test_story_prompt_includes_concept_and_ceiling() {
        let topic = TopicConfig::load("cars", Path::new("/nonexistent")).unwrap();
        let prompt = story_prompt(&topic.story, "The forgotten rotary");

        assert!(prompt.contains("Write a 60-second video script"));
        assert!(prompt.contains("\"The forgotten rotary\""));
        assert!(prompt.contains("- Hook: one line that stops the scroll"));
        assert!(prompt.contains("Max words: 150"));
        assert!(prompt.contains("Tone: "));
    }

    #[test]
    fn test_scene_prompt() {
        let prompt = scene_prompt("Route 375", "It was late. The radio hissed.", 2);
        assert!(prompt.contains("Subject: Route 375"));
        assert!(prompt.contains("exactly 2 image prompts"));
        assert!(!prompt.contains("{{"));
    }
}
