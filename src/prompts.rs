//! Prompt templates sent to the text-generation service.
//!
//! The wording here is not load-bearing: the post-processing rule sets in
//! [`crate::pipeline::postprocess`] clean up whatever comes back. Keeping
//! the templates in one place lets unit tests inspect them without a model.

/// Fixed style qualifier prepended to every image prompt before it is sent.
pub const ILLUSTRATION_STYLE: &str = "colorful children's book illustration style";

/// Image prompt used when the model returns nothing usable.
pub const FALLBACK_IMAGE_PROMPT: &str = "A colorful children's book illustration";

/// Ask for a short noun-phrase chapter title.
pub fn title_prompt(source: &str) -> String {
    format!(
        r#"Create a short, descriptive chapter title for a children's storybook based on the text below.

Rules:
1. Use only 2 or 3 words
2. Use a noun or adjective phrase, with no verbs
3. Use Title Case
4. Return ONLY the title, with no quotes and no explanation

Text:
"""{source}""""#
    )
}

/// Ask for a retelling suitable for ages 6–8.
pub fn simplify_prompt(text: &str) -> String {
    format!(
        r#"Rewrite the following story for a child aged 6 to 8.

Rules:
1. Use short, simple sentences and everyday words
2. Keep the main events and characters
3. Keep it warm and age-appropriate
4. Return ONLY the story text
5. Do NOT include any introductory phrases like "Here is the story" or "Simplified version"

Story:
"""{text}""""#
    )
}

/// Ask for one vivid single-scene image prompt, as JSON.
pub fn image_prompt_request(simplified_text: &str) -> String {
    format!(
        r#"Read this children's story and describe ONE vivid scene from it as an illustration prompt.

Rules:
1. A single scene, suitable for young children
2. Mention the main character, the setting, and the mood in one or two sentences
3. Return JSON of the form {{"image_prompt": "..."}}

Story:
"""{simplified_text}""""#
    )
}

/// Final prompt sent to the image service.
pub fn styled_image_prompt(prompt: &str) -> String {
    format!("{ILLUSTRATION_STYLE}: {prompt}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_embed_input() {
        assert!(title_prompt("A dragon woke up").contains("A dragon woke up"));
        assert!(simplify_prompt("Long ago").contains("Long ago"));
        let p = image_prompt_request("The fox ran");
        assert!(p.contains("The fox ran"));
        assert!(p.contains(r#"{"image_prompt": "..."}"#));
    }

    #[test]
    fn style_qualifier_is_prefix() {
        assert_eq!(
            styled_image_prompt("a red kite"),
            "colorful children's book illustration style: a red kite"
        );
    }
}
