//! Transformer: chapter stub → child-friendly title and retelling.
//!
//! Both remote calls run through the retry executor, and each attempt holds
//! a text-gate slot only while the call is in flight. Output goes through the
//! [`postprocess`](crate::pipeline::postprocess) rule sets.

use crate::document::ChapterStub;
use crate::error::{ServiceError, ServiceErrorKind, StepFailure, TransformationError};
use crate::pipeline::gate::Gate;
use crate::pipeline::postprocess::{clean_story, clean_title};
use crate::pipeline::retry::{retry, RetryPolicy};
use crate::prompts;
use crate::service::{ResponseFormat, TextGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Result of transforming one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    pub title: String,
    pub simplified_text: String,
}

#[derive(Clone)]
pub struct Transformer {
    generator: Arc<dyn TextGenerator>,
    gate: Gate,
    policy: RetryPolicy,
    title_source_chars: usize,
}

impl Transformer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        gate: Gate,
        policy: RetryPolicy,
        title_source_chars: usize,
    ) -> Self {
        Self {
            generator,
            gate,
            policy,
            title_source_chars,
        }
    }

    /// Title for chapter `number`: at most three words, unquoted.
    ///
    /// An empty reply after cleanup yields `"Chapter {number}"`.
    pub async fn generate_title(
        &self,
        number: usize,
        raw_text: &str,
    ) -> Result<String, TransformationError> {
        let source: String = raw_text.chars().take(self.title_source_chars).collect();
        let prompt = prompts::title_prompt(&source);
        let label = format!("chapter {number} title");

        let reply = self
            .call(&label, &prompt)
            .await
            .map_err(TransformationError::Title)?;
        let title = clean_title(&reply);
        debug!("{label}: {title:?}");
        if title.is_empty() {
            return Ok(format!("Chapter {number}"));
        }
        Ok(title)
    }

    /// Retelling for ages 6–8 with model preambles removed.
    pub async fn simplify(
        &self,
        number: usize,
        raw_text: &str,
    ) -> Result<String, TransformationError> {
        let prompt = prompts::simplify_prompt(raw_text);
        let label = format!("chapter {number} simplify");

        retry(&self.policy, &label, || async {
            let reply = self.generate(&prompt).await?;
            let story = clean_story(&reply);
            if story.is_empty() {
                // Nothing left after stripping the preamble; ask again.
                return Err(ServiceError::new(
                    ServiceErrorKind::Unavailable,
                    "simplified story was empty",
                ));
            }
            Ok(story)
        })
        .await
        .map_err(TransformationError::Simplify)
    }

    /// Title, then simplified text. Stops at the first failing step.
    pub async fn transform(&self, stub: &ChapterStub) -> Result<Transformation, TransformationError> {
        let title = self.generate_title(stub.number, &stub.text).await?;
        let simplified_text = self.simplify(stub.number, &stub.text).await?;
        Ok(Transformation {
            title,
            simplified_text,
        })
    }

    async fn call(&self, label: &str, prompt: &str) -> Result<String, StepFailure> {
        retry(&self.policy, label, || self.generate(prompt)).await
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let _slot = self.gate.acquire().await?;
        self.generator
            .generate_text(prompt, ResponseFormat::Text)
            .await
    }
}
