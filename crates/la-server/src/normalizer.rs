use la_core::core::{
    detect, Direction, GenerationError, LanguageClass, LanguageNames, ModelSelector,
};

use crate::generation::Generator;

/// Translates foreign turns into the canonical language and replies back out,
/// using the base model with fixed instruction prompts.
#[derive(Clone)]
pub struct LanguageNormalizer {
    generator: Generator,
    names: LanguageNames,
}

impl LanguageNormalizer {
    pub fn new(generator: Generator, names: LanguageNames) -> Self {
        Self { generator, names }
    }

    pub fn detect(&self, text: &str) -> LanguageClass {
        detect(text)
    }

    pub async fn to_canonical(&self, text: &str) -> Result<String, GenerationError> {
        self.translate(text, Direction::ToCanonical).await
    }

    pub async fn from_canonical(&self, text: &str) -> Result<String, GenerationError> {
        self.translate(text, Direction::FromCanonical).await
    }

    async fn translate(&self, text: &str, direction: Direction) -> Result<String, GenerationError> {
        let prompt = self.names.translation_prompt(text, direction);
        self.generator.generate(&prompt, ModelSelector::Base).await
    }
}
