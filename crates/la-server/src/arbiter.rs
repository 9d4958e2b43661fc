use std::sync::Arc;

use futures_util::future::try_join;
use la_core::core::{
    canonical_history, AssistantTurn, CandidatePair, CanonicalCandidates, GenerationError,
    LanguageClass, ModelSelector, PromptBuilder, PromptTurn, Role, Timestamp, Transcript, Turn,
    UserTurn, Variant,
};
use rand::Rng;

use crate::generation::Generator;
use crate::normalizer::LanguageNormalizer;

/// Everything one submitted message produces: the two turns to append and
/// the user-facing candidates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArbiterOutcome {
    pub user_turn: UserTurn,
    pub assistant_turn: AssistantTurn,
}

impl ArbiterOutcome {
    pub fn candidates(&self) -> CandidatePair {
        CandidatePair::from(&self.assistant_turn)
    }

    pub fn into_turns(self) -> Vec<Turn> {
        vec![
            Turn::User(self.user_turn),
            Turn::PendingAssistant(self.assistant_turn),
        ]
    }
}

// ---------------------------------------------------------------------------
// ResponseArbiter — two independent candidates per user turn
// ---------------------------------------------------------------------------

/// Produces one sft and one dpo candidate per user turn.
///
/// The arbiter reads the stored transcript but never writes it; callers append
/// the returned turns. Foreign input is answered in canonical language and the
/// candidates translated back, with the canonical generations kept.
#[derive(Clone)]
pub struct ResponseArbiter {
    generator: Generator,
    normalizer: LanguageNormalizer,
    prompt_builder: Arc<dyn PromptBuilder>,
}

impl ResponseArbiter {
    pub fn new(
        generator: Generator,
        normalizer: LanguageNormalizer,
        prompt_builder: Arc<dyn PromptBuilder>,
    ) -> Self {
        Self {
            generator,
            normalizer,
            prompt_builder,
        }
    }

    pub async fn respond(
        &self,
        history: &Transcript,
        message: &str,
        now: Timestamp,
    ) -> Result<ArbiterOutcome, GenerationError> {
        let mut working: Vec<PromptTurn> = history.prompt_history();
        working.push(PromptTurn::new(Role::User, message));

        let translated = match self.normalizer.detect(message) {
            LanguageClass::Canonical => None,
            LanguageClass::Foreign => Some(self.normalizer.to_canonical(message).await?),
        };
        if let Some(translated) = translated.as_deref() {
            working = canonical_history(working, translated);
        }

        let prompt = self.prompt_builder.build(&working);
        let (sft, dpo) = try_join(
            self.generator
                .generate(&prompt, ModelSelector::Adapter(Variant::Sft)),
            self.generator
                .generate(&prompt, ModelSelector::Adapter(Variant::Dpo)),
        )
        .await?;

        let (display_sft, display_dpo, canonical) = if translated.is_some() {
            let (display_sft, display_dpo) = try_join(
                self.normalizer.from_canonical(&sft),
                self.normalizer.from_canonical(&dpo),
            )
            .await?;
            (display_sft, display_dpo, Some(CanonicalCandidates { sft, dpo }))
        } else {
            (sft, dpo, None)
        };

        tracing::debug!(
            translated = translated.is_some(),
            history_len = history.len(),
            "generated candidate pair"
        );

        Ok(ArbiterOutcome {
            user_turn: UserTurn {
                content: message.to_owned(),
                time: now.clone(),
                translated_content: translated,
            },
            assistant_turn: AssistantTurn {
                time: now,
                sft: display_sft,
                dpo: display_dpo,
                canonical,
            },
        })
    }
}

/// Order a pair for display with a fresh fair coin.
pub fn shuffle_for_display(pair: &CandidatePair) -> [String; 2] {
    let dpo_first = rand::rng().random_bool(0.5);
    pair.present(dpo_first)
}
