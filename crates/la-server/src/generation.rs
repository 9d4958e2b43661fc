use std::sync::Arc;
use std::time::Duration;

use la_core::core::{
    extract_plain, GenerationError, InferenceBackend, ModelSelector, ReplyParser, SamplingParams,
};
use rand::Rng;

/// Largest seed drawn for a sampling attempt (inclusive).
pub const MAX_SEED: u64 = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationPolicy {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.9,
            top_p: 0.9,
            top_k: 50,
            max_attempts: 5,
            timeout: Duration::from_millis(120_000),
        }
    }
}

impl GenerationPolicy {
    fn sampling(&self, seed: u64) -> SamplingParams {
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Generator — bounded resampling until a reply parses
// ---------------------------------------------------------------------------

/// Wraps the shared inference backend with the attempt budget and deadline.
///
/// Adapter generations must contain the reply delimiter; base-model
/// generations (translations) only need to be non-blank.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn InferenceBackend>,
    parser: ReplyParser,
    policy: GenerationPolicy,
}

impl Generator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        parser: ReplyParser,
        policy: GenerationPolicy,
    ) -> Self {
        Self {
            backend,
            parser,
            policy,
        }
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    pub async fn generate(
        &self,
        prompt: &str,
        selector: ModelSelector,
    ) -> Result<String, GenerationError> {
        let timeout = self.policy.timeout;
        match tokio::time::timeout(timeout, self.attempt_loop(prompt, selector)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%selector, timeout_ms = timeout.as_millis() as u64, "generation timed out");
                Err(GenerationError::Timeout {
                    selector,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn attempt_loop(
        &self,
        prompt: &str,
        selector: ModelSelector,
    ) -> Result<String, GenerationError> {
        for attempt in 1..=self.policy.max_attempts {
            let seed = rand::rng().random_range(0..=MAX_SEED);
            let params = self.policy.sampling(seed);
            let raw = self.backend.sample(prompt, selector, &params).await?;

            let parsed = match selector {
                ModelSelector::Base => extract_plain(&raw),
                ModelSelector::Adapter(_) => self.parser.extract(&raw),
            };
            match parsed {
                Some(reply) => {
                    tracing::debug!(%selector, attempt, seed, "generation parsed");
                    return Ok(reply);
                }
                None => {
                    tracing::debug!(%selector, attempt, seed, "unparseable generation, resampling");
                }
            }
        }

        tracing::warn!(%selector, attempts = self.policy.max_attempts, "generation budget exhausted");
        Err(GenerationError::Exhausted {
            selector,
            attempts: self.policy.max_attempts,
        })
    }
}
