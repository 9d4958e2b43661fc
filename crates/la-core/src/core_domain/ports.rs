use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::core::{BackendError, Variant};

// ---------------------------------------------------------------------------
// ModelSelector — base model or one of the tuned adapters
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelSelector {
    /// The untuned base model, used for translation round-trips.
    Base,
    Adapter(Variant),
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSelector::Base => f.write_str("base"),
            ModelSelector::Adapter(variant) => f.write_str(variant.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// SamplingParams — per-attempt sampling configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub seed: u64,
}

// ---------------------------------------------------------------------------
// InferenceBackend — one sampling attempt against the shared model
// ---------------------------------------------------------------------------

/// A single, stateless sampling call against the shared model service.
///
/// Implementations must tolerate concurrent calls from many sessions; retrying
/// and reply extraction happen in the caller.
pub trait InferenceBackend: Send + Sync {
    fn sample<'a>(
        &'a self,
        prompt: &'a str,
        selector: ModelSelector,
        params: &'a SamplingParams,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>>;
}
