use std::future::Future;
use std::pin::Pin;

use la_core::core::{BackendError, InferenceBackend, ModelSelector, SamplingParams, Variant};

/// Served model names: the base model plus one adapter per variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelNames {
    pub base: String,
    pub sft: String,
    pub dpo: String,
}

impl ModelNames {
    pub fn name_for(&self, selector: ModelSelector) -> &str {
        match selector {
            ModelSelector::Base => &self.base,
            ModelSelector::Adapter(Variant::Sft) => &self.sft,
            ModelSelector::Adapter(Variant::Dpo) => &self.dpo,
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiCompletionsBackend — raw-prompt completions over HTTP
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible `/v1/completions` endpoint that serves
/// the variant adapters under their own model names.
pub struct OpenAiCompletionsBackend {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    models: ModelNames,
}

impl OpenAiCompletionsBackend {
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        models: ModelNames,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            models,
        }
    }

    pub fn inference_path(&self) -> &str {
        "/v1/completions"
    }

    pub fn build_request_body(
        &self,
        prompt: &str,
        selector: ModelSelector,
        params: &SamplingParams,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.models.name_for(selector),
            "prompt": prompt,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "top_k": params.top_k,
            "seed": params.seed,
            "stream": false,
        })
    }

    async fn send(
        &self,
        prompt: &str,
        selector: ModelSelector,
        params: &SamplingParams,
    ) -> Result<String, BackendError> {
        let url = format!("{}{}", self.base_url, self.inference_path());
        let mut req_builder = self
            .http_client
            .post(&url)
            .json(&self.build_request_body(prompt, selector, params));
        if let Some(key) = &self.api_key {
            req_builder = req_builder.bearer_auth(key);
        }

        let resp = req_builder
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::HttpStatus { status, body });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        parse_response(&bytes)
    }
}

impl InferenceBackend for OpenAiCompletionsBackend {
    fn sample<'a>(
        &'a self,
        prompt: &'a str,
        selector: ModelSelector,
        params: &'a SamplingParams,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>> {
        Box::pin(self.send(prompt, selector, params))
    }
}

// ---------------------------------------------------------------------------
// Response wire types (Deserialize only)
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct CompletionWire {
    choices: Vec<CompletionChoiceWire>,
}

#[derive(serde::Deserialize)]
struct CompletionChoiceWire {
    text: Option<String>,
}

pub fn parse_response(body: &[u8]) -> Result<String, BackendError> {
    let resp: CompletionWire = serde_json::from_slice(body)
        .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .map(|choice| choice.text.unwrap_or_default())
        .ok_or_else(|| BackendError::MalformedResponse("response has no choices".to_owned()))
}

#[cfg(test)]
mod tests;
