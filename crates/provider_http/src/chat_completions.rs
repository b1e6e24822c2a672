use core_types::{
    AttemptError, CompletionRequest, OutboundRequest, PromptMessage, ProviderAdapter,
    ProviderConfig, ProviderId,
};
use serde::Serialize;
use tracing::debug;

use crate::ClientIdentity;
use crate::response::{self, ProviderResponse};

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    stream: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChatCompletionsAdapter {
    identity: ClientIdentity,
}

impl ChatCompletionsAdapter {
    pub fn new(identity: ClientIdentity) -> Self {
        Self { identity }
    }
}

impl ProviderAdapter for ChatCompletionsAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::ChatCompletions
    }

    fn build_request(
        &self,
        provider: &ProviderConfig,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<OutboundRequest, AttemptError> {
        let model = if request.model.is_empty() {
            provider.default_model.trim()
        } else {
            request.model.as_str()
        };
        let body = ChatCompletionBody {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.sampling.max_tokens,
            top_p: request.sampling.top_p,
            frequency_penalty: request.sampling.frequency_penalty,
            presence_penalty: request.sampling.presence_penalty,
            stream: false,
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| AttemptError::InvalidRequest(err.to_string()))?;
        debug!(
            provider = %provider.name,
            model,
            messages = request.messages.len(),
            "built chat completion request"
        );

        let url = format!(
            "{}/chat/completions",
            provider.base_url.trim_end_matches('/')
        );
        let mut outbound = OutboundRequest::post(url, body)
            .header("Authorization", format!("Bearer {}", credential.trim()))
            .header("HTTP-Referer", self.identity.referer.clone())
            .header("X-Title", self.identity.title.clone());
        for (name, value) in &provider.extra_headers {
            outbound = outbound.header(name.clone(), value.clone());
        }
        Ok(outbound)
    }

    fn parse_response(&self, body: &str) -> Result<String, AttemptError> {
        ProviderResponse::parse(self.id(), body)?.into_text()
    }

    fn reject(&self, status: u16, body: &str) -> AttemptError {
        response::rejection(status, body)
    }
}
