use core_types::{
    AttemptError, CompletionRequest, OutboundRequest, PromptRole, ProviderAdapter, ProviderConfig,
    ProviderId, TurnRole,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::response::{self, ProviderResponse};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

impl From<TurnRole> for ContentRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => ContentRole::User,
            TurnRole::Assistant => ContentRole::Model,
        }
    }
}

impl From<ContentRole> for TurnRole {
    fn from(role: ContentRole) -> Self {
        match role {
            ContentRole::User => TurnRole::User,
            ContentRole::Model => TurnRole::Assistant,
        }
    }
}

impl From<PromptRole> for ContentRole {
    fn from(role: PromptRole) -> Self {
        match role {
            PromptRole::System | PromptRole::User => ContentRole::User,
            PromptRole::Assistant => ContentRole::Model,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: ContentRole,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GenerativeContentAdapter;

impl GenerativeContentAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderAdapter for GenerativeContentAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::GenerativeContent
    }

    fn build_request(
        &self,
        provider: &ProviderConfig,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<OutboundRequest, AttemptError> {
        // The caller's model id names a gateway model, so this tier always
        // runs its own configured model.
        let model = provider.default_model.trim();
        if model.is_empty() {
            return Err(AttemptError::InvalidRequest(format!(
                "provider `{}` has no default model",
                provider.name
            )));
        }

        let body = GenerateContentBody {
            contents: request
                .messages
                .iter()
                .map(|message| Content {
                    role: message.role.into(),
                    parts: [TextPart {
                        text: &message.content,
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.sampling.max_tokens,
            },
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| AttemptError::InvalidRequest(err.to_string()))?;
        debug!(
            provider = %provider.name,
            model,
            contents = request.messages.len(),
            "built generate content request"
        );

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            provider.base_url.trim_end_matches('/'),
            model
        );
        let url = Url::parse_with_params(&endpoint, &[("key", credential.trim())])
            .map_err(|err| AttemptError::InvalidRequest(format!("invalid endpoint: {err}")))?;

        let mut outbound = OutboundRequest::post(url.to_string(), body);
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
