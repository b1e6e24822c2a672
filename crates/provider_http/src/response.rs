use core_types::{AttemptError, ProviderId};
use serde::Deserialize;

const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ProviderResponse {
    ChatCompletion(ChatCompletionResponse),
    GenerativeContent(GenerateContentResponse),
}

impl ProviderResponse {
    pub fn parse(provider: ProviderId, body: &str) -> Result<Self, AttemptError> {
        let decoded = match provider {
            ProviderId::ChatCompletions => {
                serde_json::from_str(body).map(ProviderResponse::ChatCompletion)
            }
            ProviderId::GenerativeContent => {
                serde_json::from_str(body).map(ProviderResponse::GenerativeContent)
            }
        };
        decoded.map_err(|err| {
            AttemptError::MalformedResponse(format!("{} body is not valid: {err}", provider.as_str()))
        })
    }

    pub fn into_text(self) -> Result<String, AttemptError> {
        match self {
            ProviderResponse::ChatCompletion(response) => response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message)
                .and_then(|message| message.content)
                .ok_or_else(|| {
                    AttemptError::MalformedResponse(
                        "missing choices[0].message.content".to_string(),
                    )
                }),
            ProviderResponse::GenerativeContent(response) => response
                .candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.content)
                .and_then(|content| content.parts.into_iter().next())
                .and_then(|part| part.text)
                .ok_or_else(|| {
                    AttemptError::MalformedResponse(
                        "missing candidates[0].content.parts[0].text".to_string(),
                    )
                }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub fn rejection_detail(body: &str) -> String {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty());
    if let Some(message) = message {
        return message;
    }

    let body = body.trim();
    if body.is_empty() {
        return "no response body".to_string();
    }
    if body.chars().count() <= MAX_DETAIL_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_DETAIL_CHARS).collect();
    format!("{truncated}...")
}

pub fn rejection(status: u16, body: &str) -> AttemptError {
    AttemptError::ProviderRejection {
        status,
        detail: rejection_detail(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"choices":[{"message":{"content":"Hi there!"}},{"message":{"content":"other"}}]}"#;
        let text = ProviderResponse::parse(ProviderId::ChatCompletions, body)
            .and_then(ProviderResponse::into_text)
            .expect("text");
        assert_eq!(text, "Hi there!");
    }

    #[test]
    fn null_content_is_malformed() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        let err = ProviderResponse::parse(ProviderId::ChatCompletions, body)
            .and_then(ProviderResponse::into_text)
            .expect_err("must fail");
        assert!(matches!(err, AttemptError::MalformedResponse(_)));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = ProviderResponse::parse(ProviderId::ChatCompletions, r#"{"choices":[]}"#)
            .and_then(ProviderResponse::into_text)
            .expect_err("must fail");
        assert_eq!(
            err,
            AttemptError::MalformedResponse("missing choices[0].message.content".to_string())
        );
    }

    #[test]
    fn extracts_first_candidate_part() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Fallback reply"}]}}]}"#;
        let text = ProviderResponse::parse(ProviderId::GenerativeContent, body)
            .and_then(ProviderResponse::into_text)
            .expect("text");
        assert_eq!(text, "Fallback reply");
    }

    #[test]
    fn candidate_without_parts_is_malformed() {
        let body = r#"{"candidates":[{"content":{"parts":[]}}],"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = ProviderResponse::parse(ProviderId::GenerativeContent, body)
            .and_then(ProviderResponse::into_text)
            .expect_err("must fail");
        assert!(matches!(err, AttemptError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = ProviderResponse::parse(ProviderId::ChatCompletions, "<html>gateway</html>")
            .expect_err("must fail");
        assert!(matches!(err, AttemptError::MalformedResponse(_)));
    }

    #[test]
    fn rejection_prefers_error_message() {
        let detail = rejection_detail(r#"{"error":{"message":"No auth credentials found","code":401}}"#);
        assert_eq!(detail, "No auth credentials found");
        assert_eq!(rejection_detail(""), "no response body");

        let long = "x".repeat(500);
        let detail = rejection_detail(&long);
        assert!(detail.ends_with("..."));
        assert_eq!(detail.chars().count(), MAX_DETAIL_CHARS + 3);
    }
}
