use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    AttemptError, CompletionRequest, Completer, ConfigError, ConversationTurn, CredentialSet,
    DEFAULT_REQUEST_TIMEOUT, DispatchFailure, HttpTransport, ProviderAdapter, ProviderConfig,
    RequestConfig, SamplingParams,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod rotation;

pub use rotation::RotationState;

#[derive(Clone)]
pub struct ProviderTier {
    pub provider: ProviderConfig,
    pub credentials: CredentialSet,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl ProviderTier {
    pub fn new(
        provider: ProviderConfig,
        credentials: CredentialSet,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            provider,
            credentials,
            adapter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOptions {
    pub request_timeout: Duration,
    pub sampling: SamplingParams,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sampling: SamplingParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(AttemptError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    pub tier: usize,
    pub credential: usize,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub result: Result<String, DispatchFailure>,
    pub attempts: Vec<DispatchAttempt>,
}

enum Step {
    Delivered(String),
    Failed(AttemptError),
    Cancelled,
}

pub struct CompletionDispatcher {
    tiers: Vec<ProviderTier>,
    transport: Arc<dyn HttpTransport>,
    rotation: Arc<RotationState>,
    options: DispatchOptions,
}

impl CompletionDispatcher {
    pub fn builder(transport: Arc<dyn HttpTransport>) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            tiers: Vec::new(),
            rotation: None,
            options: DispatchOptions::default(),
        }
    }

    pub fn tiers(&self) -> &[ProviderTier] {
        &self.tiers
    }

    pub fn rotation(&self) -> &Arc<RotationState> {
        &self.rotation
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub async fn dispatch(
        &self,
        turns: &[ConversationTurn],
        config: &RequestConfig,
    ) -> Result<String, DispatchFailure> {
        self.dispatch_with_cancel(turns, config, &CancellationToken::new())
            .await
    }

    pub async fn dispatch_with_cancel(
        &self,
        turns: &[ConversationTurn],
        config: &RequestConfig,
        cancel: &CancellationToken,
    ) -> Result<String, DispatchFailure> {
        self.dispatch_report(turns, config, cancel).await.result
    }

    /// Walks the tiers in order, giving every credential of a tier exactly one
    /// attempt starting from that tier's rotation cursor. The first parsed
    /// reply wins; otherwise the last attempt error is returned.
    pub async fn dispatch_report(
        &self,
        turns: &[ConversationTurn],
        config: &RequestConfig,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let request = CompletionRequest::from_turns(turns, config, self.options.sampling);
        let mut attempts = Vec::new();
        if request.messages.is_empty() {
            return DispatchReport {
                result: Err(DispatchFailure::EmptyConversation),
                attempts,
            };
        }

        let mut last_error = None;
        for (tier_index, tier) in self.tiers.iter().enumerate() {
            let len = tier.credentials.len();
            let start = self.rotation.current(tier_index, len);
            for offset in 0..len {
                let credential = (start + offset) % len;
                match self.attempt(tier, credential, &request, cancel).await {
                    Step::Delivered(text) => {
                        info!(
                            tier = tier_index,
                            provider = %tier.provider.name,
                            credential,
                            attempts = attempts.len() + 1,
                            "completion delivered"
                        );
                        attempts.push(DispatchAttempt {
                            tier: tier_index,
                            credential,
                            outcome: AttemptOutcome::Succeeded,
                        });
                        return DispatchReport {
                            result: Ok(text),
                            attempts,
                        };
                    }
                    Step::Failed(err) => {
                        warn!(
                            tier = tier_index,
                            provider = %tier.provider.name,
                            credential,
                            error = %err,
                            "completion attempt failed"
                        );
                        self.rotation.move_past(tier_index, credential, len);
                        attempts.push(DispatchAttempt {
                            tier: tier_index,
                            credential,
                            outcome: AttemptOutcome::Failed(err.clone()),
                        });
                        last_error = Some(err);
                    }
                    Step::Cancelled => {
                        info!(
                            tier = tier_index,
                            provider = %tier.provider.name,
                            "dispatch cancelled"
                        );
                        return DispatchReport {
                            result: Err(DispatchFailure::Cancelled),
                            attempts,
                        };
                    }
                }
            }
            if tier_index + 1 < self.tiers.len() {
                info!(
                    tier = tier_index,
                    provider = %tier.provider.name,
                    "provider tier exhausted, falling back"
                );
            }
        }

        let last = last_error.unwrap_or_else(|| {
            AttemptError::InvalidRequest("no provider attempt was made".to_string())
        });
        warn!(attempts = attempts.len(), error = %last, "all provider tiers exhausted");
        DispatchReport {
            result: Err(DispatchFailure::Exhausted {
                attempts: attempts.len(),
                last,
            }),
            attempts,
        }
    }

    async fn attempt(
        &self,
        tier: &ProviderTier,
        credential: usize,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Step {
        if cancel.is_cancelled() {
            return Step::Cancelled;
        }

        let outbound = match tier.adapter.build_request(
            &tier.provider,
            tier.credentials.get(credential),
            request,
        ) {
            Ok(outbound) => outbound.with_timeout(self.options.request_timeout),
            Err(err) => return Step::Failed(err),
        };
        let timeout = outbound.timeout;
        debug!(provider = %tier.provider.name, credential, "sending completion request");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Step::Cancelled,
            response = tokio::time::timeout(timeout, self.transport.post_json(outbound)) => response,
        };
        let response = match response {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Step::Failed(err.into()),
            Err(_) => {
                return Step::Failed(AttemptError::Transport(format!(
                    "request timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        };

        if !response.is_success() {
            return Step::Failed(tier.adapter.reject(response.status, &response.body));
        }
        match tier.adapter.parse_response(&response.body) {
            Ok(text) => Step::Delivered(text),
            Err(err) => Step::Failed(err),
        }
    }
}

#[async_trait]
impl Completer for CompletionDispatcher {
    async fn complete(
        &self,
        turns: &[ConversationTurn],
        config: &RequestConfig,
    ) -> Result<String, DispatchFailure> {
        self.dispatch(turns, config).await
    }
}

pub struct DispatcherBuilder {
    transport: Arc<dyn HttpTransport>,
    tiers: Vec<ProviderTier>,
    rotation: Option<Arc<RotationState>>,
    options: DispatchOptions,
}

impl DispatcherBuilder {
    pub fn tier(mut self, tier: ProviderTier) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn rotation(mut self, rotation: Arc<RotationState>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<CompletionDispatcher, ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        let rotation = match self.rotation {
            Some(rotation) if rotation.tiers() != self.tiers.len() => {
                return Err(ConfigError::RotationMismatch {
                    expected: self.tiers.len(),
                    actual: rotation.tiers(),
                });
            }
            Some(rotation) => rotation,
            None => Arc::new(RotationState::new(self.tiers.len())),
        };
        Ok(CompletionDispatcher {
            tiers: self.tiers,
            transport: self.transport,
            rotation,
            options: self.options,
        })
    }
}
