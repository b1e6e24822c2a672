use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use config::{AppConfig, ConfigStore};
use core_dispatcher::{CompletionDispatcher, DispatchOptions, ProviderTier};
use core_types::{ConfigError, HttpTransport, SecretRef};
use imagegen::{ImageGenerator, ImageOptions};
use provider_http::{ClientIdentity, ReqwestTransport, adapter_for};
use secrets::{CredentialVault, default_vault_dir_from};
use tracing::{info, warn};

pub const IMAGE_TIER: &str = "image";
const VAULT_PASSWORD_VAR: &str = "SIIVI_VAULT_PASSWORD";

pub struct AppContext {
    pub config_store: ConfigStore,
    pub config: AppConfig,
    pub vault: CredentialVault,
    transport: Arc<dyn HttpTransport>,
}

impl AppContext {
    pub fn open(data_dir: &Path, config_dir: Option<PathBuf>) -> Result<Self> {
        let config_store = match config_dir {
            Some(dir) => ConfigStore::from_dir(dir),
            None => ConfigStore::from_default_location()?,
        };
        let config = config_store.load_or_init()?;

        let mut vault = CredentialVault::new(default_vault_dir_from(data_dir));
        if config.security.local_encryption_enabled {
            let password = std::env::var(VAULT_PASSWORD_VAR).with_context(|| {
                format!("local encryption is enabled; set {VAULT_PASSWORD_VAR}")
            })?;
            vault.set_password(Some(password));
        }

        Ok(Self {
            config_store,
            config,
            vault,
            transport: Arc::new(ReqwestTransport::new()),
        })
    }

    pub fn credential_ref(&self, tier: &str) -> Result<SecretRef> {
        if tier.eq_ignore_ascii_case(IMAGE_TIER) {
            return Ok(self.config.image.credential_ref.clone());
        }
        self.config
            .providers
            .iter()
            .find(|provider| provider.name.eq_ignore_ascii_case(tier))
            .map(|provider| provider.credential_ref.clone())
            .ok_or_else(|| {
                let known: Vec<&str> = self
                    .config
                    .providers
                    .iter()
                    .map(|provider| provider.name.as_str())
                    .collect();
                anyhow!(
                    "unknown tier `{tier}`; expected one of {} or {IMAGE_TIER}",
                    known.join(", ")
                )
            })
    }

    pub fn build_dispatcher(&self) -> Result<CompletionDispatcher> {
        let dispatch = &self.config.dispatch;
        let identity = ClientIdentity {
            referer: dispatch.client_referer.clone(),
            title: dispatch.client_title.clone(),
        };
        let mut builder =
            CompletionDispatcher::builder(self.transport.clone()).options(DispatchOptions {
                request_timeout: dispatch.request_timeout(),
                sampling: dispatch.sampling(),
            });

        for provider in self.config.enabled_providers() {
            let credentials = match self.vault.credential_set(&provider.credential_ref) {
                Ok(credentials) => credentials,
                Err(err) if is_missing_credentials(&err) => {
                    warn!(provider = %provider.name, "no keys configured; tier skipped");
                    continue;
                }
                Err(err) => return Err(err),
            };
            info!(
                provider = %provider.name,
                keys = credentials.len(),
                "tier configured"
            );
            builder = builder.tier(ProviderTier::new(
                provider.clone(),
                credentials,
                adapter_for(provider.id, &identity),
            ));
        }

        match builder.build() {
            Ok(dispatcher) => Ok(dispatcher),
            Err(ConfigError::NoTiers) => {
                bail!("no provider has API keys; add one with `siivi keys add <tier> <key>`")
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn image_generator(&self) -> ImageGenerator {
        let image = &self.config.image;
        ImageGenerator::new(
            self.transport.clone(),
            ImageOptions {
                endpoint: image.endpoint.clone(),
                width: image.width,
                height: image.height,
                timeout: self.config.dispatch.request_timeout(),
            },
        )
    }

    pub fn image_key(&self) -> Result<Option<String>> {
        let keys = self.vault.resolve(&self.config.image.credential_ref)?;
        Ok(keys.into_iter().next())
    }
}

fn is_missing_credentials(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingCredentials(_))
    )
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
