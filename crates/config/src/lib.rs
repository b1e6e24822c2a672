use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_types::{
    ProviderConfig, ProviderId, RequestConfig, SamplingParams, SecretRef, UiLanguage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const DEFAULT_USER: &str = "local";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub local_encryption_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub request_timeout_ms: u64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub client_referer: String,
    pub client_title: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            request_timeout_ms: 30_000,
            max_tokens: sampling.max_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            client_referer: "http://localhost".to_string(),
            client_title: "AI Chat Assistant".to_string(),
        }
    }
}

impl DispatchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub endpoint: String,
    pub credential_ref: SecretRef,
    pub width: u32,
    pub height: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.limewire.com/api/image/generation".to_string(),
            credential_ref: SecretRef::new("image", "limewire"),
            width: 512,
            height: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Persona {
    Helpful,
    Creative,
    Casual,
    Technical,
}

impl Persona {
    pub const ALL: [Persona; 4] = [
        Persona::Helpful,
        Persona::Creative,
        Persona::Casual,
        Persona::Technical,
    ];

    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|persona| persona.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or(Persona::Helpful)
    }

    pub fn name(self) -> &'static str {
        match self {
            Persona::Helpful => "helpful",
            Persona::Creative => "creative",
            Persona::Casual => "casual",
            Persona::Technical => "technical",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Persona::Helpful => {
                "You are a helpful and professional AI assistant. Provide clear, accurate, and useful responses."
            }
            Persona::Creative => {
                "You are a creative and imaginative AI assistant. Think outside the box and provide innovative solutions."
            }
            Persona::Casual => {
                "You are a casual and friendly AI assistant. Use a conversational tone and be approachable."
            }
            Persona::Technical => {
                "You are a technical and precise AI assistant. Focus on accuracy, details, and technical depth."
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub ai_model: String,
    pub ai_temperature: f64,
    pub ai_personality: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub language: UiLanguage,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            ai_model: "openrouter/auto".to_string(),
            ai_temperature: 0.7,
            ai_personality: Persona::Helpful.name().to_string(),
            theme: Theme::Dark,
            language: UiLanguage::En,
        }
    }
}

impl UserPreferences {
    pub fn persona(&self) -> Persona {
        Persona::from_name(&self.ai_personality)
    }

    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            model_id: self.ai_model.clone(),
            temperature: self.ai_temperature,
            persona_prompt: self.persona().prompt().to_string(),
        }
    }

    pub fn apply(&mut self, patch: PreferencesPatch) {
        if let Some(model) = patch.ai_model {
            self.ai_model = model;
        }
        if let Some(temperature) = patch.ai_temperature {
            self.ai_temperature = temperature;
        }
        if let Some(personality) = patch.ai_personality {
            self.ai_personality = personality;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesPatch {
    pub ai_model: Option<String>,
    pub ai_temperature: Option<f64>,
    pub ai_personality: Option<String>,
    pub theme: Option<Theme>,
    pub language: Option<UiLanguage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub image: ImageSettings,
    #[serde(default)]
    pub preferences: BTreeMap<String, UserPreferences>,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            providers: default_providers(),
            dispatch: DispatchSettings::default(),
            image: ImageSettings::default(),
            preferences: BTreeMap::new(),
            security: SecurityConfig {
                local_encryption_enabled: false,
            },
        }
    }
}

impl AppConfig {
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|provider| provider.enabled)
    }

    pub fn preferences_for(&self, user_id: &str) -> UserPreferences {
        self.preferences.get(user_id).cloned().unwrap_or_default()
    }

    pub fn update_preferences(
        &mut self,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> &UserPreferences {
        let entry = self.preferences.entry(user_id.to_string()).or_default();
        entry.apply(patch);
        entry
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: ProviderId::ChatCompletions,
            name: "openrouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "openai/gpt-3.5-turbo".to_string(),
            credential_ref: SecretRef::new("provider", "openrouter_api_key"),
            extra_headers: Vec::new(),
            enabled: true,
        },
        ProviderConfig {
            id: ProviderId::GenerativeContent,
            name: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            default_model: "gemini-1.5-flash".to_string(),
            credential_ref: SecretRef::new("provider", "gemini_api_key"),
            extra_headers: Vec::new(),
            enabled: true,
        },
    ]
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push("siivi");
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            info!(path = %self.path.display(), "wrote default config");
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn update_preferences(
        &self,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> Result<UserPreferences> {
        let mut config = self.load_or_init()?;
        let updated = config.update_preferences(user_id, patch).clone();
        self.save(&config)?;
        Ok(updated)
    }

    fn migrate(&self, config: &mut AppConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        if config.providers.is_empty() {
            config.providers = default_providers();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn creates_default_config_when_missing() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        let config = store.load_or_init().expect("load default");
        assert!(store.path().exists());
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].id, ProviderId::ChatCompletions);
        assert_eq!(config.providers[1].id, ProviderId::GenerativeContent);
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn migrates_v1_config_without_providers() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        fs::write(store.path(), r#"{"schema_version":1}"#).expect("write v1");

        let config = store.load_or_init().expect("migrate");
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.providers.len(), 2);

        let raw = fs::read_to_string(store.path()).expect("read back");
        assert!(raw.contains("\"schema_version\": 2"));
    }

    #[test]
    fn partial_sections_keep_their_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"schema_version":2,"dispatch":{"max_tokens":512},"image":{"width":1024}}"#,
        )
        .expect("write partial");

        let config = store.load_or_init().expect("load");
        assert_eq!(config.dispatch.max_tokens, 512);
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatch.top_p, 1.0);
        assert_eq!(config.dispatch.client_title, "AI Chat Assistant");
        assert_eq!(config.image.width, 1024);
        assert_eq!(config.image.height, 512);
        assert_eq!(config.image.credential_ref, SecretRef::new("image", "limewire"));
    }

    #[test]
    fn missing_user_gets_default_preferences() {
        let config = AppConfig::default();
        let prefs = config.preferences_for("nobody");
        assert_eq!(prefs, UserPreferences::default());
        assert_eq!(prefs.ai_model, "openrouter/auto");
        assert_eq!(prefs.ai_temperature, 0.7);
    }

    #[test]
    fn preference_patch_is_partial_and_persisted() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        store.load_or_init().expect("init");

        let updated = store
            .update_preferences(
                "user-1",
                PreferencesPatch {
                    ai_personality: Some("technical".to_string()),
                    language: Some(UiLanguage::De),
                    ..PreferencesPatch::default()
                },
            )
            .expect("update");
        assert_eq!(updated.ai_model, "openrouter/auto");
        assert_eq!(updated.persona(), Persona::Technical);

        let reloaded = store.load_or_init().expect("reload");
        let prefs = reloaded.preferences_for("user-1");
        assert_eq!(prefs.language, UiLanguage::De);
        assert_eq!(reloaded.preferences_for(DEFAULT_USER), UserPreferences::default());
    }

    #[test]
    fn request_config_carries_persona_prompt() {
        let prefs = UserPreferences {
            ai_personality: "pirate".to_string(),
            ai_temperature: 0.2,
            ..UserPreferences::default()
        };
        let config = prefs.request_config();
        assert_eq!(config.persona_prompt, Persona::Helpful.prompt());
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.model_id, "openrouter/auto");
        assert_eq!(Persona::from_name(" Casual "), Persona::Casual);
    }
}
