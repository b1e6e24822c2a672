use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result, bail};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use core_types::{ConfigError, CredentialSet, SecretRef};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const SCHEMA_VERSION: u32 = 1;
const ENV_PREFIX: &str = "SIIVI";

type KeyLists = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encrypted credentials exist but no password provided")]
    MissingPassword,
    #[error("`{reference}` has {len} stored keys, no index {index}")]
    IndexOutOfRange {
        reference: String,
        index: usize,
        len: usize,
    },
}

#[derive(Debug, Clone)]
pub struct CredentialVault {
    root: PathBuf,
    encryption_password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlainVaultFile {
    schema_version: u32,
    credentials: KeyLists,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedVaultFile {
    schema_version: u32,
    salt_b64: String,
    nonce_b64: String,
    ciphertext_b64: String,
}

impl CredentialVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encryption_password: None,
        }
    }

    pub fn set_password(&mut self, password: Option<String>) {
        self.encryption_password = password;
    }

    pub fn is_encrypted_mode(&self) -> bool {
        self.encryption_password.is_some()
    }

    pub fn add(&self, reference: &SecretRef, key: impl Into<String>) -> Result<usize> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            bail!("refusing to store an empty key for `{}`", reference.qualified());
        }
        let mut lists = self.load_lists()?;
        let keys = lists.entry(reference.qualified()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
        let len = keys.len();
        self.save_lists(&lists)?;
        Ok(len)
    }

    pub fn set(&self, reference: &SecretRef, keys: Vec<String>) -> Result<()> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        let mut lists = self.load_lists()?;
        if keys.is_empty() {
            lists.remove(&reference.qualified());
        } else {
            lists.insert(reference.qualified(), keys);
        }
        self.save_lists(&lists)
    }

    pub fn list(&self, reference: &SecretRef) -> Result<Vec<String>> {
        let lists = self.load_lists()?;
        Ok(lists
            .get(&reference.qualified())
            .cloned()
            .unwrap_or_default())
    }

    pub fn remove_at(&self, reference: &SecretRef, index: usize) -> Result<String> {
        let mut lists = self.load_lists()?;
        let qualified = reference.qualified();
        let keys = lists.entry(qualified.clone()).or_default();
        if index >= keys.len() {
            return Err(VaultError::IndexOutOfRange {
                reference: qualified,
                index,
                len: keys.len(),
            }
            .into());
        }
        let removed = keys.remove(index);
        if keys.is_empty() {
            lists.remove(&qualified);
        }
        self.save_lists(&lists)?;
        Ok(removed)
    }

    pub fn clear(&self, reference: &SecretRef) -> Result<()> {
        let mut lists = self.load_lists()?;
        lists.remove(&reference.qualified());
        self.save_lists(&lists)
    }

    pub fn resolve(&self, reference: &SecretRef) -> Result<Vec<String>> {
        let var = env_var_name(reference);
        if let Ok(value) = std::env::var(&var) {
            let keys = parse_key_list(&value);
            if !keys.is_empty() {
                debug!(var = %var, count = keys.len(), "using credentials from environment");
                return Ok(keys);
            }
        }
        self.list(reference)
    }

    pub fn credential_set(&self, reference: &SecretRef) -> Result<CredentialSet> {
        let keys = self.resolve(reference)?;
        CredentialSet::new(keys).map_err(|err| match err {
            ConfigError::EmptyCredentialSet => {
                ConfigError::MissingCredentials(reference.qualified()).into()
            }
            other => other.into(),
        })
    }

    fn load_lists(&self) -> Result<KeyLists> {
        let plain_path = self.plain_path();
        let enc_path = self.encrypted_path();

        match (
            plain_path.exists(),
            enc_path.exists(),
            self.encryption_password.as_ref(),
        ) {
            (false, false, _) => Ok(KeyLists::new()),
            (true, false, _) => self.read_plain_file(),
            (false, true, None) => Err(VaultError::MissingPassword.into()),
            (_, true, Some(password)) => self.read_encrypted_file(password),
            (true, true, None) => self.read_plain_file(),
        }
    }

    fn save_lists(&self, lists: &KeyLists) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        if let Some(password) = self.encryption_password.as_ref() {
            let encrypted = encrypt_lists(password, lists)?;
            let text = serde_json::to_string_pretty(&encrypted)?;
            fs::write(self.encrypted_path(), text)?;
            if self.plain_path().exists() {
                fs::remove_file(self.plain_path()).ok();
            }
            info!(references = lists.len(), "credentials persisted in encrypted mode");
            return Ok(());
        }

        let plain = PlainVaultFile {
            schema_version: SCHEMA_VERSION,
            credentials: lists.clone(),
        };
        let text = serde_json::to_string_pretty(&plain)?;
        fs::write(self.plain_path(), text)?;
        if self.encrypted_path().exists() {
            fs::remove_file(self.encrypted_path()).ok();
        }
        info!(references = lists.len(), "credentials persisted in plain mode");
        Ok(())
    }

    fn read_plain_file(&self) -> Result<KeyLists> {
        let text = fs::read_to_string(self.plain_path())?;
        let doc: PlainVaultFile =
            serde_json::from_str(&text).context("failed to parse credentials file")?;
        Ok(doc.credentials)
    }

    fn read_encrypted_file(&self, password: &str) -> Result<KeyLists> {
        let text = fs::read_to_string(self.encrypted_path())?;
        let doc: EncryptedVaultFile =
            serde_json::from_str(&text).context("failed to parse encrypted credentials file")?;
        decrypt_lists(password, &doc)
    }

    fn plain_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    fn encrypted_path(&self) -> PathBuf {
        self.root.join("credentials.enc.json")
    }
}

pub fn env_var_name(reference: &SecretRef) -> String {
    let sanitize = |part: &str| {
        part.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect::<String>()
    };
    format!(
        "{ENV_PREFIX}_{}_{}",
        sanitize(&reference.namespace),
        sanitize(&reference.key)
    )
}

pub fn parse_key_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_vault_dir_from(base_dir: &Path) -> PathBuf {
    base_dir.join("credentials")
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("failed to derive encryption key: {e}"))?;
    Ok(key)
}

fn encrypt_lists(password: &str, lists: &KeyLists) -> Result<EncryptedVaultFile> {
    let plaintext = serde_json::to_vec(lists)?;
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("failed to build cipher: {e}"))?;

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
        .map_err(|e| anyhow::anyhow!("failed to encrypt credentials: {e}"))?;

    Ok(EncryptedVaultFile {
        schema_version: SCHEMA_VERSION,
        salt_b64: BASE64.encode(salt),
        nonce_b64: BASE64.encode(nonce_bytes),
        ciphertext_b64: BASE64.encode(ciphertext),
    })
}

fn decrypt_lists(password: &str, encrypted: &EncryptedVaultFile) -> Result<KeyLists> {
    let salt = BASE64.decode(&encrypted.salt_b64)?;
    let nonce_bytes = BASE64.decode(&encrypted.nonce_b64)?;
    let ciphertext = BASE64.decode(&encrypted.ciphertext_b64)?;

    if nonce_bytes.len() != 12 {
        bail!("invalid nonce length");
    }

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("failed to build cipher: {e}"))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| anyhow::anyhow!("failed to decrypt credentials: {e}"))?;
    Ok(serde_json::from_slice(&plaintext)?)
}
