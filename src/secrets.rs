//! Signing key retrieval.
//!
//! The key is opaque to the engine: it is fetched once, wrapped in
//! `SecretString` so it never shows up in `Debug` output or logs, and handed
//! to the ledger connector.

use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};

use crate::config::AppConfig;

pub trait SecretProvider: Send + Sync {
    fn obtain_signing_key(&self) -> Result<SecretString>;
}

/// Reads the key from a named environment variable (populated from `.env`
/// by `dotenv` at startup).
pub struct EnvSecretProvider {
    env_name: String,
}

impl EnvSecretProvider {
    pub fn new(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
        }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn obtain_signing_key(&self) -> Result<SecretString> {
        let key = SecretString::new(AppConfig::resolve_env(&self.env_name)?);
        if key.expose_secret().trim().is_empty() {
            bail!("Signing key in {} is empty", self.env_name);
        }
        Ok(key)
    }
}
