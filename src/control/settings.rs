//! # Persisted bot settings.
//!
//! Management values shared between the bot and its management tools: the
//! gateway token, command prefixes and a few descriptive fields. All values
//! live in the core namespace of the [`Cache`].

use crate::error::{SettingsError, StoreError};
use crate::store::Cache;

const TOKEN_KEY: &str = "token";
const PREFIXES_KEY: &str = "prefixes";
const OWNER_KEY: &str = "owner";
const DESCRIPTION_KEY: &str = "description";
const REPOSITORY_KEY: &str = "repository";
const INVITE_KEY: &str = "official_invite";

/// Anything shorter is rejected as a token.
pub const MIN_TOKEN_LEN: usize = 50;

/// Prefix used when none is configured.
pub const FALLBACK_PREFIX: &str = "!";

/// Typed accessors for the bot's persisted settings.
#[derive(Clone)]
pub struct Settings {
    cache: Cache,
}

impl Settings {
    /// Creates settings over `cache`'s namespace.
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// The stored gateway token.
    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.cache.get(TOKEN_KEY).await
    }

    /// Stores a new token after a basic shape check.
    pub async fn set_token(&self, token: &str) -> Result<(), SettingsError> {
        let token = token.trim();
        if token.len() < MIN_TOKEN_LEN {
            return Err(SettingsError::NotAToken);
        }
        self.cache.set(TOKEN_KEY, token, None).await?;
        Ok(())
    }

    /// Forgets the token, e.g. after the gateway refused it.
    pub async fn reset_token(&self) -> Result<bool, StoreError> {
        self.cache.delete(TOKEN_KEY).await
    }

    /// Configured command prefixes, in insertion order.
    pub async fn prefixes(&self) -> Result<Vec<String>, StoreError> {
        self.cache.get_or(PREFIXES_KEY, Vec::new()).await
    }

    /// Replaces the prefix list.
    pub async fn set_prefixes(&self, prefixes: &[String]) -> Result<(), StoreError> {
        self.cache.set(PREFIXES_KEY, prefixes, None).await
    }

    /// Appends a prefix.
    pub async fn add_prefix(&self, prefix: &str) -> Result<(), SettingsError> {
        let mut prefixes = self.prefixes().await?;
        if prefixes.iter().any(|p| p == prefix) {
            return Err(SettingsError::PrefixAlreadyExists(prefix.to_string()));
        }
        prefixes.push(prefix.to_string());
        self.set_prefixes(&prefixes).await?;
        Ok(())
    }

    /// Removes a prefix.
    pub async fn remove_prefix(&self, prefix: &str) -> Result<(), SettingsError> {
        let mut prefixes = self.prefixes().await?;
        let Some(at) = prefixes.iter().position(|p| p == prefix) else {
            return Err(SettingsError::PrefixNotFound(prefix.to_string()));
        };
        prefixes.remove(at);
        self.set_prefixes(&prefixes).await?;
        Ok(())
    }

    /// First configured prefix, or [`FALLBACK_PREFIX`].
    pub async fn default_prefix(&self) -> Result<String, StoreError> {
        Ok(self
            .prefixes()
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| FALLBACK_PREFIX.to_string()))
    }

    /// Moves an existing prefix to the front of the list.
    pub async fn set_default_prefix(&self, prefix: &str) -> Result<(), SettingsError> {
        let mut prefixes = self.prefixes().await?;
        let Some(at) = prefixes.iter().position(|p| p == prefix) else {
            return Err(SettingsError::PrefixNotFound(prefix.to_string()));
        };
        let chosen = prefixes.remove(at);
        prefixes.insert(0, chosen);
        self.set_prefixes(&prefixes).await?;
        Ok(())
    }

    /// Id of the bot owner.
    pub async fn owner_id(&self) -> Result<Option<u64>, StoreError> {
        self.cache.get(OWNER_KEY).await
    }

    /// Sets the id of the bot owner.
    pub async fn set_owner_id(&self, id: u64) -> Result<(), StoreError> {
        self.cache.set(OWNER_KEY, &id, None).await
    }

    /// Application description.
    pub async fn description(&self) -> Result<Option<String>, StoreError> {
        self.cache.get(DESCRIPTION_KEY).await
    }

    /// Sets the application description.
    pub async fn set_description(&self, description: &str) -> Result<(), StoreError> {
        self.cache.set(DESCRIPTION_KEY, description, None).await
    }

    /// Official repository URL.
    pub async fn repository(&self) -> Result<Option<String>, StoreError> {
        self.cache.get(REPOSITORY_KEY).await
    }

    /// Sets the official repository URL.
    pub async fn set_repository(&self, url: &str) -> Result<(), StoreError> {
        self.cache.set(REPOSITORY_KEY, url, None).await
    }

    /// Invite link to the official community.
    pub async fn official_invite(&self) -> Result<Option<String>, StoreError> {
        self.cache.get(INVITE_KEY).await
    }

    /// Sets the invite link to the official community.
    pub async fn set_official_invite(&self, url: &str) -> Result<(), StoreError> {
        self.cache.set(INVITE_KEY, url, None).await
    }
}
