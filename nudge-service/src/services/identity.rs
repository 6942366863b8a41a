//! Lookup of the account owner's primary email, used as the Reply-To of
//! outgoing mail.

use crate::config::IdentityConfig;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when the user exists but has no usable email.
    async fn primary_email(&self, user_id: &str) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct UserRecord {
    #[serde(default, alias = "primaryEmail", alias = "email_address")]
    email: Option<String>,
}

pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// `None` when no identity endpoint is configured.
    pub fn from_config(config: &IdentityConfig) -> Result<Option<Self>> {
        config
            .api_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.api_key.clone()))
            .transpose()
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn primary_email(&self, user_id: &str) -> Result<Option<String>> {
        let url = format!("{}/users/{}", self.base_url, user_id);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send GET request to {}: {}", url, e);
            anyhow::anyhow!("HTTP request failed: {}", e)
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;

        let user: UserRecord = response.json().await?;
        Ok(user.email.filter(|email| !email.trim().is_empty()))
    }
}

/// Used when no identity endpoint is configured: never yields a reply-to.
pub struct NoopIdentityProvider;

#[async_trait]
impl IdentityProvider for NoopIdentityProvider {
    async fn primary_email(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Fixed user-to-email table for tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    emails: dashmap::DashMap<String, String>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(self, user_id: &str, email: &str) -> Self {
        self.emails.insert(user_id.to_string(), email.to_string());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn primary_email(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.emails.get(user_id).map(|email| email.clone()))
    }
}
