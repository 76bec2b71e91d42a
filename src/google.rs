use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GoogleConfig;

/// Identity claims we care about, as returned by token-info, user-info, or
/// found in an ID token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GoogleProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub name: String,
}

impl GoogleProfile {
    /// Fill blank fields from `other`.
    pub fn fill_missing_from(&mut self, other: &GoogleProfile) {
        for (mine, theirs) in [
            (&mut self.email, &other.email),
            (&mut self.given_name, &other.given_name),
            (&mut self.family_name, &other.family_name),
            (&mut self.name, &other.name),
        ] {
            if mine.is_empty() {
                *mine = theirs.clone();
            }
        }
    }

    /// First and last name, falling back to splitting `name`.
    pub fn split_names(&self) -> (Option<String>, String) {
        let mut words = self.name.split_whitespace();
        let first = if !self.given_name.is_empty() {
            Some(self.given_name.clone())
        } else {
            words.next().map(str::to_string)
        };
        let last = if !self.family_name.is_empty() {
            self.family_name.clone()
        } else {
            self.name.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")
        };
        (first, last)
    }
}

/// Decode the payload segment of a three-part JWT without checking its
/// signature. `None` when the token is not shaped like one.
pub fn decode_id_token_payload(token: &str) -> Option<GoogleProfile> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[async_trait]
pub trait GoogleIdentity: Send + Sync {
    /// `Ok(None)` when Google answers with a non-success status.
    async fn token_info(&self, id_token: &str) -> anyhow::Result<Option<GoogleProfile>>;
    /// `Ok(None)` when Google answers with a non-success status.
    async fn user_info(&self, access_token: &str) -> anyhow::Result<Option<GoogleProfile>>;
}

pub struct GoogleClient {
    client: Client,
    tokeninfo_url: String,
    userinfo_url: String,
}

impl GoogleClient {
    pub fn new(config: &GoogleConfig, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("build google http client")?;
        Ok(Self {
            client,
            tokeninfo_url: config.tokeninfo_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }
}

#[async_trait]
impl GoogleIdentity for GoogleClient {
    async fn token_info(&self, id_token: &str) -> anyhow::Result<Option<GoogleProfile>> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .context("google tokeninfo request")?;
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "google tokeninfo rejected token");
            return Ok(None);
        }
        let profile = response
            .json::<GoogleProfile>()
            .await
            .context("google tokeninfo body")?;
        debug!(email = %profile.email, "google tokeninfo ok");
        Ok(Some(profile))
    }

    async fn user_info(&self, access_token: &str) -> anyhow::Result<Option<GoogleProfile>> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("google userinfo request")?;
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "google userinfo rejected token");
            return Ok(None);
        }
        let profile = response
            .json::<GoogleProfile>()
            .await
            .context("google userinfo body")?;
        debug!(email = %profile.email, "google userinfo ok");
        Ok(Some(profile))
    }
}
