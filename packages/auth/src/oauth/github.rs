//! # GitHub OAuth 2.0
//!
//! ## Types
//!
//! - [`GitHubProfile`] / [`GitHubEmail`]: deserialization targets for the GitHub REST
//!   API responses (`/user` and `/user/emails`).
//! - [`GitHubOAuth`]: the [`IdentityProvider`] for GitHub.
//!
//! ## Flow
//!
//! 1. The authorization URL requests the `user:email` scope. GitHub does not get a
//!    PKCE challenge; the CSRF state alone binds the callback to this browser.
//! 2. The access token is used once to read `/user`.
//! 3. Only first sign-ins need an email: `/user/emails` is fetched and the entry that
//!    is both `primary` and `verified` is used. A user without one is asked to verify
//!    their address on GitHub.

use async_trait::async_trait;
use oauth2::url::Url;
use oauth2::{AccessToken, CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;

use super::{create_client, fetch_json, IdentityProvider, OAuthConfig, ProviderProfile};
use crate::cookies::GITHUB_STATE_COOKIE;
use crate::error::AuthError;
use crate::models::ProviderName;

/// GitHub user info from API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubProfile {
    pub id: i64,
    pub login: String,
}

/// GitHub email info from API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// Pick the address GitHub reports as both primary and verified.
pub fn primary_verified_email(emails: &[GitHubEmail]) -> Option<&str> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.as_str())
}

/// GitHub OAuth handler.
pub struct GitHubOAuth {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl GitHubOAuth {
    pub fn new(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl IdentityProvider for GitHubOAuth {
    fn name(&self) -> ProviderName {
        ProviderName::GitHub
    }

    fn state_cookie(&self) -> &'static str {
        GITHUB_STATE_COOKIE
    }

    fn authorization_url(&self, state: CsrfToken, _pkce_challenge: Option<PkceCodeChallenge>) -> Url {
        let (url, _) = create_client(&self.config)
            .authorize_url(|| state)
            .add_scope(Scope::new("user:email".to_string()))
            .url();
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<AccessToken, AuthError> {
        super::exchange_code(&self.config, &self.http, code, pkce_verifier).await
    }

    async fn fetch_profile(&self, access_token: &AccessToken) -> Result<ProviderProfile, AuthError> {
        let profile: GitHubProfile =
            fetch_json(&self.http, &self.config.profile_url, access_token).await?;
        Ok(ProviderProfile::GitHub(profile))
    }

    async fn verified_email(
        &self,
        access_token: &AccessToken,
        _profile: &ProviderProfile,
    ) -> Result<String, AuthError> {
        // The profile's public email carries no verification flag, so the list is
        // always consulted.
        let emails_url = self.config.emails_url.as_ref().ok_or_else(|| {
            AuthError::ProfileFetchFailure("no emails endpoint configured".to_string())
        })?;
        let emails: Vec<GitHubEmail> = fetch_json(&self.http, emails_url, access_token).await?;

        primary_verified_email(&emails)
            .map(str::to_string)
            .ok_or(AuthError::UnverifiedEmail)
    }
}
