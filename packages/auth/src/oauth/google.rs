//! # Google OAuth 2.0
//!
//! Mirrors [`super::github`] with Google's endpoints and scopes (`profile email`).
//! Google requires PKCE: the handshake stores a verifier cookie next to the state
//! cookie and the authorization URL carries the S256 challenge. The profile comes
//! from the OpenID Connect userinfo endpoint, keyed by `sub`.

use async_trait::async_trait;
use oauth2::url::Url;
use oauth2::{AccessToken, CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;

use super::{create_client, fetch_json, IdentityProvider, OAuthConfig, ProviderProfile};
use crate::cookies::{GOOGLE_CODE_VERIFIER_COOKIE, GOOGLE_STATE_COOKIE};
use crate::error::AuthError;
use crate::models::ProviderName;

/// Google user info from the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Google OAuth handler.
pub struct GoogleOAuth {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn name(&self) -> ProviderName {
        ProviderName::Google
    }

    fn state_cookie(&self) -> &'static str {
        GOOGLE_STATE_COOKIE
    }

    fn verifier_cookie(&self) -> Option<&'static str> {
        Some(GOOGLE_CODE_VERIFIER_COOKIE)
    }

    fn authorization_url(&self, state: CsrfToken, pkce_challenge: Option<PkceCodeChallenge>) -> Url {
        let client = create_client(&self.config);
        let mut request = client
            .authorize_url(|| state)
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()));
        if let Some(challenge) = pkce_challenge {
            request = request.set_pkce_challenge(challenge);
        }
        let (url, _) = request.url();
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
        let profile: GoogleProfile =
            fetch_json(&self.http, &self.config.profile_url, access_token).await?;
        Ok(ProviderProfile::Google(profile))
    }

    async fn verified_email(
        &self,
        _access_token: &AccessToken,
        profile: &ProviderProfile,
    ) -> Result<String, AuthError> {
        match profile {
            ProviderProfile::Google(p) => Ok(p.email.clone()),
            other => Err(AuthError::ProfileFetchFailure(format!(
                "expected a google profile, got {}",
                other.provider()
            ))),
        }
    }
}
