//! # OAuth sign-in
//!
//! ## Providers
//!
//! Each provider implements [`IdentityProvider`]: it builds its authorization URL,
//! exchanges an authorization code for an access token, and fetches the signed-in
//! user's profile.
//!
//! | Provider | Scopes | PKCE | Email source |
//! |----------|--------|------|--------------|
//! | [`GitHubOAuth`] | `user:email` | no | `/user/emails`, primary and verified |
//! | [`GoogleOAuth`] | `profile email` | yes (S256) | userinfo `email` |
//!
//! Providers are plain values built once from [`OAuthConfig`] and a shared
//! [`reqwest::Client`] (see [`http_client`]); there is no global client.
//!
//! ## Handshake
//!
//! [`Handshake`] drives one sign-in from the redirect to the provider through the
//! callback to a new session. See [`handshake`] for the stage-by-stage rules.

mod config;
mod github;
mod google;
pub mod handshake;

use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{
    AccessToken, AuthorizationCode, CsrfToken, EndpointNotSet, EndpointSet, PkceCodeChallenge,
    PkceCodeVerifier, TokenResponse,
};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;

use crate::error::AuthError;
use crate::models::ProviderName;

pub use config::OAuthConfig;
pub use github::{primary_verified_email, GitHubEmail, GitHubOAuth, GitHubProfile};
pub use google::{GoogleOAuth, GoogleProfile};
pub use handshake::{CallbackParams, Completion, Handshake, Stage};

/// Upper bound for each call to a provider endpoint.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by all providers. Redirects are disabled for the token
/// exchange, and every request is bounded by [`HTTP_TIMEOUT`].
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

/// A profile as returned by one of the providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderProfile {
    GitHub(GitHubProfile),
    Google(GoogleProfile),
}

impl ProviderProfile {
    pub fn provider(&self) -> ProviderName {
        match self {
            ProviderProfile::GitHub(_) => ProviderName::GitHub,
            ProviderProfile::Google(_) => ProviderName::Google,
        }
    }

    /// The provider's stable identifier for the user.
    pub fn provider_id(&self) -> String {
        match self {
            ProviderProfile::GitHub(p) => p.id.to_string(),
            ProviderProfile::Google(p) => p.sub.clone(),
        }
    }

    /// Username for a newly created local account.
    pub fn username(&self) -> &str {
        match self {
            ProviderProfile::GitHub(p) => &p.login,
            ProviderProfile::Google(p) => p.name.as_deref().unwrap_or(&p.email),
        }
    }
}

/// One identity provider's side of the authorization-code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Cookie holding the CSRF state between redirect and callback.
    fn state_cookie(&self) -> &'static str;

    /// Cookie holding the PKCE verifier. `None` when the provider does not use PKCE.
    fn verifier_cookie(&self) -> Option<&'static str> {
        None
    }

    /// Authorization URL for `state`, with the PKCE challenge when the provider
    /// uses one.
    fn authorization_url(&self, state: CsrfToken, pkce_challenge: Option<PkceCodeChallenge>) -> Url;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<AccessToken, AuthError>;

    /// Fetch the user's profile.
    async fn fetch_profile(&self, access_token: &AccessToken) -> Result<ProviderProfile, AuthError>;

    /// The email to create a new account with.
    async fn verified_email(
        &self,
        access_token: &AccessToken,
        profile: &ProviderProfile,
    ) -> Result<String, AuthError>;
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

fn create_client(config: &OAuthConfig) -> ConfiguredClient {
    BasicClient::new(config.client_id.clone())
        .set_client_secret(config.client_secret.clone())
        .set_auth_uri(config.auth_url.clone())
        .set_token_uri(config.token_url.clone())
        .set_redirect_uri(config.redirect_url.clone())
}

/// Exchange `code` (and the PKCE verifier, if any) at the token endpoint.
async fn exchange_code(
    config: &OAuthConfig,
    http: &reqwest::Client,
    code: &str,
    pkce_verifier: Option<&str>,
) -> Result<AccessToken, AuthError> {
    let client = create_client(config);
    let mut request = client.exchange_code(AuthorizationCode::new(code.to_string()));
    if let Some(verifier) = pkce_verifier {
        request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
    }

    let token = request
        .request_async(http)
        .await
        .map_err(|e| AuthError::ExchangeFailure(e.to_string()))?;

    Ok(token.access_token().clone())
}

/// GET a JSON document with the access token as bearer credential.
async fn fetch_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &Url,
    access_token: &AccessToken,
) -> Result<T, AuthError> {
    let response = http
        .get(url.clone())
        .bearer_auth(access_token.secret())
        .header(ACCEPT, "application/json")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AuthError::ProfileFetchFailure(e.to_string()))?;

    response
        .json()
        .await
        .map_err(|e| AuthError::ProfileFetchFailure(e.to_string()))
}

/// Config pointing every endpoint at `server` (a wiremock instance in tests).
#[cfg(test)]
pub(crate) fn mock_config(server: &str, with_emails: bool) -> OAuthConfig {
    use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};

    OAuthConfig {
        client_id: ClientId::new("client-id".to_string()),
        client_secret: ClientSecret::new("client-secret".to_string()),
        auth_url: AuthUrl::new(format!("{server}/authorize")).unwrap(),
        token_url: TokenUrl::new(format!("{server}/token")).unwrap(),
        redirect_url: RedirectUrl::new("http://localhost:8080/callback".to_string()).unwrap(),
        profile_url: Url::parse(&format!("{server}/user")).unwrap(),
        emails_url: with_emails.then(|| Url::parse(&format!("{server}/user/emails")).unwrap()),
    }
}
