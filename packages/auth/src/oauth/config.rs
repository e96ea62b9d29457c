//! OAuth provider configuration.

use oauth2::url::{ParseError, Url};
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};

/// OAuth provider configuration: client credentials plus every endpoint the
/// handshake talks to.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub redirect_url: RedirectUrl,
    pub profile_url: Url,
    /// GitHub only: the list of the user's email addresses.
    pub emails_url: Option<Url>,
}

impl OAuthConfig {
    /// GitHub OAuth config. `base_url` is the public origin of this server.
    pub fn github(client_id: &str, client_secret: &str, base_url: &str) -> Result<Self, ParseError> {
        Ok(Self {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            auth_url: AuthUrl::new("https://github.com/login/oauth/authorize".to_string())?,
            token_url: TokenUrl::new("https://github.com/login/oauth/access_token".to_string())?,
            redirect_url: callback_url(base_url, "github")?,
            profile_url: Url::parse("https://api.github.com/user")?,
            emails_url: Some(Url::parse("https://api.github.com/user/emails")?),
        })
    }

    /// Google OAuth config. `base_url` is the public origin of this server.
    pub fn google(client_id: &str, client_secret: &str, base_url: &str) -> Result<Self, ParseError> {
        Ok(Self {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            auth_url: AuthUrl::new("https://accounts.google.com/o/oauth2/v2/auth".to_string())?,
            token_url: TokenUrl::new("https://oauth2.googleapis.com/token".to_string())?,
            redirect_url: callback_url(base_url, "google")?,
            profile_url: Url::parse("https://openidconnect.googleapis.com/v1/userinfo")?,
            emails_url: None,
        })
    }
}

/// `<base>/api/login/<provider>/callback`
fn callback_url(base_url: &str, provider: &str) -> Result<RedirectUrl, ParseError> {
    RedirectUrl::new(format!(
        "{}/api/login/{}/callback",
        base_url.trim_end_matches('/'),
        provider
    ))
}
