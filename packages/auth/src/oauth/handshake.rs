//! # Sign-in handshake
//!
//! A sign-in moves through these stages:
//!
//! ```text
//! Initiated → RedirectedToProvider → CallbackReceived → Validated
//!           → TokenExchanged → ProfileFetched → Resolved
//! ```
//!
//! Any stage can fail instead; the failure is logged with the last stage reached
//! and the caller answers with a generic 400.
//!
//! ## [`Handshake::initiate`]
//!
//! Generates the CSRF state (and, for PKCE providers, a verifier with its S256
//! challenge), stores them in signed transient cookies and returns the headers for
//! a 302 to the provider.
//!
//! ## [`Handshake::complete`]
//!
//! 1. Reads the stored state (and verifier) from cookies and `code` / `state` from
//!    the query. Anything missing, or a state mismatch, fails before any network call.
//! 2. Exchanges the code at the provider's token endpoint.
//! 3. Fetches the profile with the access token.
//! 4. Resolves the local user: an existing `(provider, provider_id)` link wins;
//!    otherwise a user is created with the provider's verified email. A conflicting
//!    concurrent creation is retried as a lookup.
//! 5. Creates a session and returns the headers for a 302 to `/`: the session cookie
//!    (valid for a year), cleared transient cookies and the `Location`.

use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue};
use chrono::{Duration, Months, Utc};
use oauth2::{AccessToken, CsrfToken, PkceCodeChallenge};
use serde::Deserialize;

use super::{IdentityProvider, ProviderProfile};
use crate::cookies::{combine_headers, set_cookie_headers, CookieTransport};
use crate::db::AccountStore;
use crate::error::{AuthError, StoreError};
use crate::models::{NewAccount, Session, User};
use crate::session::{SessionManager, SESSION_LIFETIME_DAYS};
use crate::token::generate_session_token;

/// Lifetime of the session cookie issued at the end of a sign-in. The session row
/// itself keeps the regular lifetime and is renewed on use.
pub const ISSUED_COOKIE_MONTHS: u32 = 12;

/// Where a completed sign-in lands.
pub const HOME_PATH: &str = "/";

/// Progress of one sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initiated,
    RedirectedToProvider,
    CallbackReceived,
    Validated,
    TokenExchanged,
    ProfileFetched,
    Resolved,
}

/// Query parameters of the provider's redirect back to us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// A finished sign-in.
#[derive(Debug)]
pub struct Completion {
    pub user: User,
    pub session: Session,
    /// `Set-Cookie` headers and `Location` for the 302 response.
    pub headers: HeaderMap,
}

/// One provider's sign-in, wired to the stores it needs.
pub struct Handshake<'a> {
    provider: &'a dyn IdentityProvider,
    cookies: &'a CookieTransport,
    accounts: &'a dyn AccountStore,
    sessions: &'a SessionManager,
}

impl<'a> Handshake<'a> {
    pub fn new(
        provider: &'a dyn IdentityProvider,
        cookies: &'a CookieTransport,
        accounts: &'a dyn AccountStore,
        sessions: &'a SessionManager,
    ) -> Self {
        Self {
            provider,
            cookies,
            accounts,
            sessions,
        }
    }

    /// Headers for the redirect to the provider: `Location` and one `Set-Cookie`
    /// per transient value.
    pub fn initiate(&self) -> Result<HeaderMap, AuthError> {
        self.trace(Stage::Initiated);
        let state = CsrfToken::new_random();
        let mut transients = vec![self
            .cookies
            .transient_cookie(self.provider.state_cookie(), state.secret())];

        let pkce_challenge = self.provider.verifier_cookie().map(|name| {
            let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
            transients.push(self.cookies.transient_cookie(name, verifier.secret()));
            challenge
        });

        let url = self.provider.authorization_url(state, pkce_challenge);
        let headers = combine_headers([location(url.as_str())?, set_cookie_headers(transients)?]);
        self.trace(Stage::RedirectedToProvider);
        Ok(headers)
    }

    /// `Set-Cookie` headers expiring this provider's transient cookies.
    pub fn clear_transients(&self) -> Result<HeaderMap, AuthError> {
        let names = std::iter::once(self.provider.state_cookie()).chain(self.provider.verifier_cookie());
        Ok(set_cookie_headers(
            names.map(|name| self.cookies.clear_transient(name)),
        )?)
    }

    /// Finish the sign-in from the provider's redirect.
    #[tracing::instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn complete(
        &self,
        cookie_header: Option<&str>,
        params: &CallbackParams,
    ) -> Result<Completion, AuthError> {
        self.trace(Stage::CallbackReceived);
        let (code, pkce_verifier) = self
            .check_callback(cookie_header, params)
            .map_err(|e| self.fail(Stage::CallbackReceived, e))?;
        self.trace(Stage::Validated);

        let access_token = self
            .provider
            .exchange_code(code, pkce_verifier.as_deref())
            .await
            .map_err(|e| self.fail(Stage::Validated, e))?;
        self.trace(Stage::TokenExchanged);

        let profile = self
            .provider
            .fetch_profile(&access_token)
            .await
            .map_err(|e| self.fail(Stage::TokenExchanged, e))?;
        self.trace(Stage::ProfileFetched);

        let user = self
            .resolve_user(&access_token, &profile)
            .await
            .map_err(|e| self.fail(Stage::ProfileFetched, e))?;
        self.trace(Stage::Resolved);

        let token = generate_session_token();
        let headers = self
            .issued_headers(&token)
            .map_err(|e| self.fail(Stage::Resolved, e))?;
        let session = self
            .sessions
            .create(&token, user.id)
            .await
            .map_err(|e| self.fail(Stage::Resolved, e.into()))?;

        tracing::info!(user_id = %user.id, "signed in");
        Ok(Completion {
            user,
            session,
            headers,
        })
    }

    /// Headers for the final redirect: the session cookie for `token`, cleared
    /// transients and `Location`. Built before the session row is written.
    fn issued_headers(&self, token: &str) -> Result<HeaderMap, AuthError> {
        let cookie_expiry = Utc::now()
            .checked_add_months(Months::new(ISSUED_COOKIE_MONTHS))
            .unwrap_or_else(|| Utc::now() + Duration::days(SESSION_LIFETIME_DAYS));
        let session_cookie = set_cookie_headers([self.cookies.session_cookie(token, cookie_expiry)])?;
        Ok(combine_headers([
            session_cookie,
            self.clear_transients()?,
            location(HOME_PATH)?,
        ]))
    }

    /// Check that every value of the round trip is present and the states match.
    fn check_callback<'p>(
        &self,
        cookie_header: Option<&str>,
        params: &'p CallbackParams,
    ) -> Result<(&'p str, Option<String>), AuthError> {
        let stored_state = self
            .cookies
            .read_transient(self.provider.state_cookie(), cookie_header);
        let code = params.code.as_deref().filter(|c| !c.is_empty());
        let state = params.state.as_deref().filter(|s| !s.is_empty());

        let (Some(stored_state), Some(code), Some(state)) = (stored_state, code, state) else {
            return Err(AuthError::InvalidRequest("missing state or code"));
        };

        let pkce_verifier = match self.provider.verifier_cookie() {
            Some(name) => Some(
                self.cookies
                    .read_transient(name, cookie_header)
                    .ok_or(AuthError::InvalidRequest("missing code verifier"))?,
            ),
            None => None,
        };

        if stored_state != state {
            return Err(AuthError::InvalidRequest("state mismatch"));
        }

        Ok((code, pkce_verifier))
    }

    /// Find the user linked to the profile, creating one on first sign-in.
    async fn resolve_user(
        &self,
        access_token: &AccessToken,
        profile: &ProviderProfile,
    ) -> Result<User, AuthError> {
        let provider = self.provider.name();
        let provider_id = profile.provider_id();

        if let Some(user) = self.accounts.find_by_provider(provider, &provider_id).await? {
            return Ok(user);
        }

        let email = self.provider.verified_email(access_token, profile).await?;
        let account = NewAccount {
            provider_name: provider,
            provider_id: provider_id.clone(),
            username: profile.username().to_string(),
            email,
        };

        match self.accounts.create_account(account).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "account created");
                Ok(user)
            }
            Err(StoreError::Conflict(reason)) => {
                // A concurrent callback for the same identity may have won the insert.
                tracing::debug!(%reason, "account creation conflicted, retrying lookup");
                self.accounts
                    .find_by_provider(provider, &provider_id)
                    .await?
                    .ok_or(AuthError::Conflict(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn trace(&self, stage: Stage) {
        tracing::debug!(provider = %self.provider.name(), ?stage, "sign-in stage");
    }

    fn fail(&self, stage: Stage, err: AuthError) -> AuthError {
        match &err {
            AuthError::Persistence(_) => {
                tracing::error!(provider = %self.provider.name(), ?stage, "sign-in failed: {}", err)
            }
            _ => tracing::warn!(provider = %self.provider.name(), ?stage, "sign-in failed: {}", err),
        }
        err
    }
}

fn location(target: &str) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::try_from(target)?);
    Ok(headers)
}
