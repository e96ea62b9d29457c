//! # Cookie transport
//!
//! Serialises and reads the four cookies used by sign-in:
//!
//! | Cookie | Holds | Lifetime |
//! |--------|-------|----------|
//! | [`SESSION_COOKIE`] | raw session token | `Expires` set by the issuer |
//! | [`GITHUB_STATE_COOKIE`] | CSRF state | [`TRANSIENT_MAX_AGE_SECS`] |
//! | [`GOOGLE_STATE_COOKIE`] | CSRF state | [`TRANSIENT_MAX_AGE_SECS`] |
//! | [`GOOGLE_CODE_VERIFIER_COOKIE`] | PKCE verifier | [`TRANSIENT_MAX_AGE_SECS`] |
//!
//! Every cookie is `HttpOnly; SameSite=Lax; Path=/`, plus `Secure` in production.
//! Transient values are signed with the process [`Key`]; a tampered or unsigned
//! value reads back as absent.
//!
//! A response may carry several `Set-Cookie` headers, so [`combine_headers`] merges
//! header maps with append semantics.

use axum::http::header::{InvalidHeaderValue, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use cookie::{Cookie, CookieJar, Key, SameSite};
use time::{Duration, OffsetDateTime};

pub const SESSION_COOKIE: &str = "auth-session";
pub const GITHUB_STATE_COOKIE: &str = "github_oauth_state";
pub const GOOGLE_STATE_COOKIE: &str = "google_oauth_state";
pub const GOOGLE_CODE_VERIFIER_COOKIE: &str = "google_code_verifier";

/// Max age of the OAuth state and verifier cookies (10 minutes).
pub const TRANSIENT_MAX_AGE_SECS: i64 = 60 * 10;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Returned when the configured signing secret is too short.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cookie secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
pub struct CookieKeyError(pub usize);

/// Per-cookie attributes. `HttpOnly`, `SameSite=Lax` and `Path=/` are always set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub secure: bool,
    pub expires: Option<OffsetDateTime>,
    pub max_age: Option<Duration>,
}

/// Serialise one cookie as a `Set-Cookie` value.
pub fn serialize(name: &str, value: &str, options: &CookieOptions) -> String {
    build(name, value, options).to_string()
}

/// Read a cookie value from a `Cookie` request header. Empty values count as absent.
pub fn parse(name: &str, cookie_header: Option<&str>) -> Option<String> {
    jar_from_header(cookie_header?)
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Merge header maps, keeping every value of repeated headers such as `Set-Cookie`.
pub fn combine_headers<I>(sources: I) -> HeaderMap
where
    I: IntoIterator<Item = HeaderMap>,
{
    let mut combined = HeaderMap::new();
    for headers in sources {
        for (name, value) in headers.iter() {
            combined.append(name.clone(), value.clone());
        }
    }
    combined
}

/// One `Set-Cookie` header per serialised cookie.
pub fn set_cookie_headers<I>(cookies: I) -> Result<HeaderMap, InvalidHeaderValue>
where
    I: IntoIterator<Item = String>,
{
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        headers.append(SET_COOKIE, HeaderValue::try_from(cookie)?);
    }
    Ok(headers)
}

fn build(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(options.secure);
    if let Some(expires) = options.expires {
        builder = builder.expires(expires);
    }
    if let Some(max_age) = options.max_age {
        builder = builder.max_age(max_age);
    }
    builder.build()
}

fn jar_from_header(header: &str) -> CookieJar {
    let mut jar = CookieJar::new();
    for cookie in Cookie::split_parse(header).flatten() {
        jar.add_original(cookie.into_owned());
    }
    jar
}

fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Cookie settings shared by every request: the `Secure` flag and signing key.
#[derive(Clone)]
pub struct CookieTransport {
    secure: bool,
    key: Key,
}

impl CookieTransport {
    /// Build a transport. Without a secret a random key is generated, so in-flight
    /// sign-ins do not survive a restart.
    pub fn new(secure: bool, secret: Option<&[u8]>) -> Result<Self, CookieKeyError> {
        let key = match secret {
            Some(secret) if secret.len() >= MIN_SECRET_LEN => Key::derive_from(secret),
            Some(secret) => return Err(CookieKeyError(secret.len())),
            None => Key::generate(),
        };
        Ok(Self { secure, key })
    }

    /// The session cookie carrying `token`, expiring at `expires_at`.
    pub fn session_cookie(&self, token: &str, expires_at: DateTime<Utc>) -> String {
        let options = CookieOptions {
            secure: self.secure,
            expires: Some(to_offset(expires_at)),
            max_age: None,
        };
        serialize(SESSION_COOKIE, token, &options)
    }

    /// An empty session cookie dated at the Unix epoch, which browsers delete.
    pub fn clear_session_cookie(&self) -> String {
        let options = CookieOptions {
            secure: self.secure,
            expires: Some(OffsetDateTime::UNIX_EPOCH),
            max_age: None,
        };
        serialize(SESSION_COOKIE, "", &options)
    }

    /// A signed, short-lived cookie for OAuth state or a PKCE verifier.
    pub fn transient_cookie(&self, name: &str, value: &str) -> String {
        let options = CookieOptions {
            secure: self.secure,
            expires: None,
            max_age: Some(Duration::seconds(TRANSIENT_MAX_AGE_SECS)),
        };
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key).add(build(name, value, &options));
        // The jar holds exactly the cookie just added.
        jar.get(name).map(|c| c.to_string()).unwrap_or_default()
    }

    /// Read and verify a transient cookie.
    pub fn read_transient(&self, name: &str, cookie_header: Option<&str>) -> Option<String> {
        jar_from_header(cookie_header?)
            .signed(&self.key)
            .get(name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Expire a transient cookie immediately.
    pub fn clear_transient(&self, name: &str) -> String {
        let options = CookieOptions {
            secure: self.secure,
            expires: Some(OffsetDateTime::UNIX_EPOCH),
            max_age: Some(Duration::ZERO),
        };
        serialize(name, "", &options)
    }
}
