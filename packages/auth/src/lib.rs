//! # Auth crate: OAuth sign-in and cookie sessions
//!
//! Everything the web server needs to sign users in with GitHub or Google and keep
//! them signed in with an opaque session cookie. HTTP routing lives in the `web`
//! package; this crate only deals in header maps and domain values.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`token`] | Session token generation (160 random bits, base32) and id derivation (SHA-256, hex) |
//! | [`session`] | [`SessionManager`]: create, validate with renewal-on-read, invalidate |
//! | [`cookies`] | Session and signed transient cookies, `Set-Cookie` header assembly |
//! | [`oauth`] | GitHub and Google providers and the sign-in [`Handshake`] |
//! | [`db`] | [`SessionStore`] / [`AccountStore`] traits with PostgreSQL and in-memory backends |
//! | [`models`] | `User`, `Session` and their client-facing projections |
//! | [`error`] | [`StoreError`] and [`AuthError`] |
//!
//! ## Identity model
//!
//! A user is identified by `(provider, provider_id)`. Email is stored for display
//! and must be unique, but accounts are never linked by email: signing in with a
//! second provider under an address that is already taken fails.

pub mod cookies;
pub mod db;
pub mod error;
pub mod models;
pub mod oauth;
pub mod session;
pub mod token;

pub use cookies::CookieTransport;
pub use db::{AccountStore, MemoryStore, PgStore, SessionStore};
pub use error::{AuthError, StoreError};
pub use models::{CurrentSession, ProviderName, Session, User, UserInfo, ValidatedSession};
pub use oauth::{GitHubOAuth, GoogleOAuth, Handshake, IdentityProvider, OAuthConfig};
pub use session::SessionManager;
