//! Data models for users, linked provider accounts and sessions.

mod session;
mod user;

pub use session::{CurrentSession, Session, ValidatedSession};
pub use user::{NewAccount, ProviderName, User, UserInfo};
