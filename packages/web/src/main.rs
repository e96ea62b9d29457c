//! Sign-in server: GitHub and Google OAuth with cookie sessions.

use std::sync::Arc;

use anyhow::Context;
use auth::oauth::http_client;
use auth::{
    AccountStore, CookieTransport, GitHubOAuth, GoogleOAuth, MemoryStore, OAuthConfig, PgStore,
    SessionManager, SessionStore,
};
use tracing_subscriber::EnvFilter;

use routes::AppState;
use settings::Settings;

mod routes;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new().context("Failed to load settings")?;
    let state = app_state(&settings).await?;

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.address))?;
    tracing::info!("Server listening on {}", settings.server.address);

    axum::serve(listener, routes::router(state))
        .await
        .context("Server error")
}

async fn app_state(settings: &Settings) -> anyhow::Result<AppState> {
    let (sessions, accounts) = stores(settings).await?;

    let cookies = CookieTransport::new(settings.auth.production, settings.cookie_secret())
        .context("Invalid AUTH_SECRET")?;
    if settings.cookie_secret().is_none() {
        tracing::warn!("AUTH_SECRET not set, sign-ins in progress will not survive a restart");
    }

    for (name, provider) in [("GitHub", &settings.github), ("Google", &settings.google)] {
        if !provider.is_configured() {
            tracing::warn!("{} client id or secret not set, its sign-in will fail", name);
        }
    }

    let http = http_client().context("Failed to build HTTP client")?;
    let github = OAuthConfig::github(&settings.github.id, &settings.github.secret, &settings.auth.base)
        .context("Invalid auth.base")?;
    let google = OAuthConfig::google(&settings.google.id, &settings.google.secret, &settings.auth.base)
        .context("Invalid auth.base")?;

    Ok(AppState {
        sessions: SessionManager::new(sessions),
        accounts,
        cookies,
        github: Arc::new(GitHubOAuth::new(github, http.clone())),
        google: Arc::new(GoogleOAuth::new(google, http)),
    })
}

/// PostgreSQL when a database URL is configured, otherwise an in-memory store.
async fn stores(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn AccountStore>)> {
    if settings.database.url.is_empty() {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        let store = Arc::new(MemoryStore::new());
        let sessions: Arc<dyn SessionStore> = store.clone();
        let accounts: Arc<dyn AccountStore> = store;
        return Ok((sessions, accounts));
    }

    let pool = auth::db::connect(&settings.database.url)
        .await
        .context("Failed to connect to database")?;
    auth::db::migrate(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let store = Arc::new(PgStore::new(pool));
    let sessions: Arc<dyn SessionStore> = store.clone();
    let accounts: Arc<dyn AccountStore> = store;
    Ok((sessions, accounts))
}
