use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Server {
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Database {
    /// Empty selects the in-memory store.
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Auth {
    /// Public origin of this server, used to build the OAuth redirect URIs.
    pub base: String,
    /// Marks every cookie `Secure`.
    pub production: bool,
    /// Cookie signing secret. Empty generates a key per process.
    pub secret: String,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Provider {
    pub id: String,
    pub secret: String,
}

impl Provider {
    pub fn is_configured(&self) -> bool {
        !self.id.is_empty() && !self.secret.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub github: Provider,
    pub google: Provider,
}

impl Settings {
    /// Defaults, then `config.toml` if present, then `SECTION_KEY` environment
    /// variables.
    pub(crate) fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.address", "127.0.0.1:8080")?
            .set_default("database.url", "")?
            .set_default("auth.base", "http://localhost:8080")?
            .set_default("auth.production", false)?
            .set_default("auth.secret", "")?
            .set_default("github.id", "")?
            .set_default("github.secret", "")?
            .set_default("google.id", "")?
            .set_default("google.secret", "")?
            .add_source(
                File::with_name("config.toml")
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::default().separator("_"))
            .build()?;

        config.try_deserialize()
    }

    /// The cookie signing secret, if one is configured.
    pub fn cookie_secret(&self) -> Option<&[u8]> {
        Some(self.auth.secret.as_bytes()).filter(|s| !s.is_empty())
    }
}
