use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::error::ConfigError;

const SECRET_KEY_VAR: &str = "FEDILINKS_SECRET_KEY";

/// Process-wide configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Symmetric key for the secret codec: 32 bytes, URL-safe base64.
    pub secret_key: String,
    pub port: u16,
    /// Externally visible origin, used to build the OAuth redirect URI.
    pub public_url: String,
    /// Names the `/dash/<app-name>/` base path and the registered OAuth app.
    pub app_name: String,
    pub state_dir: PathBuf,
    pub debug: bool,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let secret_key =
            env::var(SECRET_KEY_VAR).map_err(|_| ConfigError::Missing(SECRET_KEY_VAR))?;
        let port = try_load("FEDILINKS_PORT", "8080")?;
        let app_name = load_or("FEDILINKS_APP_NAME", "fedilinks");
        let public_url = env::var("FEDILINKS_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));
        let state_dir = env::var("FEDILINKS_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_dir());
        let debug = try_load("FEDILINKS_DEBUG", "false")?;

        Ok(Self {
            secret_key,
            port,
            public_url,
            app_name,
            state_dir,
            debug,
        })
    }

    /// `/dash/<app-name>/`, with the trailing slash.
    pub fn base_path(&self) -> String {
        format!("/dash/{}/", self.app_name)
    }

    /// Absolute callback URI the instance redirects back to.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}auth",
            self.public_url.trim_end_matches('/'),
            self.base_path()
        )
    }
}

fn load_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    load_or(key, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

fn default_state_dir() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("fedilinks");
    dir
}
