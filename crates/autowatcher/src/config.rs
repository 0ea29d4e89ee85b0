//! Process-start configuration, read directly from the environment —
//! no config-file framework, matching the reference deployment's style.

use std::{path::PathBuf, time::Duration};

use color_eyre::eyre::Context as _;

fn env_var(key: &str) -> color_eyre::Result<String> {
    std::env::var(key).wrap_err_with(|| format!("unable to read {key} env var"))
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub struct Config {
    pub client_id: String,
    pub client_secret: String,

    pub database_url: String,

    /// `DataProtection.KeyDirectory`; `None` means ephemeral, dev-only keys.
    pub key_directory: Option<PathBuf>,

    /// Used to build the hub callback URL as `{base_url}/webhook`.
    pub base_url: String,

    pub polling_interval: Duration,
    pub fanout_interval: Duration,

    /// The substring the webhook GET handler requires in `hub.topic`.
    pub platform_host: String,

    /// Shared-secret header value gating the diagnostics JSON surface.
    pub operator_token: String,

    pub bind_addr: String,
}

/// WebSub manager and token-refresh-loop cadences are fixed, not configurable.
pub const WEBSUB_TICK_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const TOKEN_REFRESH_TICK_INTERVAL: Duration = Duration::from_secs(15 * 60);

impl Config {
    pub fn from_env() -> color_eyre::Result<Self> {
        let polling_interval_hours: f64 = env_var_opt("YOUTUBE_POLLING_INTERVAL_HOURS")
            .map(|value| value.parse())
            .transpose()
            .wrap_err("YOUTUBE_POLLING_INTERVAL_HOURS must be a number")?
            .unwrap_or(1.0);

        let fanout_interval_minutes: f64 = env_var_opt("VIDEO_PROCESSING_INTERVAL_MINUTES")
            .map(|value| value.parse())
            .transpose()
            .wrap_err("VIDEO_PROCESSING_INTERVAL_MINUTES must be a number")?
            .unwrap_or(5.0);

        Ok(Self {
            client_id: env_var("GOOGLE_CLIENT_ID")?,
            client_secret: env_var("GOOGLE_CLIENT_SECRET")?,
            database_url: env_var("DATABASE_URL")?,
            key_directory: env_var_opt("DATA_PROTECTION_KEY_DIRECTORY").map(PathBuf::from),
            base_url: env_var("BASE_URL")?,
            polling_interval: Duration::from_secs_f64(polling_interval_hours * 60.0 * 60.0),
            fanout_interval: Duration::from_secs_f64(fanout_interval_minutes * 60.0),
            platform_host: env_var_opt("PLATFORM_HOST")
                .unwrap_or_else(|| "www.youtube.com".to_owned()),
            operator_token: env_var("OPERATOR_TOKEN")?,
            bind_addr: env_var_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
        })
    }

    pub fn webhook_callback_url(&self) -> String {
        format!("{}/webhook", self.base_url)
    }
}
