use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_SESSION_MINUTES: i64 = 180;

/// Runtime configuration, sourced from the environment (and `.env` via dotenvy).
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Base URL of the Escomunidad REST API, without a trailing slash.
    pub api_base_url: String,
    /// URL of the chatbot endpoint, which lives outside the `/api` prefix.
    pub chatbot_url: String,
    /// Fixed wall-clock window after which a session is force-expired locally.
    pub session_duration: Duration,
    /// File holding the persisted session between console invocations.
    pub session_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_base_url = env::var("ESCOMUNIDAD_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let chatbot_url = env::var("ESCOMUNIDAD_CHATBOT_URL")
            .unwrap_or_else(|_| default_chatbot_url(&api_base_url));

        let minutes = match env::var("ESCOMUNIDAD_SESSION_MINUTES") {
            Ok(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("invalid ESCOMUNIDAD_SESSION_MINUTES value {raw:?}"))?,
            Err(_) => DEFAULT_SESSION_MINUTES,
        };
        if minutes <= 0 {
            return Err(anyhow!("ESCOMUNIDAD_SESSION_MINUTES must be positive"));
        }

        let session_file = match env::var("ESCOMUNIDAD_SESSION_FILE") {
            Ok(path) => PathBuf::from(path),
            Err(_) => dirs::home_dir()
                .context("unable to determine the home directory for the session file")?
                .join(".escomunidad")
                .join("session.json"),
        };

        Ok(Self {
            api_base_url,
            chatbot_url,
            session_duration: Duration::minutes(minutes),
            session_file,
        })
    }
}

/// The chatbot is mounted at the server root, next to the `/api` prefix.
fn default_chatbot_url(api_base_url: &str) -> String {
    let root = api_base_url
        .strip_suffix("/api")
        .unwrap_or(api_base_url)
        .trim_end_matches('/');
    format!("{root}/chatbot/ask/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatbot_url_derived_from_api_prefix() {
        assert_eq!(
            default_chatbot_url("http://localhost:8000/api"),
            "http://localhost:8000/chatbot/ask/"
        );
    }

    #[test]
    fn chatbot_url_without_api_suffix() {
        assert_eq!(
            default_chatbot_url("https://escomunidad.example"),
            "https://escomunidad.example/chatbot/ask/"
        );
    }
}
