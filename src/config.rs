use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    /// Gmail account used as the SMTP sender and login.
    pub gmail_user: String,
    /// App password for the sender account.
    pub gmail_app_password: String,
    /// Staff address receiving intake notifications and pending digests.
    pub staff_email: String,
    /// Externally reachable base URL used to build action links.
    pub base_url: String,
    /// SMTP relay host. Defaults to Gmail.
    pub smtp_host: String,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let gmail_user =
            env::var("GMAIL_USER").context("GMAIL_USER environment variable is required")?;

        let gmail_app_password = env::var("GMAIL_APP_PASSWORD")
            .context("GMAIL_APP_PASSWORD environment variable is required")?;

        let staff_email =
            env::var("EMAIL_DESTINO").context("EMAIL_DESTINO environment variable is required")?;

        let base_url = normalize_base_url(
            env::var("CLOUD_RUN_URL").context("CLOUD_RUN_URL environment variable is required")?,
        );

        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Ok(Config {
            gmail_user,
            gmail_app_password,
            staff_email,
            base_url,
            smtp_host,
            port,
            state_dir,
        })
    }
}

/// Strip trailing slashes so action links never contain `//action`.
pub fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_plain() {
        assert_eq!(
            normalize_base_url("https://service.example.com".to_string()),
            "https://service.example.com"
        );
    }

    #[test]
    fn test_normalize_base_url_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://service.example.com/".to_string()),
            "https://service.example.com"
        );
        assert_eq!(
            normalize_base_url("https://service.example.com///".to_string()),
            "https://service.example.com"
        );
    }
}
