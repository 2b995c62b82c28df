//! Redis connection configuration

use serde::{Deserialize, Serialize};

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisConfig {
    /// Server URL (e.g., "redis://127.0.0.1:6379")
    #[serde(default = "default_url")]
    pub url: String,

    /// Optional password, injected into the URL when it carries none
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// Per-command timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            password: None,
            db: 0,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl RedisConfig {
    /// Connection URL with password and database applied
    pub fn connection_url(&self) -> String {
        let (scheme, rest) = match self.url.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("redis", self.url.as_str()),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };

        let authority = match &self.password {
            Some(password) if !authority.contains('@') => format!(":{}@{}", password, authority),
            _ => authority.to_string(),
        };

        let db = match path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => self.db.to_string(),
        };

        format!("{}://{}/{}", scheme, authority, db)
    }

    /// URL safe to log (password masked)
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match (url.split_once("://"), url.rfind('@')) {
            (Some((scheme, _)), Some(at)) => format!("{}://***{}", scheme, &url[at..]),
            _ => url,
        }
    }
}
