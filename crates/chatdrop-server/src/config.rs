//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration on a local network.

use std::net::SocketAddr;
use std::path::PathBuf;

use chatdrop_shared::constants::{
    DEFAULT_AI_API_URL, DEFAULT_AI_MODEL, DEFAULT_HTTP_PORT, MAX_HISTORY, MAX_UPLOAD_SIZE,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Directory where uploaded files are stored.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// JSON file holding the message history.
    /// Env: `MESSAGES_FILE`
    /// Default: `./messages.json`
    pub messages_file: PathBuf,

    /// Maximum upload size in bytes, also the request body limit.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 16 MiB
    pub max_upload_size: usize,

    /// Number of records kept in the message log.
    /// Env: `MAX_HISTORY`
    /// Default: `100`
    pub max_history: usize,

    /// Chat-completion endpoint. Empty disables the AI responder.
    /// Env: `AI_API_URL`
    pub ai_api_url: Option<String>,

    /// Model identifier sent to the completion endpoint.
    /// Env: `AI_MODEL`
    /// Default: `gpt-4o-mini`
    pub ai_model: String,

    /// Bearer token for the completion endpoint.
    /// Env: `AI_API_KEY`
    /// Default: unset.
    pub ai_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            upload_dir: PathBuf::from("./uploads"),
            messages_file: PathBuf::from("./messages.json"),
            max_upload_size: MAX_UPLOAD_SIZE,
            max_history: MAX_HISTORY,
            ai_api_url: Some(DEFAULT_AI_API_URL.to_string()),
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_api_key: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("upload_dir", &self.upload_dir)
            .field("messages_file", &self.messages_file)
            .field("max_upload_size", &self.max_upload_size)
            .field("max_history", &self.max_history)
            .field("ai_api_url", &self.ai_api_url)
            .field("ai_model", &self.ai_model)
            .field("ai_api_key", &self.ai_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(path);
        }

        if let Some(path) = lookup("MESSAGES_FILE") {
            config.messages_file = PathBuf::from(path);
        }

        if let Some(val) = lookup("MAX_UPLOAD_SIZE") {
            match parse_positive(&val) {
                Some(n) => config.max_upload_size = n,
                None => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("MAX_HISTORY") {
            match parse_positive(&val) {
                Some(n) => config.max_history = n,
                None => tracing::warn!(value = %val, "Invalid MAX_HISTORY, using default"),
            }
        }

        // -- AI responder --

        if let Some(url) = lookup("AI_API_URL") {
            let url = url.trim();
            config.ai_api_url = if url.is_empty() {
                None
            } else {
                Some(url.to_string())
            };
        }

        if let Some(model) = lookup("AI_MODEL") {
            if !model.trim().is_empty() {
                config.ai_model = model.trim().to_string();
            }
        }

        if let Some(key) = lookup("AI_API_KEY") {
            if !key.is_empty() {
                config.ai_api_key = Some(key);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(val: &str) -> Option<usize> {
    val.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.max_upload_size, 16 * 1024 * 1024);
        assert_eq!(config.max_history, 100);
        assert_eq!(config.ai_model, "gpt-4o-mini");
        assert!(config.ai_api_url.is_some());
        assert!(config.ai_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("UPLOAD_DIR", "/srv/uploads"),
            ("MESSAGES_FILE", "/srv/messages.json"),
            ("MAX_UPLOAD_SIZE", "1024"),
            ("MAX_HISTORY", "10"),
            ("AI_MODEL", "local-model"),
            ("AI_API_KEY", "secret"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.messages_file, PathBuf::from("/srv/messages.json"));
        assert_eq!(config.max_upload_size, 1024);
        assert_eq!(config.max_history, 10);
        assert_eq!(config.ai_model, "local-model");
        assert_eq!(config.ai_api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_UPLOAD_SIZE", "huge"),
            ("MAX_HISTORY", "0"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.max_upload_size, 16 * 1024 * 1024);
        assert_eq!(config.max_history, 100);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_from(&[("AI_API_KEY", "secret")]);
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_empty_ai_url_disables_responder() {
        let config = config_from(&[("AI_API_URL", "  ")]);
        assert!(config.ai_api_url.is_none());
    }
}
