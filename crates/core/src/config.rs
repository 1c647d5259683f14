use crate::models::MAX_UPLOAD_BYTES;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SUPAVEC_URL: &str = "https://api.supavec.com";
pub const DEFAULT_CHAT_URL: &str = "https://llama3b.gaia.domains/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SUPAVEC_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanguageModelConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

/// Limits applied by the gateway itself, independent of either upstream.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub upstream_timeout: Duration,
    pub staging_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            staging_dir: std::env::temp_dir(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Origin allowed by CORS.
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
        }
    }
}
