mod defaults;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::SofiaError;
use defaults::*;

/// Top-level SofIA configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sofia: SofiaConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SofiaConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When true, missing signature secrets fail closed instead of
    /// warn-and-allow.
    #[serde(default)]
    pub production: bool,
    /// Optional directory for rolling log files. Empty = stderr only.
    #[serde(default)]
    pub log_dir: String,
}

impl Default for SofiaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            production: false,
            log_dir: String::new(),
        }
    }
}

/// Task broker settings.
///
/// The queue itself lives behind the `TaskQueue` trait; `url` identifies
/// the external broker in deployments that run receiver and worker as
/// separate processes, and is surfaced in `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Webhook receiver settings: bind address, per-platform verification
/// tokens and signature secrets.
///
/// Facebook and Instagram share the Messenger verification token and app
/// secret, the way the Meta API shares them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub verify_token_whatsapp: String,
    #[serde(default)]
    pub verify_token_facebook: String,
    #[serde(default)]
    pub app_secret_whatsapp: String,
    #[serde(default)]
    pub app_secret_facebook: String,
    /// Bearer token for the operator maintenance endpoint. Empty = endpoint disabled.
    #[serde(default)]
    pub admin_key: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            verify_token_whatsapp: String::new(),
            verify_token_facebook: String::new(),
            app_secret_whatsapp: String::new(),
            app_secret_facebook: String::new(),
            admin_key: String::new(),
        }
    }
}

/// AI provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Gemini settings. Generation parameters are fixed here, never taken
/// from user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Outbound channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub whatsapp: Option<WhatsAppConfig>,
    pub messenger: Option<MessengerConfig>,
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub phone_id: String,
}

/// Messenger (Facebook/Instagram) page credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessengerConfig {
    #[serde(default)]
    pub page_token: String,
    #[serde(default)]
    pub page_id: String,
}

/// Knowledge document settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_path")]
    pub path: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: default_knowledge_path(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Task worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            concurrency: default_concurrency(),
        }
    }
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Falls back to defaults if the file does not exist; secrets normally
/// arrive through the environment in deployment.
pub fn load(path: &str) -> Result<Config, SofiaError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SofiaError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| SofiaError::Config(format!("failed to parse config: {}", e)))?
    } else {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Overlay environment variables onto the loaded config.
///
/// Variable names match the deployment environment of the service
/// (Render-style flat env), so `config.toml` can stay secret-free.
fn apply_env_overrides(config: &mut Config) {
    fn env_set(name: &str, slot: &mut String) {
        if let Ok(value) = std::env::var(name) {
            if !value.trim().is_empty() {
                *slot = value;
            }
        }
    }

    if std::env::var("SOFIA_ENV").as_deref() == Ok("production") {
        config.sofia.production = true;
    }

    env_set("BROKER_URL", &mut config.broker.url);
    env_set("GEMINI_API_KEY", &mut config.provider.gemini.api_key);
    env_set(
        "VERIFY_TOKEN_WHATSAPP",
        &mut config.webhook.verify_token_whatsapp,
    );
    env_set(
        "VERIFY_TOKEN_FACEBOOK",
        &mut config.webhook.verify_token_facebook,
    );
    env_set(
        "APP_SECRET_WHATSAPP",
        &mut config.webhook.app_secret_whatsapp,
    );
    env_set(
        "APP_SECRET_FACEBOOK",
        &mut config.webhook.app_secret_facebook,
    );
    env_set("SOFIA_ADMIN_KEY", &mut config.webhook.admin_key);

    if let Ok(token) = std::env::var("WHATSAPP_TOKEN") {
        let wa = config.channel.whatsapp.get_or_insert_with(Default::default);
        wa.token = token;
    }
    if let Ok(phone_id) = std::env::var("WHATSAPP_PHONE_ID") {
        let wa = config.channel.whatsapp.get_or_insert_with(Default::default);
        wa.phone_id = phone_id;
    }
    if let Ok(token) = std::env::var("FACEBOOK_PAGE_ACCESS_TOKEN") {
        let fb = config
            .channel
            .messenger
            .get_or_insert_with(Default::default);
        fb.page_token = token;
    }
    if let Ok(page_id) = std::env::var("FACEBOOK_PAGE_ID") {
        let fb = config
            .channel
            .messenger
            .get_or_insert_with(Default::default);
        fb.page_id = page_id;
    }
}

impl Config {
    /// Validate required settings before `start`.
    ///
    /// Missing provider or channel credentials are fatal. Missing
    /// signature secrets are fatal only in production; otherwise the
    /// verifier degrades to warn-and-allow and we flag it here once.
    pub fn validate(&self) -> Result<(), SofiaError> {
        if self.provider.gemini.api_key.is_empty() {
            return Err(SofiaError::Config(
                "provider.gemini.api_key is required (or set GEMINI_API_KEY)".into(),
            ));
        }

        let whatsapp_ok = self
            .channel
            .whatsapp
            .as_ref()
            .is_some_and(|wa| !wa.token.is_empty() && !wa.phone_id.is_empty());
        let messenger_ok = self
            .channel
            .messenger
            .as_ref()
            .is_some_and(|fb| !fb.page_token.is_empty() && !fb.page_id.is_empty());

        if !whatsapp_ok && !messenger_ok {
            return Err(SofiaError::Config(
                "no delivery channel configured: set [channel.whatsapp] token/phone_id \
                 or [channel.messenger] page_token/page_id"
                    .into(),
            ));
        }

        if whatsapp_ok && self.webhook.verify_token_whatsapp.is_empty() {
            return Err(SofiaError::Config(
                "webhook.verify_token_whatsapp is required when WhatsApp is configured".into(),
            ));
        }
        if messenger_ok && self.webhook.verify_token_facebook.is_empty() {
            return Err(SofiaError::Config(
                "webhook.verify_token_facebook is required when Messenger is configured".into(),
            ));
        }

        let secrets_missing = (whatsapp_ok && self.webhook.app_secret_whatsapp.is_empty())
            || (messenger_ok && self.webhook.app_secret_facebook.is_empty());
        if secrets_missing {
            if self.sofia.production {
                return Err(SofiaError::Config(
                    "signature app secrets are required in production".into(),
                ));
            }
            warn!("signature app secret missing — webhook POSTs will be accepted UNVERIFIED (non-production only)");
        }

        Ok(())
    }
}
