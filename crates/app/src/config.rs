use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use courier_live::LiveConfig;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const CONFIG_DIRECTORY_NAME: &str = "courier";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_HTTP_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

/// Which gateway backend the composition root builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    Local,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSettings {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_base_ms: default_reconnect_base_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_api_mode")]
    pub api: ApiMode,
    #[serde(default = "default_http_base_url")]
    pub http_base_url: String,
    #[serde(default)]
    pub live: LiveSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: default_api_mode(),
            http_base_url: default_http_base_url(),
            live: LiveSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn normalized(mut self) -> Self {
        self.http_base_url = if self.http_base_url.trim().is_empty() {
            default_http_base_url()
        } else {
            self.http_base_url.trim().to_string()
        };
        self.live.ws_url = if self.live.ws_url.trim().is_empty() {
            default_ws_url()
        } else {
            self.live.ws_url.trim().to_string()
        };
        self
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            ws_url: self.live.ws_url.clone(),
            reconnect_base: Duration::from_millis(self.live.reconnect_base_ms),
            max_reconnect_attempts: self.live.max_reconnect_attempts,
            heartbeat_interval: Duration::from_secs(self.live.heartbeat_secs),
        }
    }
}

/// File-backed config with an atomically-swapped in-memory view.
pub struct ConfigStore {
    settings: Arc<ArcSwap<AppConfig>>,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".courier"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<AppConfig> {
        self.settings.load_full()
    }

    pub fn update(&self, config: AppConfig) -> Result<(), ConfigError> {
        let normalized = config.normalized();
        self.persist(&normalized)?;
        self.settings.store(Arc::new(normalized));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> AppConfig {
        if !path.exists() {
            tracing::info!("config file not found at {:?}, using defaults", path);
            return AppConfig::default();
        }

        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Json::file(path));

        match figment.extract::<AppConfig>() {
            Ok(config) => config.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse config from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppConfig::default()
            }
        }
    }

    fn persist(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-config-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(config).context(SerializeConfigSnafu {
            stage: "serialize-config-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-config-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-config-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved config to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to create config directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize config on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write config file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace config file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_api_mode() -> ApiMode {
    ApiMode::Local
}

fn default_http_base_url() -> String {
    DEFAULT_HTTP_BASE_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_the_local_backend() {
        let config = AppConfig::default();
        assert_eq!(config.api, ApiMode::Local);
        assert_eq!(config.http_base_url, DEFAULT_HTTP_BASE_URL);
        assert_eq!(config.live.max_reconnect_attempts, 5);
    }

    #[test]
    fn normalization_restores_blank_urls() {
        let config = AppConfig {
            http_base_url: "   ".to_string(),
            ..AppConfig::default()
        }
        .normalized();
        assert_eq!(config.http_base_url, DEFAULT_HTTP_BASE_URL);
    }

    #[test]
    fn live_config_converts_units() {
        let config = AppConfig::default();
        let live = config.live_config();
        assert_eq!(live.reconnect_base, Duration::from_secs(1));
        assert_eq!(live.heartbeat_interval, Duration::from_secs(30));
    }
}
