//! 应用配置
//!
//! 配置只在启动时构建一次，然后显式传给各组件的构造函数。
//! 优先级：内置默认值 < TOML 配置文件 < 环境变量（含 `.env` 文件）。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::{self, EnvError, EnvVar};

/// 按顺序查找的配置文件
pub const CONFIG_PATHS: &[&str] = &[
    "pagelingo.toml",
    ".pagelingo.toml",
    "~/.config/pagelingo/config.toml",
    "/etc/pagelingo/config.toml",
];

/// 按顺序尝试加载的 `.env` 文件，只加载第一个存在的
pub const ENV_FILES: &[&str] = &[".env.local", ".env.development", ".env.production", ".env"];

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Redb,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "redb" | "embedded" => Ok(StoreBackend::Redb),
            "mongodb" | "mongo" => Ok(StoreBackend::MongoDb),
            other => Err(format!(
                "Invalid store backend '{}'. Use: memory, redb, mongodb",
                other
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Redb => "redb",
            StoreBackend::MongoDb => "mongodb",
        })
    }
}

/// 以秒为单位序列化 `Duration`
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// 流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub default_language: String,
    pub persist_to_sink: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            default_language: "Spanish".to_string(),
            persist_to_sink: true,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redb,
            path: expand_tilde(Path::new("~/.local/share/pagelingo/artifacts.redb")),
        }
    }
}

/// 抓取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub user_agent: String,
    pub cache_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent:
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:97.0) Gecko/20100101 Firefox/97.0"
                    .to_string(),
            cache_size: 256,
        }
    }
}

/// 翻译配置
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "google/gemini-flash-1.5-8b".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

// 密钥不进入日志
impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[configured]"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Web 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 7080,
        }
    }
}

/// MongoDB 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub url: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "pagelingo".to_string(),
        }
    }
}

/// 应用配置汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub no_color: bool,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub translation: TranslationConfig,
    pub web: WebConfig,
    pub mongodb: MongoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            no_color: false,
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
            fetch: FetchConfig::default(),
            translation: TranslationConfig::default(),
            web: WebConfig::default(),
            mongodb: MongoConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载完整配置：`.env`、配置文件、环境变量覆盖，最后验证
    pub fn load() -> ConfigResult<Self> {
        load_dotenv();

        let mut config = match find_config_file()? {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.pipeline.output_dir = expand_tilde(&config.pipeline.output_dir);
        config.store.path = expand_tilde(&config.store.path);
        Ok(config)
    }

    /// 用已设置的环境变量覆盖当前值
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        fn set<T, V: EnvVar<T>>(target: &mut T) -> ConfigResult<()> {
            if let Some(value) = V::lookup()? {
                *target = value;
            }
            Ok(())
        }

        set::<_, env::core::LogLevel>(&mut self.log_level)?;
        set::<_, env::core::NoColor>(&mut self.no_color)?;

        set::<_, env::pipeline::OutputDir>(&mut self.pipeline.output_dir)?;
        set::<_, env::pipeline::DefaultLanguage>(&mut self.pipeline.default_language)?;
        set::<_, env::pipeline::PersistToSink>(&mut self.pipeline.persist_to_sink)?;

        set::<_, env::store::Backend>(&mut self.store.backend)?;
        set::<_, env::store::Path>(&mut self.store.path)?;

        set::<_, env::fetch::Timeout>(&mut self.fetch.timeout)?;
        set::<_, env::fetch::UserAgent>(&mut self.fetch.user_agent)?;
        set::<_, env::fetch::CacheSize>(&mut self.fetch.cache_size)?;

        set::<_, env::translation::ApiUrl>(&mut self.translation.api_url)?;
        if let Some(api_key) = env::translation::ApiKey::lookup()? {
            self.translation.api_key = Some(api_key);
        }
        set::<_, env::translation::Model>(&mut self.translation.model)?;
        set::<_, env::translation::Timeout>(&mut self.translation.timeout)?;

        set::<_, env::web::BindAddress>(&mut self.web.bind_address)?;
        set::<_, env::web::Port>(&mut self.web.port)?;

        set::<_, env::mongodb::ConnectionString>(&mut self.mongodb.url)?;
        set::<_, env::mongodb::DatabaseName>(&mut self.mongodb.database)?;

        Ok(())
    }

    /// 验证配置，并把输出目录转换为绝对路径
    pub fn validate(&mut self) -> ConfigResult<()> {
        let output_dir = &self.pipeline.output_dir;
        if output_dir.is_file() {
            return Err(ConfigError::Invalid(format!(
                "output directory {} is an existing file",
                output_dir.display()
            )));
        }
        if output_dir.is_relative() {
            let cwd = std::env::current_dir()
                .map_err(|e| ConfigError::Invalid(format!("cannot resolve working directory: {}", e)))?;
            self.pipeline.output_dir = cwd.join(output_dir);
        }

        if self.pipeline.default_language.trim().is_empty() {
            return Err(ConfigError::Invalid("default language cannot be empty".to_string()));
        }
        if self.web.port == 0 {
            return Err(ConfigError::Invalid("web port cannot be 0".to_string()));
        }
        if self.fetch.timeout.is_zero() || self.translation.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// 配置摘要（隐藏敏感信息）
    pub fn summary(&self) -> String {
        format!(
            "log_level={} store={} output_dir={} default_language={} translation_model={} api_key={}",
            self.log_level,
            self.store.backend,
            self.pipeline.output_dir.display(),
            self.pipeline.default_language,
            self.translation.model,
            if self.translation.api_key.is_some() {
                "[configured]"
            } else {
                "[missing]"
            }
        )
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
        None => path.to_path_buf(),
    }
}

/// 加载 `.env` 文件
fn load_dotenv() {
    for env_file in ENV_FILES {
        if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
            tracing::info!(file = env_file, "loaded environment file");
            break;
        }
    }
}

fn find_config_file() -> ConfigResult<Option<PathBuf>> {
    if let Some(path) = env::core::ConfigFile::lookup()? {
        if !path.exists() {
            return Err(ConfigError::Invalid(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    Ok(CONFIG_PATHS
        .iter()
        .map(|path| expand_tilde(Path::new(path)))
        .find(|path| path.is_file()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_env_defaults() {
        let config = AppConfig::default();
        assert_eq!(
            config.pipeline.default_language,
            env::pipeline::DefaultLanguage::parse(env::pipeline::DefaultLanguage::DEFAULT.unwrap())
                .unwrap()
        );
        assert_eq!(
            config.fetch.timeout,
            env::fetch::Timeout::parse(env::fetch::Timeout::DEFAULT.unwrap()).unwrap()
        );
        assert_eq!(
            config.store.path,
            env::store::Path::parse(env::store::Path::DEFAULT.unwrap()).unwrap()
        );
        assert_eq!(config.web.port, 7080);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            log_level = "debug"

            [pipeline]
            default_language = "German"

            [store]
            backend = "memory"

            [fetch]
            timeout = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.pipeline.default_language, "German");
        assert!(config.pipeline.persist_to_sink);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.fetch.timeout, Duration::from_secs(5));
        assert_eq!(config.fetch.cache_size, 256);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(AppConfig::from_toml_str("[store]\nbackend = \"sqlite\"").is_err());
    }

    #[test]
    fn test_validate_rejects_file_output_dir() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.pipeline.output_dir = file.path().to_path_buf();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_makes_output_dir_absolute() {
        let mut config = AppConfig::default();
        config.pipeline.output_dir = PathBuf::from("translations");
        config.validate().unwrap();
        assert!(config.pipeline.output_dir.is_absolute());
        assert!(config.pipeline.output_dir.ends_with("translations"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        std::env::set_var("PAGELINGO_FETCH_CACHE_SIZE", "12");
        let mut config = AppConfig::from_toml_str("[fetch]\ncache_size = 3").unwrap();
        let result = config.apply_env();
        std::env::remove_var("PAGELINGO_FETCH_CACHE_SIZE");

        result.unwrap();
        assert_eq!(config.fetch.cache_size, 12);
    }

    #[test]
    fn test_summary_starts_with_log_level() {
        let config = AppConfig::from_toml_str("log_level = \"debug\"").unwrap();
        assert!(config.summary().starts_with("log_level=debug store=redb "));
    }

    #[test]
    fn test_summary_hides_api_key() {
        let mut config = AppConfig::default();
        config.translation.api_key = Some("secret-token".to_string());
        assert!(!config.summary().contains("secret-token"));
        assert!(!format!("{:?}", config.translation).contains("secret-token"));
    }
}
