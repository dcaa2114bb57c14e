//! 统一的环境变量管理系统
//!
//! 每个环境变量是一个实现了 [`EnvVar`] 的零大小类型，集中定义名称、默认值、
//! 说明和解析规则。默认值以字符串形式给出，与用户输入走同一条解析路径。

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::StoreBackend;

/// 环境变量解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Environment variable '{variable}': {message}")]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl EnvError {
    fn new(variable: &str, message: impl Into<String>) -> Self {
        Self {
            variable: variable.to_string(),
            message: message.into(),
        }
    }
}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    /// 未设置时使用的原始值；`None` 表示没有默认值
    const DEFAULT: Option<&'static str>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 读取并解析已设置的值，未设置时返回 `None`
    fn lookup() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn get() -> EnvResult<T> {
        if let Some(value) = Self::lookup()? {
            return Ok(value);
        }
        match Self::DEFAULT {
            Some(default) => Self::parse(default),
            None => Err(EnvError::new(
                Self::NAME,
                "Required environment variable not set",
            )),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "PAGELINGO_LOG_LEVEL";
        const DEFAULT: Option<&'static str> = Some("info");
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            parse_log_level(value, Self::NAME)
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<&'static str> = Some("");
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何非空值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }

    /// 配置文件路径
    pub struct ConfigFile;
    impl EnvVar<PathBuf> for ConfigFile {
        const NAME: &'static str = "PAGELINGO_CONFIG";
        const DEFAULT: Option<&'static str> = None;
        const DESCRIPTION: &'static str = "Path of a TOML configuration file";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_path(value, Self::NAME)
        }
    }
}

/// 流水线相关环境变量
pub mod pipeline {
    use super::*;

    /// 译文镜像输出目录
    pub struct OutputDir;
    impl EnvVar<PathBuf> for OutputDir {
        const NAME: &'static str = "PAGELINGO_OUTPUT_DIR";
        const DEFAULT: Option<&'static str> = Some(".");
        const DESCRIPTION: &'static str = "Directory that receives translated Markdown files";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_path(value, Self::NAME)
        }
    }

    /// 默认目标语言
    pub struct DefaultLanguage;
    impl EnvVar<String> for DefaultLanguage {
        const NAME: &'static str = "PAGELINGO_DEFAULT_LANGUAGE";
        const DEFAULT: Option<&'static str> = Some("Spanish");
        const DESCRIPTION: &'static str = "Target language used when a request names none";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 是否写出镜像文件
    pub struct PersistToSink;
    impl EnvVar<bool> for PersistToSink {
        const NAME: &'static str = "PAGELINGO_PERSIST_TO_SINK";
        const DEFAULT: Option<&'static str> = Some("true");
        const DESCRIPTION: &'static str = "Mirror new translations to the output directory";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 存储相关环境变量
pub mod store {
    use super::*;

    /// 存储后端
    pub struct Backend;
    impl EnvVar<StoreBackend> for Backend {
        const NAME: &'static str = "PAGELINGO_STORE_BACKEND";
        const DEFAULT: Option<&'static str> = Some("redb");
        const DESCRIPTION: &'static str = "Artifact store backend: memory, redb, mongodb";

        fn parse(value: &str) -> EnvResult<StoreBackend> {
            value
                .parse()
                .map_err(|message: String| EnvError::new(Self::NAME, message))
        }
    }

    /// redb 数据库文件
    pub struct Path;
    impl EnvVar<PathBuf> for Path {
        const NAME: &'static str = "PAGELINGO_STORE_PATH";
        const DEFAULT: Option<&'static str> = Some("~/.local/share/pagelingo/artifacts.redb");
        const DESCRIPTION: &'static str = "Database file used by the redb backend";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_path(value, Self::NAME)
        }
    }
}

/// 抓取相关环境变量
pub mod fetch {
    use super::*;

    /// 请求超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "PAGELINGO_FETCH_TIMEOUT";
        const DEFAULT: Option<&'static str> = Some("30");
        const DESCRIPTION: &'static str = "Page fetch timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 1, 300)
        }
    }

    /// User-Agent
    pub struct UserAgent;
    impl EnvVar<String> for UserAgent {
        const NAME: &'static str = "PAGELINGO_FETCH_USER_AGENT";
        const DEFAULT: Option<&'static str> = Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:97.0) Gecko/20100101 Firefox/97.0",
        );
        const DESCRIPTION: &'static str = "User-Agent header sent when fetching pages";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 抓取缓存容量
    pub struct CacheSize;
    impl EnvVar<usize> for CacheSize {
        const NAME: &'static str = "PAGELINGO_FETCH_CACHE_SIZE";
        const DEFAULT: Option<&'static str> = Some("256");
        const DESCRIPTION: &'static str = "Fetch cache size in pages (0 disables it)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_usize(value, Self::NAME, 0, 100_000)
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// API 地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "PAGELINGO_TRANSLATION_API_URL";
        const DEFAULT: Option<&'static str> = Some("https://openrouter.ai/api/v1");
        const DESCRIPTION: &'static str = "Base URL of an OpenAI-compatible chat completions API";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError::new(
                    Self::NAME,
                    "API URL must start with http:// or https://",
                ))
            }
        }
    }

    /// API 密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "PAGELINGO_TRANSLATION_API_KEY";
        const DEFAULT: Option<&'static str> = None;
        const DESCRIPTION: &'static str = "Bearer token for the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 模型名称
    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "PAGELINGO_TRANSLATION_MODEL";
        const DEFAULT: Option<&'static str> = Some("google/gemini-flash-1.5-8b");
        const DESCRIPTION: &'static str = "Model identifier passed to the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 请求超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "PAGELINGO_TRANSLATION_TIMEOUT";
        const DEFAULT: Option<&'static str> = Some("120");
        const DESCRIPTION: &'static str = "Translation request timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 1, 900)
        }
    }
}

/// Web服务器相关环境变量
pub mod web {
    use super::*;

    /// 绑定地址
    pub struct BindAddress;
    impl EnvVar<String> for BindAddress {
        const NAME: &'static str = "PAGELINGO_WEB_BIND_ADDRESS";
        const DEFAULT: Option<&'static str> = Some("127.0.0.1");
        const DESCRIPTION: &'static str = "Web server bind address";

        fn parse(value: &str) -> EnvResult<String> {
            let addr = value.trim();
            if addr.is_empty() {
                return Err(EnvError::new(Self::NAME, "Address cannot be empty"));
            }
            Ok(addr.to_string())
        }
    }

    /// 端口
    pub struct Port;
    impl EnvVar<u16> for Port {
        const NAME: &'static str = "PAGELINGO_WEB_PORT";
        const DEFAULT: Option<&'static str> = Some("7080");
        const DESCRIPTION: &'static str = "Web server port";

        fn parse(value: &str) -> EnvResult<u16> {
            match value.trim().parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(EnvError::new(
                    Self::NAME,
                    "Must be a valid port number (1-65535)",
                )),
            }
        }
    }
}

/// MongoDB相关环境变量
pub mod mongodb {
    use super::*;

    /// MongoDB连接字符串
    pub struct ConnectionString;
    impl EnvVar<String> for ConnectionString {
        const NAME: &'static str = "MONGODB_URL";
        const DEFAULT: Option<&'static str> = Some("mongodb://localhost:27017");
        const DESCRIPTION: &'static str = "MongoDB connection string";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("mongodb://") || url.starts_with("mongodb+srv://") {
                Ok(url.to_string())
            } else {
                Err(EnvError::new(
                    Self::NAME,
                    "MongoDB URL must start with mongodb:// or mongodb+srv://",
                ))
            }
        }
    }

    /// 数据库名称
    pub struct DatabaseName;
    impl EnvVar<String> for DatabaseName {
        const NAME: &'static str = "MONGODB_DATABASE";
        const DEFAULT: Option<&'static str> = Some("pagelingo");
        const DESCRIPTION: &'static str = "MongoDB database name";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError::new(
            var_name,
            format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        )),
    }
}

fn parse_log_level(value: &str, var_name: &str) -> EnvResult<String> {
    let level = value.trim().to_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(level),
        _ => Err(EnvError::new(
            var_name,
            format!("Invalid log level '{}'. Use: trace, debug, info, warn, error", value),
        )),
    }
}

fn parse_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value
        .trim()
        .parse()
        .map_err(|_| EnvError::new(var_name, "Must be a valid non-negative number"))?;

    if num < min {
        return Err(EnvError::new(
            var_name,
            format!("Value {} is below minimum {}", num, min),
        ));
    }

    if num > max {
        return Err(EnvError::new(
            var_name,
            format!("Value {} exceeds maximum {}", num, max),
        ));
    }

    Ok(num)
}

fn parse_seconds(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let seconds = parse_usize(value, var_name, min as usize, max as usize)
        .map_err(|e| EnvError::new(var_name, format!("{} (seconds)", e.message)))?;
    Ok(Duration::from_secs(seconds as u64))
}

fn parse_non_empty(value: &str, var_name: &str) -> EnvResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EnvError::new(var_name, "Value cannot be empty"));
    }
    Ok(value.to_string())
}

/// 展开 `~` 并转换为路径
fn parse_path(value: &str, var_name: &str) -> EnvResult<PathBuf> {
    let value = parse_non_empty(value, var_name)?;
    Ok(PathBuf::from(shellexpand::tilde(&value).as_ref()))
}

fn doc_line<T, V: EnvVar<T>>() -> String {
    match V::DEFAULT {
        Some(default) if !default.is_empty() => {
            format!("- `{}`: {} (default: `{}`)\n", V::NAME, V::DESCRIPTION, default)
        }
        _ => format!("- `{}`: {}\n", V::NAME, V::DESCRIPTION),
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&doc_line::<String, core::LogLevel>());
    docs.push_str(&doc_line::<bool, core::NoColor>());
    docs.push_str(&doc_line::<PathBuf, core::ConfigFile>());

    docs.push_str("\n## Pipeline Configuration\n\n");
    docs.push_str(&doc_line::<PathBuf, pipeline::OutputDir>());
    docs.push_str(&doc_line::<String, pipeline::DefaultLanguage>());
    docs.push_str(&doc_line::<bool, pipeline::PersistToSink>());

    docs.push_str("\n## Store Configuration\n\n");
    docs.push_str(&doc_line::<StoreBackend, store::Backend>());
    docs.push_str(&doc_line::<PathBuf, store::Path>());

    docs.push_str("\n## Fetch Configuration\n\n");
    docs.push_str(&doc_line::<Duration, fetch::Timeout>());
    docs.push_str(&doc_line::<String, fetch::UserAgent>());
    docs.push_str(&doc_line::<usize, fetch::CacheSize>());

    docs.push_str("\n## Translation Configuration\n\n");
    docs.push_str(&doc_line::<String, translation::ApiUrl>());
    docs.push_str(&doc_line::<String, translation::ApiKey>());
    docs.push_str(&doc_line::<String, translation::Model>());
    docs.push_str(&doc_line::<Duration, translation::Timeout>());

    docs.push_str("\n## Web Server Configuration\n\n");
    docs.push_str(&doc_line::<String, web::BindAddress>());
    docs.push_str(&doc_line::<u16, web::Port>());

    docs.push_str("\n## MongoDB Configuration\n\n");
    docs.push_str(&doc_line::<String, mongodb::ConnectionString>());
    docs.push_str(&doc_line::<String, mongodb::DatabaseName>());

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(pipeline::PersistToSink::parse("true").unwrap());
        assert!(pipeline::PersistToSink::parse("YES").unwrap());
        assert!(pipeline::PersistToSink::parse("on").unwrap());

        assert!(!pipeline::PersistToSink::parse("0").unwrap());
        assert!(!pipeline::PersistToSink::parse("off").unwrap());

        assert!(pipeline::PersistToSink::parse("maybe").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(translation::ApiUrl::parse("http://localhost:1188").is_ok());
        assert!(translation::ApiUrl::parse("https://api.example.com").is_ok());

        assert!(translation::ApiUrl::parse("ftp://example.com").is_err());
        assert!(mongodb::ConnectionString::parse("localhost:27017").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(fetch::Timeout::parse("10").unwrap(), Duration::from_secs(10));
        assert!(fetch::Timeout::parse("0").is_err());
        assert!(fetch::Timeout::parse("soon").is_err());

        assert_eq!(fetch::CacheSize::parse("0").unwrap(), 0);
        assert!(web::Port::parse("0").is_err());
        assert_eq!(web::Port::parse("8080").unwrap(), 8080);
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!(store::Backend::parse("Memory").unwrap(), StoreBackend::Memory);
        assert_eq!(store::Backend::parse("redb").unwrap(), StoreBackend::Redb);
        assert_eq!(store::Backend::parse("mongo").unwrap(), StoreBackend::MongoDb);

        let error = store::Backend::parse("sqlite").unwrap_err();
        assert_eq!(error.variable, "PAGELINGO_STORE_BACKEND");
    }

    #[test]
    fn test_defaults_parse() {
        assert_eq!(
            pipeline::DefaultLanguage::parse(pipeline::DefaultLanguage::DEFAULT.unwrap()).unwrap(),
            "Spanish"
        );
        assert_eq!(
            web::Port::parse(web::Port::DEFAULT.unwrap()).unwrap(),
            7080
        );
        assert!(!core::NoColor::parse(core::NoColor::DEFAULT.unwrap()).unwrap());
    }

    #[test]
    fn test_env_docs_list_variables() {
        let docs = generate_env_docs();
        assert!(docs.contains("`PAGELINGO_OUTPUT_DIR`"));
        assert!(docs.contains("(default: `Spanish`)"));
        assert!(docs.contains("- `PAGELINGO_TRANSLATION_API_KEY`: Bearer token for the translation API\n"));
    }
}
