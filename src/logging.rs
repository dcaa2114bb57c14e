//! 日志初始化
//!
//! 进程内只安装一次 fmt 订阅者。`RUST_LOG` 存在时优先，否则使用配置的级别。
//! 日志写到 stderr，stdout 留给命令输出。

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// 安装全局订阅者，重复调用无效果
pub fn init_tracing(level: &str, no_color: bool) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(!no_color)
                    .with_target(false),
            )
            .try_init();
    });
}

/// 本 crate 使用配置级别，依赖库最多到 `warn`
fn default_directive(level: &str) -> String {
    format!("warn,pagelingo={level},pagelingo_web={level}")
}
