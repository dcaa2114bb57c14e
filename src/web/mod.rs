//! Web 服务器模块
//!
//! 通过 HTTP 暴露获取或生成译文、按 id 读取译文以及 RSS 订阅源

pub mod handlers;
pub mod routes;
pub mod types;

pub use routes::create_routes;
pub use types::*;

use std::io;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::config::WebConfig;

/// 服务器启动或运行时的错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// 创建新的 Web 服务器
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// 启动 Web 服务器，直到进程退出
    pub async fn start(&self) -> Result<(), ServerError> {
        let app = create_router(self.state.clone());
        let addr = self.address();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        tracing::info!("web server listening on http://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// 创建路由器
pub fn create_router(app_state: Arc<AppState>) -> Router {
    create_routes()
        .with_state(app_state)
        .layer(CorsLayer::permissive())
}
