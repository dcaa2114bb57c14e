//! Web 请求处理器

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::artifact::DerivedId;
use crate::error::{ErrorKind, PipelineError};
use crate::feed::build_feed;
use crate::store::{Page, DEFAULT_PAGE_LIMIT};
use crate::web::types::{
    ApiResponse, AppState, HealthResponse, TranslateRequestInput, TranslationData,
};

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::FetchFailed | ErrorKind::TranslationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::SinkWriteFailed | ErrorKind::Store | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// 把流水线错误转换为带信封的错误响应
fn error_response(error: PipelineError) -> Response {
    let status = status_for(error.kind());
    if status.is_server_error() {
        tracing::error!(kind = %error.kind(), error = %error, "request failed");
    } else {
        tracing::debug!(kind = %error.kind(), error = %error, "request rejected");
    }
    (
        status,
        Json(ApiResponse::<TranslationData>::failure(&error)),
    )
        .into_response()
}

/// 健康检查
pub async fn index(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        default_language: state.orchestrator.default_language().to_string(),
    })
}

/// 获取或生成译文
pub async fn translate(
    State(state): State<Arc<AppState>>,
    Json(input): Json<TranslateRequestInput>,
) -> Response {
    tracing::debug!(url = %input.url, language = ?input.language, "received translate request");

    match state.orchestrator.resolve(input.into()).await {
        Ok(resolved) => Json(ApiResponse::ok(TranslationData::from(resolved))).into_response(),
        Err(error) => error_response(error),
    }
}

/// 按 id 读取已有译文
pub async fn get_translation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.orchestrator.get_existing(DerivedId(id)).await {
        Ok(resolved) => Json(ApiResponse::ok(TranslationData::from(resolved))).into_response(),
        Err(error) => error_response(error),
    }
}

/// 订阅源分页参数
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// RSS 订阅源
pub async fn feed(State(state): State<Arc<AppState>>, Query(query): Query<FeedQuery>) -> Response {
    let page = Page::new(
        query.offset,
        query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, DEFAULT_PAGE_LIMIT * 10),
    );

    match build_feed(state.orchestrator.store().as_ref(), &state.feed_channel, page).await {
        Ok(xml) => ([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], xml).into_response(),
        Err(error) => error_response(error.into()),
    }
}
