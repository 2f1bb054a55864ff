use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::common::errors::HubError;
use crate::common::models::Task;
use crate::registry::TaskRegistry;
use crate::resolver::{FormatResolver, rank_audio, rank_video};
use crate::swarm::SwarmManager;

pub mod range;
use range::RangeSpec;

/// 注入 HTTP 处理器的共享状态，注册表等都是显式持有的实例而非全局量
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub swarm: Arc<SwarmManager>,
    pub resolver: Arc<FormatResolver>,
}

/// 表现层消费的全部 HTTP 面
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tasks", post(create_task_handler).get(list_tasks_handler))
        .route("/tasks/{id}", get(get_task_handler).delete(delete_task_handler))
        .route("/tasks/{id}/pause", post(pause_task_handler))
        .route("/tasks/{id}/resume", post(resume_task_handler))
        .route("/stream/{task_id}/{*file_path}", get(stream_handler))
        .route("/formats", get(formats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// 错误分类 -> HTTP 状态码，表现层只看结构化的 {error, details}
fn status_for(err: &HubError) -> StatusCode {
    match err {
        HubError::InvalidDescriptor(_)
        | HubError::InvalidResource(_)
        | HubError::ResourceUnavailable(_)
        | HubError::UnsupportedCollection(_) => StatusCode::BAD_REQUEST,
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::InvalidState(_) => StatusCode::CONFLICT,
        HubError::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        HubError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
        HubError::DaemonUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.code(), "details": self.to_string() });
        (status_for(&self), Json(body)).into_response()
    }
}

// --------------------------------------------------------------------

async fn health_handler() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    descriptor: String,
}

async fn create_task_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), HubError> {
    let task = state.registry.submit(&req.descriptor).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "taskId": task.id, "backend": task.backend })),
    ))
}

async fn list_tasks_handler(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.registry.list_all().await)
}

async fn get_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, HubError> {
    Ok(Json(state.registry.get(&id).await?))
}

async fn pause_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HubError> {
    state.registry.pause(&id).await?;
    Ok(StatusCode::OK)
}

async fn resume_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HubError> {
    state.registry.resume(&id).await?;
    Ok(StatusCode::OK)
}

async fn delete_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HubError> {
    // 幂等：重复删除同样应答 200
    state.registry.remove(&id).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct FormatsQuery {
    resource: String,
}

async fn formats_handler(
    State(state): State<AppState>,
    Query(query): Query<FormatsQuery>,
) -> Result<Json<Value>, HubError> {
    let formats = state.resolver.resolve(&query.resource).await?;
    Ok(Json(json!({
        "videoFormats": rank_video(&formats),
        "audioFormats": rank_audio(&formats),
    })))
}

/// 边下边播的范围流式响应
///
/// 文件路径必须精确匹配任务 files 里的一项；底层字节流直接读自
/// 仍在传输中的群文件，客户端断开时响应体被丢弃，底层流和分片
/// 优先级关注随之释放。
async fn stream_handler(
    State(state): State<AppState>,
    Path((task_id, file_path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, HubError> {
    let (file_idx, length) = state.swarm.file_entry(&task_id, &file_path)?;

    let content_type = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .to_string();

    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    let (status, start, end) = match range::parse_range(range_header, length) {
        RangeSpec::Unsatisfiable => {
            debug!("范围不可满足: {:?}, 文件长度 {}", range_header, length);
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{}", length))
                .body(Body::empty())
                .map_err(|e| HubError::Internal(e.to_string()));
        }
        RangeSpec::Full => {
            // 空文件没有可读窗口，直接给空响应体
            if length == 0 {
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CONTENT_LENGTH, "0")
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(Body::empty())
                    .map_err(|e| HubError::Internal(e.to_string()));
            }
            (StatusCode::OK, 0, length - 1)
        }
        RangeSpec::Bounded { start, end } => (StatusCode::PARTIAL_CONTENT, start, end),
    };

    let window = end - start + 1;
    // 打开流时 seek 已向引擎申请了该窗口的分片优先级
    let stream = state
        .swarm
        .file_stream(&task_id, file_idx, start)
        .await?
        .take(window);

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, window.to_string())
        .header(header::ACCEPT_RANGES, "bytes");
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, length),
        );
    }
    builder
        .body(Body::from_stream(ReaderStream::new(stream)))
        .map_err(|e| HubError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&HubError::InvalidDescriptor("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&HubError::ResourceUnavailable("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&HubError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&HubError::InvalidState("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&HubError::RangeNotSatisfiable),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            status_for(&HubError::ExtractionFailed("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&HubError::DaemonUnreachable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_code_is_stable_identifier() {
        // 前端靠 error 字段区分可重试与永久失败
        assert_eq!(HubError::ResourceUnavailable("私有视频".into()).code(), "ResourceUnavailable");
        assert_eq!(HubError::DaemonUnreachable("超时".into()).code(), "DaemonUnreachable");
    }
}
