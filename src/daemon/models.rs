use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::models::{Backend, ErrorDetail, Task, TaskFile, TaskProgress, TaskStatus};

// JSON-RPC 2.0 请求/响应外壳

#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

// --------------------------------------------------------------------

/// 守护进程上报的单个下载状态，aria2 的数字字段一律是字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub gid: String,
    pub status: String,
    #[serde(default)]
    pub total_length: Option<String>,
    #[serde(default)]
    pub completed_length: Option<String>,
    #[serde(default)]
    pub download_speed: Option<String>,
    #[serde(default)]
    pub upload_speed: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub files: Vec<DaemonFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub length: Option<String>,
}

/// 守护进程状态词表 -> 统一状态，映射表必须穷尽
///
/// 未知字符串归入 error，原文保留在 errorDetail 里，绝不静默吞掉。
pub fn map_daemon_status(raw: &str) -> (TaskStatus, Option<ErrorDetail>) {
    match raw {
        "waiting" => (TaskStatus::Pending, None),
        "active" => (TaskStatus::Active, None),
        "paused" => (TaskStatus::Paused, None),
        "complete" => (TaskStatus::Complete, None),
        "error" => (TaskStatus::Error, None),
        "removed" => (TaskStatus::Removed, None),
        other => (
            TaskStatus::Error,
            Some(ErrorDetail {
                code: "UnknownDaemonStatus".to_string(),
                message: other.to_string(),
            }),
        ),
    }
}

impl DaemonStatus {
    /// 守护进程原生形状 -> 统一任务快照
    pub fn into_task(self) -> Task {
        let (status, mut error_detail) = map_daemon_status(&self.status);

        // 守护进程自己报告的失败优先于未知状态兜底
        if status == TaskStatus::Error && self.error_message.is_some() {
            error_detail = Some(ErrorDetail {
                code: self.error_code.clone().unwrap_or_else(|| "DaemonError".to_string()),
                message: self.error_message.clone().unwrap_or_default(),
            });
        }

        let files: Vec<TaskFile> = self
            .files
            .iter()
            .map(|f| TaskFile {
                path: f.path.clone(),
                length_bytes: f.length.as_deref().and_then(parse_u64).unwrap_or(0),
            })
            .collect();

        // 展示名取第一个文件名，没有就退回 gid
        let display_name = files
            .first()
            .and_then(|f| {
                std::path::Path::new(&f.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.gid.clone());

        Task {
            id: self.gid,
            backend: Backend::Daemon,
            display_name,
            status,
            progress: TaskProgress {
                total_bytes: self.total_length.as_deref().and_then(parse_u64),
                completed_bytes: self.completed_length.as_deref().and_then(parse_u64),
                download_rate_bps: self.download_speed.as_deref().and_then(parse_u64),
                upload_rate_bps: self.upload_speed.as_deref().and_then(parse_u64),
            },
            error_detail,
            files,
        }
    }
}

fn parse_u64(s: &str) -> Option<u64> {
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(raw: &str) -> DaemonStatus {
        DaemonStatus {
            gid: "2089b05ecca3d829".to_string(),
            status: raw.to_string(),
            total_length: Some("1024".to_string()),
            completed_length: Some("512".to_string()),
            download_speed: Some("100".to_string()),
            upload_speed: None,
            error_code: None,
            error_message: None,
            files: vec![DaemonFile {
                path: "/downloads/movie.mkv".to_string(),
                length: Some("1024".to_string()),
            }],
        }
    }

    #[test]
    fn test_status_mapping_table() {
        // 守护进程的 waiting 归一为 pending
        assert_eq!(map_daemon_status("waiting").0, TaskStatus::Pending);
        assert_eq!(map_daemon_status("active").0, TaskStatus::Active);
        assert_eq!(map_daemon_status("paused").0, TaskStatus::Paused);
        assert_eq!(map_daemon_status("complete").0, TaskStatus::Complete);
        assert_eq!(map_daemon_status("error").0, TaskStatus::Error);
        assert_eq!(map_daemon_status("removed").0, TaskStatus::Removed);
    }

    #[test]
    fn test_unknown_status_preserves_raw_string() {
        let (status, detail) = map_daemon_status("shelved");
        assert_eq!(status, TaskStatus::Error);
        let detail = detail.expect("未知状态必须带原文");
        assert_eq!(detail.message, "shelved");
    }

    #[test]
    fn test_into_task_translates_counters() {
        let task = status("active").into_task();
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.progress.total_bytes, Some(1024));
        assert_eq!(task.progress.completed_bytes, Some(512));
        assert_eq!(task.progress.download_rate_bps, Some(100));
        assert_eq!(task.files.len(), 1);
        assert_eq!(task.display_name, "movie.mkv");
    }

    #[test]
    fn test_error_status_carries_daemon_detail() {
        let mut s = status("error");
        s.error_code = Some("3".to_string());
        s.error_message = Some("resource was not found".to_string());
        let task = s.into_task();
        assert_eq!(task.status, TaskStatus::Error);
        let detail = task.error_detail.expect("error 状态必须带 errorDetail");
        assert_eq!(detail.code, "3");
    }
}
