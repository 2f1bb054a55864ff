use serde::{Deserialize, Serialize};

/// 任务归属的后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// BT 对等传输（librqbit）
    Swarm,
    /// 外部队列式下载守护进程（aria2 RPC）
    Daemon,
    /// 单资源远程视频，按请求即时解析，不进任务队列
    RemoteSingle,
}

/// 跨后端统一后的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Paused,
    Complete,
    Error,
    Removed,
}

// --------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_rate_bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_rate_bps: Option<u64>,
}

/// 仅在 status == error 时出现
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFile {
    pub path: String,
    pub length_bytes: u64,
}

/// 统一任务模型，API 消费方只见这一种形状
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub backend: Backend,
    /// 展示用名称，不能当作查找键
    pub display_name: String,
    pub status: TaskStatus,
    pub progress: TaskProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    pub files: Vec<TaskFile>,
}

impl Task {
    /// 元数据尚未就绪时的占位任务
    pub fn pending(id: impl Into<String>, backend: Backend, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend,
            display_name: display_name.into(),
            status: TaskStatus::Pending,
            progress: TaskProgress::default(),
            error_detail: None,
            files: Vec::new(),
        }
    }

    /// 后端轮询失败时，把错误收敛进任务而不是向调用方抛出
    pub fn errored(
        id: impl Into<String>,
        backend: Backend,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            backend,
            status: TaskStatus::Error,
            progress: TaskProgress::default(),
            error_detail: Some(ErrorDetail {
                code: code.into(),
                message: message.into(),
            }),
            files: Vec::new(),
        }
    }
}
