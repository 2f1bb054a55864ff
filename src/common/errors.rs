use thiserror::Error;

/// 核心统一错误分类，所有后端的原生错误最终都收敛到这里
#[derive(Debug, Error)]
pub enum HubError {
    #[error("无效的下载描述符: {0}")]
    InvalidDescriptor(String),
    #[error("无效的资源地址: {0}")]
    InvalidResource(String),
    #[error("未找到: {0}")]
    NotFound(String),
    #[error("非法的状态转换: {0}")]
    InvalidState(String),
    #[error("下载守护进程不可达: {0}")]
    DaemonUnreachable(String),
    #[error("资源不可用: {0}")]
    ResourceUnavailable(String),
    #[error("流信息解析失败: {0}")]
    ExtractionFailed(String),
    #[error("暂不支持合集/播放列表: {0}")]
    UnsupportedCollection(String),
    #[error("请求的字节范围无法满足")]
    RangeNotSatisfiable,
    #[error("内部错误: {0}")]
    Internal(String),
}

impl HubError {
    /// 稳定的错误标识，前端靠它区分可重试与永久失败，不要改动已有取值
    pub fn code(&self) -> &'static str {
        match self {
            HubError::InvalidDescriptor(_) => "InvalidDescriptor",
            HubError::InvalidResource(_) => "InvalidResource",
            HubError::NotFound(_) => "NotFound",
            HubError::InvalidState(_) => "InvalidState",
            HubError::DaemonUnreachable(_) => "DaemonUnreachable",
            HubError::ResourceUnavailable(_) => "ResourceUnavailable",
            HubError::ExtractionFailed(_) => "ExtractionFailed",
            HubError::UnsupportedCollection(_) => "UnsupportedCollection",
            HubError::RangeNotSatisfiable => "RangeNotSatisfiable",
            HubError::Internal(_) => "Internal",
        }
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Internal(format!("IO错误: {}", err))
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::Internal(err.to_string())
    }
}
