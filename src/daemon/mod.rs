use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::common::errors::HubError;
use crate::common::models::Task;

pub mod models;
use models::{DaemonStatus, RpcRequest, RpcResponse};

// 单次 RPC 往返的超时与重试上限，连不上守护进程绝不能挂住调用方
const RPC_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// 入队选项
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// 目标文件名（守护进程的 out 选项）
    pub out: Option<String>,
    /// 落盘目录，不传则用守护进程自己的默认目录
    pub dir: Option<String>,
    /// 插队到队首
    pub front: bool,
}

/// 外部下载守护进程（aria2）的类型化 RPC 客户端
pub struct DaemonProxy {
    endpoint: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl DaemonProxy {
    pub fn new(endpoint: impl Into<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            secret,
            client,
        }
    }

    /// 入队一个下载，成功返回守护进程生成的 gid
    ///
    /// 连接失败映射为 DaemonUnreachable（可重试），资源格式被守护进程
    /// 拒绝映射为 InvalidResource；失败时不留下任何任务残留。
    pub async fn enqueue(&self, resource: &str, options: &EnqueueOptions) -> Result<String, HubError> {
        let mut opts = serde_json::Map::new();
        if let Some(out) = &options.out {
            opts.insert("out".to_string(), json!(out));
        }
        if let Some(dir) = &options.dir {
            opts.insert("dir".to_string(), json!(dir));
        }
        let mut params = vec![json!([resource]), Value::Object(opts)];
        if options.front {
            params.push(json!(0));
        }

        let result = self.call("aria2.addUri", params).await.map_err(|e| match e {
            HubError::DaemonUnreachable(_) => e,
            HubError::NotFound(msg) | HubError::InvalidState(msg) | HubError::Internal(msg) => {
                HubError::InvalidResource(msg)
            }
            other => other,
        })?;

        let gid = result
            .as_str()
            .ok_or_else(|| HubError::Internal("守护进程返回的 gid 不是字符串".to_string()))?
            .to_string();
        info!("守护进程已入队: gid={}, 资源: {}", gid, resource);
        Ok(gid)
    }

    /// 取消下载，守护进程报"不存在"按成功的空操作处理（早已移除）
    pub async fn cancel(&self, gid: &str) -> Result<(), HubError> {
        match self.call("aria2.remove", vec![json!(gid)]).await {
            Ok(_) => {
                info!("守护进程任务已取消: {}", gid);
                Ok(())
            }
            Err(HubError::NotFound(_)) => {
                debug!("取消的任务已不存在，视为成功: {}", gid);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn pause(&self, gid: &str) -> Result<(), HubError> {
        self.call("aria2.pause", vec![json!(gid)]).await.map(|_| ())
    }

    pub async fn resume(&self, gid: &str) -> Result<(), HubError> {
        self.call("aria2.unpause", vec![json!(gid)]).await.map(|_| ())
    }

    /// 轮询单个任务状态，翻译成统一任务形状
    pub async fn poll_status(&self, gid: &str) -> Result<Task, HubError> {
        let keys = json!([
            "gid",
            "status",
            "totalLength",
            "completedLength",
            "downloadSpeed",
            "uploadSpeed",
            "errorCode",
            "errorMessage",
            "files"
        ]);
        let result = self
            .call("aria2.tellStatus", vec![json!(gid), keys])
            .await?;
        let status: DaemonStatus = serde_json::from_value(result)
            .map_err(|e| HubError::Internal(format!("守护进程状态反序列化失败: {}", e)))?;
        Ok(status.into_task())
    }

    // 发送一次 RPC 调用，连接类失败带退避重试到固定上限
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, HubError> {
        let mut params = params;
        if let Some(secret) = &self.secret {
            params.insert(0, json!(format!("token:{}", secret)));
        }
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };

        let mut last_err = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                debug!("守护进程重试 #{}, 退避 {:?}", attempt, backoff);
                tokio::time::sleep(backoff).await;
            }

            let response = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    // 连接/超时类错误，重试
                    last_err = e.to_string();
                    continue;
                }
            };

            let body: RpcResponse = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            };

            if let Some(err) = body.error {
                return Err(normalize_rpc_error(method, err.code, &err.message));
            }
            return body
                .result
                .ok_or_else(|| HubError::Internal("守护进程响应缺少 result".to_string()));
        }

        warn!("守护进程不可达: {}, 最后错误: {}", self.endpoint, last_err);
        Err(HubError::DaemonUnreachable(last_err))
    }
}

/// 守护进程的错误形状 -> 统一错误分类
///
/// aria2 对不存在的 gid 统一报 "... is not found"，对非法转换
/// （如恢复已完成的任务）报 "cannot be paused/unpaused"。
fn normalize_rpc_error(method: &str, code: i64, message: &str) -> HubError {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("no such") {
        return HubError::NotFound(message.to_string());
    }
    match method {
        "aria2.pause" | "aria2.unpause" => HubError::InvalidState(message.to_string()),
        "aria2.addUri" => HubError::InvalidResource(message.to_string()),
        _ => HubError::Internal(format!("守护进程错误({}): {}", code, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_gid_is_not_found() {
        let err = normalize_rpc_error("aria2.pause", 1, "GID a2b3 is not found");
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[test]
    fn test_pause_complete_task_is_invalid_state() {
        // 暂停已完成的任务：守护进程拒绝转换，必须是 InvalidState 而非 NotFound
        let err = normalize_rpc_error("aria2.pause", 1, "GID#2089b05ecca3d829 cannot be paused now");
        assert!(matches!(err, HubError::InvalidState(_)));
    }

    #[test]
    fn test_bad_uri_is_invalid_resource() {
        let err = normalize_rpc_error("aria2.addUri", 1, "unsupported uri scheme");
        assert!(matches!(err, HubError::InvalidResource(_)));
    }
}
