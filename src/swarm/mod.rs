use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use librqbit::api::TorrentIdOrHash;
use librqbit::{AddTorrent, AddTorrentOptions, Api, ManagedTorrent, Session};
use tokio::io::{AsyncRead, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::common::errors::HubError;
use crate::common::models::{Backend, Task, TaskFile, TaskProgress, TaskStatus};

/// 磁力链元数据握手的同步等待上限，超时后任务转入后台继续解析
const METADATA_WAIT: std::time::Duration = std::time::Duration::from_secs(5);

// 元数据尚未就绪的群任务
struct PendingAdd {
    display_name: String,
    error: Option<String>,
}

/// BT 群传输管理器，群协议本身完全委托给 librqbit 引擎
pub struct SwarmManager {
    session: Arc<Session>,
    api: Api,
    // infohash -> 占位信息，引擎接管后移除
    pending_adds: Arc<DashMap<String, PendingAdd>>,
}

impl SwarmManager {
    pub async fn new(output_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&output_dir).await?;
        let session = Session::new(output_dir).await?;
        let api = Api::new(session.clone(), None);
        Ok(Self {
            session,
            api,
            pending_adds: Arc::new(DashMap::new()),
        })
    }

    /// 添加一个群任务，幂等：相同 infohash 的重复添加返回既有任务
    ///
    /// 描述符语法校验由调用方（registry 的描述符检测）完成，这里只做
    /// 网络层的添加；磁力链的元数据解析可能很慢，超时后返回 pending
    /// 占位任务，解析在后台继续。
    pub async fn add(&self, descriptor: &str, infohash: &str) -> Result<Task, HubError> {
        let infohash = infohash.to_lowercase();

        // 引擎已经在管理了，直接返回快照，不产生任何网络副作用
        if let Ok(handle) = self.api.mgr_handle(to_torrent_id(&infohash)?) {
            debug!("群任务已存在，返回既有任务: {}", infohash);
            return Ok(self.task_from_handle(&handle));
        }
        if self.pending_adds.contains_key(&infohash) {
            debug!("群任务元数据解析中，返回占位任务: {}", infohash);
            return Ok(Task::pending(
                &infohash,
                Backend::Swarm,
                format!("infohash:{}", infohash),
            ));
        }

        self.pending_adds.insert(
            infohash.clone(),
            PendingAdd {
                display_name: format!("infohash:{}", infohash),
                error: None,
            },
        );

        // 后台执行添加，磁力链的 DHT 查询可能远超调用方能接受的时延
        let add = AddTorrent::Url(std::borrow::Cow::Owned(descriptor.to_string()));
        let opts = AddTorrentOptions {
            overwrite: true,
            ..Default::default()
        };
        let session = self.session.clone();
        let pending = self.pending_adds.clone();
        let hash_for_task = infohash.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let result = session.add_torrent(add, Some(opts)).await;
            match &result {
                Ok(_) => {
                    info!("群任务元数据已解析: {}", hash_for_task);
                    pending.remove(&hash_for_task);
                }
                Err(e) => {
                    // 网络失败不向 add 调用方抛出，收敛为任务的 error 状态
                    warn!("群任务添加失败: {}, 错误: {}", hash_for_task, e);
                    if let Some(mut entry) = pending.get_mut(&hash_for_task) {
                        entry.error = Some(e.to_string());
                    }
                }
            }
            let _ = tx.send(result);
        });

        match tokio::time::timeout(METADATA_WAIT, rx).await {
            Ok(Ok(Ok(response))) => {
                if let Some(handle) = response.into_handle() {
                    return Ok(self.task_from_handle(&handle));
                }
            }
            Ok(Ok(Err(_))) | Ok(Err(_)) => {
                // 失败详情已写入 pending_adds，走下面的占位/错误分支
            }
            Err(_) => {
                debug!("元数据解析超时({:?})，转入后台: {}", METADATA_WAIT, infohash);
            }
        }

        self.get(&infohash)
    }

    /// 当前跟踪的全部群任务快照，插入顺序
    pub fn list(&self) -> Vec<Task> {
        let listed = self.api.api_torrent_list();
        let managed: std::collections::HashSet<String> = listed
            .torrents
            .iter()
            .map(|t| t.info_hash.to_lowercase())
            .collect();

        let mut tasks = Vec::new();
        for t in &listed.torrents {
            let Some(id) = t.id else { continue };
            if let Ok(handle) = self.api.mgr_handle(TorrentIdOrHash::Id(id)) {
                tasks.push(self.task_from_handle(&handle));
            }
        }
        // 还在解析元数据、尚未进入引擎的任务
        for entry in self.pending_adds.iter() {
            if !managed.contains(entry.key()) {
                tasks.push(self.pending_task(entry.key(), entry.value()));
            }
        }
        tasks
    }

    pub fn get(&self, infohash: &str) -> Result<Task, HubError> {
        let infohash = infohash.to_lowercase();
        if let Ok(id) = to_torrent_id(&infohash) {
            if let Ok(handle) = self.api.mgr_handle(id) {
                return Ok(self.task_from_handle(&handle));
            }
        }
        if let Some(entry) = self.pending_adds.get(&infohash) {
            return Ok(self.pending_task(&infohash, entry.value()));
        }
        Err(HubError::NotFound(format!("群任务不存在: {}", infohash)))
    }

    pub async fn pause(&self, infohash: &str) -> Result<(), HubError> {
        self.api
            .mgr_handle(to_torrent_id(infohash)?)
            .map_err(|_| HubError::NotFound(format!("群任务不存在: {}", infohash)))?;
        self.api
            .api_torrent_action_pause(to_torrent_id(infohash)?)
            .await
            .map_err(|e| map_action_error(e.to_string()))?;
        Ok(())
    }

    pub async fn resume(&self, infohash: &str) -> Result<(), HubError> {
        self.api
            .mgr_handle(to_torrent_id(infohash)?)
            .map_err(|_| HubError::NotFound(format!("群任务不存在: {}", infohash)))?;
        self.api
            .api_torrent_action_start(to_torrent_id(infohash)?)
            .await
            .map_err(|e| map_action_error(e.to_string()))?;
        Ok(())
    }

    /// 移除群任务，幂等：不存在视为成功
    pub async fn remove(&self, infohash: &str) -> Result<(), HubError> {
        let infohash = infohash.to_lowercase();
        self.pending_adds.remove(&infohash);
        if let Ok(id) = to_torrent_id(&infohash) {
            // 任务可能尚未进入引擎，删除失败直接忽略
            let _ = self.session.delete(id, false).await;
        }
        info!("群任务已移除: {}", infohash);
        Ok(())
    }

    /// 描述符是否已被本管理器跟踪（含元数据解析中的）
    pub fn is_tracked(&self, infohash: &str) -> bool {
        let infohash = infohash.to_lowercase();
        self.pending_adds.contains_key(&infohash)
            || to_torrent_id(&infohash)
                .ok()
                .and_then(|id| self.api.mgr_handle(id).ok())
                .is_some()
    }

    /// 按精确路径查找文件，返回 (文件序号, 字节长度)
    ///
    /// id 不是 infohash 形状（比如守护进程的 gid）一律按不存在处理，
    /// 查找路径上不暴露描述符语法错误。
    pub fn file_entry(&self, infohash: &str, path: &str) -> Result<(usize, u64), HubError> {
        let id = to_torrent_id(infohash)
            .map_err(|_| HubError::NotFound(format!("群任务不存在: {}", infohash)))?;
        let handle = self
            .api
            .mgr_handle(id)
            .map_err(|_| HubError::NotFound(format!("群任务不存在: {}", infohash)))?;

        let meta = handle.metadata.load();
        let meta = meta
            .as_ref()
            .ok_or_else(|| HubError::NotFound(format!("元数据尚未就绪: {}", infohash)))?;

        if let Ok(files) = meta.info.iter_file_details() {
            for (idx, file) in files.enumerate() {
                if file.filename.to_string().ok().as_deref() == Some(path) {
                    return Ok((idx, file.len));
                }
            }
        }
        Err(HubError::NotFound(format!("文件不存在: {}", path)))
    }

    /// 打开从 start 开始的文件字节流
    ///
    /// seek 会把读取位置注册给引擎的分片调度器，所请求窗口附近的分片
    /// 被优先拉取；流被丢弃（客户端断开）时优先级关注随之释放。
    pub async fn file_stream(
        &self,
        infohash: &str,
        file_idx: usize,
        start: u64,
    ) -> Result<impl AsyncRead + Send + Unpin + 'static, HubError> {
        let id = to_torrent_id(infohash)
            .map_err(|_| HubError::NotFound(format!("群任务不存在: {}", infohash)))?;
        let mut stream = self
            .api
            .api_stream(id, file_idx)
            .map_err(|e| HubError::Internal(format!("打开群文件流失败: {}", e)))?;
        stream
            .seek(SeekFrom::Start(start))
            .await
            .map_err(|e| HubError::Internal(format!("定位群文件流失败: {}", e)))?;
        Ok(stream)
    }

    fn pending_task(&self, infohash: &str, entry: &PendingAdd) -> Task {
        match &entry.error {
            Some(msg) => Task::errored(infohash, Backend::Swarm, "SwarmAddFailed", msg.clone()),
            None => Task::pending(infohash, Backend::Swarm, entry.display_name.clone()),
        }
    }

    // 引擎内部状态 -> 统一任务快照
    fn task_from_handle(&self, handle: &ManagedTorrent) -> Task {
        let stats = handle.stats();
        let infohash = handle.info_hash().as_string().to_lowercase();

        // librqbit 的状态枚举按 Debug 文案匹配，未知状态保守地视为 pending
        let state = format!("{:?}", stats.state);
        let status = if stats.finished {
            TaskStatus::Complete
        } else {
            match state.as_str() {
                "Initializing" => TaskStatus::Pending,
                "Live" => TaskStatus::Active,
                "Paused" => TaskStatus::Paused,
                "Error" => TaskStatus::Error,
                _ => TaskStatus::Pending,
            }
        };

        let error_detail = if status == TaskStatus::Error {
            Some(crate::common::models::ErrorDetail {
                code: "SwarmError".to_string(),
                message: stats.error.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        let (display_name, files) = {
            let meta = handle.metadata.load();
            match meta.as_ref() {
                Some(meta) => {
                    let name = meta
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("infohash:{}", infohash));
                    let files = meta
                        .info
                        .iter_file_details()
                        .map(|it| {
                            it.filter_map(|f| {
                                f.filename.to_string().ok().map(|path| TaskFile {
                                    path,
                                    length_bytes: f.len,
                                })
                            })
                            .collect()
                        })
                        .unwrap_or_default();
                    (name, files)
                }
                None => (format!("infohash:{}", infohash), Vec::new()),
            }
        };

        // 速率：引擎按兆比特每秒上报，x 1e6/8 换算成 B/s
        let (down_bps, up_bps) = stats
            .live
            .as_ref()
            .map(|l| {
                (
                    (l.download_speed.mbps * 125000.0) as u64,
                    (l.upload_speed.mbps * 125000.0) as u64,
                )
            })
            .unwrap_or((0, 0));

        Task {
            id: infohash,
            backend: Backend::Swarm,
            display_name,
            status,
            progress: TaskProgress {
                total_bytes: Some(stats.total_bytes),
                completed_bytes: Some(stats.progress_bytes),
                download_rate_bps: Some(down_bps),
                upload_rate_bps: Some(up_bps),
            },
            error_detail,
            files,
        }
    }
}

fn to_torrent_id(infohash: &str) -> Result<TorrentIdOrHash, HubError> {
    TorrentIdOrHash::try_from(infohash)
        .map_err(|e| HubError::InvalidDescriptor(format!("非法的 infohash: {}", e)))
}

// 引擎拒绝状态转换（未就绪/已是目标状态）与内部故障分开上报
fn map_action_error(message: String) -> HubError {
    let lower = message.to_lowercase();
    if lower.contains("not live") || lower.contains("paused") || lower.contains("already") {
        HubError::InvalidState(message)
    } else {
        HubError::Internal(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_classification() {
        // 转换被拒绝 -> 409 一侧
        assert!(matches!(
            map_action_error("torrent is not live".to_string()),
            HubError::InvalidState(_)
        ));
        assert!(matches!(
            map_action_error("torrent is already paused".to_string()),
            HubError::InvalidState(_)
        ));
        // 引擎内部故障 -> 500 一侧，不能伪装成状态冲突
        assert!(matches!(
            map_action_error("storage error: disk full".to_string()),
            HubError::Internal(_)
        ));
    }
}
