use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::errors::HubError;
use crate::common::models::{Backend, Task};
use crate::daemon::{DaemonProxy, EnqueueOptions};
use crate::swarm::SwarmManager;

pub mod detector;
use detector::DescriptorKind;

/// 跨后端统一的任务注册表
///
/// 对外是一个扁平的任务 id 空间；内部按后端分命名空间查找，
/// infohash 和守护进程 gid 形状不同，不会碰撞。
pub struct TaskRegistry {
    swarm: Arc<SwarmManager>,
    daemon: Arc<DaemonProxy>,
    // 守护进程任务的插入顺序（listAll 的稳定排序依据）
    daemon_gids: Mutex<Vec<String>>,
    // 描述符 -> gid，幂等提交的依据；remove 时一并清掉
    descriptor_gids: DashMap<String, String>,
    // 描述符级别的在途去重锁
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl TaskRegistry {
    pub fn new(swarm: Arc<SwarmManager>, daemon: Arc<DaemonProxy>) -> Self {
        Self {
            swarm,
            daemon,
            daemon_gids: Mutex::new(Vec::new()),
            descriptor_gids: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// 提交一个描述符，按形状路由到对应后端
    ///
    /// 同一描述符的并发提交只会产生一个任务：同描述符持锁串行化，
    /// 后到者在锁内走幂等分支拿到既有任务。
    pub async fn submit(&self, descriptor: &str) -> Result<Task, HubError> {
        let kind = detector::detect(descriptor)?;
        let descriptor = descriptor.trim().to_string();

        let slot = self
            .inflight
            .entry(descriptor.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = slot.lock().await;

        let result = match kind {
            DescriptorKind::Swarm { infohash } => {
                // 群后端的幂等性由引擎保证（重复添加返回既有任务）
                self.swarm.add(&descriptor, &infohash).await
            }
            DescriptorKind::Daemon => self.submit_to_daemon(&descriptor).await,
        };

        drop(_guard);
        // 槽位上还挂着等待者时不能清理，否则后来者会拿到新锁并发跑；
        // 计数 2 = 表里一份 + 本地一份，此时才由最后离开者移除
        self.inflight
            .remove_if(&descriptor, |_, s| Arc::strong_count(s) == 2);
        result
    }

    async fn submit_to_daemon(&self, descriptor: &str) -> Result<Task, HubError> {
        // 已知描述符：返回既有任务而不是重复入队
        if let Some(gid) = self.descriptor_gids.get(descriptor).map(|e| e.value().clone()) {
            debug!("描述符已入队，返回既有任务: {}", gid);
            return Ok(self.daemon_task_or_error(&gid).await);
        }

        // 入队失败（守护进程不可达等）不留下任何任务残留
        let gid = self
            .daemon
            .enqueue(descriptor, &EnqueueOptions::default())
            .await?;

        self.descriptor_gids.insert(descriptor.to_string(), gid.clone());
        self.daemon_gids.lock().await.push(gid.clone());
        info!("守护进程任务已注册: {}", gid);

        // 刚入队，守护进程大概率还在 waiting，占位快照即可
        Ok(Task::pending(&gid, Backend::Daemon, descriptor))
    }

    /// 跨两个命名空间查找任务
    pub async fn get(&self, task_id: &str) -> Result<Task, HubError> {
        if let Ok(task) = self.swarm.get(task_id) {
            return Ok(task);
        }
        if self.knows_gid(task_id).await {
            return Ok(self.daemon_task_or_error(task_id).await);
        }
        Err(HubError::NotFound(format!("任务不存在: {}", task_id)))
    }

    /// 移除任务并分派到所属后端的取消操作，幂等
    ///
    /// 移除是终态：之后重新提交同一描述符会创建全新任务。
    pub async fn remove(&self, task_id: &str) -> Result<(), HubError> {
        if self.swarm.is_tracked(task_id) {
            return self.swarm.remove(task_id).await;
        }
        if self.knows_gid(task_id).await {
            self.daemon.cancel(task_id).await?;
            self.daemon_gids.lock().await.retain(|g| g != task_id);
            self.descriptor_gids.retain(|_, gid| gid != task_id);
            info!("守护进程任务已移除: {}", task_id);
            return Ok(());
        }
        // 两边都不认识：早已移除，保持幂等
        debug!("移除的任务不存在，视为成功: {}", task_id);
        Ok(())
    }

    pub async fn pause(&self, task_id: &str) -> Result<(), HubError> {
        if self.swarm.is_tracked(task_id) {
            return self.swarm.pause(task_id).await;
        }
        if self.knows_gid(task_id).await {
            return self.daemon.pause(task_id).await;
        }
        Err(HubError::NotFound(format!("任务不存在: {}", task_id)))
    }

    pub async fn resume(&self, task_id: &str) -> Result<(), HubError> {
        if self.swarm.is_tracked(task_id) {
            return self.swarm.resume(task_id).await;
        }
        if self.knows_gid(task_id).await {
            return self.daemon.resume(task_id).await;
        }
        Err(HubError::NotFound(format!("任务不存在: {}", task_id)))
    }

    /// 合并两个后端的任务集：群任务在前、守护进程任务在后，各自插入顺序
    pub async fn list_all(&self) -> Vec<Task> {
        let mut tasks = self.swarm.list();
        let gids = self.daemon_gids.lock().await.clone();
        for gid in gids {
            tasks.push(self.daemon_task_or_error(&gid).await);
        }
        tasks
    }

    async fn knows_gid(&self, gid: &str) -> bool {
        self.daemon_gids.lock().await.iter().any(|g| g == gid)
    }

    // 轮询失败不跨边界抛出，收敛为 errorDetail
    async fn daemon_task_or_error(&self, gid: &str) -> Task {
        match self.daemon.poll_status(gid).await {
            Ok(task) => task,
            Err(e) => Task::errored(gid, Backend::Daemon, e.code(), e.to_string()),
        }
    }
}
