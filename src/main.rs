use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use media_hub::daemon::DaemonProxy;
use media_hub::registry::TaskRegistry;
use media_hub::resolver::FormatResolver;
use media_hub::server::{AppState, router};
use media_hub::swarm::SwarmManager;

mod cli;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = cli::Cli::parse();

    // 初始化日志
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // 创建落盘目录
    info!("创建下载目录: {:?}", args.download_dir);
    tokio::fs::create_dir_all(&args.download_dir).await?;

    // 组装三个后端
    let swarm = Arc::new(SwarmManager::new(args.download_dir.clone()).await?);
    let daemon = Arc::new(DaemonProxy::new(&args.daemon_rpc, args.daemon_secret.clone()));
    let resolver = Arc::new(FormatResolver::new());
    let registry = Arc::new(TaskRegistry::new(swarm.clone(), daemon.clone()));

    let state = AppState {
        registry,
        swarm,
        resolver,
    };

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("{}: http://{}", "服务已启动".green(), listener.local_addr()?);
    info!("守护进程端点: {}", args.daemon_rpc);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
