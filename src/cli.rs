use clap::Parser;
use std::path::PathBuf;

/// 媒体获取聚合服务
#[derive(Parser, Debug)]
#[command(name = "mhubd")]
#[command(version)]
#[command(about = "聚合群引擎、下载守护进程与远程视频解析的媒体获取服务", long_about = None)]
pub struct Cli {
    /// HTTP 监听地址
    #[arg(long, value_name = "ADDR")]
    #[arg(default_value = "127.0.0.1:8620")]
    #[arg(env = "MEDIA_HUB_LISTEN")]
    pub listen: String,

    /// 下载守护进程的 JSON-RPC 端点
    #[arg(long, value_name = "URL")]
    #[arg(default_value = "http://127.0.0.1:6800/jsonrpc")]
    #[arg(env = "MEDIA_HUB_DAEMON_RPC")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub daemon_rpc: String,

    /// 守护进程的 RPC 密钥 (可选)
    #[arg(long, value_name = "SECRET")]
    #[arg(env = "MEDIA_HUB_DAEMON_SECRET")]
    pub daemon_secret: Option<String>,

    /// 群任务的落盘目录
    #[arg(long, value_name = "DIR")]
    #[arg(default_value = "./downloads")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub download_dir: PathBuf,

    /// 输出调试级别日志
    #[arg(long)]
    pub verbose: bool,
}
