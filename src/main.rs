//! 制品库负载模拟器。
//!
//! 从源库抓取远程仓库的完整文件列表，再通过目标库批量下载这些文件，
//! 借此在目标库上制造远程 HTTP 连接负载；可选地并发执行 AQL 查询模拟数据库连接负载。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/凭据/日志等基础设施
//! - `remote`：制品库 HTTP 客户端、接口模型、仓库管理、指标轮询、AQL
//! - `crawl`：目录树并发抓取
//! - `download`：批量下载
//! - `simulator`：模拟流程编排

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tracing::{info, info_span};

mod base_system;
mod crawl;
mod download;
mod remote;
mod simulator;
#[cfg(test)]
mod test_support;

use base_system::config::load_or_create_with_base;
use base_system::context::SimConfig;
use base_system::credentials::{Credentials, StoreCredentials};
use base_system::logging::{LogOptions, LogSystem};
use simulator::Simulator;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "artifact-load-sim")]
#[command(about = "Generate download and query load against an artifact store")]
struct Cli {
    /// 凭据文件路径（默认 <data-dir>/credentials.yml）
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// 模拟配置文件路径（默认 <data-dir>/simconfig.yml）
    #[arg(long)]
    simconfig: Option<PathBuf>,

    /// 数据目录路径（存放默认配置文件与 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("artifact-load-sim v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}，日志目录 {}", VERSION, log.logs_dir().display());

    let creds = load_or_create_with_base::<Credentials>(cli.credentials.as_deref(), data_dir)
        .map_err(|e| anyhow!(e.to_string()))?;
    ensure_filled(&creds)?;
    let config = load_or_create_with_base::<SimConfig>(cli.simconfig.as_deref(), data_dir)
        .map_err(|e| anyhow!(e.to_string()))?;

    let root = info_span!("artifact_load_sim");
    let sim = Simulator::new(config, &creds, &root)?;
    sim.log_store_versions();
    let outcome = sim.run();
    log.safe_exit();
    outcome
}

fn ensure_filled(creds: &Credentials) -> Result<()> {
    require_url(&creds.source())?;
    require_url(&creds.destination())
}

fn require_url<C: StoreCredentials>(store: &C) -> Result<()> {
    if store.url().trim().is_empty() {
        bail!("凭据文件中 {} 库的 url 为空，请填写后重新运行", C::ROLE);
    }
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
