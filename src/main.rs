//! wenku8 风格网络小说转 EPUB 工具。
//!
//! 读取以表格组织的目录页，按分卷下载章节，清洗正文后每卷输出一个 EPUB。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/重试/临时目录等基础设施
//! - `network_parser`：页面与图片获取（编码转换、重试）
//! - `book_parser`：目录解析、正文清洗、封面、EPUB 生成与打包
//! - `download`：分卷下载流程编排（并发抓取、进度、汇总）
//! - `ui`：交互选择（控制台实现）

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info};

mod base_system;
mod book_parser;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use book_parser::index_parser::IndexParser;
use download::downloader::VolumeDownloader;
use download::models::{RunSummary, VolumeOutcome};
use network_parser::network::{Fetcher, HttpFetcher};
use ui::noui::ConsoleSelector;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "wenku-epub")]
#[command(about = "将 wenku8 风格的网络小说按分卷转换为 EPUB")]
struct Cli {
    /// 小说目录页地址，例如 https://www.wenku8.net/novel/3/3348/index.htm
    #[arg(required_unless_present = "version")]
    index_url: Option<String>,

    /// 配置文件路径（默认当前目录下的 config.yml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 输出目录，覆盖配置文件中的 output_dir
    #[arg(long)]
    output: Option<PathBuf>,

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
        println!("wenku-epub v{}", VERSION);
        return Ok(());
    }
    let index_url = cli
        .index_url
        .ok_or_else(|| anyhow!("缺少目录页地址"))?;

    let cancel = Arc::new(AtomicBool::new(false));
    let base_dir = cli.config.as_deref().and_then(Path::parent);
    let _log = init_logging(cli.debug, base_dir, cancel.clone())?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let mut config = load_or_create::<Config>(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(output) = cli.output {
        config.output_dir = output.display().to_string();
    }

    let fetcher = HttpFetcher::new(&config).context("初始化 HTTP 客户端失败")?;
    let mut selector = ConsoleSelector::new(cancel.clone());

    let html = fetcher
        .fetch_text(&index_url, &config.source_encoding)
        .with_context(|| format!("获取目录页失败: {index_url}"))?;
    let book = IndexParser::new(&config)
        .parse(&html, &index_url, &mut selector)
        .context("目录页解析失败")?;
    info!(target: "startup", title = %book.title, author = %book.author, volumes = book.volumes.len(), "开始下载");

    let summary = VolumeDownloader::new(&config, &fetcher, cancel)
        .with_progress(std::io::stderr().is_terminal())
        .run(&book, &mut selector);
    report(&summary);

    if summary.failed() > 0 {
        bail!("{} 个分卷未能生成", summary.failed());
    }
    Ok(())
}

fn init_logging(
    debug: bool,
    base_dir: Option<&Path>,
    cancel: Arc<AtomicBool>,
) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: std::io::stderr().is_terminal(),
        archive_on_exit: true,
    };
    LogSystem::init(opts, base_dir, cancel).map_err(|e| anyhow!(e))
}

fn report(summary: &RunSummary) {
    for (name, outcome) in &summary.volumes {
        match outcome {
            VolumeOutcome::Written(path) => {
                info!(target: "summary", "[完成] {name} -> {}", path.display())
            }
            VolumeOutcome::Failed(reason) => error!(target: "summary", "[失败] {name}: {reason}"),
        }
    }
    info!(
        target: "summary",
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "全部分卷处理结束"
    );
}
