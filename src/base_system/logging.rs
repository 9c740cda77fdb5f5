//! 进程级日志：控制台 + `logs/latest.log`，退出时把本次日志压缩归档。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// 启动时超过该大小的旧日志先归档
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const FLUSH_SETTLE: Duration = Duration::from_millis(500);
const LATEST_LOG: &str = "latest.log";
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// 只负责安装 subscriber；各组件的日志上下文通过构造时传入的 `Span` 传递。
pub struct LogSystem {
    runtime: Arc<LogRuntime>,
}

impl LogSystem {
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = logs_dir_under(base_dir);
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join(LATEST_LOG);
        rotate_if_oversized(&latest_log, &logs_dir)?;

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&logs_dir, LATEST_LOG));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stdout)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_ansi(options.use_color)
                    .with_writer(console_writer)
                    .with_filter(console_level),
            )
            .with(
                // 文件里始终保留 debug 级别，方便事后排查
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .with_filter(LevelFilter::DEBUG),
            )
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let runtime = Arc::new(LogRuntime::new(
            logs_dir,
            Some(guard),
            options.archive_on_exit,
        ));
        runtime.install_signal_handler();
        runtime.install_panic_hook();

        Ok(Self { runtime })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.runtime.logs_dir
    }

    pub fn safe_exit(&self) {
        self.runtime.shutdown();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.runtime.shutdown();
    }
}

fn logs_dir_under(base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) => base.join("logs"),
        None => PathBuf::from("logs"),
    }
}

struct LogRuntime {
    logs_dir: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    exited: AtomicBool,
    archive_on_exit: bool,
}

impl LogRuntime {
    fn new(logs_dir: PathBuf, guard: Option<WorkerGuard>, archive_on_exit: bool) -> Self {
        Self {
            logs_dir,
            guard: Mutex::new(guard),
            exited: AtomicBool::new(false),
            archive_on_exit,
        }
    }

    fn install_signal_handler(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        if let Err(err) = ctrlc::set_handler(move || {
            std::process::exit(runtime.on_interrupt());
        }) {
            error!("注册 Ctrl+C 处理失败: {}", err);
        }
    }

    fn install_panic_hook(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            match info.location() {
                Some(at) => error!("panic at {}:{}: {}", at.file(), at.line(), info),
                None => error!("panic: {info}"),
            }
            runtime.shutdown();
            previous(info);
        }));
    }

    /// Ctrl+C：收尾后返回进程退出码。
    fn on_interrupt(&self) -> i32 {
        info!("收到中断信号，退出");
        self.shutdown();
        INTERRUPTED_EXIT_CODE
    }

    /// 只有第一次调用生效；返回归档文件路径（若有）。
    fn shutdown(&self) -> Option<PathBuf> {
        if self.exited.swap(true, Ordering::SeqCst) {
            return None;
        }

        // 释放 guard 会把 non_blocking 缓冲刷到文件
        let flushed = self
            .guard
            .lock()
            .map(|mut g| g.take().is_some())
            .unwrap_or(false);

        if !self.archive_on_exit {
            return None;
        }
        if flushed {
            thread::sleep(FLUSH_SETTLE);
        }
        match archive_log_file(&self.logs_dir.join(LATEST_LOG), &self.logs_dir) {
            Ok(archived) => archived,
            Err(err) => {
                eprintln!("failed to archive log: {err}");
                None
            }
        }
    }
}

fn rotate_if_oversized(latest_log: &Path, logs_dir: &Path) -> Result<(), LogError> {
    let oversized = fs::metadata(latest_log)
        .map(|m| m.len() >= ROTATE_AT_BYTES)
        .unwrap_or(false);
    if oversized {
        archive_log_file(latest_log, logs_dir)?;
    }
    Ok(())
}

/// 把 `latest_log` 压缩为 `log_<时间戳>.zip` 并删除原文件；空文件直接删除。
fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let size = match fs::metadata(latest_log) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let mut archive_path = logs_dir.join(format!("log_{stamp}.zip"));
    let mut n = 1;
    while archive_path.exists() {
        archive_path = logs_dir.join(format!("log_{stamp}_{n}.zip"));
        n += 1;
    }

    {
        let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
        zip.start_file(
            format!("{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(latest_log)?, &mut zip)?;
        zip.finish()?;
    }

    let _ = fs::remove_file(latest_log);
    Ok(Some(archive_path))
}
