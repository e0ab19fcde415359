//! Shared logging utilities for Logforge binaries.
//!
//! Grounded on the Casparian Flow logging crate: a rolling file writer
//! plus a stderr mirror, both driven by one `tracing_subscriber::registry`.
//! Two things are added for this daemon: thread-id prefixing (spec.md §9 --
//! "a logger that attaches `{thread_id, timestamp}` per record", since the
//! core runs many OS-thread workers rather than one event loop) and a
//! bounded stderr-error-line budget that HUP resets (spec.md §7).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "logforge=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by Logforge binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Foreground (`-n`) operation mirrors everything to stderr at full
    /// verbosity; daemonized operation quiets the stderr mirror to `warn`.
    pub foreground: bool,
    /// Cap on stderr error lines (spec.md §7); `None` means unlimited,
    /// which is the default for foreground runs.
    pub stderr_error_cap: Option<usize>,
}

/// Handle returned by [`init_logging`]. Kept alive for the process
/// lifetime; `reopen` and `stderr_budget` back the HUP handler in
/// `logforge_lifecycle`.
#[derive(Clone)]
pub struct LoggingHandle {
    writer: SharedRollingWriter,
    stderr_budget: Arc<StderrBudget>,
}

impl LoggingHandle {
    /// Reopen the rolling log file handle. Called on HUP (spec.md §4.7:
    /// "reopen error-message sinks"). The rolling writer already reopens
    /// lazily on rotation; this forces a rotation boundary so an external
    /// logrotate-style move of the current file is picked up immediately.
    pub fn reopen(&self) -> io::Result<()> {
        self.writer.force_rotate()
    }

    pub fn stderr_budget(&self) -> Arc<StderrBudget> {
        Arc::clone(&self.stderr_budget)
    }
}

/// Enforces spec.md §7's "at most N error lines to stderr (configurable,
/// default unlimited in foreground); one 'maximum reached, suppressing
/// further' message closes the stream when the cap is hit. HUP resets
/// suppression."
pub struct StderrBudget {
    cap: Option<usize>,
    emitted: AtomicUsize,
    closed_message_printed: AtomicBool,
}

impl StderrBudget {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            emitted: AtomicUsize::new(0),
            closed_message_printed: AtomicBool::new(false),
        }
    }

    /// Returns what the caller should do with this error line. Returns
    /// `Print` until the cap is reached; the call that crosses the cap
    /// gets `PrintClosingMessage` so it can print the single suppression
    /// notice; everything after that is `Suppress`.
    pub fn try_emit(&self) -> EmitDecision {
        let Some(cap) = self.cap else {
            return EmitDecision::Print;
        };
        let prev = self.emitted.fetch_add(1, Ordering::Relaxed);
        if prev < cap {
            EmitDecision::Print
        } else if !self.closed_message_printed.swap(true, Ordering::Relaxed) {
            EmitDecision::PrintClosingMessage
        } else {
            EmitDecision::Suppress
        }
    }

    /// HUP resets suppression (spec.md §7).
    pub fn reset(&self) {
        self.emitted.store(0, Ordering::Relaxed);
        self.closed_message_printed.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitDecision {
    Print,
    PrintClosingMessage,
    Suppress,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<LoggingHandle> {
    let log_dir = ensure_logs_dir(config.app_name).context("Failed to ensure log directory")?;
    let file_writer = SharedRollingWriter::new(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOGFORGE_LOG").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose || config.foreground {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer.clone())
                .with_thread_ids(true)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_filter(console_filter),
        )
        .init();

    Ok(LoggingHandle {
        writer: file_writer,
        stderr_budget: Arc::new(StderrBudget::new(config.stderr_error_cap)),
    })
}

/// Get the Logforge home directory: ~/.logforge (override via LOGFORGE_HOME).
pub fn logforge_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("LOGFORGE_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".logforge")
}

/// Get the logs directory: ~/.logforge/logs
pub fn logs_dir() -> PathBuf {
    logforge_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir(_app_name: &str) -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: PathBuf, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut appender = Self {
            dir,
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        let (file, size) = appender.open_current_file()?;
        appender.file = Some(file);
        appender.current_size = size;
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn open_current_file(&self) -> io::Result<(File, u64)> {
        let path = self.current_path();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        self.rotate_files()?;

        let (file, size) = self.open_current_file()?;
        self.file = Some(file);
        self.current_size = size;
        Ok(())
    }

    fn rotate_files(&self) -> io::Result<()> {
        let max_index = self.max_files.saturating_sub(1);
        if max_index == 0 {
            return Ok(());
        }

        let oldest = self.rotated_path(max_index);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for idx in (1..max_index).rev() {
            let src = self.rotated_path(idx);
            if src.exists() {
                let dst = self.rotated_path(idx + 1);
                fs::rename(&src, &dst)?;
            }
        }

        let current = self.current_path();
        if current.exists() {
            let first = self.rotated_path(1);
            fs::rename(current, first)?;
        }

        Ok(())
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn new(dir: PathBuf, base_name: &str) -> Result<Self> {
        let appender = RollingFileAppender::new(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }

    fn force_rotate(&self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.rotate()
    }
}

struct SharedRollingWriterGuard {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRollingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedRollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_budget_unlimited_always_prints() {
        let budget = StderrBudget::new(None);
        for _ in 0..10_000 {
            assert_eq!(budget.try_emit(), EmitDecision::Print);
        }
    }

    #[test]
    fn stderr_budget_caps_and_closes_once() {
        let budget = StderrBudget::new(Some(3));
        assert_eq!(budget.try_emit(), EmitDecision::Print);
        assert_eq!(budget.try_emit(), EmitDecision::Print);
        assert_eq!(budget.try_emit(), EmitDecision::Print);
        assert_eq!(budget.try_emit(), EmitDecision::PrintClosingMessage);
        assert_eq!(budget.try_emit(), EmitDecision::Suppress);
        assert_eq!(budget.try_emit(), EmitDecision::Suppress);
    }

    #[test]
    fn stderr_budget_hup_resets_suppression() {
        let budget = StderrBudget::new(Some(1));
        assert_eq!(budget.try_emit(), EmitDecision::Print);
        assert_eq!(budget.try_emit(), EmitDecision::PrintClosingMessage);
        budget.reset();
        assert_eq!(budget.try_emit(), EmitDecision::Print);
    }

    #[test]
    fn rolling_writer_rotates_past_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::new(dir.path().to_path_buf(), "test", 3, 16).unwrap();
        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"0123456789").unwrap();
        assert!(dir.path().join("test.log.1").exists());
    }
}
