//! Diagnostics Module
//!
//! Side channel fed by [`Status`] construction.
//!
//! ## Responsibilities
//! - Capture a bounded call stack for unexpected failures
//! - Append a timestamped line per failure to a size-capped error log
//! - Rotate the log, keeping a fixed number of dated generations
//!
//! ## Dispatch
//! Mirrors the `tracing` dispatcher model: a process-wide default is
//! installed once with [`set_global_default`], and [`with_default`] installs
//! a thread-scoped override for the duration of a closure. With neither
//! installed, statuses are not traced or logged.
//!
//! Log I/O failures never propagate. The operation that produced the status
//! already failed; the log is best effort.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::Status;

/// Default log size cap before rotation (256 KiB)
pub const DEFAULT_MAX_LOG_BYTES: u64 = 1 << 18;

/// Default number of dated generations kept after rotation
pub const DEFAULT_KEEP_GENERATIONS: usize = 4;

/// Default number of stack frames captured per status
pub const DEFAULT_TRACE_FRAMES: usize = 10;

// =============================================================================
// Capability
// =============================================================================

/// Destination for failure records
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, status: &Status);
}

/// Stack capture policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCapture {
    Disabled,
    /// Capture at most this many frames
    Frames(usize),
}

impl Default for TraceCapture {
    fn default() -> Self {
        TraceCapture::Frames(DEFAULT_TRACE_FRAMES)
    }
}

/// Diagnostic capability consulted by status constructors
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<Arc<dyn DiagnosticSink>>,
    trace: TraceCapture,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink: Some(sink),
            trace: TraceCapture::default(),
        }
    }

    /// Capability that neither logs nor traces
    pub fn disabled() -> Self {
        Self {
            sink: None,
            trace: TraceCapture::Disabled,
        }
    }

    pub fn with_trace(mut self, trace: TraceCapture) -> Self {
        self.trace = trace;
        self
    }

    pub fn trace_capture(&self) -> TraceCapture {
        self.trace
    }
}

static GLOBAL: OnceLock<Diagnostics> = OnceLock::new();

thread_local! {
    static SCOPED: RefCell<Option<Diagnostics>> = const { RefCell::new(None) };
}

/// Install the process-wide capability. Fails if one is already installed.
pub fn set_global_default(diagnostics: Diagnostics) -> std::result::Result<(), Diagnostics> {
    GLOBAL.set(diagnostics)
}

/// Run `f` with `diagnostics` installed for the current thread only
pub fn with_default<T>(diagnostics: Diagnostics, f: impl FnOnce() -> T) -> T {
    struct Restore(Option<Diagnostics>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            SCOPED.with(|s| *s.borrow_mut() = previous);
        }
    }

    let previous = SCOPED.with(|s| s.borrow_mut().replace(diagnostics));
    let _restore = Restore(previous);
    f()
}

fn current() -> Option<Diagnostics> {
    SCOPED
        .with(|s| s.borrow().clone())
        .or_else(|| GLOBAL.get().cloned())
}

/// Capture a bounded stack snapshot under the active policy
pub(crate) fn capture_trace() -> Option<String> {
    match current()?.trace {
        TraceCapture::Disabled => None,
        TraceCapture::Frames(max) => Some(render_frames(&Backtrace::force_capture(), max)),
    }
}

/// Hand a status to the active sink, if any
pub(crate) fn record(status: &Status) {
    if let Some(sink) = current().and_then(|d| d.sink) {
        sink.record(status);
    }
}

fn render_frames(backtrace: &Backtrace, max_frames: usize) -> String {
    let rendered = backtrace.to_string();
    let mut out = String::new();
    let mut frames = 0;
    for line in rendered.lines() {
        if is_frame_header(line) {
            frames += 1;
            if frames > max_frames {
                break;
            }
        }
        out.push('\n');
        out.push_str(line);
    }
    out
}

/// Frame header lines look like `  12: symbol::path`
fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}

// =============================================================================
// Rotating error log
// =============================================================================

/// Size-capped, rotating, append-only error log
pub struct RotatingLog {
    dir: PathBuf,
    name: String,
    max_bytes: u64,
    keep_generations: usize,
    /// Serializes file I/O; independent of every other engine lock
    lock: Mutex<()>,
}

impl RotatingLog {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            keep_generations: DEFAULT_KEEP_GENERATIONS,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_keep_generations(mut self, keep: usize) -> Self {
        self.keep_generations = keep;
        self
    }

    /// Path of the live log file
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Rotate any previous log away and start a fresh one with a banner
    pub fn start_session(&self) {
        let _guard = self.lock.lock();
        let result = (|| -> io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            if self.path().exists() {
                self.rotate()?;
            }
            let mut file = fs::File::create(self.path())?;
            writeln!(file, "===== START session on {}", now_rfc3339())?;
            file.flush()
        })();
        if let Err(e) = result {
            tracing::warn!(path = %self.path().display(), error = %e, "failed to start error log");
        }
    }

    /// Append one entry. Errors are swallowed.
    pub fn append(&self, entry: &str) {
        let _guard = self.lock.lock();
        if let Err(e) = self.try_append(entry) {
            tracing::warn!(path = %self.path().display(), error = %e, "failed to append error log");
        }
    }

    /// Dated generations, oldest first
    pub fn generations(&self) -> io::Result<Vec<PathBuf>> {
        let prefix = format!("{}.", self.name);
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&prefix))
            .collect();
        names.sort();
        Ok(names.into_iter().map(|n| self.dir.join(n)).collect())
    }

    fn try_append(&self, entry: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if size >= self.max_bytes {
            self.rotate()?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "=== {}", now_rfc3339())?;
        writeln!(file, "{}", entry)?;
        file.flush()
    }

    /// Rename the live log to a dated generation and prune old ones.
    /// Caller holds `lock`.
    fn rotate(&self) -> io::Result<()> {
        let mut dated = self.dir.join(format!("{}.{}", self.name, generation_suffix()));
        let mut n = 1;
        while dated.exists() {
            dated = self
                .dir
                .join(format!("{}.{}-{}", self.name, generation_suffix(), n));
            n += 1;
        }
        fs::rename(self.path(), &dated)?;

        let generations = self.generations()?;
        let excess = generations.len().saturating_sub(self.keep_generations);
        for old in &generations[..excess] {
            remove_quietly(old);
        }
        Ok(())
    }
}

impl DiagnosticSink for RotatingLog {
    fn record(&self, status: &Status) {
        match status.trace() {
            Some(trace) => self.append(&format!("{}{}", status, trace)),
            None => self.append(&status.to_string()),
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to prune error log generation");
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-time".to_string())
}

/// Fixed width so lexical order is chronological
fn generation_suffix() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:09}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.nanosecond()
    )
}
