use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::progress::OutputMode;

/// Install the global subscriber: a terminal layer filtered by `mode` and a
/// file layer that stays silent until the returned handle is activated.
pub fn init(mode: OutputMode) -> FileLogHandle {
    // Tracing on stderr corrupts indicatif's line tracking, so the spinner
    // modes keep the terminal layer off.
    let terminal_filter = match mode {
        OutputMode::Verbose => EnvFilter::new("wsldev=debug"),
        OutputMode::Plain => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("wsldev=info")),
        OutputMode::Normal | OutputMode::Quiet | OutputMode::Silent => EnvFilter::new("off"),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    let (file_writer, handle) = DeferredFileWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("wsldev=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    handle
}

// ── DeferredFileWriter ───────────────────────────────────

/// A `MakeWriter` that discards writes until a log file is attached.
///
/// The subscriber is installed before we know whether the command mutates
/// anything; read-only commands never create a log file.
#[derive(Clone)]
pub struct DeferredFileWriter {
    inner: Arc<Mutex<Option<File>>>,
}

/// Handle returned by [`DeferredFileWriter::new`].
#[derive(Clone)]
pub struct FileLogHandle {
    inner: Arc<Mutex<Option<File>>>,
}

impl DeferredFileWriter {
    pub fn new() -> (Self, FileLogHandle) {
        let inner = Arc::new(Mutex::new(None));
        (
            Self {
                inner: inner.clone(),
            },
            FileLogHandle { inner },
        )
    }
}

impl FileLogHandle {
    /// Start appending to `path`, creating parent directories as needed.
    pub fn set_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(file);
        }
        Ok(())
    }
}

/// Writer handed out per event: writes to the file, or discards.
pub struct DeferredWriter {
    inner: Arc<Mutex<Option<File>>>,
}

impl std::io::Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.inner.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(f) => f.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(f) => f.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredFileWriter {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            inner: self.inner.clone(),
        }
    }
}
