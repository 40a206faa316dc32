use std::{
    env,
    io,
    str::FromStr,
    sync::{mpsc, Once},
    thread,
};

use log::{Record, Metadata};
use thiserror::Error;
pub use log::{
    Log,
    Level,
    SetLoggerError, LevelFilter,
    set_boxed_logger, set_max_level,
};

pub mod micro {
    pub use log::{trace, debug, error, warn, info};
}

/// Environment variable read by [`init_test_logger`] to pick the log level.
pub const LOG_LEVEL_ENV: &str = "EMBEDHTTP_LOG";

const TEST_LOGGER_BUFFER_SIZE: usize = 64;

/// Failure of [`init_stdout_logger`].
#[derive(Debug, Error)]
pub enum InitLoggerError {
    #[error("failed to spawn logger thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("a logger is already installed: {0}")]
    Install(#[from] SetLoggerError),
}

enum Message {
    Line(String),
    Flush,
    Shutdown,
}

/// A `log::Log` backend that hands formatted records to a dedicated writer
/// thread, so handler threads never block on the destination itself.
pub struct EmbedLogger {
    sender: mpsc::SyncSender<Message>,
    jhand: Option<thread::JoinHandle<()>>,
    level: Level,
}

impl EmbedLogger {
    /// Spawns the writer thread; fails if it cannot be spawned.
    pub fn new<T: io::Write + Send + 'static>(buf_size: usize, mut destination: T, level: Level) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(buf_size);
        let jh = thread::Builder::new()
            .name("embedhttp-logger".to_string())
            .spawn(move || {
                for msg in rx {
                    let r = match msg {
                        Message::Line(line) => destination.write_all((line + "\n").as_bytes()),
                        Message::Flush => destination.flush(),
                        Message::Shutdown => break,
                    };
                    if let Err(e) = r {
                        eprintln!("logger error: {}", e);
                    }
                }
                let _ = destination.flush();
            })?;
        Ok(Self {
            sender: tx,
            jhand: Some(jh),
            level,
        })
    }
}

impl Log for EmbedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = if record.target().is_empty() {
            format!("[{}] {}", record.level(), record.args())
        } else {
            format!("[{} {}] {}", record.level(), record.target(), record.args())
        };
        if let Err(e) = self.sender.send(Message::Line(line)) {
            eprintln!("logger error: {}", e);
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(Message::Flush);
    }
}

impl Drop for EmbedLogger {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(jh) = self.jhand.take() {
            let _ = jh.join();
        }
    }
}

pub fn init_stdout_logger(msg_buffer_size: usize, level: Level) -> Result<(), InitLoggerError> {
    let logger = EmbedLogger::new(msg_buffer_size, io::stdout(), level)?;
    set_boxed_logger(Box::new(logger))?;
    set_max_level(level.to_level_filter());
    Ok(())
}

/// Installs a stdout logger once per process. Safe to call from every test;
/// the level comes from `EMBEDHTTP_LOG` and defaults to `warn`.
pub fn init_test_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let level = env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| Level::from_str(&s).ok())
            .unwrap_or(Level::Warn);
        // another logger may already be installed by the host test binary
        let _ = init_stdout_logger(TEST_LOGGER_BUFFER_SIZE, level);
    });
}
