use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE_NAME: &str = "app.log";
pub const OLD_LOG_FILE_NAME: &str = "app.old.log";
pub const DEFAULT_MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

struct State {
    dir: PathBuf,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl State {
    fn current_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    fn open(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Moves `app.log` to `app.old.log`, replacing any previous generation.
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;

        let current = self.current_path();
        let old = self.dir.join(OLD_LOG_FILE_NAME);
        let _ = std::fs::remove_file(&old);
        if std::fs::rename(&current, &old).is_err() {
            let _ = std::fs::remove_file(&current);
        }

        self.open()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.max_size || self.file.is_none() {
            self.rotate_or_reopen()?;
        }

        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::other("log file is not open"));
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn rotate_or_reopen(&mut self) -> io::Result<()> {
        if self.written >= self.max_size {
            self.rotate()
        } else {
            self.open()
        }
    }
}

/// Append-only log file capped at `max_size` bytes, keeping one previous
/// generation.
///
/// The size check happens before each write, so a file may exceed the cap by
/// at most one record.
#[derive(Clone)]
pub struct RotatingFile {
    state: Arc<Mutex<State>>,
}

impl RotatingFile {
    /// Opens (or creates) `dir/app.log`, creating `dir` if needed.
    pub fn open(dir: impl AsRef<Path>, max_size: u64) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut state = State {
            dir,
            max_size,
            file: None,
            written: 0,
        };
        state.open()?;

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state.lock().ok().map(|s| s.current_path())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state.lock() {
            Ok(mut state) => state.write(buf),
            Err(_) => Err(io::Error::other("log file lock poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Ok(mut state) = self.state.lock()
            && let Some(file) = state.file.as_mut()
        {
            file.flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
