//! Per-worker log files.
//!
//! With output redirection enabled every worker owns a [`WorkerLog`]. While it
//! is captured, tracing events emitted on the worker thread land in the file
//! instead of the caller's subscriber, and [`WorkerLog::write_line`] appends raw
//! lines. Files are named `parmap-<session>-worker-<n>.log`; a successful
//! session that does not retain its logs sweeps that pattern from its log
//! directory afterwards.

use crate::parallel::MapError;
use globset::Glob;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::subscriber::DefaultGuard;
use uuid::Uuid;

pub const LOG_PREFIX: &str = "parmap";

// Absolute from first use; later working-directory changes do not move it.
static LOG_ROOT: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    RwLock::new(root)
});

/// Directory worker logs go to when a session does not name its own.
pub fn log_root() -> PathBuf {
    LOG_ROOT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_log_root(path: impl Into<PathBuf>) {
    *LOG_ROOT.write().unwrap_or_else(PoisonError::into_inner) = path.into();
}

/// Naming and cleanup of the log files that belong to one session.
#[derive(Debug, Clone)]
pub struct LogManager {
    dir: PathBuf,
    session: Uuid,
}

impl LogManager {
    pub fn new(dir: impl Into<PathBuf>, session: Uuid) -> Self {
        Self {
            dir: dir.into(),
            session,
        }
    }

    /// Use `dir` when given, the process-wide log root otherwise.
    pub fn for_session(dir: Option<&Path>, session: Uuid) -> Self {
        match dir {
            Some(dir) => Self::new(dir, session),
            None => Self::new(log_root(), session),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, worker_id: usize) -> PathBuf {
        self.dir.join(format!(
            "{LOG_PREFIX}-{}-worker-{worker_id}.log",
            self.session.simple()
        ))
    }

    /// Glob matching every log file of this session.
    pub fn pattern(&self) -> String {
        format!("{LOG_PREFIX}-{}-worker-*.log", self.session.simple())
    }

    /// Create (or truncate) the log file of one worker.
    pub fn open(&self, worker_id: usize) -> Result<WorkerLog, MapError> {
        let path = self.path_for(worker_id);
        let file = fs::create_dir_all(&self.dir)
            .and_then(|_| File::create(&path))
            .map_err(|source| MapError::Log {
                path: path.clone(),
                source,
            })?;

        Ok(WorkerLog {
            path,
            file: Arc::new(file),
        })
    }

    /// Files currently in the log directory that match this session's pattern.
    pub fn session_logs(&self) -> Vec<PathBuf> {
        let matcher = match Glob::new(&self.pattern()) {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                tracing::warn!("invalid log pattern {}: {}", self.pattern(), e);
                return Vec::new();
            }
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot list log directory {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut logs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| matcher.is_match(entry.file_name()))
            .map(|entry| entry.path())
            .collect();
        logs.sort();
        logs
    }

    /// Best-effort removal of this session's log files. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        for path in self.session_logs() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("failed to remove log {}: {}", path.display(), e),
            }
        }
        tracing::debug!(session = %self.session, removed, "swept worker logs");
        removed
    }
}

/// An open worker log. The file is closed once the log and every capture
/// guard created from it are dropped.
#[derive(Debug)]
pub struct WorkerLog {
    path: PathBuf,
    file: Arc<File>,
}

impl WorkerLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file: &File = &self.file;
        writeln!(file, "{line}")
    }

    /// Route tracing events of the current thread into this file until the
    /// returned guard is dropped.
    pub fn capture(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(Arc::clone(&self.file))
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_follow_session_pattern() {
        let session = Uuid::new_v4();
        let manager = LogManager::new("/tmp/logs", session);

        let path = manager.path_for(3);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, format!("parmap-{}-worker-3.log", session.simple()));
        assert!(
            Glob::new(&manager.pattern())
                .unwrap()
                .compile_matcher()
                .is_match(&name)
        );
    }

    #[test]
    fn test_sweep_only_removes_own_session() {
        let temp_dir = TempDir::new().unwrap();
        let ours = LogManager::new(temp_dir.path(), Uuid::new_v4());
        let theirs = LogManager::new(temp_dir.path(), Uuid::new_v4());

        drop(ours.open(0).unwrap());
        drop(ours.open(1).unwrap());
        drop(theirs.open(0).unwrap());
        fs::write(temp_dir.path().join("notes.log"), "keep me").unwrap();

        assert_eq!(ours.session_logs().len(), 2);
        assert_eq!(ours.sweep(), 2);
        assert!(ours.session_logs().is_empty());
        assert_eq!(theirs.session_logs().len(), 1);
        assert!(temp_dir.path().join("notes.log").exists());
    }

    #[test]
    fn test_capture_writes_thread_events() {
        let temp_dir = TempDir::new().unwrap();
        let manager = LogManager::new(temp_dir.path().join("nested"), Uuid::new_v4());
        let log = manager.open(0).unwrap();
        let path = log.path().to_path_buf();

        {
            let _guard = log.capture();
            tracing::info!("captured event");
            log.write_line("raw line").unwrap();
        }
        drop(log);

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("captured event"));
        assert!(content.contains("raw line"));
    }

    #[test]
    fn test_for_session_falls_back_to_root() {
        let session = Uuid::new_v4();
        let explicit = LogManager::for_session(Some(Path::new("/var/tmp")), session);
        assert_eq!(explicit.dir(), Path::new("/var/tmp"));

        let fallback = LogManager::for_session(None, session);
        assert_eq!(fallback.dir(), log_root());
    }

    #[test]
    fn test_default_log_root_is_absolute_working_directory() {
        let root = log_root();
        assert!(root.is_absolute());
        assert_eq!(root, std::env::current_dir().unwrap());
    }
}
