// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem I/O abstraction for the state store's atomic write protocol.
//!
//! The state file is small (a handful of resume tokens and counters), so
//! unlike a snapshot checkpointer this does its writes synchronously on the
//! caller's thread, with no compression. The durability protocol itself —
//! write-tmp, fsync-file, rename, fsync-dir — is unchanged.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateWriteError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StateWriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Trait abstracting state-file I/O for testability.
///
/// A real sync process uses [`FsStateWriter`]. Tests substitute a fake to
/// inject faults at each step of the write protocol and assert on ordering
/// without touching the filesystem.
pub trait StateWriter: Send + Sync {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), StateWriteError>;
    fn fsync_file(&self, path: &Path) -> Result<(), StateWriteError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StateWriteError>;
    fn fsync_dir(&self, path: &Path) -> Result<(), StateWriteError>;
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StateWriteError>;
    fn remove(&self, path: &Path) -> Result<(), StateWriteError>;
}

/// Production writer backed by real filesystem calls.
#[derive(Debug, Clone, Default)]
pub struct FsStateWriter;

impl StateWriter for FsStateWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), StateWriteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateWriteError::io(parent, e))?;
        }
        let mut file = File::create(path).map_err(|e| StateWriteError::io(path, e))?;
        file.write_all(data)
            .map_err(|e| StateWriteError::io(path, e))
    }

    fn fsync_file(&self, path: &Path) -> Result<(), StateWriteError> {
        let file = File::open(path).map_err(|e| StateWriteError::io(path, e))?;
        file.sync_all().map_err(|e| StateWriteError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StateWriteError> {
        std::fs::rename(from, to).map_err(|e| StateWriteError::io(to, e))
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), StateWriteError> {
        // Directory fsync is best-effort: some platforms (notably Windows)
        // cannot open a directory as a File at all.
        match File::open(path) {
            Ok(dir) => {
                let _ = dir.sync_all();
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StateWriteError> {
        match std::fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateWriteError::io(path, e)),
        }
    }

    fn remove(&self, path: &Path) -> Result<(), StateWriteError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateWriteError::io(path, e)),
        }
    }
}

/// Sequence counter backing [`unique_tmp_path`]'s per-process uniqueness.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Build a temp-file path in the same directory as `path` that no concurrent
/// writer (another process, or another attempt after a crash) could collide
/// with: `.<stem>_<pid>_<seq>.tmp`, mirroring the original service's
/// `tempfile.mkstemp(prefix=..., suffix='.tmp')`. The pid scopes the name
/// across processes; the counter scopes it across calls within one.
fn unique_tmp_path(path: &Path) -> PathBuf {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("state");
    path.with_file_name(format!(".{stem}_{}_{seq}.tmp", std::process::id()))
}

/// Write `data` to `path` durably: uniquely-named temp file in the same
/// directory, fsync, atomic rename, best-effort directory fsync.
pub fn write_atomic(
    writer: &dyn StateWriter,
    path: &Path,
    data: &[u8],
) -> Result<(), StateWriteError> {
    let tmp_path = unique_tmp_path(path);
    writer.write_tmp(&tmp_path, data)?;

    if let Err(e) = writer.fsync_file(&tmp_path) {
        let _ = writer.remove(&tmp_path);
        return Err(e);
    }
    if let Err(e) = writer.rename(&tmp_path, path) {
        let _ = writer.remove(&tmp_path);
        return Err(e);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        writer.fsync_dir(parent)?;
    }
    Ok(())
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Records of each call made against a [`FakeStateWriter`], in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum WriterCall {
        WriteTmp(PathBuf),
        FsyncFile(PathBuf),
        Rename(PathBuf, PathBuf),
        FsyncDir(PathBuf),
    }

    /// In-memory fake used to test the atomic write protocol without a real
    /// filesystem, including fault injection at any named step.
    ///
    /// Cloning shares the same backing storage (via `Arc`), so a clone can
    /// stand in for "the same disk, a new process" in restart-simulation tests.
    #[derive(Default, Clone)]
    pub struct FakeStateWriter {
        files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
        calls: Arc<Mutex<Vec<WriterCall>>>,
        fail_on: Arc<Mutex<Option<&'static str>>>,
    }

    impl FakeStateWriter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Cause the named step (`"write_tmp"`, `"fsync_file"`, `"rename"`,
        /// `"fsync_dir"`) to fail the next time it runs.
        pub fn fail_on(&self, step: &'static str) {
            *self.fail_on.lock().unwrap() = Some(step);
        }

        pub fn calls(&self) -> Vec<WriterCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn seed(&self, path: &Path, data: Vec<u8>) {
            self.files.lock().unwrap().insert(path.to_path_buf(), data);
        }

        fn maybe_fail(&self, step: &str, path: &Path) -> Result<(), StateWriteError> {
            let mut fail_on = self.fail_on.lock().unwrap();
            if *fail_on == Some(step) {
                *fail_on = None;
                return Err(StateWriteError::io(
                    path,
                    std::io::Error::other(format!("injected failure at {step}")),
                ));
            }
            Ok(())
        }
    }

    impl StateWriter for FakeStateWriter {
        fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), StateWriteError> {
            self.calls
                .lock()
                .unwrap()
                .push(WriterCall::WriteTmp(path.to_path_buf()));
            self.maybe_fail("write_tmp", path)?;
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), data.to_vec());
            Ok(())
        }

        fn fsync_file(&self, path: &Path) -> Result<(), StateWriteError> {
            self.calls
                .lock()
                .unwrap()
                .push(WriterCall::FsyncFile(path.to_path_buf()));
            self.maybe_fail("fsync_file", path)
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<(), StateWriteError> {
            self.calls
                .lock()
                .unwrap()
                .push(WriterCall::Rename(from.to_path_buf(), to.to_path_buf()));
            self.maybe_fail("rename", to)?;
            let data = self.files.lock().unwrap().remove(from);
            if let Some(data) = data {
                self.files.lock().unwrap().insert(to.to_path_buf(), data);
            }
            Ok(())
        }

        fn fsync_dir(&self, path: &Path) -> Result<(), StateWriteError> {
            self.calls
                .lock()
                .unwrap()
                .push(WriterCall::FsyncDir(path.to_path_buf()));
            self.maybe_fail("fsync_dir", path)
        }

        fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StateWriteError> {
            Ok(self.files.lock().unwrap().get(path).cloned())
        }

        fn remove(&self, path: &Path) -> Result<(), StateWriteError> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }
}
