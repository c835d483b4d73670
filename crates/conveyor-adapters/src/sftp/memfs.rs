//! In-memory remote filesystem for exercising the SFTP layer without a
//! server. The handle is the connector; every channel it opens shares the
//! same backing state, so a test can seed files, run commands, and assert
//! on the results through any handle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{ChannelError, ExecError};
use crate::sftp::{
    remote_parent, RemoteEntry, RemoteStat, SftpChannel, SftpConnector, SftpEndpoint,
};

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    /// Per-path reported-size overrides, for faking a truncated remote
    /// stat after an otherwise successful write.
    size_overrides: BTreeMap<String, u64>,
}

/// Shared-state in-memory SFTP backend.
#[derive(Debug, Clone, Default)]
pub struct InMemorySftp {
    state: Arc<Mutex<State>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

impl InMemorySftp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating missing parent directories.
    pub fn seed_file(&self, path: &str, content: &[u8]) {
        let path = normalize(path);
        let mut state = self.state.lock();
        let mut dir = remote_parent(&path).map(normalize);
        while let Some(d) = dir {
            if d == "/" {
                break;
            }
            dir = remote_parent(&d).map(normalize);
            state.dirs.insert(d);
        }
        state.files.insert(path, content.to_vec());
    }

    pub fn seed_dir(&self, path: &str) {
        self.state.lock().dirs.insert(normalize(path));
    }

    /// Make `stat` report `size` for this path regardless of its content.
    pub fn force_reported_size(&self, path: &str, size: u64) {
        self.state.lock().size_overrides.insert(normalize(path), size);
    }

    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(&normalize(path)).cloned()
    }

    pub fn channel(&self) -> InMemoryChannel {
        InMemoryChannel {
            state: Arc::clone(&self.state),
        }
    }
}

impl SftpConnector for InMemorySftp {
    fn connect(&self, _endpoint: &SftpEndpoint) -> Result<Box<dyn SftpChannel>, ExecError> {
        Ok(Box::new(self.channel()))
    }
}

/// One live session against the shared state.
#[derive(Debug)]
pub struct InMemoryChannel {
    state: Arc<Mutex<State>>,
}

impl InMemoryChannel {
    fn dir_exists(state: &State, path: &str) -> bool {
        path == "/" || state.dirs.contains(path)
    }
}

impl SftpChannel for InMemoryChannel {
    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, ChannelError> {
        let path = normalize(path);
        let state = self.state.lock();
        if let Some(content) = state.files.get(&path) {
            let size = state
                .size_overrides
                .get(&path)
                .copied()
                .unwrap_or(content.len() as u64);
            return Ok(Some(RemoteStat {
                size,
                is_dir: false,
                modified: None,
            }));
        }
        if Self::dir_exists(&state, &path) {
            return Ok(Some(RemoteStat {
                size: 0,
                is_dir: true,
                modified: None,
            }));
        }
        Ok(None)
    }

    fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ChannelError> {
        let path = normalize(path);
        let state = self.state.lock();
        if !Self::dir_exists(&state, &path) {
            return Err(ChannelError::NotFound { path });
        }
        let mut entries = Vec::new();
        for (file, content) in &state.files {
            if remote_parent(file).map(normalize).as_deref() == Some(path.as_str()) {
                let size = state
                    .size_overrides
                    .get(file)
                    .copied()
                    .unwrap_or(content.len() as u64);
                entries.push(RemoteEntry {
                    name: file_name(file),
                    path: file.clone(),
                    stat: RemoteStat {
                        size,
                        is_dir: false,
                        modified: None,
                    },
                });
            }
        }
        for dir in &state.dirs {
            if remote_parent(dir).map(normalize).as_deref() == Some(path.as_str()) {
                entries.push(RemoteEntry {
                    name: file_name(dir),
                    path: dir.clone(),
                    stat: RemoteStat {
                        size: 0,
                        is_dir: true,
                        modified: None,
                    },
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, ChannelError> {
        let path = normalize(path);
        self.state
            .lock()
            .files
            .get(&path)
            .cloned()
            .ok_or(ChannelError::NotFound { path })
    }

    fn write(&mut self, path: &str, content: &[u8]) -> Result<u64, ChannelError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        if let Some(parent) = remote_parent(&path).map(normalize) {
            if !Self::dir_exists(&state, &parent) {
                return Err(ChannelError::NotFound { path: parent });
            }
        }
        state.files.insert(path, content.to_vec());
        Ok(content.len() as u64)
    }

    fn remove_file(&mut self, path: &str) -> Result<(), ChannelError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        if state.files.remove(&path).is_none() {
            return Err(ChannelError::NotFound { path });
        }
        state.size_overrides.remove(&path);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), ChannelError> {
        let from = normalize(from);
        let to = normalize(to);
        let mut state = self.state.lock();
        if let Some(content) = state.files.remove(&from) {
            state.files.insert(to, content);
            return Ok(());
        }
        if state.dirs.remove(&from) {
            state.dirs.insert(to);
            return Ok(());
        }
        Err(ChannelError::NotFound { path: from })
    }

    fn mkdir(&mut self, path: &str) -> Result<(), ChannelError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        if state.files.contains_key(&path) || state.dirs.contains(&path) {
            return Err(ChannelError::channel(format!("already exists: {path}")));
        }
        if let Some(parent) = remote_parent(&path).map(normalize) {
            if !Self::dir_exists(&state, &parent) {
                return Err(ChannelError::NotFound { path: parent });
            }
        }
        state.dirs.insert(path);
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), ChannelError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        if !state.dirs.contains(&path) {
            return Err(ChannelError::NotFound { path });
        }
        let occupied = state
            .files
            .keys()
            .map(String::as_str)
            .chain(state.dirs.iter().map(String::as_str))
            .any(|p| remote_parent(p).map(normalize).as_deref() == Some(path.as_str()));
        if occupied {
            return Err(ChannelError::channel(format!("directory not empty: {path}")));
        }
        state.dirs.remove(&path);
        Ok(())
    }
}
