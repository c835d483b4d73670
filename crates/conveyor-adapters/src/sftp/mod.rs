//! SFTP protocol layer: the channel seam, the `ssh2` backend, and the
//! operation commands.
//!
//! A channel is one remote session. It is `Send` but deliberately not
//! shared: one channel serves one operation at a time, and concurrent
//! operations each connect their own channel through an [`SftpConnector`].

pub mod commands;
pub mod memfs;
mod transfer;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use conveyor_flow_engine::Adapter;

use crate::errors::{ChannelError, ExecError};

pub use commands::{
    DeleteCommand, ExistsCommand, GetInfoCommand, ListCommand, MkdirCommand, RenameCommand,
    RmdirCommand, SftpCommand, SftpOperation,
};
pub use transfer::{BatchDownloadCommand, BatchUploadCommand, DownloadCommand, UploadCommand};

// ---------------------------------------------------------------------------
// Remote filesystem model
// ---------------------------------------------------------------------------

/// Metadata of a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: u64,
    pub is_dir: bool,
    /// Seconds since the epoch, when the server reports one.
    pub modified: Option<u64>,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub stat: RemoteStat,
}

// ---------------------------------------------------------------------------
// Channel seam
// ---------------------------------------------------------------------------

/// One live remote session. `stat` answers `None` for a missing path, so
/// existence checks never depend on backend error codes.
pub trait SftpChannel: Send {
    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, ChannelError>;

    fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ChannelError>;

    fn read(&mut self, path: &str) -> Result<Vec<u8>, ChannelError>;

    /// Write the full content, returning the byte count transferred.
    fn write(&mut self, path: &str, content: &[u8]) -> Result<u64, ChannelError>;

    fn remove_file(&mut self, path: &str) -> Result<(), ChannelError>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), ChannelError>;

    fn mkdir(&mut self, path: &str) -> Result<(), ChannelError>;

    fn rmdir(&mut self, path: &str) -> Result<(), ChannelError>;
}

/// Opens channels. Executors hold a connector, not a channel: every
/// `execute` call binds its own session.
pub trait SftpConnector: Send + Sync {
    fn connect(&self, endpoint: &SftpEndpoint) -> Result<Box<dyn SftpChannel>, ExecError>;
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Connection settings extracted from an adapter's config mapping.
#[derive(Debug, Clone)]
pub struct SftpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Password auth when set; SSH agent auth otherwise.
    pub password: Option<String>,
}

impl SftpEndpoint {
    pub fn from_adapter(adapter: &Adapter) -> Result<Self, ExecError> {
        let host = required(adapter, "host")?;
        let username = required(adapter, "username")?;
        Ok(Self {
            host,
            port: adapter.config_u64("port", 22) as u16,
            username,
            password: adapter.config_str("password").map(String::from),
        })
    }
}

fn required(adapter: &Adapter, field: &str) -> Result<String, ExecError> {
    adapter
        .config_str(field)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| ExecError::MissingConfig {
            field: field.to_string(),
        })
}

// ---------------------------------------------------------------------------
// ssh2 backend
// ---------------------------------------------------------------------------

/// Production connector backed by `ssh2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ssh2Connector;

impl SftpConnector for Ssh2Connector {
    fn connect(&self, endpoint: &SftpEndpoint) -> Result<Box<dyn SftpChannel>, ExecError> {
        tracing::debug!(host = %endpoint.host, port = endpoint.port, "sftp connect");
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).map_err(|e| {
            ExecError::Connect {
                message: format!("{}:{}: {e}", endpoint.host, endpoint.port),
            }
        })?;
        let mut session = ssh2::Session::new().map_err(connect_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(connect_err)?;
        match &endpoint.password {
            Some(password) => session
                .userauth_password(&endpoint.username, password)
                .map_err(connect_err)?,
            None => session.userauth_agent(&endpoint.username).map_err(connect_err)?,
        }
        let sftp = session.sftp().map_err(connect_err)?;
        Ok(Box::new(Ssh2Channel {
            _session: session,
            sftp,
        }))
    }
}

fn connect_err(e: ssh2::Error) -> ExecError {
    ExecError::Connect {
        message: e.to_string(),
    }
}

/// The session must outlive the sftp handle, so the channel owns both.
struct Ssh2Channel {
    _session: ssh2::Session,
    sftp: ssh2::Sftp,
}

// LIBSSH2_FX_NO_SUCH_FILE
const SFTP_NO_SUCH_FILE: i32 = 2;

fn is_not_found(e: &ssh2::Error) -> bool {
    matches!(e.code(), ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

fn channel_err(e: ssh2::Error) -> ChannelError {
    ChannelError::channel(e.to_string())
}

fn to_remote_stat(stat: &ssh2::FileStat) -> RemoteStat {
    RemoteStat {
        size: stat.size.unwrap_or(0),
        is_dir: stat.is_dir(),
        modified: stat.mtime,
    }
}

impl SftpChannel for Ssh2Channel {
    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, ChannelError> {
        match self.sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(to_remote_stat(&stat))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(channel_err(e)),
        }
    }

    fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ChannelError> {
        let entries = self.sftp.readdir(Path::new(path)).map_err(|e| {
            if is_not_found(&e) {
                ChannelError::NotFound {
                    path: path.to_string(),
                }
            } else {
                channel_err(e)
            }
        })?;
        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    path: entry_path.to_string_lossy().into_owned(),
                    stat: to_remote_stat(&stat),
                })
            })
            .collect())
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, ChannelError> {
        let mut file = self.sftp.open(Path::new(path)).map_err(|e| {
            if is_not_found(&e) {
                ChannelError::NotFound {
                    path: path.to_string(),
                }
            } else {
                channel_err(e)
            }
        })?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| ChannelError::channel(e.to_string()))?;
        Ok(buf)
    }

    fn write(&mut self, path: &str, content: &[u8]) -> Result<u64, ChannelError> {
        let mut file = self
            .sftp
            .create(Path::new(path))
            .map_err(channel_err)?;
        file.write_all(content)
            .map_err(|e| ChannelError::channel(e.to_string()))?;
        Ok(content.len() as u64)
    }

    fn remove_file(&mut self, path: &str) -> Result<(), ChannelError> {
        self.sftp.unlink(Path::new(path)).map_err(|e| {
            if is_not_found(&e) {
                ChannelError::NotFound {
                    path: path.to_string(),
                }
            } else {
                channel_err(e)
            }
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), ChannelError> {
        self.sftp
            .rename(Path::new(from), Path::new(to), None)
            .map_err(channel_err)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), ChannelError> {
        self.sftp.mkdir(Path::new(path), 0o755).map_err(channel_err)
    }

    fn rmdir(&mut self, path: &str) -> Result<(), ChannelError> {
        self.sftp.rmdir(Path::new(path)).map_err(channel_err)
    }
}

// ---------------------------------------------------------------------------
// Path helpers shared by commands and executors
// ---------------------------------------------------------------------------

/// Join a remote directory and file name with exactly one separator.
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{name}")
    } else {
        format!("{trimmed}/{name}")
    }
}

/// Parent path of a remote file path, if it has one.
pub(crate) fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        Some("/")
    } else {
        Some(&trimmed[..idx])
    }
}
