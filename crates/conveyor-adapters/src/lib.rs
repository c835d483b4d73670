//! Protocol adapter executors for Conveyor integration flows.
//!
//! Plugs into the engine's `AdapterRunner` seam: a cached factory keyed by
//! protocol+direction hands out FILE, SFTP, and EMAIL executors; the SFTP
//! side is built from validated operation commands over a channel trait
//! with an in-memory test backend.

pub mod email;
pub mod errors;
pub mod executor;
pub mod factory;
pub mod file_adapter;
pub mod runner;
pub mod sftp;
pub mod sftp_adapter;

pub use email::{EmailReceiverExecutor, LettreSmtp, MailTransport, OutboundEmail, SmtpEndpoint};
pub use errors::{ChannelError, CommandError, ExecError};
pub use executor::AdapterExecutor;
pub use factory::ExecutorFactory;
pub use file_adapter::{FileReceiverExecutor, FileSenderExecutor};
pub use runner::DefaultAdapterRunner;
pub use sftp::{
    BatchDownloadCommand, BatchUploadCommand, DeleteCommand, DownloadCommand, ExistsCommand,
    GetInfoCommand, ListCommand, MkdirCommand, RemoteEntry, RemoteStat, RenameCommand,
    RmdirCommand, SftpChannel, SftpCommand, SftpConnector, SftpEndpoint, SftpOperation,
    Ssh2Connector, UploadCommand,
};
pub use sftp_adapter::{SftpReceiverExecutor, SftpSenderExecutor};
