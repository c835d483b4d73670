//! Error types for the protocol layer.
//!
//! `ExecError` covers adapter executors, `CommandError` parameter
//! validation of SFTP operation commands, `ChannelError` the remote
//! filesystem seam. Operational failures surface as structured
//! `CommandResult` failures at the command boundary; these enums carry
//! the contract violations and transport faults underneath them.

use thiserror::Error;

use conveyor_flow_engine::StepError;

/// Adapter executor failure. `MissingConfig` and `Config` are raised by
/// `validate_config` before any connection is opened.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("missing required adapter config field: {field}")]
    MissingConfig { field: String },
    #[error("invalid adapter config: {message}")]
    Config { message: String },
    #[error("unsupported adapter: {type_label} {direction_label}")]
    Unsupported {
        type_label: String,
        direction_label: String,
    },
    #[error("connection failed: {message}")]
    Connect { message: String },
    #[error("remote operation failed: {message}")]
    Remote { message: String },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mail delivery failed: {message}")]
    Mail { message: String },
}

impl From<ExecError> for StepError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::MissingConfig { .. } | ExecError::Config { .. } => StepError::Config {
                message: err.to_string(),
            },
            other => StepError::Execution {
                message: other.to_string(),
            },
        }
    }
}

/// Rejected SFTP command parameters, raised before the channel is touched.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid parameters for {command}: {message}")]
    InvalidParams { command: String, message: String },
}

/// Remote filesystem fault reported by an [`SftpChannel`](crate::sftp::SftpChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("remote path not found: {path}")]
    NotFound { path: String },
    #[error("channel error: {message}")]
    Channel { message: String },
}

impl ChannelError {
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_step_config() {
        let err = ExecError::MissingConfig {
            field: "smtpHost".into(),
        };
        assert!(matches!(StepError::from(err), StepError::Config { .. }));
    }

    #[test]
    fn transport_errors_map_to_step_execution() {
        let err = ExecError::Connect {
            message: "refused".into(),
        };
        let step = StepError::from(err);
        assert!(matches!(step, StepError::Execution { .. }));
        assert!(step.to_string().contains("refused"));
    }
}
