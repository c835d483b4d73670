//! Type+direction keyed executor factory.
//!
//! Executors are stateless, so the factory constructs each supported pair
//! once and hands out `Arc` clones from a cache keyed
//! `UPPER(type)_UPPER(direction)`. Unknown pairs are an explicit `None`,
//! never a panic: EMAIL sender in particular — collecting mail into a
//! flow is unsupported — must fail the lookup rather than no-op.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use conveyor_flow_engine::{AdapterDirection, AdapterType};

use crate::email::{EmailReceiverExecutor, LettreSmtp, MailTransport};
use crate::executor::AdapterExecutor;
use crate::file_adapter::{FileReceiverExecutor, FileSenderExecutor};
use crate::sftp::{Ssh2Connector, SftpConnector};
use crate::sftp_adapter::{SftpReceiverExecutor, SftpSenderExecutor};

pub struct ExecutorFactory {
    cache: Mutex<BTreeMap<String, Arc<dyn AdapterExecutor>>>,
    sftp_connector: Arc<dyn SftpConnector>,
    mail_transport: Arc<dyn MailTransport>,
}

impl Default for ExecutorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorFactory {
    /// Factory with the production backends (`ssh2`, `lettre`).
    pub fn new() -> Self {
        Self::with_backends(Arc::new(Ssh2Connector), Arc::new(LettreSmtp))
    }

    /// Factory with substituted protocol backends, for tests and embedding.
    pub fn with_backends(
        sftp_connector: Arc<dyn SftpConnector>,
        mail_transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            cache: Mutex::new(BTreeMap::new()),
            sftp_connector,
            mail_transport,
        }
    }

    fn cache_key(adapter_type: AdapterType, direction: AdapterDirection) -> String {
        format!("{}_{}", adapter_type.label(), direction.label())
    }

    fn build(
        &self,
        adapter_type: AdapterType,
        direction: AdapterDirection,
    ) -> Option<Arc<dyn AdapterExecutor>> {
        match (adapter_type, direction) {
            (AdapterType::File, AdapterDirection::Sender) => Some(Arc::new(FileSenderExecutor)),
            (AdapterType::File, AdapterDirection::Receiver) => Some(Arc::new(FileReceiverExecutor)),
            (AdapterType::Sftp, AdapterDirection::Sender) => Some(Arc::new(
                SftpSenderExecutor::new(Arc::clone(&self.sftp_connector)),
            )),
            (AdapterType::Sftp, AdapterDirection::Receiver) => Some(Arc::new(
                SftpReceiverExecutor::new(Arc::clone(&self.sftp_connector)),
            )),
            (AdapterType::Email, AdapterDirection::Receiver) => Some(Arc::new(
                EmailReceiverExecutor::new(Arc::clone(&self.mail_transport)),
            )),
            // Email collection is not a thing this system does; unknown
            // future pairs are equally unsupported.
            _ => None,
        }
    }

    /// The executor for a type+direction pair, `None` when unsupported.
    pub fn create(
        &self,
        adapter_type: AdapterType,
        direction: AdapterDirection,
    ) -> Option<Arc<dyn AdapterExecutor>> {
        let key = Self::cache_key(adapter_type, direction);
        let mut cache = self.cache.lock();
        if let Some(executor) = cache.get(&key) {
            return Some(Arc::clone(executor));
        }
        let executor = self.build(adapter_type, direction)?;
        cache.insert(key, Arc::clone(&executor));
        Some(executor)
    }

    pub fn is_supported(&self, adapter_type: AdapterType, direction: AdapterDirection) -> bool {
        self.create(adapter_type, direction).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_pairs_resolve_and_email_sender_does_not() {
        let factory = ExecutorFactory::new();
        for (t, d) in [
            (AdapterType::File, AdapterDirection::Sender),
            (AdapterType::File, AdapterDirection::Receiver),
            (AdapterType::Sftp, AdapterDirection::Sender),
            (AdapterType::Sftp, AdapterDirection::Receiver),
            (AdapterType::Email, AdapterDirection::Receiver),
        ] {
            assert!(factory.is_supported(t, d), "{t:?} {d:?}");
        }
        assert!(!factory.is_supported(AdapterType::Email, AdapterDirection::Sender));
        assert!(factory
            .create(AdapterType::Email, AdapterDirection::Sender)
            .is_none());
    }

    #[test]
    fn executors_are_cached_and_shared() {
        let factory = ExecutorFactory::new();
        let first = factory
            .create(AdapterType::File, AdapterDirection::Sender)
            .unwrap();
        let second = factory
            .create(AdapterType::File, AdapterDirection::Sender)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn created_executor_matches_the_requested_pair() {
        let factory = ExecutorFactory::new();
        let executor = factory
            .create(AdapterType::Sftp, AdapterDirection::Receiver)
            .unwrap();
        assert_eq!(executor.protocol(), AdapterType::Sftp);
        assert_eq!(executor.direction(), AdapterDirection::Receiver);
    }
}
