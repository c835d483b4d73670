//! Outbound SMTP email executor and the mail transport seam.
//!
//! Direction naming follows the flow model: the email RECEIVER adapter
//! pushes data out of the flow, delivering queued files as attachments.
//! Collecting mail from an inbox is not supported anywhere in this
//! system, which is why no email sender executor exists.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde_json::{json, Value};

use conveyor_flow_engine::{
    Adapter, AdapterDirection, AdapterType, ExecutionContext, FlowExecutionStep, ResultMap,
    KEY_FILES_TO_PROCESS,
};

use crate::errors::ExecError;
use crate::executor::{entry_bytes, entry_file_name, AdapterExecutor};

// ---------------------------------------------------------------------------
// Recipients and templates
// ---------------------------------------------------------------------------

/// Normalize a recipients config value. A comma-separated string and a
/// list of strings produce the same result: trimmed, empty entries
/// dropped, order preserved.
pub fn normalize_recipients(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Substitute `{placeholder}` occurrences. Unknown placeholders are left
/// in place.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// SMTP connection settings from an adapter's config.
#[derive(Debug, Clone)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One outbound message, transport-agnostic.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// `(file name, bytes)` pairs attached to the message.
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Delivers an [`OutboundEmail`]. The production backend is
/// [`LettreSmtp`]; tests substitute a recording double.
pub trait MailTransport: Send + Sync {
    fn send(&self, endpoint: &SmtpEndpoint, message: &OutboundEmail) -> Result<(), ExecError>;
}

/// Production transport backed by `lettre`'s blocking SMTP client.
#[derive(Debug, Default, Clone, Copy)]
pub struct LettreSmtp;

fn parse_mailbox(address: &str) -> Result<Mailbox, ExecError> {
    address.parse::<Mailbox>().map_err(|e| ExecError::Config {
        message: format!("invalid email address '{address}': {e}"),
    })
}

impl MailTransport for LettreSmtp {
    fn send(&self, endpoint: &SmtpEndpoint, message: &OutboundEmail) -> Result<(), ExecError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&message.from)?)
            .subject(message.subject.clone());
        for recipient in &message.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        let octet_stream =
            ContentType::parse("application/octet-stream").map_err(|e| ExecError::Mail {
                message: e.to_string(),
            })?;
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
        for (name, bytes) in &message.attachments {
            parts = parts.singlepart(
                Attachment::new(name.clone()).body(bytes.clone(), octet_stream.clone()),
            );
        }
        let email = builder.multipart(parts).map_err(|e| ExecError::Mail {
            message: e.to_string(),
        })?;

        let mut smtp = SmtpTransport::builder_dangerous(&endpoint.host).port(endpoint.port);
        if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
            smtp = smtp.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        tracing::debug!(host = %endpoint.host, recipients = message.recipients.len(), "smtp send");
        smtp.build()
            .send(&email)
            .map(|_| ())
            .map_err(|e| ExecError::Mail {
                message: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

const DEFAULT_SUBJECT: &str = "Flow delivery: {fileCount} file(s) from {stepName}";
const DEFAULT_BODY: &str =
    "Step {stepName} delivered {fileCount} file(s). First file: {fileName}.";

/// Delivers queued context files as email attachments over SMTP.
pub struct EmailReceiverExecutor {
    transport: Arc<dyn MailTransport>,
}

impl EmailReceiverExecutor {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AdapterExecutor for EmailReceiverExecutor {
    fn protocol(&self) -> AdapterType {
        AdapterType::Email
    }

    fn direction(&self) -> AdapterDirection {
        AdapterDirection::Receiver
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["smtpHost", "fromAddress", "recipients"]
    }

    fn validate_config(&self, adapter: &Adapter) -> Result<(), ExecError> {
        for field in self.required_fields() {
            if !adapter.config.contains_key(*field) {
                return Err(ExecError::MissingConfig {
                    field: (*field).to_string(),
                });
            }
        }
        // Both config shapes must yield at least one usable address.
        if normalize_recipients(adapter.config.get("recipients")).is_empty() {
            return Err(ExecError::Config {
                message: "at least one recipient is required".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError> {
        let host = adapter
            .config_str("smtpHost")
            .ok_or_else(|| ExecError::MissingConfig {
                field: "smtpHost".to_string(),
            })?
            .to_string();
        let from = adapter
            .config_str("fromAddress")
            .ok_or_else(|| ExecError::MissingConfig {
                field: "fromAddress".to_string(),
            })?
            .to_string();
        let recipients = normalize_recipients(adapter.config.get("recipients"));
        if recipients.is_empty() {
            return Err(ExecError::Config {
                message: "at least one recipient is required".to_string(),
            });
        }
        let attach_files = adapter.config_bool("attachFiles", true);

        let queued: Vec<Value> = ctx
            .file_list(KEY_FILES_TO_PROCESS)
            .cloned()
            .unwrap_or_default();

        let mut result = ResultMap::new();
        result.insert("smtpHost".into(), json!(host));
        result.insert("recipientCount".into(), json!(recipients.len()));
        if queued.is_empty() {
            result.insert("success".into(), json!(true));
            result.insert("filesProcessed".into(), json!(0));
            result.insert("totalBytes".into(), json!(0));
            result.insert("message".into(), json!("no files queued, nothing to send"));
            return Ok(result);
        }

        let mut attachments = Vec::new();
        let mut total_bytes = 0u64;
        if attach_files {
            for entry in &queued {
                let name = entry_file_name(entry).unwrap_or("attachment.bin").to_string();
                let bytes = entry_bytes(entry).unwrap_or_default();
                total_bytes += bytes.len() as u64;
                step.record_file(&name, "email", bytes.len() as u64);
                attachments.push((name, bytes));
            }
        }

        let first_file = queued
            .first()
            .and_then(entry_file_name)
            .unwrap_or_default()
            .to_string();
        let vars: [(&str, String); 3] = [
            ("fileName", first_file),
            ("fileCount", queued.len().to_string()),
            ("stepName", step.step_name.clone()),
        ];
        let subject = render_template(
            adapter.config_str("subject").unwrap_or(DEFAULT_SUBJECT),
            &vars,
        );
        let body = render_template(adapter.config_str("body").unwrap_or(DEFAULT_BODY), &vars);

        let endpoint = SmtpEndpoint {
            host: host.clone(),
            port: adapter.config_u64("smtpPort", 587) as u16,
            username: adapter.config_str("smtpUsername").map(String::from),
            password: adapter.config_str("smtpPassword").map(String::from),
        };
        let message = OutboundEmail {
            from,
            recipients,
            subject,
            body,
            attachments,
        };
        self.transport.send(&endpoint, &message)?;

        result.insert("success".into(), json!(true));
        result.insert("filesProcessed".into(), json!(message.attachments.len()));
        result.insert("totalBytes".into(), json!(total_bytes));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::file_entry;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(SmtpEndpoint, OutboundEmail)>>,
    }

    impl MailTransport for RecordingTransport {
        fn send(&self, endpoint: &SmtpEndpoint, message: &OutboundEmail) -> Result<(), ExecError> {
            self.sent.lock().push((endpoint.clone(), message.clone()));
            Ok(())
        }
    }

    fn adapter(config: &[(&str, Value)]) -> Adapter {
        let mut full: Vec<(&str, Value)> = vec![
            ("smtpHost", json!("smtp.example.net")),
            ("fromAddress", json!("flows@example.net")),
            ("recipients", json!("ops@example.net")),
        ];
        full.extend_from_slice(config);
        Adapter {
            id: "email-1".into(),
            name: "notify".into(),
            adapter_type: AdapterType::Email,
            direction: AdapterDirection::Receiver,
            active: true,
            config: full
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn step() -> FlowExecutionStep {
        FlowExecutionStep::new("s1", "send report", "adapter")
    }

    #[test]
    fn comma_string_and_list_recipients_normalize_identically() {
        let from_string = normalize_recipients(Some(&json!("a@x.com, b@x.com")));
        let from_list = normalize_recipients(Some(&json!(["a@x.com", "b@x.com"])));
        assert_eq!(from_string, from_list);
        assert_eq!(from_string, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn empty_recipient_entries_are_dropped() {
        assert!(normalize_recipients(Some(&json!(" , ,"))).is_empty());
        assert_eq!(
            normalize_recipients(Some(&json!(["", " c@x.com "]))),
            vec!["c@x.com"]
        );
        assert!(normalize_recipients(None).is_empty());
    }

    #[test]
    fn template_substitutes_known_placeholders_only() {
        let rendered = render_template(
            "{fileCount} files via {stepName} ({unknown})",
            &[("fileCount", "2".into()), ("stepName", "send".into())],
        );
        assert_eq!(rendered, "2 files via send ({unknown})");
    }

    #[tokio::test]
    async fn delivers_queued_files_as_attachments() {
        let transport = Arc::new(RecordingTransport::default());
        let executor = EmailReceiverExecutor::new(transport.clone());
        let mut ctx = ExecutionContext::new();
        ctx.set(
            KEY_FILES_TO_PROCESS,
            json!([
                file_entry("a.csv", "/x/a.csv", b"1,2", String::new()),
                file_entry("b.csv", "/x/b.csv", b"3,4", String::new()),
            ]),
        );
        let mut step = step();

        let result = executor
            .execute(&adapter(&[]), &mut ctx, &mut step)
            .await
            .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["filesProcessed"], json!(2));
        assert_eq!(result["totalBytes"], json!(6));

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        let (endpoint, message) = &sent[0];
        assert_eq!(endpoint.host, "smtp.example.net");
        assert_eq!(message.recipients, vec!["ops@example.net"]);
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].0, "a.csv");
        assert!(message.subject.contains("2 file(s)"));
        assert!(message.body.contains("a.csv"));
    }

    #[tokio::test]
    async fn zero_queued_files_is_success_without_a_send() {
        let transport = Arc::new(RecordingTransport::default());
        let executor = EmailReceiverExecutor::new(transport.clone());
        let mut ctx = ExecutionContext::new();

        let result = executor
            .execute(&adapter(&[]), &mut ctx, &mut step())
            .await
            .unwrap();
        assert_eq!(result["success"], json!(true));
        assert!(result["message"].as_str().unwrap().contains("nothing to send"));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn custom_templates_are_rendered() {
        let transport = Arc::new(RecordingTransport::default());
        let executor = EmailReceiverExecutor::new(transport.clone());
        let mut ctx = ExecutionContext::new();
        ctx.set(
            KEY_FILES_TO_PROCESS,
            json!([file_entry("r.pdf", "/x/r.pdf", b"%PDF", String::new())]),
        );
        let adapter = adapter(&[("subject", json!("Report {fileName} ready"))]);

        executor
            .execute(&adapter, &mut ctx, &mut step())
            .await
            .unwrap();
        assert_eq!(transport.sent.lock()[0].1.subject, "Report r.pdf ready");
    }

    #[test]
    fn validate_config_rejects_unusable_recipient_lists() {
        let adapter = adapter(&[("recipients", json!(" , "))]);
        let transport = Arc::new(RecordingTransport::default());
        let err = EmailReceiverExecutor::new(transport)
            .validate_config(&adapter)
            .unwrap_err();
        assert!(err.to_string().contains("recipient"));
    }
}
