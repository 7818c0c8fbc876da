// # SMTP Notifier
//
// This crate provides the email `Notifier` for digger.
//
// ## Message
//
// Each change produces one multipart/alternative message: a plain-text part
// and an HTML part rendered from the built-in template or from
// `notifier.template_path`.
//
// ## Transport
//
// - `starttls: true`: STARTTLS relay (required upgrade)
// - `starttls: false`: unencrypted relay, for local MTAs only
//
// Credentials are optional. Sending is a blocking lettre call and runs on
// the blocking pool. No retries: a failed delivery is reported to core,
// which logs it and moves on.

pub mod template;

use async_trait::async_trait;
use digger_core::config::SmtpConfig;
use digger_core::model::ChangeEvent;
use digger_core::traits::Notifier;
use digger_core::{Error, Result};

use lettre::message::{Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use std::time::Duration;

use template::{DEFAULT_HTML_TEMPLATE, TemplateValues, render_html, render_text};

/// Email notifier
pub struct SmtpNotifier {
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
    recipient_name: String,
    html_template: String,
    transport: SmtpTransport,
    relay: String,
}

impl SmtpNotifier {
    /// Create a notifier from SMTP settings
    ///
    /// Addresses are parsed and the template file is read here, so a bad
    /// configuration fails at startup rather than on the first change.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        config.validate()?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("Invalid sender '{}': {}", config.from, e)))?;

        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| Error::config(format!("Invalid recipient '{}': {}", addr, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let html_template = match &config.template_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::config(format!("Failed to read email template {}: {}", path, e))
            })?,
            None => DEFAULT_HTML_TEMPLATE.to_string(),
        };

        Ok(Self {
            from,
            to,
            subject: config.subject.clone(),
            recipient_name: config.recipient_name.clone(),
            html_template,
            transport: build_transport(config)?,
            relay: format!("{}:{}", config.host, config.port),
        })
    }

    /// Build the message for one change event
    pub fn build_message(&self, event: &ChangeEvent) -> Result<Message> {
        let values = TemplateValues::new(event, &self.recipient_name);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("{}: {}", self.subject, event.hostname));
        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(render_text(&values)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(render_html(&self.html_template, &values)),
                    ),
            )
            .map_err(|e| Error::notification(format!("Failed to build message: {}", e)))
    }
}

fn build_transport(config: &SmtpConfig) -> Result<SmtpTransport> {
    let builder = if config.starttls {
        SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| Error::config(format!("Invalid SMTP relay '{}': {}", config.host, e)))?
    } else {
        SmtpTransport::builder_dangerous(&config.host)
    };

    let builder = builder
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout_secs)));

    let builder = match (&config.username, &config.password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        _ => builder,
    };

    Ok(builder.build())
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("relay", &self.relay)
            .field("from", &self.from.to_string())
            .field("to", &self.to.iter().map(|m| m.to_string()).collect::<Vec<_>>())
            .field("subject", &self.subject)
            .finish()
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let message = self.build_message(event)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| Error::notification(format!("Mail task failed: {}", e)))?
            .map_err(|e| {
                Error::notification(format!("Failed to send email via {}: {}", self.relay, e))
            })?;

        tracing::info!(
            hostname = %event.hostname,
            recipients = self.to.len(),
            "Change notification sent"
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("digger".to_string()),
            password: Some("s3cret-pass".to_string()),
            from: "Digger <digger@example.com>".to_string(),
            to: vec!["noc@example.com".to_string(), "sec@example.com".to_string()],
            starttls: true,
            template_path: None,
            subject: "IP Address Change Notification".to_string(),
            recipient_name: "Network Security Team".to_string(),
            timeout_secs: 10,
        }
    }

    fn event() -> ChangeEvent {
        ChangeEvent {
            hostname: "sftp.vendor.example".to_string(),
            port: 22,
            entity_name: "Vendor".to_string(),
            old_ips: vec!["10.0.0.1".to_string()],
            new_ips: vec!["10.0.0.2".to_string()],
            new_ip: "10.0.0.2".to_string(),
            detected_at: Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_message_has_both_parts() {
        let notifier = SmtpNotifier::new(&config()).unwrap();
        let message = notifier.build_message(&event()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: IP Address Change Notification: sftp.vendor.example"));
        assert!(raw.contains("noc@example.com"));
        assert!(raw.contains("sec@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
        assert_eq!(notifier.notifier_name(), "smtp");
    }

    #[test]
    fn test_custom_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email.html");
        std::fs::write(&path, "<p>{{hostname}} moved to {{new_ip}}</p>").unwrap();

        let mut cfg = config();
        cfg.template_path = Some(path.display().to_string());
        let notifier = SmtpNotifier::new(&cfg).unwrap();
        let raw = String::from_utf8(notifier.build_message(&event()).unwrap().formatted()).unwrap();

        assert!(raw.contains("<p>sftp.vendor.example moved to 10.0.0.2</p>"));
    }

    #[test]
    fn test_missing_template_is_config_error() {
        let mut cfg = config();
        cfg.template_path = Some("/nonexistent/digger/email.html".to_string());
        assert!(matches!(SmtpNotifier::new(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let mut cfg = config();
        cfg.to = vec!["not an address".to_string()];
        assert!(matches!(SmtpNotifier::new(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let notifier = SmtpNotifier::new(&config()).unwrap();
        let debug = format!("{:?}", notifier);
        assert!(debug.contains("smtp.example.com:587"));
        assert!(!debug.contains("s3cret-pass"));
    }
}
