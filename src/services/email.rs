//! Email delivery of notifications over SMTP

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use serde_json::Value;
use std::str::FromStr;

use super::notifier::{Notifier, TemplateKind};
use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn render(template: TemplateKind, payload: &Value) -> (String, String) {
        let field = |name: &str| match payload.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        match template {
            TemplateKind::OtpCode => (
                "Your Labtrack verification code".to_string(),
                format!(
                    "Your verification code is: {}\n\nIt expires at {}.\n\nIf you didn't request this code, please ignore this email.\n",
                    field("code"),
                    field("expires_at")
                ),
            ),
            TemplateKind::BorrowRequestReceived => (
                "Borrow request received".to_string(),
                format!(
                    "Your request #{} for {} unit(s) of {} has been received and is awaiting review.\n",
                    field("borrowing_id"),
                    field("quantity"),
                    field("item_name")
                ),
            ),
            TemplateKind::BorrowRequestDecided => (
                "Borrow request decision".to_string(),
                format!(
                    "Your request #{} is now {}.\n{}\n",
                    field("borrowing_id"),
                    field("status"),
                    field("reason")
                ),
            ),
            TemplateKind::BorrowingReleased => (
                "Equipment released".to_string(),
                format!(
                    "{} unit(s) of {} were released to you. Please return them by {}.\n",
                    field("quantity"),
                    field("item_name"),
                    field("intended_return_date")
                ),
            ),
            TemplateKind::ReturnSubmitted => (
                "Return submitted".to_string(),
                format!(
                    "Your return for borrowing #{} was submitted. Total fee: {}.\n",
                    field("borrowing_id"),
                    field("total_fee")
                ),
            ),
            TemplateKind::ReturnDecided => (
                "Return decision".to_string(),
                format!(
                    "Your return #{} is now {}. Total fee: {}.\n",
                    field("returning_id"),
                    field("status"),
                    field("total_fee")
                ),
            ),
        }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Labtrack");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Notifier(format!("Invalid from address: {}", e)))?;
        let to_mailbox =
            Mailbox::from_str(to).map_err(|e| AppError::Notifier(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Notifier(format!("Failed to build email: {}", e)))
    }

    fn transport(config: &EmailConfig) -> AppResult<SmtpTransport> {
        let builder = if config.smtp_use_tls {
            SmtpTransport::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::Notifier(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
        }
        .port(config.smtp_port);

        let builder = match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &str, template: TemplateKind, payload: &Value) -> AppResult<()> {
        let (subject, body) = Self::render(template, payload);
        let email = self.build_message(recipient, &subject, &body)?;
        let config = self.config.clone();

        // SmtpTransport blocks on network I/O
        tokio::task::spawn_blocking(move || {
            let mailer = Self::transport(&config)?;
            mailer
                .send(&email)
                .map(|_| ())
                .map_err(|e| AppError::Notifier(format!("Failed to send email: {}", e)))
        })
        .await
        .map_err(|e| AppError::Notifier(format!("Email task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_otp_template_carries_code() {
        let (subject, body) =
            EmailNotifier::render(TemplateKind::OtpCode, &json!({"code": "042917", "expires_at": "12:05"}));
        assert!(subject.contains("verification code"));
        assert!(body.contains("042917"));
        assert!(body.contains("12:05"));
    }

    #[test]
    fn test_invalid_recipient_is_a_notifier_error() {
        let notifier = EmailNotifier::new(EmailConfig::default());
        let err = notifier.build_message("not an address", "s", "b").unwrap_err();
        assert!(matches!(err, AppError::Notifier(_)));
    }
}
