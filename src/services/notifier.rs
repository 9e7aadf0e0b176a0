//! Outbound notifications
//!
//! Notifications are sent only after the triggering transaction has
//! committed. A failure or timeout is logged and reported back as a
//! warning string; it never undoes the committed change.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    OtpCode,
    BorrowRequestReceived,
    BorrowRequestDecided,
    BorrowingReleased,
    ReturnSubmitted,
    ReturnDecided,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::OtpCode => "otp_code",
            TemplateKind::BorrowRequestReceived => "borrow_request_received",
            TemplateKind::BorrowRequestDecided => "borrow_request_decided",
            TemplateKind::BorrowingReleased => "borrowing_released",
            TemplateKind::ReturnSubmitted => "return_submitted",
            TemplateKind::ReturnDecided => "return_decided",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, template: TemplateKind, payload: &Value) -> AppResult<()>;
}

/// Payload fields never written to logs
const SECRET_FIELDS: &[&str] = &["code"];

fn redacted(payload: &Value) -> Value {
    let mut shown = payload.clone();
    if let Value::Object(ref mut fields) = shown {
        for name in SECRET_FIELDS {
            if let Some(value) = fields.get_mut(*name) {
                *value = Value::String("***".to_string());
            }
        }
    }
    shown
}

/// Notifier used when email delivery is disabled
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, template: TemplateKind, payload: &Value) -> AppResult<()> {
        tracing::info!(
            recipient,
            template = %template,
            payload = %redacted(payload),
            "Notification (not delivered)"
        );
        Ok(())
    }
}

/// Sends notifications with a deadline and turns failures into warnings
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Deliver one notification; `Some(warning)` when it did not go out
    pub async fn dispatch(&self, recipient: &str, template: TemplateKind, payload: Value) -> Option<String> {
        let outcome = tokio::time::timeout(self.timeout, self.notifier.send(recipient, template, &payload)).await;
        let error = match outcome {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => e,
            Err(_) => AppError::Notifier(format!("timed out after {:?}", self.timeout)),
        };
        tracing::warn!(recipient, template = %template, error = %error, "Notification failed");
        Some(format!("{} notification to {} was not sent: {}", template, recipient, error))
    }

    /// Like `dispatch`, collecting the warning into `warnings`
    pub async fn dispatch_into(
        &self,
        warnings: &mut Vec<String>,
        recipient: &str,
        template: TemplateKind,
        payload: Value,
    ) {
        if let Some(warning) = self.dispatch(recipient, template, payload).await {
            warnings.push(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_delivered_notification_has_no_warning() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|recipient, template, _| recipient == "ada@lab.test" && *template == TemplateKind::OtpCode)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(notifier), Duration::from_secs(1));
        let warning = dispatcher
            .dispatch("ada@lab.test", TemplateKind::OtpCode, json!({"code": "123456"}))
            .await;
        assert!(warning.is_none());
    }

    #[test]
    fn test_logged_payload_hides_the_code() {
        let payload = json!({"code": "123456", "purpose": "guest_request"});
        let shown = redacted(&payload);
        assert_eq!(shown["code"], "***");
        assert_eq!(shown["purpose"], "guest_request");
        assert!(!shown.to_string().contains("123456"));
        assert_eq!(payload["code"], "123456");
    }

    #[tokio::test]
    async fn test_failure_becomes_warning() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_, _, _| Err(AppError::Notifier("smtp down".to_string())));

        let dispatcher = Dispatcher::new(Arc::new(notifier), Duration::from_secs(1));
        let mut warnings = Vec::new();
        dispatcher
            .dispatch_into(&mut warnings, "ada@lab.test", TemplateKind::ReturnDecided, json!({}))
            .await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("smtp down"));
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn send(&self, _: &str, _: TemplateKind, _: &Value) -> AppResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_notifier_times_out() {
        let dispatcher = Dispatcher::new(Arc::new(Stalled), Duration::from_millis(20));
        let warning = dispatcher
            .dispatch("ada@lab.test", TemplateKind::BorrowingReleased, json!({}))
            .await
            .unwrap();
        assert!(warning.contains("timed out"));
    }
}
