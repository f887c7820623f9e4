use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::delivery::Delivery;
use crate::error::{DeliveryError, NotifyError};
use crate::payload::{
    Destination, NotificationKind, NotificationPayload, RenderedNotification, TemplateData,
};
use crate::template::TemplateRenderer;
use crate::Result;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry for delivery failures. The default performs one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub retries: u32,
    /// Delay before the first retry; doubles each time.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    fn delay_before(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

pub struct NotificationDispatcher {
    renderer: TemplateRenderer,
    delivery: Arc<dyn Delivery>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(renderer: TemplateRenderer, delivery: Arc<dyn Delivery>) -> Self {
        Self {
            renderer,
            delivery,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        template_name: &str,
        data: &TemplateData,
    ) -> Result<()> {
        let payload =
            NotificationPayload::new(NotificationKind::Email, template_name, data.clone());
        let destination = Destination::Email {
            to: to.to_string(),
            subject: subject.to_string(),
        };
        self.send(&payload, destination).await
    }

    pub async fn send_teams_webhook(
        &self,
        webhook_url: &str,
        template_name: &str,
        data: &TemplateData,
    ) -> Result<()> {
        let payload =
            NotificationPayload::new(NotificationKind::Teams, template_name, data.clone());
        let destination = Destination::Teams {
            webhook_url: webhook_url.to_string(),
        };
        self.send(&payload, destination).await
    }

    /// Render `payload` and hand it to the delivery channel.
    ///
    /// Rendering failures are returned without touching the channel.
    pub async fn send(&self, payload: &NotificationPayload, destination: Destination) -> Result<()> {
        if payload.kind != destination.kind() {
            return Err(NotifyError::KindMismatch {
                payload: payload.kind,
                destination: destination.kind(),
            });
        }
        let body = self
            .renderer
            .render(payload.kind, &payload.template_name, &payload.data)
            .await?;
        let message = RenderedNotification { destination, body };
        self.deliver_with_retry(&message).await?;
        debug!(
            channel = self.delivery.name(),
            kind = %payload.kind,
            template = %payload.template_name,
            "notification delivered"
        );
        Ok(())
    }

    async fn deliver_with_retry(
        &self,
        message: &RenderedNotification,
    ) -> std::result::Result<(), DeliveryError> {
        let mut retry = 0;
        loop {
            match self.delivery.deliver(message).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && retry < self.retry.retries => {
                    retry += 1;
                    let delay = self.retry.delay_before(retry);
                    warn!(
                        channel = self.delivery.name(),
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records deliveries; fails the first `fail_first` attempts.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<RenderedNotification>>,
        attempts: Mutex<u32>,
        fail_first: u32,
        not_configured: bool,
    }

    #[async_trait]
    impl Delivery for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn deliver(
            &self,
            message: &RenderedNotification,
        ) -> std::result::Result<(), DeliveryError> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if self.not_configured {
                return Err(DeliveryError::NotConfigured("email relay URL is not set".into()));
            }
            if *attempts <= self.fail_first {
                return Err(DeliveryError::Other("transport down".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn store_with(dir: &TempDir, rel: &str, body: &str) -> TemplateStore {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
        TemplateStore::dir_only(dir.path())
    }

    fn data() -> TemplateData {
        [("ticketId".to_string(), "T7".to_string())].into_iter().collect()
    }

    #[tokio::test]
    async fn send_email_renders_and_delivers() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(store_with(&dir, "email/alert.html", "ticket {{ ticketId }}")),
            recorder.clone(),
        );

        dispatcher
            .send_email("ops@example.com", "subject", "alert", &data())
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "ticket T7");
        assert_eq!(
            sent[0].destination,
            Destination::Email {
                to: "ops@example.com".into(),
                subject: "subject".into()
            }
        );
    }

    #[tokio::test]
    async fn send_teams_uses_teams_template() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(store_with(&dir, "teams/alert.json", r#"{"t":"{{ticketId}}"}"#)),
            recorder.clone(),
        );

        dispatcher
            .send_teams_webhook("https://hook", "alert", &data())
            .await
            .unwrap();
        assert_eq!(recorder.sent.lock().unwrap()[0].body, r#"{"t":"T7"}"#);
    }

    #[tokio::test]
    async fn missing_template_never_reaches_delivery() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(TemplateStore::dir_only(dir.path())),
            recorder.clone(),
        )
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));

        let err = dispatcher
            .send_email("ops@example.com", "s", "alert", &data())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::TemplateNotFound { .. }));
        assert_eq!(*recorder.attempts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_without_retry_by_default() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder {
            fail_first: 1,
            ..Recorder::default()
        });
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(store_with(&dir, "email/alert.html", "x")),
            recorder.clone(),
        );

        let err = dispatcher
            .send_email("ops@example.com", "s", "alert", &data())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
        assert_eq!(*recorder.attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_retry_recovers_from_transient_failure() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder {
            fail_first: 2,
            ..Recorder::default()
        });
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(store_with(&dir, "email/alert.html", "x")),
            recorder.clone(),
        )
        .with_retry(RetryPolicy::new(2, Duration::from_secs(1)));

        dispatcher
            .send_email("ops@example.com", "s", "alert", &data())
            .await
            .unwrap();
        assert_eq!(*recorder.attempts.lock().unwrap(), 3);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_channel_config_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder {
            not_configured: true,
            ..Recorder::default()
        });
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::new(store_with(&dir, "email/alert.html", "x")),
            recorder.clone(),
        )
        .with_retry(RetryPolicy::new(3, Duration::from_secs(1)));

        let err = dispatcher
            .send_email("ops@example.com", "s", "alert", &data())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Delivery(DeliveryError::NotConfigured(_))
        ));
        assert_eq!(*recorder.attempts.lock().unwrap(), 1);
    }

    #[test]
    fn only_missing_config_is_permanent() {
        assert!(!DeliveryError::NotConfigured("relay".into()).is_retryable());
        assert!(DeliveryError::Other("timeout".into()).is_retryable());
        assert!(DeliveryError::Rejected {
            status: 503,
            body: String::new()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let dispatcher = NotificationDispatcher::new(
            TemplateRenderer::default(),
            Arc::new(Recorder::default()),
        );
        let payload = NotificationPayload::new(NotificationKind::Teams, "sla_breach", data());
        let err = dispatcher
            .send(
                &payload,
                Destination::Email {
                    to: "a@b".into(),
                    subject: "s".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::KindMismatch { .. }));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
    }
}
