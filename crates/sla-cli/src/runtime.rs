use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sla_core::config::PollerConfig;
use sla_core::TrackerDb;
use sla_notify::{
    Delivery, HttpDelivery, LogDelivery, NotificationDispatcher, RetryPolicy, TemplateRenderer,
    TemplateStore,
};
use sla_server::{PollerSettings, SlaPoller};
use tracing::{info, warn};

/// Wire the store, renderer, delivery channel and poller from config.
pub fn build_poller(db_path: &Path, cfg: &PollerConfig, dry_run: bool) -> anyhow::Result<Arc<SlaPoller>> {
    cfg.ensure_valid()?;

    let db = TrackerDb::open(db_path)
        .with_context(|| format!("failed to open tracker database {}", db_path.display()))?;

    let delivery: Arc<dyn Delivery> = if dry_run {
        info!("dry run: notifications will be logged, not sent");
        Arc::new(LogDelivery)
    } else {
        if cfg.email_relay_url.is_none() {
            warn!("email_relay_url is not set; breach emails will fail to send");
        }
        Arc::new(HttpDelivery::new(cfg.email_relay_url.clone())?)
    };

    let renderer = TemplateRenderer::new(TemplateStore::from_config(cfg.template_dir.clone()));
    let dispatcher = NotificationDispatcher::new(renderer, delivery)
        .with_retry(RetryPolicy::new(cfg.notify_retries, cfg.retry_backoff()));

    Ok(Arc::new(SlaPoller::new(
        Arc::new(db),
        Arc::new(dispatcher),
        PollerSettings::from_config(cfg),
    )))
}
