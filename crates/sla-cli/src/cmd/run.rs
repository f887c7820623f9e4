use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::info;

use crate::context::load_config;
use crate::runtime::build_poller;

pub fn run(
    db: &Path,
    config_path: Option<&Path>,
    port: u16,
    no_server: bool,
    dry_run: bool,
) -> Result<()> {
    let cfg = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let poller = build_poller(db, &cfg, dry_run)?;

        // Bind before starting so a taken port fails fast with nothing to undo.
        let listener = if no_server {
            None
        } else {
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
                .await
                .with_context(|| format!("failed to bind status API on port {port}"))?;
            Some(listener)
        };

        let handle = poller.start()?;
        println!(
            "SLA poller running every {}ms (Ctrl-C to stop)",
            cfg.poll_interval_ms
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let mut server = listener.map(|listener| {
            tokio::spawn(sla_server::serve_on(poller.clone(), listener, async move {
                let _ = stop_rx.await;
            }))
        });

        let result = match server.as_mut() {
            Some(server) => tokio::select! {
                _ = tokio::signal::ctrl_c() => Ok(()),
                res = server => match res {
                    Ok(inner) => inner,
                    Err(e) => Err(anyhow!("status API task failed: {e}")),
                },
            },
            None => tokio::signal::ctrl_c().await.map_err(Into::into),
        };

        info!("shutting down");
        let _ = stop_tx.send(());
        handle.stop().await;
        if let Some(server) = server {
            if !server.is_finished() {
                let _ = server.await;
            }
        }
        result
    })
}
