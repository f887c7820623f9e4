use anyhow::{bail, Result};
use std::path::Path;

use crate::context::load_config;
use crate::output::print_json;
use crate::runtime::build_poller;

pub fn run(db: &Path, config_path: Option<&Path>, dry_run: bool, json: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async {
        let poller = build_poller(db, &cfg, dry_run)?;
        Ok::<_, anyhow::Error>(poller.tick().await)
    })?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "checked {}  breached {}  notified {}  notify failures {}  lost races {}",
            report.checked,
            report.breached,
            report.notified,
            report.notify_failures,
            report.lost_races
        );
        for e in &report.errors {
            println!("[error] {e}");
        }
    }

    if let Some(e) = &report.listing_error {
        bail!("could not list running trackers: {e}");
    }
    Ok(())
}
