use anyhow::{anyhow, Result};
use sla_notify::{NotificationKind, TemplateData, TemplateRenderer, TemplateStore};
use std::path::Path;

use crate::context::load_config;

pub fn run(config_path: Option<&Path>, kind: &str, name: &str, set: &[String]) -> Result<()> {
    let kind: NotificationKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let data = parse_pairs(set)?;
    let cfg = load_config(config_path)?;
    let renderer = TemplateRenderer::new(TemplateStore::from_config(cfg.template_dir));

    let rt = tokio::runtime::Runtime::new()?;
    let body = rt.block_on(renderer.render(kind, name, &data))?;
    println!("{body}");
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> Result<TemplateData> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| anyhow!("invalid --set '{pair}', expected KEY=VALUE"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        let data = parse_pairs(&["ticketUrl=http://x/?a=b".into(), "ticketId=T1".into()]).unwrap();
        assert_eq!(data["ticketUrl"], "http://x/?a=b");
        assert_eq!(data["ticketId"], "T1");
    }

    #[test]
    fn pair_without_key_is_rejected() {
        assert!(parse_pairs(&["=x".into()]).is_err());
        assert!(parse_pairs(&["nothing".into()]).is_err());
    }
}
