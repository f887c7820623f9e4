//! Notification templates.
//!
//! Templates are read-only resources addressed by `(kind, name)`, resolved to
//! `<kind>/<name>.<ext>`. An optional directory is consulted first so
//! operators can override wording; templates compiled into the binary are
//! the fallback.
//!
//! Substitution replaces every `{{ identifier }}` with the matching data
//! value, or the empty string when the key is absent. Substituted values are
//! not re-scanned and nothing is escaped.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rust_embed::Embed;

use crate::error::NotifyError;
use crate::payload::{NotificationKind, TemplateData};
use crate::Result;

#[derive(Embed)]
#[folder = "templates/"]
struct BuiltinTemplates;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap())
}

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap())
}

/// Replace `{{ key }}` placeholders in `template` with values from `data`.
pub fn substitute(template: &str, data: &TemplateData) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures| {
            data.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
    builtin: bool,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateStore {
    /// Only the templates compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            dir: None,
            builtin: true,
        }
    }

    /// `dir` first, then the built-in templates.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            builtin: true,
        }
    }

    /// Only `dir`; no built-in fallback.
    pub fn dir_only(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            builtin: false,
        }
    }

    pub fn from_config(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(d) => Self::with_dir(d),
            None => Self::builtin(),
        }
    }

    /// Load the raw text of template `kind/name`.
    pub async fn load(&self, kind: NotificationKind, name: &str) -> Result<String> {
        let not_found = || NotifyError::TemplateNotFound {
            kind,
            name: name.to_string(),
        };
        // Names are single path segments; anything else can't address a template.
        if !name_re().is_match(name) {
            return Err(not_found());
        }
        let rel = kind.resource_path(name);

        if let Some(dir) = &self.dir {
            let path = dir.join(&rel);
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(NotifyError::TemplateRead { path, source: e }),
            }
        }

        if !self.builtin {
            return Err(not_found());
        }
        let file = <BuiltinTemplates as Embed>::get(&rel).ok_or_else(not_found)?;
        String::from_utf8(file.data.into_owned()).map_err(|_| NotifyError::TemplateEncoding(rel))
    }

    /// Names of the built-in templates, as `kind/name.ext` paths.
    pub fn builtin_names() -> Vec<String> {
        let mut names: Vec<String> = <BuiltinTemplates as Embed>::iter()
            .map(|p| p.into_owned())
            .collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// TemplateRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    store: TemplateStore,
}

impl TemplateRenderer {
    pub fn new(store: TemplateStore) -> Self {
        Self { store }
    }

    pub async fn render(
        &self,
        kind: NotificationKind,
        name: &str,
        data: &TemplateData,
    ) -> Result<String> {
        let template = self.store.load(kind, name).await?;
        Ok(substitute(&template, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn data(pairs: &[(&str, &str)]) -> TemplateData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_template(dir: &TempDir, rel: &str, body: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn missing_key_becomes_empty_string() {
        let out = substitute("Ticket {{ticketId}} / {{missing}}", &data(&[("ticketId", "T1")]));
        assert_eq!(out, "Ticket T1 / ");
    }

    #[test]
    fn inner_whitespace_is_allowed() {
        let out = substitute("{{  slaName }}|{{slaName}}", &data(&[("slaName", "Response")]));
        assert_eq!(out, "Response|Response");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let out = substitute("{{a}}", &data(&[("a", "{{b}}"), ("b", "nope")]));
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn values_are_not_escaped() {
        let out = substitute("<p>{{v}}</p>", &data(&[("v", "<b>&\"</b>")]));
        assert_eq!(out, "<p><b>&\"</b></p>");
    }

    #[test]
    fn non_word_placeholders_are_left_alone() {
        let out = substitute("{{ ticket-id }} {{}}", &data(&[("ticket-id", "x")]));
        assert_eq!(out, "{{ ticket-id }} {{}}");
    }

    #[tokio::test]
    async fn render_from_dir_is_stable_across_calls() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "email/x.html", "Ticket {{ticketId}} / {{missing}}");
        let renderer = TemplateRenderer::new(TemplateStore::dir_only(dir.path()));
        let d = data(&[("ticketId", "T1")]);

        let first = renderer.render(NotificationKind::Email, "x", &d).await.unwrap();
        let second = renderer.render(NotificationKind::Email, "x", &d).await.unwrap();
        assert_eq!(first, "Ticket T1 / ");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn kind_selects_the_template_family() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "email/x.html", "mail");
        let store = TemplateStore::dir_only(dir.path());
        assert!(store.load(NotificationKind::Email, "x").await.is_ok());
        let err = store.load(NotificationKind::Teams, "x").await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::TemplateNotFound {
                kind: NotificationKind::Teams,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn dir_overrides_builtin() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "email/sla_breach.html", "custom {{ticketId}}");
        let store = TemplateStore::with_dir(dir.path());
        assert_eq!(
            store.load(NotificationKind::Email, "sla_breach").await.unwrap(),
            "custom {{ticketId}}"
        );
    }

    #[tokio::test]
    async fn builtin_fallback_serves_breach_templates() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::with_dir(dir.path());
        let email = store.load(NotificationKind::Email, "sla_breach").await.unwrap();
        assert!(email.contains("{{ ticketId }}"));
        let teams = store.load(NotificationKind::Teams, "sla_breach").await.unwrap();
        assert!(teams.contains("MessageCard"));
    }

    #[tokio::test]
    async fn rendered_teams_card_is_valid_json() {
        let renderer = TemplateRenderer::default();
        let d = data(&[
            ("ticketId", "T42"),
            ("slaName", "Response Time"),
            ("breachTime", "2026-01-01T00:00:00+00:00"),
            ("overdueBy", "5"),
            ("ticketUrl", "http://localhost:3000/tickets/T42"),
        ]);
        let body = renderer
            .render(NotificationKind::Teams, "sla_breach", &d)
            .await
            .unwrap();
        let card: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(card["sections"][0]["facts"][0]["value"], "T42");
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let err = TemplateStore::builtin()
            .load(NotificationKind::Email, "does_not_exist")
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::TemplateNotFound { .. }));
    }

    #[tokio::test]
    async fn path_like_names_are_not_found() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "secret.html", "nope");
        let store = TemplateStore::dir_only(dir.path().join("email"));
        let err = store
            .load(NotificationKind::Email, "../secret")
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::TemplateNotFound { .. }));
    }

    #[test]
    fn builtin_names_lists_both_kinds() {
        let names = TemplateStore::builtin_names();
        assert!(names.contains(&"email/sla_breach.html".to_string()));
        assert!(names.contains(&"teams/sla_breach.json".to_string()));
    }
}
