use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat placeholder data handed to the template renderer.
pub type TemplateData = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// NotificationKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Email,
    Teams,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Email => "email",
            NotificationKind::Teams => "teams",
        }
    }

    /// File extension of templates for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            NotificationKind::Email => "html",
            NotificationKind::Teams => "json",
        }
    }

    /// Resource path of template `name`, relative to a template root.
    pub fn resource_path(self, name: &str) -> String {
        format!("{}/{name}.{}", self.as_str(), self.extension())
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationKind::Email),
            "teams" => Ok(NotificationKind::Teams),
            _ => Err(format!("unknown notification kind '{s}' (expected email or teams)")),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationPayload / Destination / RenderedNotification
// ---------------------------------------------------------------------------

/// What to render: not persisted, built per notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub template_name: String,
    pub data: TemplateData,
}

impl NotificationPayload {
    pub fn new(kind: NotificationKind, template_name: impl Into<String>, data: TemplateData) -> Self {
        Self {
            kind,
            template_name: template_name.into(),
            data,
        }
    }
}

/// Where a rendered payload goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Email { to: String, subject: String },
    Teams { webhook_url: String },
}

impl Destination {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Destination::Email { .. } => NotificationKind::Email,
            Destination::Teams { .. } => NotificationKind::Teams,
        }
    }
}

/// A rendered body plus its destination, handed to a `Delivery`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNotification {
    pub destination: Destination,
    pub body: String,
}

impl RenderedNotification {
    pub fn kind(&self) -> NotificationKind {
        self.destination.kind()
    }
}
