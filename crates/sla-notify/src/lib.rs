//! `sla-notify`: breach notification rendering and dispatch.
//!
//! # Architecture
//!
//! ```text
//! NotificationDispatcher   send_email / send_teams_webhook
//!     │
//!     ├── TemplateRenderer   TemplateStore (dir override → embedded) + {{ placeholder }} substitution
//!     │
//!     └── dyn Delivery       LogDelivery | HttpDelivery (webhook / email relay)
//! ```
//!
//! The dispatcher's contract ends when a rendered payload has been handed to
//! a `Delivery`. Failures come back to the caller as `NotifyError`; nothing
//! here retries unless a `RetryPolicy` asks for it.

pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod payload;
pub mod template;

pub use delivery::{Delivery, HttpDelivery, LogDelivery};
pub use dispatch::{NotificationDispatcher, RetryPolicy};
pub use error::{DeliveryError, NotifyError};
pub use payload::{Destination, NotificationKind, NotificationPayload, RenderedNotification, TemplateData};
pub use template::{substitute, TemplateRenderer, TemplateStore};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, NotifyError>;
