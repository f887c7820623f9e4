use std::sync::Arc;

use crate::poller::SlaPoller;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<SlaPoller>,
}

impl AppState {
    pub fn new(poller: Arc<SlaPoller>) -> Self {
        Self { poller }
    }
}
