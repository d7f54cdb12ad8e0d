//! Application state management
//!
//! Shared state for the HTTP handlers. The listener owns its own pipeline and does not
//! go through here.

use crate::actions::ActionRegistry;
use crate::notify::DetailOpener;
use std::sync::Arc;

pub struct AppState {
    /// "View full" handlers keyed by action id
    pub actions: ActionRegistry,

    /// Where detail views are opened
    pub detail: Arc<dyn DetailOpener>,

    /// Slack signing secret; requests are unauthenticated when absent
    pub signing_secret: Option<String>,
}

impl AppState {
    pub fn new(
        actions: ActionRegistry,
        detail: Arc<dyn DetailOpener>,
        signing_secret: Option<String>,
    ) -> Self {
        Self {
            actions,
            detail,
            signing_secret,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
