//! Action dispatch for tapped result items.
//!
//! Actions run strictly in declaration order, one at a time. A failing action
//! is logged and recorded, and the remaining actions still run.

use crate::navigation::NavigationStack;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use touchfish_types::{ActionKind, ResultItem};
use tracing::{debug, warn};

/// Launcher window control
pub trait WindowController: Send + Sync {
    /// Bring the launcher window to the front
    ///
    /// # Errors
    ///
    /// Returns an error if the window system rejected the request.
    fn activate(&self) -> std::io::Result<()>;

    /// Hide the launcher window
    ///
    /// # Errors
    ///
    /// Returns an error if the window system rejected the request.
    fn deactivate(&self) -> std::io::Result<()>;
}

/// Clipboard payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
}

pub trait Clipboard: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the clipboard could not be written.
    fn copy_data_to_clipboard(&self, data: &[u8], content_type: ContentType)
    -> std::io::Result<()>;
}

pub trait UrlOpener: Send + Sync {
    /// Open `url`, in `application` if given or the system default otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the opener could not be launched.
    fn open_url(&self, application: Option<&str>, url: &str) -> std::io::Result<()>;
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{action} requires a parameter at index {index}")]
    MissingParameter { action: ActionKind, index: usize },

    #[error("{action} failed: {source}")]
    Collaborator {
        action: ActionKind,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to each action of one tapped item
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Indices of actions that completed
    pub performed: Vec<usize>,
    pub failures: Vec<(usize, ActionError)>,
}

impl DispatchReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ActionDispatcher {
    navigation: Arc<NavigationStack>,
    window: Arc<dyn WindowController>,
    clipboard: Arc<dyn Clipboard>,
    opener: Arc<dyn UrlOpener>,
    browser: RwLock<Option<String>>,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(
        navigation: Arc<NavigationStack>,
        window: Arc<dyn WindowController>,
        clipboard: Arc<dyn Clipboard>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            navigation,
            window,
            clipboard,
            opener,
            browser: RwLock::new(None),
        }
    }

    /// Application used for `open`; `None` means the system default.
    #[must_use]
    pub fn with_browser(self, browser: Option<String>) -> Self {
        self.set_browser(browser);
        self
    }

    pub fn set_browser(&self, browser: Option<String>) {
        *self.browser.write() = browser;
    }

    /// Run every action of `item` in order. Never fails as a whole.
    pub fn dispatch(&self, item: &ResultItem, recipe_id: &str) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, &action) in item.actions.iter().enumerate() {
            match self.perform(item, index, action) {
                Ok(()) => {
                    debug!("[{}] {} '{}' #{}", recipe_id, action, item.title, index);
                    report.performed.push(index);
                }
                Err(e) => {
                    warn!(
                        "[{}] Skipping action #{} on '{}': {}",
                        recipe_id, index, item.title, e
                    );
                    report.failures.push((index, e));
                }
            }
        }

        report
    }

    fn perform(
        &self,
        item: &ResultItem,
        index: usize,
        action: ActionKind,
    ) -> Result<(), ActionError> {
        let collaborator = |source| ActionError::Collaborator { action, source };

        match action {
            ActionKind::Back => {
                // Idle is always reachable
                let _ = self.navigation.go_to_recipe(None);
                Ok(())
            }
            ActionKind::Hide => self.window.deactivate().map_err(collaborator),
            ActionKind::Copy => {
                let text = required_parameter(item, index, action)?;
                self.clipboard
                    .copy_data_to_clipboard(text.as_bytes(), ContentType::Text)
                    .map_err(collaborator)
            }
            ActionKind::Open => {
                let url = required_parameter(item, index, action)?;
                let browser = self.browser.read().clone();
                self.opener
                    .open_url(browser.as_deref(), url)
                    .map_err(collaborator)
            }
        }
    }
}

fn required_parameter(
    item: &ResultItem,
    index: usize,
    action: ActionKind,
) -> Result<&str, ActionError> {
    item.first_parameter(index)
        .ok_or(ActionError::MissingParameter { action, index })
}
