//! Active-recipe navigation.
//!
//! Only one level is tracked: either no recipe is active and the top-level
//! chooser is shown, or exactly one recipe drives the result area. Every
//! transition is broadcast so the session can run a newly activated recipe.

use crate::recipe::RecipeRegistry;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use touchfish_types::RecipeSummary;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "recipeId", rename_all = "lowercase")]
pub enum NavigationState {
    /// Top-level recipe list
    #[default]
    Idle,
    Active(String),
}

impl NavigationState {
    #[must_use]
    pub fn active_recipe(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Active(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

pub struct NavigationStack {
    registry: Arc<RecipeRegistry>,
    state: RwLock<NavigationState>,
    tx: watch::Sender<NavigationState>,
}

impl NavigationStack {
    #[must_use]
    pub fn new(registry: Arc<RecipeRegistry>) -> Self {
        let (tx, _rx) = watch::channel(NavigationState::Idle);
        Self {
            registry,
            state: RwLock::new(NavigationState::Idle),
            tx,
        }
    }

    /// Activate a recipe, or return to the chooser with `None`.
    ///
    /// Transitions are serialized; the last one to complete wins.
    ///
    /// # Errors
    ///
    /// Returns `Error::RecipeNotFound` for an unknown id; the state is left unchanged.
    pub fn go_to_recipe(&self, id: Option<&str>) -> Result<NavigationState> {
        // Checked under the lock so a concurrent reconcile cannot be overtaken
        let mut state = self.state.write();
        let next = match id {
            None => NavigationState::Idle,
            Some(id) if self.registry.contains(id) => NavigationState::Active(id.to_string()),
            Some(id) => return Err(Error::RecipeNotFound(id.to_string())),
        };

        self.transition(&mut state, next.clone());
        Ok(next)
    }

    /// Return to Idle if the active recipe disappeared in a rescan.
    pub fn reconcile(&self) -> bool {
        let mut state = self.state.write();
        let stale = state
            .active_recipe()
            .is_some_and(|id| !self.registry.contains(id));
        if stale {
            debug!("Active recipe no longer installed, returning to recipe list");
            self.transition(&mut state, NavigationState::Idle);
        }
        stale
    }

    fn transition(&self, state: &mut NavigationState, next: NavigationState) {
        debug!("Navigation: {:?} -> {:?}", *state, next);
        state.clone_from(&next);
        // Broadcast while holding the lock so subscribers see transitions in order
        self.tx.send_replace(next);
    }

    #[must_use]
    pub fn state(&self) -> NavigationState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn active_recipe(&self) -> Option<String> {
        self.state.read().active_recipe().map(str::to_string)
    }

    /// Receive every transition, starting from the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NavigationState> {
        self.tx.subscribe()
    }

    /// The chooser list shown while Idle
    #[must_use]
    pub fn recipes(&self) -> Vec<RecipeSummary> {
        self.registry.snapshot().summaries()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }
}
