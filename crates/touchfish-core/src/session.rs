//! Event loop that drives the active recipe.
//!
//! Inbound `SessionEvent`s and navigation transitions are consumed in order.
//! Tokens are issued on the loop itself, so they follow event order, while the
//! executions run as concurrent tasks. Published results go out on an
//! unbounded channel tagged with their token.

use crate::dispatch::WindowController;
use crate::engine::ExecutionEngine;
use crate::navigation::{NavigationStack, NavigationState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use touchfish_types::{ExecutionOutput, SessionEvent};
use tracing::{debug, info, warn};

pub struct Session {
    engine: Arc<ExecutionEngine>,
    navigation: Arc<NavigationStack>,
    window: Arc<dyn WindowController>,
    outbound: mpsc::UnboundedSender<ExecutionOutput>,
    query: String,
    active: Option<String>,
    tasks: JoinSet<()>,
}

impl Session {
    /// Create a session and the receiver for its published results.
    #[must_use]
    pub fn new(
        engine: Arc<ExecutionEngine>,
        navigation: Arc<NavigationStack>,
        window: Arc<dyn WindowController>,
    ) -> (Self, mpsc::UnboundedReceiver<ExecutionOutput>) {
        let (outbound, results) = mpsc::unbounded_channel();
        let session = Self {
            engine,
            navigation,
            window,
            outbound,
            query: String::new(),
            active: None,
            tasks: JoinSet::new(),
        };
        (session, results)
    }

    /// Run until the inbound channel closes, then cancel whatever is still running.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut transitions = self.navigation.subscribe();
        let initial = transitions.borrow_and_update().clone();
        self.on_navigation(initial);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Event channel closed, stopping session");
                        break;
                    };
                    self.on_event(event);
                }
                changed = transitions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = transitions.borrow_and_update().clone();
                    self.on_navigation(state);
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!("Execution task panicked: {}", e);
                        }
                    }
                }
            }
        }

        self.tasks.shutdown().await;
        info!("Session stopped");
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::QueryChanged { query } => {
                self.query = query;
            }
            SessionEvent::StatusChanged => {}
        }

        if let Some(recipe_id) = self.active.clone() {
            self.spawn_execution(&recipe_id);
        }
    }

    fn on_navigation(&mut self, state: NavigationState) {
        let next = state.active_recipe().map(str::to_string);
        if next == self.active {
            // Re-activating the same recipe re-runs it
            if let Some(recipe_id) = next {
                self.spawn_execution(&recipe_id);
            }
            return;
        }

        if let Some(previous) = self.active.take() {
            debug!("[{}] Deactivated", previous);
            self.engine.cancel(&previous);
        }

        self.active = next;
        if let Some(recipe_id) = self.active.clone() {
            debug!("[{}] Activated", recipe_id);
            self.spawn_execution(&recipe_id);
        }
    }

    fn spawn_execution(&mut self, recipe_id: &str) {
        let request = self.engine.begin(recipe_id, &self.query);
        let engine = Arc::clone(&self.engine);
        let navigation = Arc::clone(&self.navigation);
        let window = Arc::clone(&self.window);
        let outbound = self.outbound.clone();

        self.tasks.spawn(async move {
            let Some(output) = engine.run(request).await else {
                return;
            };
            let dismiss = output.result.is_dismissal();
            let recipe_id = output.recipe_id.clone();

            if outbound.send(output).is_err() {
                debug!("[{}] Result receiver dropped", recipe_id);
            }

            if dismiss {
                debug!("[{}] Finished with no output, dismissing", recipe_id);
                let _ = navigation.go_to_recipe(None);
                if let Err(e) = window.deactivate() {
                    warn!("[{}] Failed to deactivate window: {}", recipe_id, e);
                }
            }
        });
    }
}
