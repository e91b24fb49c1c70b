//! Recipe execution with per-recipe supersession.
//!
//! Every request for a recipe gets a token strictly greater than the previous
//! one. Issuing a new token cancels the older in-flight request (its child is
//! killed), and a finished request only publishes if its token is still the
//! latest for that recipe. Requests for different recipes never interact.

mod process;

use crate::config::ExecutionConfig;
use crate::recipe::RecipeRegistry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use touchfish_types::{
    ExecuteResult, ExecutionOutput, MALFORMED_OUTPUT_MESSAGE, ResultEnvelope, TIMEOUT_MESSAGE,
};
use tracing::{debug, warn};

/// Why an execution produced no result envelope.
///
/// The `Display` text of every variant except `Superseded` becomes the
/// `errorMessage` of the published result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    #[error("{}", MALFORMED_OUTPUT_MESSAGE)]
    Parse { reason: String },

    /// Non-zero exit, carrying stderr or the exit code
    #[error("{0}")]
    Exit(String),

    /// A newer request for the same recipe was issued
    #[error("superseded")]
    Superseded,
}

/// One issued execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub recipe_id: String,
    pub query: String,
    pub token: u64,
    pub started_at: Instant,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct RecipeSlot {
    latest: u64,
    in_flight: Option<CancellationToken>,
}

pub struct ExecutionEngine {
    registry: Arc<RecipeRegistry>,
    config: RwLock<ExecutionConfig>,
    slots: Mutex<HashMap<String, RecipeSlot>>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(registry: Arc<RecipeRegistry>, config: ExecutionConfig) -> Self {
        Self {
            registry,
            config: RwLock::new(config),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the execution settings; applies to requests issued afterwards.
    pub fn set_config(&self, config: ExecutionConfig) {
        *self.config.write() = config;
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }

    /// Run `recipe_id` against `query`.
    ///
    /// Returns `None` when a newer request for the same recipe was issued
    /// before this one finished; nothing from this request is published then.
    pub async fn execute(&self, recipe_id: &str, query: &str) -> Option<ExecutionOutput> {
        let request = self.begin(recipe_id, query);
        self.run(request).await
    }

    /// Issue a token for a new request and cancel the older in-flight one.
    ///
    /// Split from [`run`](Self::run) so callers that spawn the execution can
    /// allocate tokens in event order.
    pub fn begin(&self, recipe_id: &str, query: &str) -> ExecutionRequest {
        let cancel = CancellationToken::new();
        let token = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(recipe_id.to_string()).or_default();
            slot.latest += 1;
            if let Some(previous) = slot.in_flight.replace(cancel.clone()) {
                previous.cancel();
            }
            slot.latest
        };

        debug!("[{}] Request #{} for query {:?}", recipe_id, token, query);
        ExecutionRequest {
            recipe_id: recipe_id.to_string(),
            query: query.to_string(),
            token,
            started_at: Instant::now(),
            cancel,
        }
    }

    /// Execute an issued request and publish it if it is still the latest.
    pub async fn run(&self, request: ExecutionRequest) -> Option<ExecutionOutput> {
        let outcome = self.invoke(&request).await;
        let time_cost = request.started_at.elapsed();

        let result = match outcome {
            Ok(envelope) => envelope.into_result(time_cost),
            Err(ExecutionError::Superseded) => {
                debug!(
                    "[{}] Request #{} cancelled by a newer request",
                    request.recipe_id, request.token
                );
                return None;
            }
            Err(e) => {
                if let ExecutionError::Parse { reason } = &e {
                    warn!("[{}] Malformed output: {}", request.recipe_id, reason);
                } else {
                    warn!("[{}] Execution failed: {}", request.recipe_id, e);
                }
                ExecuteResult::failure(e.to_string(), time_cost)
            }
        };

        if !self.complete(&request) {
            debug!(
                "[{}] Discarding stale result of request #{}",
                request.recipe_id, request.token
            );
            return None;
        }

        debug!(
            "[{}] Request #{} finished in {:?}",
            request.recipe_id, request.token, time_cost
        );
        Some(ExecutionOutput {
            recipe_id: request.recipe_id,
            query: request.query,
            token: request.token,
            result,
        })
    }

    /// Latest token issued for `recipe_id`
    #[must_use]
    pub fn latest_token(&self, recipe_id: &str) -> Option<u64> {
        self.slots.lock().get(recipe_id).map(|slot| slot.latest)
    }

    #[must_use]
    pub fn is_latest(&self, recipe_id: &str, token: u64) -> bool {
        self.latest_token(recipe_id) == Some(token)
    }

    /// Cancel whatever is in flight for `recipe_id` without issuing a new request.
    pub fn cancel(&self, recipe_id: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(recipe_id) {
            // Bumping the token makes a request that already finished parsing stale too
            slot.latest += 1;
            if let Some(cancel) = slot.in_flight.take() {
                cancel.cancel();
            }
        }
    }

    async fn invoke(&self, request: &ExecutionRequest) -> Result<ResultEnvelope, ExecutionError> {
        // The manifest snapshot stays valid for this request even if a rescan swaps the set
        let manifest = self
            .registry
            .lookup(&request.recipe_id)
            .ok_or_else(|| ExecutionError::RecipeNotFound(request.recipe_id.clone()))?;

        let config = self.config.read().clone();
        let timeout = manifest.invocation.timeout.unwrap_or(config.timeout());

        let output = process::run(
            &manifest,
            &request.query,
            timeout,
            config.max_output_bytes,
            &request.cancel,
        )
        .await?;

        if !output.status.success() {
            return Err(ExecutionError::Exit(process::describe_failure(&output)));
        }

        ResultEnvelope::parse(&output.stdout).map_err(|reason| ExecutionError::Parse { reason })
    }

    /// Clear the in-flight marker if `request` is still the latest.
    fn complete(&self, request: &ExecutionRequest) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(&request.recipe_id) {
            Some(slot) if slot.latest == request.token => {
                slot.in_flight = None;
                true
            }
            _ => false,
        }
    }
}
