pub mod config;
pub mod dispatch;
pub mod engine;
pub mod navigation;
pub mod recipe;
pub mod session;

mod error;

#[cfg(test)]
mod tests;

pub use dispatch::{ActionDispatcher, ActionError, DispatchReport};
pub use engine::{ExecutionEngine, ExecutionError, ExecutionRequest};
pub use error::{Error, Result};
pub use navigation::{NavigationStack, NavigationState};
pub use recipe::{RecipeManifest, RecipeRegistry};
pub use session::Session;

pub use touchfish_types::*;
