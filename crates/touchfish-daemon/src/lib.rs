//! TouchFish daemon library: hosts a recipe session over stdio.
//!
//! The daemon owns the recipe registry, navigation and execution engine,
//! speaks newline-delimited JSON with the presentation layer, and reloads
//! config and recipes when they change on disk.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;
pub mod system;
pub(crate) mod watcher;

pub use error::{DaemonError, Result};
pub use protocol::{Inbound, Outbound};
pub use server::{Collaborators, Daemon, run};
