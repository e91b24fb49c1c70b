mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{ActionConfig, Config, ExecutionConfig};
pub use validation::{warn_unknown_fields, warn_unknown_manifest_fields};
