use thiserror::Error;

/// Errors from config persistence and navigation
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Recipe not found: {0}")]
    RecipeNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
