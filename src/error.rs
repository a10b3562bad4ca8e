use thiserror::Error;

#[derive(Error, Debug)]
pub enum KlartextError {
    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Planning error: {0}")]
    Plan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KlartextError>;
