use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input for `{field}`: {reason}")]
    InputValidation { field: &'static str, reason: String },

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("model artifacts could not be loaded: {0}")]
    ArtifactLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EngineError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InputValidation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::InputValidation { .. } | EngineError::Csv(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
