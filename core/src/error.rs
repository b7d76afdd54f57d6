use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unique identifier draw exhausted after {attempts} attempts")]
    IdCollisionExhausted { attempts: u32 },

    #[error("Pipeline failed for meter '{meter}': {message}")]
    MeterPipeline { meter: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
