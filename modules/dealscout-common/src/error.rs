use thiserror::Error;

#[derive(Error, Debug)]
pub enum DealScoutError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DealScoutError {
    /// True for errors a caller should surface synchronously and never retry.
    pub fn is_validation(&self) -> bool {
        matches!(self, DealScoutError::Validation(_))
    }
}
