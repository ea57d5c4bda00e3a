use crate::domain::risk::RiskBand;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Token error: {0}")]
    TokenError(String),
    #[error("No routing option: {0}")]
    NoRoute(String),
    #[error("Transaction rejected due to {band} risk (score {score:.2})")]
    RiskRejected { score: f64, band: RiskBand },
    #[error("Processor error: {0}")]
    ProcessorError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Human-readable reason recorded on a failed payment.
    pub fn reason(&self) -> String {
        match self {
            Self::ValidationError(msg)
            | Self::TokenError(msg)
            | Self::NoRoute(msg)
            | Self::ProcessorError(msg)
            | Self::NotFound(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(msg.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
