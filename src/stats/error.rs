use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Segment name already exists: {name}")]
    DuplicateSegmentName { name: String },

    #[error("Unknown classifier code: {code}")]
    UnknownClassifierCode { code: String },

    #[error("Metric index {index} is outside the 1-3 slot range")]
    MetricIndexOutOfRange { index: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Aggregation failed: {message}")]
    AggregationFailed { message: String },

    #[error("Corrupt classifier reference data: {reason}")]
    CorruptReferenceData { reason: String },

    #[error("Artifact store error: {0}")]
    ArtifactStore(String),

    #[error("Share link expired or invalid")]
    InvalidShareToken,

    #[error("Upstream service error: {message}")]
    Upstream { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;
