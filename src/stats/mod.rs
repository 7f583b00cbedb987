pub mod aggregation_job;
pub mod codifier;
pub mod connection;
pub mod error;
pub mod loader;
pub mod models;
pub mod repository;

pub use aggregation_job::{spawn_aggregation_job, AggregationJob, AggregationJobConfig};
pub use codifier::ClassifierTree;
pub use error::StatsError;
pub use loader::ReferenceLoader;
pub use models::{
    metric_vector, ClassifierCode, ClassifierNode, Metric, NewSegmentRequest, Process,
    ProcurementFact, Region, RegionCodifier, Segment, SubmitProcessRequest,
};
pub use repository::StatsRepository;
