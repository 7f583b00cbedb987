pub mod api;
pub mod config;
pub mod database_setup;
pub mod object_store;
pub mod stats;
pub mod upstream;

pub use config::Config;
pub use database_setup::{DatabaseHealth, DatabaseSetup};
pub use object_store::{LocalObjectStore, ObjectStore, SharedLink};

// Re-export statistics types for convenience
pub use stats::{
    connection::create_pool, AggregationJob, AggregationJobConfig, ClassifierTree, Process,
    ReferenceLoader, Segment, StatsError, StatsRepository,
};

// Re-export upstream clients
pub use upstream::{AdPlatformClient, AnalyticsClient};
