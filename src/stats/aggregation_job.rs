//! Background aggregation worker.
//!
//! Pending processes form the work queue: the worker claims one row at a
//! time, aggregates the selected metrics per classifier code and region from
//! the fact table, advances `progress` as it goes and stores the finished
//! CSV artifact. A failure is recorded on the row and the loop moves on;
//! jobs are independent and there is no cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{Result, StatsError};
use super::models::{selected_slots, Process, METRIC_NAMES, METRIC_SLOTS};
use super::repository::StatsRepository;
use crate::object_store::ObjectStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationJobConfig {
    /// Seconds between queue polls when the queue is empty.
    pub run_interval_seconds: u64,

    /// Upper bound on jobs drained per cycle, so one burst of submissions
    /// cannot monopolize a cycle forever.
    pub max_jobs_per_run: usize,
}

impl Default for AggregationJobConfig {
    fn default() -> Self {
        Self {
            run_interval_seconds: 5,
            max_jobs_per_run: 4,
        }
    }
}

/// Result of one worker cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
}

pub struct AggregationJob {
    config: AggregationJobConfig,
    repository: Arc<StatsRepository>,
    store: Arc<dyn ObjectStore>,
    is_running: AtomicBool,
}

impl AggregationJob {
    pub fn new(
        config: AggregationJobConfig,
        repository: Arc<StatsRepository>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            repository,
            store,
            is_running: AtomicBool::new(false),
        }
    }

    /// Runs the polling loop until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(StatsError::AggregationFailed {
                message: "aggregation worker is already running".to_string(),
            });
        }
        self.is_running.store(true, Ordering::Relaxed);
        info!("Starting aggregation worker");

        let mut interval = time::interval(Duration::from_secs(self.config.run_interval_seconds));
        while self.is_running.load(Ordering::Relaxed) {
            interval.tick().await;
            match self.run_cycle().await {
                Ok(result) if result.jobs_completed + result.jobs_failed > 0 => {
                    info!(
                        completed = result.jobs_completed,
                        failed = result.jobs_failed,
                        "Aggregation cycle finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // Queue polling errors are transient; keep the loop alive
                    error!("Aggregation cycle failed: {}", e);
                }
            }
        }
        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping aggregation worker");
        self.is_running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Drains up to `max_jobs_per_run` pending processes.
    pub async fn run_cycle(&self) -> Result<AggregationRunResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut jobs_completed = 0;
        let mut jobs_failed = 0;
        debug!(%run_id, "Starting aggregation cycle");

        for _ in 0..self.config.max_jobs_per_run {
            let Some(process) = self.repository.claim_pending_process().await? else {
                break;
            };

            let process_id = process.id;
            match self.aggregate(&process).await {
                Ok(data_file) => {
                    self.repository.complete_process(process_id, &data_file).await?;
                    jobs_completed += 1;
                }
                Err(e) => {
                    // The row keeps the real reason; the API surfaces a
                    // generic retry message
                    warn!(process_id, "Aggregation failed: {}", e);
                    self.repository
                        .fail_process(process_id, &e.to_string())
                        .await?;
                    jobs_failed += 1;
                }
            }
        }

        Ok(AggregationRunResult {
            run_id,
            started_at,
            completed_at: Utc::now(),
            jobs_completed,
            jobs_failed,
        })
    }

    /// Computes one process end to end and stores its artifact. Returns the
    /// stored object path.
    async fn aggregate(&self, process: &Process) -> Result<String> {
        debug!(process_id = process.id, "Aggregating process");

        let codes = self
            .repository
            .classifier_codes_by_ids(&process.okpd2_ids)
            .await?;
        let regions = self
            .repository
            .region_codifiers_by_ids(&process.region_ids)
            .await?;
        let facts = self
            .repository
            .facts_for(&process.okpd2_ids, &process.region_ids)
            .await?;
        let tree = self.repository.load_classifier_tree().await?;

        let slots = selected_slots(&process.metrics);
        if slots.is_empty() || slots.iter().any(|&s| s > METRIC_SLOTS) {
            return Err(StatsError::AggregationFailed {
                message: format!("process {} carries no valid metric selection", process.id),
            });
        }

        let fact_index: HashMap<(i64, i64), _> = facts
            .iter()
            .map(|f| ((f.okpd2_id, f.region_codifier_id), f))
            .collect();

        // Codifier nodes are matched to leaf codes by the code string
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec![
            "classifier_path".to_string(),
            "code".to_string(),
            "description".to_string(),
            "region_code".to_string(),
            "region".to_string(),
        ];
        header.extend(slots.iter().map(|&s| METRIC_NAMES[s - 1].to_string()));
        writer.write_record(&header)?;

        let total = codes.len().max(1);
        for (done, code) in codes.iter().enumerate() {
            let path_label = tree
                .get_by_code(&code.code)
                .map(|node| {
                    let path = tree.ancestor_path(node.id)?;
                    Ok::<_, StatsError>(tree.path_codes(&path).join(" / "))
                })
                .transpose()?
                .unwrap_or_else(|| code.code.clone());

            for region in &regions {
                let mut record = vec![
                    path_label.clone(),
                    code.code.clone(),
                    code.description.clone(),
                    region.region_code.clone(),
                    region.region_name.clone(),
                ];
                for &slot in &slots {
                    let value = fact_index
                        .get(&(code.id, region.id))
                        .map(|f| f.metric_value(slot))
                        .unwrap_or(0);
                    record.push(value.to_string());
                }
                writer.write_record(&record)?;
            }

            let progress = (((done + 1) * 100) / total) as i32;
            self.repository
                .set_process_progress(process.id, progress.min(99))
                .await?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StatsError::ArtifactStore(e.to_string()))?;

        let data_file = artifact_path(process.id);
        self.store.put(&data_file, &bytes).await?;
        Ok(data_file)
    }
}

/// Object path for a process artifact. The random suffix keeps retried runs
/// from colliding with a write-once store.
fn artifact_path(process_id: i64) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let salt: u16 = rand::random();
    format!("statistics/process_{process_id}_{stamp}_{salt:04x}.csv")
}

/// Spawns the worker on the runtime; the handle resolves when it stops.
pub fn spawn_aggregation_job(
    config: AggregationJobConfig,
    repository: Arc<StatsRepository>,
    store: Arc<dyn ObjectStore>,
) -> (Arc<AggregationJob>, tokio::task::JoinHandle<Result<()>>) {
    let job = Arc::new(AggregationJob::new(config, repository, store));
    let runner = job.clone();
    let handle = tokio::spawn(async move { runner.start().await });
    (job, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_polls_frequently_with_a_small_batch() {
        let config = AggregationJobConfig::default();
        assert!(config.run_interval_seconds > 0);
        assert!(config.max_jobs_per_run > 0);
    }

    #[test]
    fn artifact_paths_are_scoped_to_the_process() {
        let path = artifact_path(7);
        assert!(path.starts_with("statistics/process_7_"));
        assert!(path.ends_with(".csv"));
    }
}
