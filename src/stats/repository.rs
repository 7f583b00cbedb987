use std::collections::HashMap;

use sqlx::PgPool;
use tracing::{debug, info};

use super::codifier::ClassifierTree;
use super::error::{Result, StatsError};
use super::models::*;

const PG_UNIQUE_VIOLATION: &str = "23505";

pub struct StatsRepository {
    pool: PgPool,
}

impl StatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- process lifecycle ---

    /// Validates and persists a new aggregation process. Returns its id
    /// immediately; the worker picks the row up later.
    pub async fn submit_process(&self, request: &SubmitProcessRequest) -> Result<i64> {
        let okpd2_ids = self.resolve_classifier_codes(&request.okpd2).await?;
        let region_ids = self.resolve_regions(&request.regions).await?;
        let metrics = metric_vector(&request.metrics)?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO process (okpd2_ids, region_ids, metrics)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&okpd2_ids)
        .bind(&region_ids)
        .bind(&metrics[..])
        .fetch_one(&self.pool)
        .await?;

        info!(
            process_id = id,
            codes = okpd2_ids.len(),
            regions = region_ids.len(),
            "Submitted aggregation process"
        );
        Ok(id)
    }

    pub async fn get_process(&self, id: i64) -> Result<Process> {
        sqlx::query_as::<_, Process>("SELECT * FROM process WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StatsError::NotFound {
                what: "process",
                id: id.to_string(),
            })
    }

    /// Claims the oldest pending process for the worker. Moving `progress`
    /// off 0 inside the claiming UPDATE means concurrent workers can never
    /// double-claim a row.
    pub async fn claim_pending_process(&self) -> Result<Option<Process>> {
        let claimed = sqlx::query_as::<_, Process>(
            r#"
            UPDATE process
            SET progress = 1, updated_at = NOW()
            WHERE id = (
                SELECT id FROM process
                WHERE progress = 0 AND error_msg IS NULL
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        if let Some(process) = &claimed {
            debug!(process_id = process.id, "Claimed pending process");
        }
        Ok(claimed)
    }

    /// Advances progress. GREATEST keeps it monotone even if a slow update
    /// lands out of order; 100 is reserved for `complete_process`.
    pub async fn set_process_progress(&self, id: i64, progress: i32) -> Result<()> {
        let progress = progress.clamp(0, 99);
        sqlx::query(
            r#"
            UPDATE process
            SET progress = GREATEST(progress, $2), updated_at = NOW()
            WHERE id = $1 AND error_msg IS NULL
            "#,
        )
        .bind(id)
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_process(&self, id: i64, data_file: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE process
            SET progress = 100, data_file = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(data_file)
        .execute(&self.pool)
        .await?;
        info!(process_id = id, data_file, "Aggregation process completed");
        Ok(())
    }

    /// Records a permanent failure. The message stays in the row and the
    /// log; the API surfaces only a generic retry suggestion.
    pub async fn fail_process(&self, id: i64, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE process
            SET error_msg = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        info!(process_id = id, error = message, "Aggregation process failed");
        Ok(())
    }

    // --- segments ---

    pub async fn create_segment(&self, request: &NewSegmentRequest) -> Result<Segment> {
        let name_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM segment WHERE name = $1)",
        )
        .bind(&request.segment_name)
        .fetch_one(&self.pool)
        .await?;
        if name_taken {
            return Err(StatsError::DuplicateSegmentName {
                name: request.segment_name.clone(),
            });
        }

        let okpd2_ids = self.resolve_classifier_codes(&request.okpd2).await?;

        let mut tx = self.pool.begin().await?;
        let segment = sqlx::query_as::<_, Segment>(
            "INSERT INTO segment (name) VALUES ($1) RETURNING *",
        )
        .bind(&request.segment_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            // Unique-index race between the existence check and the insert
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                StatsError::DuplicateSegmentName {
                    name: request.segment_name.clone(),
                }
            }
            other => StatsError::Database(other),
        })?;

        for okpd2_id in &okpd2_ids {
            sqlx::query(
                "INSERT INTO segment_okpd2 (segment_id, okpd2_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(segment.id)
            .bind(okpd2_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            segment_id = segment.id,
            name = %segment.name,
            codes = okpd2_ids.len(),
            "Created segment"
        );
        Ok(segment)
    }

    pub async fn get_segment(&self, id: i64) -> Result<Segment> {
        sqlx::query_as::<_, Segment>("SELECT * FROM segment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StatsError::NotFound {
                what: "segment",
                id: id.to_string(),
            })
    }

    /// A segment's leaf codes expanded to their classifier-tree records,
    /// joined on the code string.
    pub async fn segment_codifier_nodes(&self, segment_id: i64) -> Result<Vec<ClassifierNode>> {
        self.get_segment(segment_id).await?;

        let nodes = sqlx::query_as::<_, ClassifierNode>(
            r#"
            SELECT c.id, c.code, c.description, c.parent_id, c.active
            FROM segment_okpd2 s
            JOIN okpd2 o ON o.id = s.okpd2_id
            JOIN okpd2_codifier c ON c.code = o.code
            WHERE s.segment_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(segment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(nodes)
    }

    /// Root-to-leaf classifier paths for each of a segment's codes.
    pub async fn segment_code_paths(&self, segment_id: i64) -> Result<Vec<Vec<i64>>> {
        let nodes = self.segment_codifier_nodes(segment_id).await?;
        let tree = self.load_classifier_tree().await?;
        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        tree.ancestor_paths(&ids)
    }

    // --- reference data ---

    pub async fn list_metrics(&self) -> Result<Vec<Metric>> {
        let metrics = sqlx::query_as::<_, Metric>("SELECT * FROM metric ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(metrics)
    }

    pub async fn list_region_codifiers(&self) -> Result<Vec<RegionCodifier>> {
        let regions =
            sqlx::query_as::<_, RegionCodifier>("SELECT * FROM region_codifier ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(regions)
    }

    pub async fn list_segments(&self) -> Result<Vec<Segment>> {
        let segments = sqlx::query_as::<_, Segment>("SELECT * FROM segment ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(segments)
    }

    pub async fn load_classifier_tree(&self) -> Result<ClassifierTree> {
        let rows = sqlx::query_as::<_, ClassifierNode>(
            "SELECT id, code, description, parent_id, active FROM okpd2_codifier",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ClassifierTree::new(rows))
    }

    pub async fn classifier_roots(&self) -> Result<Vec<ClassifierNode>> {
        let roots = sqlx::query_as::<_, ClassifierNode>(
            "SELECT * FROM okpd2_codifier WHERE parent_id = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roots)
    }

    /// Direct children of one classifier node; the parent must exist.
    pub async fn classifier_children(&self, parent_id: i64) -> Result<Vec<ClassifierNode>> {
        sqlx::query_as::<_, ClassifierNode>("SELECT * FROM okpd2_codifier WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StatsError::NotFound {
                what: "classifier node",
                id: parent_id.to_string(),
            })?;

        let children = sqlx::query_as::<_, ClassifierNode>(
            "SELECT * FROM okpd2_codifier WHERE parent_id = $1 ORDER BY id",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(children)
    }

    pub async fn classifier_codes_by_ids(&self, ids: &[i64]) -> Result<Vec<ClassifierCode>> {
        let codes = sqlx::query_as::<_, ClassifierCode>(
            "SELECT * FROM okpd2 WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    pub async fn region_codifiers_by_ids(&self, ids: &[i64]) -> Result<Vec<RegionCodifier>> {
        let regions = sqlx::query_as::<_, RegionCodifier>(
            "SELECT * FROM region_codifier WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(regions)
    }

    // --- aggregation source ---

    pub async fn facts_for(
        &self,
        okpd2_ids: &[i64],
        region_codifier_ids: &[i64],
    ) -> Result<Vec<ProcurementFact>> {
        let facts = sqlx::query_as::<_, ProcurementFact>(
            r#"
            SELECT * FROM procurement_fact
            WHERE okpd2_id = ANY($1) AND region_codifier_id = ANY($2)
            ORDER BY okpd2_id, region_codifier_id
            "#,
        )
        .bind(okpd2_ids)
        .bind(region_codifier_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(facts)
    }

    // --- resolution helpers ---

    /// Maps leaf code strings to `okpd2` row ids, preserving request order.
    async fn resolve_classifier_codes(&self, codes: &[String]) -> Result<Vec<i64>> {
        let rows = sqlx::query_as::<_, ClassifierCode>(
            "SELECT * FROM okpd2 WHERE code = ANY($1)",
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        let by_code: HashMap<&str, i64> =
            rows.iter().map(|c| (c.code.as_str(), c.id)).collect();

        codes
            .iter()
            .map(|code| {
                by_code
                    .get(code.as_str())
                    .copied()
                    .ok_or_else(|| StatsError::UnknownClassifierCode { code: code.clone() })
            })
            .collect()
    }

    /// Maps user-facing region ids to the codifier row ids facts are keyed
    /// on. Unknown regions simply resolve to nothing, as in the original
    /// lookup; an empty result still yields a valid (region-less) process.
    async fn resolve_regions(&self, region_ids: &[i64]) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM region_codifier WHERE region_id = ANY($1) ORDER BY id",
        )
        .bind(region_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
