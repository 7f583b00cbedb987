use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::error::{Result, StatsError};

/// Number of selectable metric slots on a process.
pub const METRIC_SLOTS: usize = 3;

/// Slot names in vector order: slot 1 counts contracts, slot 2 counts all
/// offers, slot 3 counts active offers.
pub const METRIC_NAMES: [&str; METRIC_SLOTS] =
    ["Contract count", "Offers total", "Offers active"];

/// Leaf economic-activity classifier code (OKPD2). Immutable reference data.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClassifierCode {
    pub id: i64,
    pub code: String,
    pub description: String,
}

/// Node of the classifier grouping tree. `parent_id == 0` marks a root.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClassifierNode {
    pub id: i64,
    pub code: String,
    pub description: String,
    pub parent_id: i64,
    pub active: bool,
}

impl ClassifierNode {
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Region {
    pub id: i64,
    pub region_code: String,
    pub region_name: String,
}

/// Maps the user-facing `region_id` to the internal row id the aggregation
/// keys facts on.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RegionCodifier {
    pub id: i64,
    pub region_code: String,
    pub region_name: String,
    pub region_id: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Metric {
    pub id: i64,
    pub name: String,
}

/// User-named group of classifier leaf codes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Segment {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One aggregation job. Created at `progress = 0`, advanced only by the
/// worker; a row with `error_msg` set or `progress = 100` plus `data_file`
/// is terminal and read-only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Process {
    pub id: i64,
    pub okpd2_ids: Vec<i64>,
    pub region_ids: Vec<i64>,
    pub metrics: Vec<i32>,
    pub progress: i32,
    pub error_msg: Option<String>,
    pub data_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Process {
    pub fn is_failed(&self) -> bool {
        self.error_msg.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 100 && self.data_file.is_some()
    }
}

/// Aggregation source row: counters for one classifier code in one region.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcurementFact {
    pub id: i64,
    pub okpd2_id: i64,
    pub region_codifier_id: i64,
    pub contract_count: i64,
    pub offers_total: i64,
    pub offers_active: i64,
}

impl ProcurementFact {
    /// Counter for a 1-based metric slot.
    pub fn metric_value(&self, slot: usize) -> i64 {
        match slot {
            1 => self.contract_count,
            2 => self.offers_total,
            3 => self.offers_active,
            _ => 0,
        }
    }
}

/// Submission payload for a new aggregation process.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitProcessRequest {
    /// Leaf classifier code strings, e.g. `"43.21"`.
    #[validate(length(min = 1, message = "at least one classifier code is required"))]
    pub okpd2: Vec<String>,

    /// 1-based metric slot selections.
    #[validate(length(min = 1, message = "at least one metric is required"))]
    pub metrics: Vec<i32>,

    /// User-facing region identifiers.
    #[validate(length(min = 1, message = "at least one region is required"))]
    pub regions: Vec<i64>,
}

/// Payload for creating a named segment of classifier leaf codes.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSegmentRequest {
    #[validate(length(min = 1, message = "segment name must not be empty"))]
    pub segment_name: String,

    #[validate(length(min = 1, message = "at least one classifier code is required"))]
    pub okpd2: Vec<String>,
}

/// Builds the fixed 3-slot selection vector: 1 at each selected (1-based)
/// index, 0 elsewhere. Duplicate selections are idempotent and order does
/// not matter.
pub fn metric_vector(selected: &[i32]) -> Result<[i32; METRIC_SLOTS]> {
    let mut vector = [0; METRIC_SLOTS];
    for &index in selected {
        if !(1..=METRIC_SLOTS as i32).contains(&index) {
            return Err(StatsError::MetricIndexOutOfRange { index });
        }
        vector[(index - 1) as usize] = 1;
    }
    Ok(vector)
}

/// 1-based slots switched on in a stored selection vector.
pub fn selected_slots(vector: &[i32]) -> Vec<usize> {
    vector
        .iter()
        .enumerate()
        .filter(|(_, &flag)| flag != 0)
        .map(|(i, _)| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_vector_sets_selected_slots() {
        assert_eq!(metric_vector(&[1, 3]).unwrap(), [1, 0, 1]);
        assert_eq!(metric_vector(&[2]).unwrap(), [0, 1, 0]);
    }

    #[test]
    fn metric_vector_is_order_independent() {
        assert_eq!(metric_vector(&[1, 3]).unwrap(), metric_vector(&[3, 1]).unwrap());
    }

    #[test]
    fn metric_vector_is_idempotent_under_duplicates() {
        assert_eq!(
            metric_vector(&[2, 2, 2]).unwrap(),
            metric_vector(&[2]).unwrap()
        );
    }

    #[test]
    fn metric_vector_rejects_out_of_range_indices() {
        assert!(matches!(
            metric_vector(&[0]),
            Err(StatsError::MetricIndexOutOfRange { index: 0 })
        ));
        assert!(matches!(
            metric_vector(&[4]),
            Err(StatsError::MetricIndexOutOfRange { index: 4 })
        ));
    }

    #[test]
    fn selected_slots_round_trips_the_vector() {
        let vector = metric_vector(&[1, 3]).unwrap();
        assert_eq!(selected_slots(&vector), vec![1, 3]);
    }

    #[test]
    fn fact_metric_values_follow_slot_order() {
        let fact = ProcurementFact {
            id: 1,
            okpd2_id: 10,
            region_codifier_id: 20,
            contract_count: 5,
            offers_total: 40,
            offers_active: 12,
        };
        assert_eq!(fact.metric_value(1), 5);
        assert_eq!(fact.metric_value(2), 40);
        assert_eq!(fact.metric_value(3), 12);
    }
}
