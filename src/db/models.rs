use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Well-execution ordering strategies. Metadata only - carried on the job
/// record and in exports, never used by the estimation code.
pub const PATTERN_TYPES: &[&str] = &["Sequential", "Simul", "Hybrid"];

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub job_id: String,
    pub operator: String,
    pub pad_name: String,
    pub pattern_type: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub operator: String,
    pub pad_name: String,
    pub pattern_type: String,
    pub wells: Vec<NewJobWell>,
}

/// One well declaration at job-creation time. Declaration order is
/// preserved in the store and drives fuzzy target resolution.
#[derive(Debug, Clone)]
pub struct NewJobWell {
    pub well_name: String,
    pub target_stages: i32,
    pub simul: bool,
}

/// Declared total stage count for a well, read back in declaration order.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WellTarget {
    pub well_name: String,
    pub target_stages: i32,
    pub simul: bool,
}

/// One completed frac stage on one well.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StageRecord {
    pub well_name: String,
    pub stage_number: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl StageRecord {
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}

/// One quality observation for a (well, stage) pair. At most one row per
/// pair exists in the store; a later save overwrites the earlier one.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QualityRecord {
    pub well_name: String,
    pub stage_number: i32,
    pub pre_sand: String,
    pub post_sand: String,
    pub spp: String,
    pub comments: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProcessedReport {
    pub id: i32,
    pub file_name: String,
    pub job_id: String,
    pub kind: String,
    pub rows_parsed: i32,
    pub rows_dropped: i32,
    pub rows_affected: i32,
    pub processing_status: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProcessedReport {
    pub file_name: String,
    pub job_id: String,
    pub kind: String,
    pub rows_parsed: i32,
    pub rows_dropped: i32,
    pub rows_affected: i32,
    pub processing_status: String,
}

#[derive(Debug, Clone)]
pub struct InsertResult {
    pub total_rows_affected: usize,
}
