use crate::db::models::{
    InsertResult, Job, NewJob, NewProcessedReport, ProcessedReport, QualityRecord, StageRecord,
    WellTarget, PATTERN_TYPES,
};
use crate::error::{AppError, Result};
use sqlx::PgPool;
use tracing::{debug, info};

pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Create a job with its well declarations. Duplicate job numbers are
    /// rejected; declaration order is persisted so that fuzzy target
    /// resolution stays deterministic.
    pub async fn create_job(&self, job: NewJob) -> Result<()> {
        if !PATTERN_TYPES.contains(&job.pattern_type.as_str()) {
            return Err(AppError::InvalidData(format!(
                "Unknown pattern type '{}', expected one of {:?}",
                job.pattern_type, PATTERN_TYPES
            )));
        }

        if job.wells.is_empty() {
            return Err(AppError::InvalidData(
                "A job needs at least one well declaration".to_string(),
            ));
        }

        for well in &job.wells {
            if well.well_name.trim().is_empty() {
                return Err(AppError::InvalidData(
                    "Well declarations need a non-empty name".to_string(),
                ));
            }
            if well.target_stages <= 0 {
                return Err(AppError::InvalidData(format!(
                    "Well '{}' needs a positive target stage count",
                    well.well_name
                )));
            }
        }

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE job_id = $1")
            .bind(&job.job_id)
            .fetch_one(&self.pool)
            .await?;

        if existing > 0 {
            return Err(AppError::InvalidData(format!(
                "Job '{}' already exists",
                job.job_id
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO jobs (job_id, operator, pad_name, pattern_type) VALUES ($1, $2, $3, $4)",
        )
        .bind(&job.job_id)
        .bind(&job.operator)
        .bind(&job.pad_name)
        .bind(&job.pattern_type)
        .execute(&mut *tx)
        .await?;

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO job_wells (job_id, position, well_name, target_stages, simul) ",
        );

        query_builder.push_values(job.wells.iter().enumerate(), |mut b, (position, well)| {
            b.push_bind(&job.job_id)
                .push_bind(position as i32)
                .push_bind(&well.well_name)
                .push_bind(well.target_stages)
                .push_bind(well.simul);
        });

        query_builder.build().execute(&mut *tx).await?;

        tx.commit().await?;

        info!("Created job {} with {} wells", job.job_id, job.wells.len());
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at, job_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    /// Delete a job and everything recorded under it. Returns false when the
    /// job does not exist.
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Well targets in declaration order.
    pub async fn get_well_targets(&self, job_id: &str) -> Result<Vec<WellTarget>> {
        let targets = sqlx::query_as::<_, WellTarget>(
            "SELECT well_name, target_stages, simul FROM job_wells WHERE job_id = $1 ORDER BY position",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(targets)
    }

    /// Insert or update stage records on their natural key. Re-uploading a
    /// grown report is the normal path, so conflicts update in place.
    /// Duplicate (well, stage) rows within one batch collapse to the last
    /// occurrence before hitting the database.
    pub async fn upsert_stage_records(
        &self,
        job_id: &str,
        records: &[StageRecord],
        source_report: &str,
    ) -> Result<InsertResult> {
        let records = dedup_last_by(records, |r| (r.well_name.clone(), r.stage_number));
        if records.is_empty() {
            return Ok(InsertResult {
                total_rows_affected: 0,
            });
        }

        let mut total_rows_affected = 0;
        let mut tx = self.pool.begin().await?;

        const BATCH_SIZE: usize = 500;

        for (batch_idx, chunk) in records.chunks(BATCH_SIZE).enumerate() {
            debug!(
                "Upserting stage batch {}/{} ({} records)",
                batch_idx + 1,
                (records.len() + BATCH_SIZE - 1) / BATCH_SIZE,
                chunk.len()
            );

            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO stage_records (job_id, well_name, stage_number, start_time, end_time, source_report) ",
            );

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(job_id)
                    .push_bind(&record.well_name)
                    .push_bind(record.stage_number)
                    .push_bind(record.start_time)
                    .push_bind(record.end_time)
                    .push_bind(source_report);
            });

            query_builder.push(
                " ON CONFLICT (job_id, well_name, stage_number) DO UPDATE SET \
                start_time = EXCLUDED.start_time, \
                end_time = EXCLUDED.end_time, \
                source_report = EXCLUDED.source_report",
            );

            let result = query_builder.build().execute(&mut *tx).await?;
            total_rows_affected += result.rows_affected() as usize;
        }

        tx.commit().await?;

        Ok(InsertResult {
            total_rows_affected,
        })
    }

    /// Stage records in insertion order, which downstream grouping relies on
    /// for stable output.
    pub async fn get_stage_records(&self, job_id: &str) -> Result<Vec<StageRecord>> {
        let records = sqlx::query_as::<_, StageRecord>(
            "SELECT well_name, stage_number, start_time, end_time FROM stage_records \
             WHERE job_id = $1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Upsert one quality observation. The (job, well, stage) key is unique;
    /// a later save overwrites the earlier one.
    pub async fn upsert_quality_check(&self, job_id: &str, record: &QualityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quality_checks
                (job_id, well_name, stage_number, pre_sand, post_sand, spp, comments)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id, well_name, stage_number) DO UPDATE SET
                pre_sand = EXCLUDED.pre_sand,
                post_sand = EXCLUDED.post_sand,
                spp = EXCLUDED.spp,
                comments = EXCLUDED.comments,
                recorded_at = NOW()
            "#,
        )
        .bind(job_id)
        .bind(&record.well_name)
        .bind(record.stage_number)
        .bind(&record.pre_sand)
        .bind(&record.post_sand)
        .bind(&record.spp)
        .bind(&record.comments)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_quality_checks(
        &self,
        job_id: &str,
        records: &[QualityRecord],
    ) -> Result<InsertResult> {
        let records = dedup_last_by(records, |r| (r.well_name.clone(), r.stage_number));
        if records.is_empty() {
            return Ok(InsertResult {
                total_rows_affected: 0,
            });
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO quality_checks (job_id, well_name, stage_number, pre_sand, post_sand, spp, comments) ",
        );

        query_builder.push_values(&records, |mut b, record| {
            b.push_bind(job_id)
                .push_bind(&record.well_name)
                .push_bind(record.stage_number)
                .push_bind(&record.pre_sand)
                .push_bind(&record.post_sand)
                .push_bind(&record.spp)
                .push_bind(&record.comments);
        });

        query_builder.push(
            " ON CONFLICT (job_id, well_name, stage_number) DO UPDATE SET \
            pre_sand = EXCLUDED.pre_sand, \
            post_sand = EXCLUDED.post_sand, \
            spp = EXCLUDED.spp, \
            comments = EXCLUDED.comments, \
            recorded_at = NOW()",
        );

        let result = query_builder.build().execute(&self.pool).await?;

        Ok(InsertResult {
            total_rows_affected: result.rows_affected() as usize,
        })
    }

    pub async fn get_quality_checks(&self, job_id: &str) -> Result<Vec<QualityRecord>> {
        let records = sqlx::query_as::<_, QualityRecord>(
            "SELECT well_name, stage_number, pre_sand, post_sand, spp, comments \
             FROM quality_checks WHERE job_id = $1 ORDER BY well_name, stage_number",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_quality_checks_for_well(
        &self,
        job_id: &str,
        well_name: &str,
    ) -> Result<Vec<QualityRecord>> {
        let records = sqlx::query_as::<_, QualityRecord>(
            "SELECT well_name, stage_number, pre_sand, post_sand, spp, comments \
             FROM quality_checks WHERE job_id = $1 AND well_name = $2 ORDER BY stage_number",
        )
        .bind(job_id)
        .bind(well_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn mark_report_processed(&self, report: NewProcessedReport) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO processed_reports
                (file_name, job_id, kind, rows_parsed, rows_dropped, rows_affected, processing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (file_name) DO UPDATE SET
                rows_parsed = EXCLUDED.rows_parsed,
                rows_dropped = EXCLUDED.rows_dropped,
                rows_affected = EXCLUDED.rows_affected,
                processing_status = EXCLUDED.processing_status,
                processed_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&report.file_name)
        .bind(&report.job_id)
        .bind(&report.kind)
        .bind(report.rows_parsed)
        .bind(report.rows_dropped)
        .bind(report.rows_affected)
        .bind(&report.processing_status)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_processed_report(&self, file_name: &str) -> Result<Option<ProcessedReport>> {
        let report = sqlx::query_as::<_, ProcessedReport>(
            "SELECT * FROM processed_reports WHERE file_name = $1",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(report)
    }

    pub async fn mark_job_archived(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET archived_at = NOW() WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Keep the last occurrence of each key, preserving first-seen order of the
/// keys. Batched ON CONFLICT upserts cannot touch the same row twice in one
/// statement, and last-write-wins matches the store's upsert contract.
fn dedup_last_by<T: Clone, K: PartialEq>(items: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut result: Vec<(K, T)> = Vec::with_capacity(items.len());

    for item in items {
        let k = key(item);
        match result.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, slot)) => *slot = item.clone(),
            None => result.push((k, item.clone())),
        }
    }

    result.into_iter().map(|(_, item)| item).collect()
}
