use crate::db::models::{Job, QualityRecord, StageRecord, WellTarget};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Export a finished job for hand-off: metadata as JSON plus flat CSV dumps
/// of the stage and quality data, one directory per job.
pub async fn export_job(
    export_dir: &Path,
    job: &Job,
    targets: &[WellTarget],
    stage_records: &[StageRecord],
    quality_checks: &[QualityRecord],
) -> Result<PathBuf> {
    let job_dir = export_dir.join(&job.job_id);
    tokio::fs::create_dir_all(&job_dir).await?;

    let metadata = serde_json::json!({
        "job": job,
        "wells": targets,
    });
    tokio::fs::write(
        job_dir.join("job_metadata.json"),
        serde_json::to_vec_pretty(&metadata)?,
    )
    .await?;

    tokio::fs::write(
        job_dir.join("stage_records.csv"),
        stage_records_csv(stage_records),
    )
    .await?;

    tokio::fs::write(
        job_dir.join("quality_checks.csv"),
        quality_checks_csv(quality_checks),
    )
    .await?;

    info!(
        "Exported job {} to {} ({} stages, {} quality checks)",
        job.job_id,
        job_dir.display(),
        stage_records.len(),
        quality_checks.len()
    );

    Ok(job_dir)
}

fn stage_records_csv(records: &[StageRecord]) -> String {
    let mut out = String::from("Well Name,Stage,Start time,End time,Duration (hrs)\n");

    for record in records {
        out.push_str(&format!(
            "{},{},{},{},{:.2}\n",
            csv_field(&record.well_name),
            record.stage_number,
            record.start_time.format("%Y-%m-%d %H:%M:%S"),
            record.end_time.format("%Y-%m-%d %H:%M:%S"),
            record.duration_hours()
        ));
    }

    out
}

fn quality_checks_csv(records: &[QualityRecord]) -> String {
    let mut out = String::from("Well Name,Stage,Pre Sand,Post Sand,SPP,Comments\n");

    for record in records {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_field(&record.well_name),
            record.stage_number,
            csv_field(&record.pre_sand),
            csv_field(&record.post_sand),
            csv_field(&record.spp),
            csv_field(&record.comments)
        ));
    }

    out
}

/// Quote a CSV field when it carries a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
