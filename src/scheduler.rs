use crate::archive;
use crate::config::Config;
use crate::db::models::{Job, NewProcessedReport};
use crate::db::Repository;
use crate::error::Result;
use crate::inbox::{Inbox, ReportFile, ReportKind};
use crate::parser::Parser;
use crate::progress;
use crate::quality;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

const COMPLETION_TIME_FORMAT: &str = "%B %d, %Y @ %I:%M %p";

pub struct Scheduler {
    config: Config,
    repository: Arc<Repository>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        repository: Arc<Repository>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            repository,
            shutdown_rx,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let initial_delay = Duration::from_secs(self.config.scheduler.initial_delay_seconds);
        let poll_interval = Duration::from_secs(self.config.scheduler.interval_minutes * 60);

        info!(
            "Scheduler starting with {}s initial delay, {}m interval",
            self.config.scheduler.initial_delay_seconds, self.config.scheduler.interval_minutes
        );

        // Initial delay
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {},
            _ = self.shutdown_rx.changed() => {
                info!("Shutdown received during initial delay");
                return Ok(());
            }
        }

        // Run immediately, then on interval
        if let Err(e) = self.run_ingestion().await {
            error!("Ingestion error: {}", e);
        }

        let mut ticker = interval(poll_interval);
        ticker.tick().await; // First tick is immediate, skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_ingestion().await {
                        error!("Ingestion error: {}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One tick: ingest every report currently in the inbox, then recompute
    /// and log progress and quality summaries for every job. Reports are
    /// re-processed on every tick - stage reports grow as the job runs and
    /// the natural-key upserts make re-ingestion idempotent.
    async fn run_ingestion(&self) -> Result<()> {
        info!("Starting ingestion run");

        let inbox = Inbox::new(&self.config.inbox)?;
        let reports = inbox.scan().await?;

        for report in &reports {
            if let Err(e) = self.process_report(&inbox, report).await {
                error!("Error processing {}: {}", report.name, e);
            }
        }

        for job in self.repository.list_jobs().await? {
            if let Err(e) = self.summarize_job(&job).await {
                error!("Error summarizing job {}: {}", job.job_id, e);
            }
        }

        info!("Ingestion run completed");
        Ok(())
    }

    async fn process_report(&self, inbox: &Inbox, report: &ReportFile) -> Result<()> {
        let job = match self.repository.get_job(&report.job_id).await? {
            Some(job) => job,
            None => {
                warn!(
                    "Report {} addresses unknown job '{}', skipping",
                    report.name, report.job_id
                );
                return Ok(());
            }
        };

        let content = inbox.read_report(report).await?;

        match report.kind {
            ReportKind::Kpi => {
                let (records, stats) = match Parser::parse_stage_report(&content) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Rejecting stage report {}: {}", report.name, e);
                        self.mark_failed(report).await?;
                        return Ok(());
                    }
                };

                info!(
                    "Parsed {}: {} rows, {} kept, {} dropped",
                    report.name, stats.total_rows, stats.parsed, stats.dropped
                );

                let result = self
                    .repository
                    .upsert_stage_records(&job.job_id, &records, &report.name)
                    .await?;

                self.repository
                    .mark_report_processed(NewProcessedReport {
                        file_name: report.name.clone(),
                        job_id: job.job_id.clone(),
                        kind: report.kind.as_str().to_string(),
                        rows_parsed: stats.parsed as i32,
                        rows_dropped: stats.dropped as i32,
                        rows_affected: result.total_rows_affected as i32,
                        processing_status: "completed".to_string(),
                    })
                    .await?;
            }
            ReportKind::Quality => {
                let (records, stats) = match Parser::parse_quality_report(&content) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Rejecting quality report {}: {}", report.name, e);
                        self.mark_failed(report).await?;
                        return Ok(());
                    }
                };

                info!(
                    "Parsed {}: {} rows, {} kept, {} dropped",
                    report.name, stats.total_rows, stats.parsed, stats.dropped
                );

                let result = self
                    .repository
                    .upsert_quality_checks(&job.job_id, &records)
                    .await?;

                self.repository
                    .mark_report_processed(NewProcessedReport {
                        file_name: report.name.clone(),
                        job_id: job.job_id.clone(),
                        kind: report.kind.as_str().to_string(),
                        rows_parsed: stats.parsed as i32,
                        rows_dropped: stats.dropped as i32,
                        rows_affected: result.total_rows_affected as i32,
                        processing_status: "completed".to_string(),
                    })
                    .await?;
            }
        }

        Ok(())
    }

    async fn mark_failed(&self, report: &ReportFile) -> Result<()> {
        self.repository
            .mark_report_processed(NewProcessedReport {
                file_name: report.name.clone(),
                job_id: report.job_id.clone(),
                kind: report.kind.as_str().to_string(),
                rows_parsed: 0,
                rows_dropped: 0,
                rows_affected: 0,
                processing_status: "failed".to_string(),
            })
            .await?;
        Ok(())
    }

    async fn summarize_job(&self, job: &Job) -> Result<()> {
        let records = self.repository.get_stage_records(&job.job_id).await?;
        if records.is_empty() {
            debug!("No stage data yet for job {}", job.job_id);
            return Ok(());
        }

        let targets = self.repository.get_well_targets(&job.job_id).await?;
        let groups = progress::group_by_well(&records);
        let progresses = progress::estimate(&groups, &targets);

        if let Some(window) = progress::job_window(&records) {
            info!(
                "Job {} ({} / {}): started {}, {:.1} hrs elapsed",
                job.job_id,
                job.operator,
                job.pad_name,
                window.first_start.format(COMPLETION_TIME_FORMAT),
                window.elapsed_hours
            );
        }

        for well in &progresses {
            let estimate = match well.estimated_completion {
                Some(est) => est.format(COMPLETION_TIME_FORMAT).to_string(),
                None => "unknown".to_string(),
            };
            let avg = match well.average_duration_hours {
                Some(avg) => format!("{:.2} hrs", avg),
                None => "n/a".to_string(),
            };

            info!(
                "  {}: {}/{} stages completed ({} remaining), avg stage {}, est completion {}",
                well.well_name,
                well.stages_completed,
                well.target_stages,
                well.stages_remaining,
                avg,
                estimate
            );
        }

        for group in &groups {
            let idle = progress::idle_report(group);
            let longest = idle
                .rows
                .iter()
                .filter_map(|r| r.idle_hours)
                .fold(None::<f64>, |acc, h| Some(acc.map_or(h, |a| a.max(h))));
            if let Some(longest) = longest {
                debug!(
                    "  {} longest gap between stage starts: {:.2} hrs",
                    idle.well_name, longest
                );
            }
        }

        match progress::estimate_pad(&progresses) {
            Some(pad_end) => info!(
                "Projected pad completion for job {}: {}",
                job.job_id,
                pad_end.format(COMPLETION_TIME_FORMAT)
            ),
            None => debug!("No pad estimate available for job {}", job.job_id),
        }

        for group in &groups {
            let checks = self
                .repository
                .get_quality_checks_for_well(&job.job_id, &group.well_name)
                .await?;
            if checks.is_empty() {
                continue;
            }

            let (rate, spp) = quality::summarize_rates(&checks);
            for row in &rate.rows {
                debug!(
                    "  {} sand drops {}: pre {} post {} ({:.2}%)",
                    group.well_name, row.condition, row.pre, row.post, row.percent_of_total
                );
            }
            for row in &spp.rows {
                debug!(
                    "  {} SPP {}: {} ({:.2}%)",
                    group.well_name, row.condition, row.count, row.percent_of_total
                );
            }
        }

        if self.config.archive.enabled
            && job.archived_at.is_none()
            && progress::job_complete(&progresses, &targets)
        {
            info!("Job {} reached all declared targets, archiving", job.job_id);
            let quality_checks = self.repository.get_quality_checks(&job.job_id).await?;
            archive::export_job(
                Path::new(&self.config.archive.export_dir),
                job,
                &targets,
                &records,
                &quality_checks,
            )
            .await?;
            self.repository.mark_job_archived(&job.job_id).await?;
        }

        Ok(())
    }
}
