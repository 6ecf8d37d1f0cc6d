use crate::config::InboxConfig;
use crate::error::{AppError, Result};
use glob::Pattern;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Kpi,
    Quality,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Kpi => "kpi",
            ReportKind::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportFile {
    pub name: String,
    pub path: PathBuf,
    pub job_id: String,
    pub kind: ReportKind,
}

/// Watched directory where uploaded reports land. The upload side names
/// files `{job_id}__{description}.csv`; anything that does not parse to a
/// job id and a known report kind is left alone.
pub struct Inbox {
    dir: PathBuf,
    kpi_patterns: Vec<Pattern>,
    quality_patterns: Vec<Pattern>,
}

impl Inbox {
    pub fn new(config: &InboxConfig) -> Result<Self> {
        Ok(Self {
            dir: PathBuf::from(&config.dir),
            kpi_patterns: compile_patterns(&config.kpi_patterns)?,
            quality_patterns: compile_patterns(&config.quality_patterns)?,
        })
    }

    /// List the report files currently in the inbox, sorted by file name so
    /// every scan processes them in the same order.
    pub async fn scan(&self) -> Result<Vec<ReportFile>> {
        let mut reports = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();

            let kind = match self.classify(&name) {
                Some(kind) => kind,
                None => {
                    debug!("Ignoring inbox file with unrecognized kind: {}", name);
                    continue;
                }
            };

            let job_id = match parse_report_name(&name) {
                Some(job_id) => job_id,
                None => {
                    debug!("Ignoring inbox file without a job id prefix: {}", name);
                    continue;
                }
            };

            reports.push(ReportFile {
                name,
                path: entry.path(),
                job_id,
                kind,
            });
        }

        reports.sort_by(|a, b| a.name.cmp(&b.name));

        info!("Found {} report files in {}", reports.len(), self.dir.display());
        Ok(reports)
    }

    pub async fn read_report(&self, report: &ReportFile) -> Result<String> {
        debug!("Reading report {}", report.path.display());
        let content = tokio::fs::read_to_string(&report.path).await?;
        Ok(content)
    }

    fn classify(&self, file_name: &str) -> Option<ReportKind> {
        let lowered = file_name.to_lowercase();

        if self.kpi_patterns.iter().any(|p| p.matches(&lowered)) {
            return Some(ReportKind::Kpi);
        }
        if self.quality_patterns.iter().any(|p| p.matches(&lowered)) {
            return Some(ReportKind::Quality);
        }
        None
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| AppError::Config(format!("Invalid pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Extract the job id from a report file name.
/// Format: {JOB_ID}__{DESCRIPTION}.csv
/// Example: 25-052__kpi_2025-07-14.csv
fn parse_report_name(file_name: &str) -> Option<String> {
    let (job_id, rest) = file_name.split_once("__")?;
    if job_id.is_empty() || rest.is_empty() {
        return None;
    }
    Some(job_id.to_string())
}
