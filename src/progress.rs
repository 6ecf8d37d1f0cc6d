use crate::db::models::{StageRecord, WellTarget};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// All valid stage records for one well, in original upload order.
#[derive(Debug, Clone, Serialize)]
pub struct WellGroup {
    pub well_name: String,
    pub records: Vec<StageRecord>,
}

/// Idle-gap view of one well, sorted by stage start time. Idle time is
/// measured start-to-start: the operational definition counts time between
/// consecutive stage starts, not end-to-start gaps.
#[derive(Debug, Clone, Serialize)]
pub struct IdleReport {
    pub well_name: String,
    pub rows: Vec<IdleRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdleRow {
    pub stage_number: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub idle_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WellProgress {
    pub well_name: String,
    pub stages_completed: usize,
    pub target_stages: i32,
    pub stages_remaining: i64,
    pub average_duration_hours: Option<f64>,
    pub last_end_time: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Observed span of the whole job: first stage start to last stage end.
#[derive(Debug, Clone, Serialize)]
pub struct JobWindow {
    pub first_start: DateTime<Utc>,
    pub last_end: DateTime<Utc>,
    pub elapsed_hours: f64,
}

/// Group stage records by well. Wells appear in first-appearance order and
/// records keep their original sequence within each group, so re-grouping a
/// flattened result reproduces the same grouping.
pub fn group_by_well(records: &[StageRecord]) -> Vec<WellGroup> {
    let mut groups: Vec<WellGroup> = Vec::new();

    for record in records {
        match groups
            .iter_mut()
            .find(|g| g.well_name == record.well_name)
        {
            Some(group) => group.records.push(record.clone()),
            None => groups.push(WellGroup {
                well_name: record.well_name.clone(),
                records: vec![record.clone()],
            }),
        }
    }

    groups
}

/// Compute the idle-gap table for one well. The first row of the sorted
/// group has no predecessor and reports no idle value.
pub fn idle_report(group: &WellGroup) -> IdleReport {
    let mut records = group.records.clone();
    records.sort_by_key(|r| r.start_time);

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let idle_hours = if i == 0 {
                None
            } else {
                let gap = record.start_time - records[i - 1].start_time;
                Some(gap.num_seconds() as f64 / 3600.0)
            };
            IdleRow {
                stage_number: record.stage_number,
                start_time: record.start_time,
                end_time: record.end_time,
                idle_hours,
            }
        })
        .collect();

    IdleReport {
        well_name: group.well_name.clone(),
        rows,
    }
}

/// Resolve the declared stage target for an observed well name. Exact match
/// first, then substring containment in either direction, first declared
/// match wins. Declaration order is persisted with the job, which keeps the
/// ambiguous-match case deterministic; the first-match rule itself is a
/// documented limitation of the matching semantics.
pub fn resolve_target(targets: &[WellTarget], observed_name: &str) -> Option<i32> {
    if let Some(target) = targets.iter().find(|t| t.well_name == observed_name) {
        return Some(target.target_stages);
    }

    targets
        .iter()
        .find(|t| names_match(&t.well_name, observed_name))
        .map(|t| t.target_stages)
}

fn names_match(declared: &str, observed: &str) -> bool {
    declared.contains(observed) || observed.contains(declared)
}

/// Project completion for one well. A well with no declared or fuzzy-matched
/// target counts against a target of 0 (the unknown-target sentinel), so its
/// remaining count goes negative rather than clamping. An empty group yields
/// no average and no estimate.
pub fn estimate_well(group: &WellGroup, targets: &[WellTarget]) -> WellProgress {
    let stages_completed = group.records.len();
    let target_stages = resolve_target(targets, &group.well_name).unwrap_or(0);
    let stages_remaining = target_stages as i64 - stages_completed as i64;

    let (average_duration_hours, last_end_time) = if stages_completed == 0 {
        (None, None)
    } else {
        let total: f64 = group.records.iter().map(|r| r.duration_hours()).sum();
        let average = total / stages_completed as f64;
        let last_end = group.records.iter().map(|r| r.end_time).max();
        (Some(average), last_end)
    };

    let estimated_completion = match (average_duration_hours, last_end_time) {
        (Some(average), Some(last_end)) => {
            Some(last_end + hours_duration(stages_remaining as f64 * average))
        }
        _ => None,
    };

    WellProgress {
        well_name: group.well_name.clone(),
        stages_completed,
        target_stages,
        stages_remaining,
        average_duration_hours,
        last_end_time,
        estimated_completion,
    }
}

pub fn estimate(groups: &[WellGroup], targets: &[WellTarget]) -> Vec<WellProgress> {
    groups
        .iter()
        .map(|group| estimate_well(group, targets))
        .collect()
}

/// Pad-wide completion estimate: the latest defined per-well estimate.
/// None when no well has a defined estimate.
pub fn estimate_pad(progresses: &[WellProgress]) -> Option<DateTime<Utc>> {
    progresses
        .iter()
        .filter_map(|p| p.estimated_completion)
        .max()
}

pub fn job_window(records: &[StageRecord]) -> Option<JobWindow> {
    let first_start = records.iter().map(|r| r.start_time).min()?;
    let last_end = records.iter().map(|r| r.end_time).max()?;
    let elapsed_hours = (last_end - first_start).num_seconds() as f64 / 3600.0;

    Some(JobWindow {
        first_start,
        last_end,
        elapsed_hours,
    })
}

/// A job is complete once every declared well has logged at least its target
/// stage count. Wells declared with a zero target never satisfy this.
pub fn job_complete(progresses: &[WellProgress], targets: &[WellTarget]) -> bool {
    if targets.is_empty() {
        return false;
    }

    targets.iter().all(|target| {
        target.target_stages > 0
            && progresses.iter().any(|p| {
                (p.well_name == target.well_name || names_match(&target.well_name, &p.well_name))
                    && p.stages_completed as i64 >= target.target_stages as i64
            })
    })
}

fn hours_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(well: &str, stage: i32, start: &str, end: &str) -> StageRecord {
        StageRecord {
            well_name: well.to_string(),
            stage_number: stage,
            start_time: ts(start),
            end_time: ts(end),
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        Utc.from_utc_datetime(&naive)
    }

    fn target(name: &str, stages: i32) -> WellTarget {
        WellTarget {
            well_name: name.to_string(),
            target_stages: stages,
            simul: false,
        }
    }

    #[test]
    fn test_group_by_well_preserves_order() {
        let records = vec![
            record("B", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
            record("A", 1, "2024-01-01 00:30", "2024-01-01 01:30"),
            record("B", 2, "2024-01-01 02:00", "2024-01-01 03:00"),
        ];

        let groups = group_by_well(&records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].well_name, "B");
        assert_eq!(groups[0].records.len(), 2);
        assert_eq!(groups[0].records[1].stage_number, 2);
        assert_eq!(groups[1].well_name, "A");
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let records = vec![
            record("B", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
            record("A", 1, "2024-01-01 00:30", "2024-01-01 01:30"),
            record("B", 2, "2024-01-01 02:00", "2024-01-01 03:00"),
            record("C", 1, "2024-01-01 04:00", "2024-01-01 05:00"),
        ];

        let first = group_by_well(&records);
        let flattened: Vec<StageRecord> = first
            .iter()
            .flat_map(|g| g.records.iter().cloned())
            .collect();
        let second = group_by_well(&flattened);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.well_name, b.well_name);
            assert_eq!(a.records.len(), b.records.len());
            for (ra, rb) in a.records.iter().zip(b.records.iter()) {
                assert_eq!(ra.stage_number, rb.stage_number);
                assert_eq!(ra.start_time, rb.start_time);
            }
        }
    }

    #[test]
    fn test_idle_report_start_to_start() {
        let group = WellGroup {
            well_name: "A".to_string(),
            records: vec![
                // Out of order on purpose - idle analysis sorts by start
                record("A", 2, "2024-01-01 03:00", "2024-01-01 04:00"),
                record("A", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
            ],
        };

        let report = idle_report(&group);

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].stage_number, 1);
        assert_eq!(report.rows[0].idle_hours, None);
        // 00:00 -> 03:00 between starts, not 01:00 -> 03:00
        assert_eq!(report.rows[1].idle_hours, Some(3.0));
    }

    #[test]
    fn test_estimate_concrete_scenario() {
        // Two 1-hour stages, target 3, last end 04:00 -> estimate 05:00
        let group = WellGroup {
            well_name: "A".to_string(),
            records: vec![
                record("A", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
                record("A", 2, "2024-01-01 03:00", "2024-01-01 04:00"),
            ],
        };
        let targets = vec![target("A", 3)];

        let progress = estimate_well(&group, &targets);

        assert_eq!(progress.stages_completed, 2);
        assert_eq!(progress.target_stages, 3);
        assert_eq!(progress.stages_remaining, 1);
        assert_eq!(progress.average_duration_hours, Some(1.0));
        assert_eq!(progress.last_end_time, Some(ts("2024-01-01 04:00")));
        assert_eq!(progress.estimated_completion, Some(ts("2024-01-01 05:00")));
    }

    #[test]
    fn test_fuzzy_target_resolution() {
        let targets = vec![target("A-1H (long name)", 42), target("B-2H", 10)];

        // Observed name is a substring of the declared one
        assert_eq!(resolve_target(&targets, "A-1H"), Some(42));
        // Declared name is a substring of the observed one
        assert_eq!(resolve_target(&targets, "B-2H ST01"), Some(10));
        // Exact match wins over fuzzy
        assert_eq!(resolve_target(&targets, "B-2H"), Some(10));
        // No match at all
        assert_eq!(resolve_target(&targets, "C-3H"), None);
    }

    #[test]
    fn test_ambiguous_fuzzy_match_uses_declaration_order() {
        let targets = vec![target("Unit A", 12), target("A", 99)];
        // Both declared names substring-match; first declared wins
        assert_eq!(resolve_target(&targets, "Unit A-1H"), Some(12));
    }

    #[test]
    fn test_unknown_target_goes_negative() {
        let group = WellGroup {
            well_name: "Mystery".to_string(),
            records: vec![record("Mystery", 1, "2024-01-01 00:00", "2024-01-01 02:00")],
        };

        let progress = estimate_well(&group, &[]);

        assert_eq!(progress.target_stages, 0);
        assert_eq!(progress.stages_remaining, -1);
        // Estimate still defined - one negative stage backs the clock up
        assert_eq!(progress.estimated_completion, Some(ts("2024-01-01 00:00")));
    }

    #[test]
    fn test_empty_group_has_no_estimate() {
        let group = WellGroup {
            well_name: "A".to_string(),
            records: vec![],
        };

        let progress = estimate_well(&group, &[target("A", 5)]);

        assert_eq!(progress.stages_completed, 0);
        assert_eq!(progress.average_duration_hours, None);
        assert_eq!(progress.last_end_time, None);
        assert_eq!(progress.estimated_completion, None);
        assert!(estimate_pad(&[progress]).is_none());
    }

    #[test]
    fn test_pad_estimate_is_upper_bound() {
        let records = vec![
            record("A", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
            record("A", 2, "2024-01-01 02:00", "2024-01-01 03:00"),
            record("B", 1, "2024-01-01 00:00", "2024-01-01 04:00"),
        ];
        let targets = vec![target("A", 4), target("B", 3)];

        let groups = group_by_well(&records);
        let progresses = estimate(&groups, &targets);
        let pad = estimate_pad(&progresses).unwrap();

        for progress in &progresses {
            if let Some(est) = progress.estimated_completion {
                assert!(pad >= est);
            }
        }
    }

    #[test]
    fn test_job_window() {
        let records = vec![
            record("A", 1, "2024-01-01 06:00", "2024-01-01 07:00"),
            record("B", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
        ];

        let window = job_window(&records).unwrap();

        assert_eq!(window.first_start, ts("2024-01-01 00:00"));
        assert_eq!(window.last_end, ts("2024-01-01 07:00"));
        assert_eq!(window.elapsed_hours, 7.0);

        assert!(job_window(&[]).is_none());
    }

    #[test]
    fn test_job_complete() {
        let records = vec![
            record("A", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
            record("A", 2, "2024-01-01 02:00", "2024-01-01 03:00"),
            record("B", 1, "2024-01-01 00:00", "2024-01-01 01:00"),
        ];
        let groups = group_by_well(&records);

        let targets = vec![target("A", 2), target("B", 1)];
        let progresses = estimate(&groups, &targets);
        assert!(job_complete(&progresses, &targets));

        let targets = vec![target("A", 2), target("B", 2)];
        let progresses = estimate(&groups, &targets);
        assert!(!job_complete(&progresses, &targets));

        // A declared well with no records keeps the job open
        let targets = vec![target("A", 2), target("C", 1)];
        let progresses = estimate(&groups, &targets);
        assert!(!job_complete(&progresses, &targets));

        assert!(!job_complete(&progresses, &[]));
    }
}
