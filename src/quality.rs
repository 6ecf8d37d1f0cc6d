use crate::db::models::QualityRecord;
use serde::Serialize;

/// Fixed condition sets for sand-drop and SPP observations. Values are
/// case-sensitive and match the checklist form exactly. An empty value means
/// the observation was not recorded and is skipped by the summaries.
pub const PRE_SAND_CONDITIONS: &[&str] =
    &["Good", "Medium", "Bad", "No Usable Drop", "Drop not performed"];
pub const POST_SAND_CONDITIONS: &[&str] =
    &["Good", "Medium", "Bad", "No Usable Drop", "No post sand"];
pub const SPP_CONDITIONS: &[&str] = &["Good", "Anomaly", "No Post Sand", "N/A"];

pub fn is_valid_pre_sand(value: &str) -> bool {
    value.is_empty() || PRE_SAND_CONDITIONS.contains(&value)
}

pub fn is_valid_post_sand(value: &str) -> bool {
    value.is_empty() || POST_SAND_CONDITIONS.contains(&value)
}

pub fn is_valid_spp(value: &str) -> bool {
    value.is_empty() || SPP_CONDITIONS.contains(&value)
}

/// Pre/post sand-drop counts per condition for one well. Rows cover the
/// union of conditions observed on either side, sorted lexicographically;
/// percentages are of the grand total of all pre+post counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RateTable {
    pub rows: Vec<RateRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateRow {
    pub condition: String,
    pub pre: usize,
    pub post: usize,
    pub total: usize,
    pub percent_of_total: f64,
}

/// SPP observation counts per condition for one well, sorted by condition
/// for deterministic output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SppTable {
    pub rows: Vec<SppRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SppRow {
    pub condition: String,
    pub count: usize,
    pub percent_of_total: f64,
}

/// Summarize quality observations for one well into the sand-drop rate
/// table and the SPP table. Empty input yields empty tables; a zero grand
/// total reports 0% rather than dividing.
pub fn summarize_rates(records: &[QualityRecord]) -> (RateTable, SppTable) {
    let pre_counts = count_values(records.iter().map(|r| r.pre_sand.as_str()));
    let post_counts = count_values(records.iter().map(|r| r.post_sand.as_str()));

    let mut conditions: Vec<String> = pre_counts
        .iter()
        .chain(post_counts.iter())
        .map(|(condition, _)| condition.clone())
        .collect();
    conditions.sort();
    conditions.dedup();

    let grand_total: usize = pre_counts.iter().map(|(_, n)| n).sum::<usize>()
        + post_counts.iter().map(|(_, n)| n).sum::<usize>();

    let rows = conditions
        .into_iter()
        .map(|condition| {
            let pre = lookup(&pre_counts, &condition);
            let post = lookup(&post_counts, &condition);
            let total = pre + post;
            RateRow {
                condition,
                pre,
                post,
                total,
                percent_of_total: percent(total, grand_total),
            }
        })
        .collect();

    let mut spp_counts = count_values(records.iter().map(|r| r.spp.as_str()));
    spp_counts.sort_by(|a, b| a.0.cmp(&b.0));
    let spp_total: usize = spp_counts.iter().map(|(_, n)| n).sum();

    let spp_rows = spp_counts
        .into_iter()
        .map(|(condition, count)| SppRow {
            condition,
            count,
            percent_of_total: percent(count, spp_total),
        })
        .collect();

    (RateTable { rows }, SppTable { rows: spp_rows })
}

fn count_values<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        if value.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    counts
}

fn lookup(counts: &[(String, usize)], condition: &str) -> usize {
    counts
        .iter()
        .find(|(v, _)| v == condition)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality(stage: i32, pre: &str, post: &str, spp: &str) -> QualityRecord {
        QualityRecord {
            well_name: "B".to_string(),
            stage_number: stage,
            pre_sand: pre.to_string(),
            post_sand: post.to_string(),
            spp: spp.to_string(),
            comments: String::new(),
        }
    }

    #[test]
    fn test_condition_sets() {
        assert!(is_valid_pre_sand("Drop not performed"));
        assert!(!is_valid_pre_sand("No post sand"));
        assert!(is_valid_post_sand("No post sand"));
        assert!(!is_valid_post_sand("Drop not performed"));
        assert!(is_valid_spp("N/A"));
        assert!(!is_valid_spp("good"));
        // Unrecorded observations are legal everywhere
        assert!(is_valid_pre_sand(""));
        assert!(is_valid_post_sand(""));
        assert!(is_valid_spp(""));
    }

    #[test]
    fn test_rate_table_union_and_percentages() {
        // pre = [Good, Good, Bad], post = [Good] (two posts not recorded)
        let records = vec![
            quality(1, "Good", "Good", "Good"),
            quality(2, "Good", "", "Good"),
            quality(3, "Bad", "", "Anomaly"),
        ];

        let (rate, _) = summarize_rates(&records);

        assert_eq!(rate.rows.len(), 2);
        // Sorted lexicographically: Bad before Good
        assert_eq!(rate.rows[0].condition, "Bad");
        assert_eq!(rate.rows[0].pre, 1);
        assert_eq!(rate.rows[0].post, 0);
        assert_eq!(rate.rows[0].total, 1);
        assert_eq!(rate.rows[1].condition, "Good");
        assert_eq!(rate.rows[1].pre, 2);
        assert_eq!(rate.rows[1].post, 1);
        assert_eq!(rate.rows[1].total, 3);

        // Grand total is 4 observations: 3/4 and 1/4
        assert!((rate.rows[1].percent_of_total - 75.0).abs() < 1e-6);
        assert!((rate.rows[0].percent_of_total - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_rate_table_percentages_sum_to_100() {
        let records = vec![
            quality(1, "Good", "Medium", "Good"),
            quality(2, "Bad", "No post sand", "Anomaly"),
            quality(3, "No Usable Drop", "Good", "N/A"),
            quality(4, "Good", "Good", "Good"),
        ];

        let (rate, spp) = summarize_rates(&records);

        let rate_sum: f64 = rate.rows.iter().map(|r| r.percent_of_total).sum();
        assert!((rate_sum - 100.0).abs() < 1e-6);

        let spp_sum: f64 = spp.rows.iter().map(|r| r.percent_of_total).sum();
        assert!((spp_sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_spp_table() {
        let records = vec![
            quality(1, "Good", "Good", "Good"),
            quality(2, "Good", "Good", "Good"),
            quality(3, "Good", "Good", "Anomaly"),
            quality(4, "Good", "Good", "N/A"),
        ];

        let (_, spp) = summarize_rates(&records);

        assert_eq!(spp.rows.len(), 3);
        assert_eq!(spp.rows[0].condition, "Anomaly");
        assert_eq!(spp.rows[1].condition, "Good");
        assert_eq!(spp.rows[1].count, 2);
        assert!((spp.rows[1].percent_of_total - 50.0).abs() < 1e-6);
        assert_eq!(spp.rows[2].condition, "N/A");
    }

    #[test]
    fn test_empty_input_yields_empty_tables() {
        let (rate, spp) = summarize_rates(&[]);
        assert!(rate.rows.is_empty());
        assert!(spp.rows.is_empty());
    }

    #[test]
    fn test_all_unrecorded_yields_empty_tables() {
        let records = vec![quality(1, "", "", "")];
        let (rate, spp) = summarize_rates(&records);
        assert!(rate.rows.is_empty());
        assert!(spp.rows.is_empty());
    }
}
